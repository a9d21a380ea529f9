//! Helpers for task actions that shell out

use std::process::Command;

use tracing::debug;

/// Failures of [`sh`]
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", status_text(.code))]
    Status { command: String, code: Option<i32> },
}

fn status_text(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Run a command line through `sh -c`, failing on a non-zero exit status
pub fn sh(command: impl AsRef<str>) -> Result<(), ShellError> {
    let command = command.as_ref();
    debug!(command, "running shell command");

    let status = Command::new("sh")
        .arg("-c")
        .arg(command)
        .status()
        .map_err(|source| ShellError::Spawn {
            command: command.to_string(),
            source,
        })?;

    if status.success() {
        Ok(())
    } else {
        Err(ShellError::Status {
            command: command.to_string(),
            code: status.code(),
        })
    }
}

/// Join arguments with single spaces
pub fn join<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| a.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join(["cc", "-c", "a.c"]), "cc -c a.c");
        assert_eq!(join(Vec::<String>::new()), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_sh_status() {
        assert!(sh("true").is_ok());

        let err = sh("exit 3").unwrap_err();
        assert!(matches!(err, ShellError::Status { code: Some(3), .. }));
        assert_eq!(err.to_string(), "`exit 3` exited with status 3");
    }

    #[cfg(unix)]
    #[test]
    fn test_sh_runs_in_shell() {
        let temp = tempfile::TempDir::new().unwrap();
        let target = temp.path().join("out.txt");
        sh(format!("echo hi > '{}'", target.display())).unwrap();
        assert_eq!(std::fs::read_to_string(target).unwrap(), "hi\n");
    }
}
