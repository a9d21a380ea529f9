//! Kiln - incremental task runner
//!
//! A build program declares its tasks into a [`Registry`] and hands control to
//! [`main`], which parses the command line, loads `kiln.toml`, and runs the
//! requested tasks, skipping those whose inputs and outputs are unchanged.
//!
//! ```no_run
//! use kiln::{sh, Registry, TaskDefinition};
//!
//! fn main() -> std::process::ExitCode {
//!     kiln::main(|_params, registry: &mut Registry| {
//!         registry.register(
//!             TaskDefinition::new("compile", |_| Ok(sh("cc -o hello hello.c")?))
//!                 .with_input("hello.c")
//!                 .with_output("hello")
//!                 .with_default(true),
//!         );
//!         Ok(())
//!     })
//! }
//! ```

pub mod cli;
pub mod exit_codes;
pub mod logging;
pub mod reporter;
pub mod shell;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use kiln_core::config::load_config_or_default;
use kiln_tasks::{FingerprintCache, RunError, Scheduler, SchedulerOptions, TaskReporter, TracingReporter};
use tracing::{debug, info};

pub use cli::{Cli, Invocation};
pub use kiln_core::{Config, ForceScope};
pub use kiln_tasks::{
    Action, FileSet, Parameters, Registry, Spec, TaskContext, TaskDefinition, TaskRef,
};
pub use reporter::ConsoleReporter;
pub use shell::{join, sh, ShellError};

use cli::output;

/// Entry point for a build program.
///
/// `build` receives the command-line parameters and declares tasks. Returns
/// the process exit code (see [`exit_codes`]).
pub fn main<F>(build: F) -> ExitCode
where
    F: FnOnce(&Parameters, &mut Registry) -> anyhow::Result<()>,
{
    let mut cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return ExitCode::from(usage_exit_code(&e, e.print())),
    };

    let _guard = logging::init_tracing(cli.verbose, cli.quiet);

    // Actions resolve relative paths against the project directory
    match project_root(&cli) {
        Ok(root) => {
            if let Err(e) = std::env::set_current_dir(&root) {
                output::error(&format!("Cannot change to {}: {}", root.display(), e));
                return ExitCode::from(exit_codes::CONFIG_ERROR);
            }
            cli.directory = Some(root);
        }
        Err(e) => {
            output::error(&format!("Cannot determine working directory: {}", e));
            return ExitCode::from(exit_codes::CONFIG_ERROR);
        }
    }

    ExitCode::from(execute(&cli, build))
}

/// Run a parsed command line and return the exit code.
///
/// Does not touch the process's working directory or global logger.
pub fn execute<F>(cli: &Cli, build: F) -> u8
where
    F: FnOnce(&Parameters, &mut Registry) -> anyhow::Result<()>,
{
    let root = match project_root(cli) {
        Ok(root) => root,
        Err(e) => {
            output::error(&format!("Cannot determine working directory: {}", e));
            return exit_codes::CONFIG_ERROR;
        }
    };

    let config = match load_config_or_default(&root) {
        Ok((config, Some(path))) => {
            debug!(path = %path.display(), "loaded configuration");
            config
        }
        Ok((config, None)) => config,
        Err(e) => {
            output::error(&e.to_string());
            return exit_codes::CONFIG_ERROR;
        }
    };

    let invocation = Invocation::from_cli(cli);
    let options = scheduler_options(cli, &config, &root, &invocation);

    if cli.clean {
        return clean(&options.cache_file, cli.quiet);
    }

    let mut registry = Registry::new();
    if let Err(e) = build(&invocation.parameters, &mut registry) {
        output::error(&format!("{:#}", e));
        return exit_codes::SETUP_ERROR;
    }

    if cli.list {
        for line in list_tasks(&registry) {
            println!("{}", line);
        }
        return exit_codes::SUCCESS;
    }

    let reporter: Arc<dyn TaskReporter> = if cli.quiet {
        Arc::new(TracingReporter)
    } else {
        Arc::new(ConsoleReporter::new())
    };
    let mut scheduler = Scheduler::new(registry, options).with_reporter(reporter);

    match scheduler.run(&invocation.request()) {
        Ok(results) => {
            info!(tasks = results.len(), "run finished");
            exit_codes::SUCCESS
        }
        Err(e) => report_failure(&e),
    }
}

/// Exit code after clap rejected the command line or printed help/version.
///
/// Help that could not be written still counts as a failed invocation.
fn usage_exit_code(error: &clap::Error, printed: std::io::Result<()>) -> u8 {
    if error.use_stderr() || printed.is_err() {
        exit_codes::CONFIG_ERROR
    } else {
        exit_codes::SUCCESS
    }
}

fn project_root(cli: &Cli) -> std::io::Result<PathBuf> {
    let cwd = std::env::current_dir()?;
    Ok(match &cli.directory {
        Some(dir) => cwd.join(dir),
        None => cwd,
    })
}

/// Scheduler options from configuration, overridden by command-line flags
fn scheduler_options(cli: &Cli, config: &Config, root: &Path, invocation: &Invocation) -> SchedulerOptions {
    let mut options = SchedulerOptions::from_config(config);
    if let Some(cache) = &cli.cache {
        options.cache_file = cache.clone();
    }
    if cli.no_cache {
        options.use_cache = false;
    }
    options.cache_file = root.join(&options.cache_file);
    options.parameters = invocation.parameters.clone();
    options
}

fn clean(cache_file: &Path, quiet: bool) -> u8 {
    match FingerprintCache::clear(cache_file) {
        Ok(removed) => {
            if !quiet {
                let path = output::path_style().apply_to(cache_file.display()).to_string();
                if removed {
                    output::success(&format!("Removed {}", path));
                } else {
                    output::info(&format!("No cache at {}", path));
                }
            }
            exit_codes::SUCCESS
        }
        Err(e) => {
            output::error(&e.to_string());
            exit_codes::ERROR
        }
    }
}

/// `--list` output: exported tasks in declaration order, defaults marked
pub fn list_tasks(registry: &Registry) -> Vec<String> {
    let exported = registry.exported_names();
    registry
        .tasks()
        .filter(|t| t.is_exported() && exported.iter().any(|name| name == t.name()))
        .map(|t| output::task_line(t.name(), t.is_default()))
        .collect()
}

/// Print a failed run and choose its exit code
fn report_failure(error: &RunError) -> u8 {
    match error {
        RunError::Setup { errors, exported } => {
            for e in errors {
                output::error(&e.to_string());
            }
            if !exported.is_empty() {
                eprintln!("Exported tasks are listed below.");
                for name in exported {
                    eprintln!("{}", name);
                }
            }
            exit_codes::SETUP_ERROR
        }
        RunError::Declaration { errors } => {
            for e in errors {
                output::error(&e.to_string());
            }
            exit_codes::SETUP_ERROR
        }
        // The console reporter already printed the failing task
        RunError::ActionFailed { .. } | RunError::MissingInput { .. } => exit_codes::ERROR,
        other => {
            output::error(&other.to_string());
            exit_codes::ERROR
        }
    }
}
