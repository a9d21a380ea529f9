//! CLI definition and argument splitting

pub mod output;

use std::path::PathBuf;

use clap::Parser;
use kiln_tasks::{Parameters, RunRequest, FORCE_MARKER};

/// Kiln - run the tasks of a build program, skipping what is up to date
#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Tasks to run (`name` or `name!`), parameters (`key=value`) and `!` to force
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Arguments handed to the last task named on the command line
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,

    /// Working directory
    #[arg(short = 'C', long)]
    pub directory: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Fingerprint cache file, overriding the configuration
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Neither read nor write the fingerprint cache
    #[arg(long)]
    pub no_cache: bool,

    /// List exported tasks and exit
    #[arg(long, conflicts_with = "clean")]
    pub list: bool,

    /// Delete the fingerprint cache and exit
    #[arg(long)]
    pub clean: bool,
}

/// Command-line targets sorted into what they mean
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    /// Task references in command-line order
    pub tasks: Vec<String>,
    /// `key=value` assignments
    pub parameters: Parameters,
    /// A bare `!` was given
    pub force: bool,
    /// Trailing arguments
    pub args: Vec<String>,
}

impl Invocation {
    /// Split the positional targets of a parsed command line
    pub fn from_cli(cli: &Cli) -> Self {
        let mut invocation = Self {
            args: cli.args.clone(),
            ..Self::default()
        };

        for target in &cli.targets {
            if let Some((key, value)) = Parameters::parse_assignment(target) {
                invocation.parameters.insert(key, value);
            } else if target.len() == FORCE_MARKER.len_utf8() && target.starts_with(FORCE_MARKER) {
                invocation.force = true;
            } else {
                invocation.tasks.push(target.clone());
            }
        }

        invocation
    }

    /// The scheduler request for this invocation
    pub fn request(&self) -> RunRequest {
        RunRequest::new(self.tasks.iter().cloned())
            .with_force(self.force)
            .with_args(self.args.iter().cloned())
    }
}
