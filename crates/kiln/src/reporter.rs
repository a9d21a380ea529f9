//! Console reporter for interactive runs

use std::sync::atomic::{AtomicBool, Ordering};

use kiln_tasks::{TaskEvent, TaskReporter};
use tracing::debug;

use crate::cli::output;

/// Prints a `> name` header before each action, separated by blank lines
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    started: AtomicBool,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to print for an event, if any
    fn render(&self, event: &TaskEvent) -> Option<String> {
        match event {
            TaskEvent::Started { name } => {
                let header = output::task_header(name);
                if self.started.swap(true, Ordering::Relaxed) {
                    Some(format!("\n{}", header))
                } else {
                    Some(header)
                }
            }
            _ => None,
        }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Failed { name, error } => output::error(&format!("{}: {}", name, error)),
            TaskEvent::Skipped { name, reason } => debug!(task = %name, reason = %reason, "skipped"),
            TaskEvent::AllCompleted {
                executed, skipped, ..
            } => debug!(executed, skipped, "run complete"),
            _ => {
                if let Some(line) = self.render(event) {
                    println!("{}", line);
                }
            }
        }
    }
}
