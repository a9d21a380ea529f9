//! Task execution reporting

use std::sync::Mutex;
use std::time::Duration;

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task's action is about to run
    Started { name: String },
    /// A task's action completed
    Completed { name: String, duration: Duration },
    /// A task was up to date
    Skipped { name: String, reason: String },
    /// A task could not be completed
    Failed { name: String, error: String },
    /// The run finished
    AllCompleted {
        executed: usize,
        skipped: usize,
        duration: Duration,
    },
}

/// Trait for reporting run progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { name } => {
                tracing::info!("Starting {}", name);
            }
            TaskEvent::Completed { name, duration } => {
                tracing::info!("{} completed in {:.1}s", name, duration.as_secs_f64());
            }
            TaskEvent::Skipped { name, reason } => {
                tracing::debug!("{} skipped: {}", name, reason);
            }
            TaskEvent::Failed { name, error } => {
                tracing::error!("{} failed: {}", name, error);
            }
            TaskEvent::AllCompleted {
                executed,
                skipped,
                duration,
            } => {
                tracing::info!(
                    "Run complete: {} executed, {} up to date ({:.1}s)",
                    executed,
                    skipped,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Names of tasks whose action started, in order
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TaskEvent::Started { name } => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
