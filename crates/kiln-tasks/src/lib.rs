//! Kiln Tasks - Task orchestration engine
//!
//! This crate provides the task registry, nested input/output specification
//! flattening, the fingerprint cache and the depth-first scheduler that
//! decides which tasks run and which are skipped.

pub mod cache;
pub mod context;
pub mod files;
pub mod registry;
pub mod reporter;
pub mod scheduler;
pub mod spec;
pub mod task;

pub use cache::{CacheError, Fingerprint, FingerprintCache, Mtime};
pub use context::{ParameterError, Parameters, TaskContext};
pub use files::FileSet;
pub use registry::{DeclarationError, FindOptions, Registry, RegistryError};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TracingReporter};
pub use scheduler::{
    RunError, RunRequest, Scheduler, SchedulerOptions, SetupError, TaskResult, TaskStatus,
};
pub use spec::{FlatInputs, Producer, Snapshot, SnapshotEntry, Spec, SpecError};
pub use task::{Action, Task, TaskDefinition, TaskId, TaskRef, TaskState, FORCE_MARKER};
