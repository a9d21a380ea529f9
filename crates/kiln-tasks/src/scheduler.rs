//! Depth-first incremental task scheduler
//!
//! A run visits each requested task's dependencies in declared order before
//! the task itself. Every task is visited at most once per run. A visited
//! task is skipped when nothing it depends on ran, it is not forced, its
//! input fingerprint matches the one recorded by the previous run and its
//! outputs exist and are no older than its inputs.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use kiln_core::config::{defaults::DEFAULT_CACHE_FILE, Config, ForceScope};
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheError, Fingerprint, FingerprintCache, Mtime};
use crate::context::{Parameters, TaskContext};
use crate::registry::{DeclarationError, FindOptions, Registry, RegistryError};
use crate::reporter::{TaskEvent, TaskReporter, TracingReporter};
use crate::spec::{flatten_inputs, flatten_outputs, FlatInputs, SpecError};
use crate::task::{TaskId, TaskRef, TaskState};

/// Outcome of a task that settled during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The action ran
    Done,
    /// The task was up to date
    Skipped,
}

/// Result of a single task
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task name
    pub name: String,
    /// Whether the action ran
    pub status: TaskStatus,
    /// How long the action took
    pub duration: Duration,
}

/// Options for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Fingerprint cache file
    pub cache_file: PathBuf,
    /// Whether fingerprints are loaded and saved
    pub use_cache: bool,
    /// Reach of [`RunRequest::force`]
    pub force_scope: ForceScope,
    /// Parameters handed to every action
    pub parameters: Parameters,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            cache_file: PathBuf::from(DEFAULT_CACHE_FILE),
            use_cache: true,
            force_scope: ForceScope::default(),
            parameters: Parameters::new(),
        }
    }
}

impl SchedulerOptions {
    /// Options taken from a loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_file: config.cache.file.clone(),
            use_cache: config.cache.enabled,
            force_scope: config.run.force_scope,
            parameters: Parameters::new(),
        }
    }
}

/// What the command line asked for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    /// Task references, optionally suffixed with `!`; empty runs the defaults
    pub tasks: Vec<String>,
    /// Global force marker
    pub force: bool,
    /// Trailing arguments for the last requested task
    pub args: Vec<String>,
}

impl RunRequest {
    /// Request the given tasks
    pub fn new<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tasks: tasks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Set the global force marker
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Set trailing arguments
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Problems found before anything runs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error(transparent)]
    Resolution(#[from] RegistryError),
}

/// Errors that end a run
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Declaration or command-line errors; nothing ran
    #[error("{}", lines(.errors))]
    Setup {
        errors: Vec<SetupError>,
        /// Names a command-line reference could have used
        exported: Vec<String>,
    },

    /// A task was reached again while its own dependencies were running
    #[error("Circular dependency detected between tasks \"{parent}\" and \"{task}\"")]
    Cycle { parent: String, task: String },

    /// Input files were missing when the task was visited
    #[error("Task {task}: input file(s) do not exist: {}", paths(.files))]
    MissingInput { task: String, files: Vec<PathBuf> },

    /// An action returned an error
    #[error("Task {task} failed: {message}")]
    ActionFailed { task: String, message: String },

    /// Specifications that could not be flattened during the run
    #[error("{}", lines(.errors))]
    Declaration { errors: Vec<DeclarationError> },

    /// The fingerprint cache could not be written
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl RunError {
    /// Whether the run stopped before any action executed
    pub fn is_setup(&self) -> bool {
        matches!(self, Self::Setup { .. })
    }
}

fn lines<E: fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn paths(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| format!("\"{}\"", p.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runs requested tasks and their dependencies
pub struct Scheduler {
    registry: Registry,
    options: SchedulerOptions,
    reporter: Arc<dyn TaskReporter>,
}

impl Scheduler {
    /// Create a new scheduler that reports through tracing
    pub fn new(registry: Registry, options: SchedulerOptions) -> Self {
        Self {
            registry,
            options,
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Replace the reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Run the requested tasks, or every default task if none were requested.
    ///
    /// Setup errors abort before any action runs or the cache is read. Any
    /// error leaves the cache file untouched.
    #[instrument(skip_all, fields(requested = request.tasks.len(), force = request.force))]
    pub fn run(&mut self, request: &RunRequest) -> Result<Vec<TaskResult>, RunError> {
        let start = Instant::now();
        for task in self.registry.tasks_mut() {
            task.reset();
        }

        let initial = self.resolve_initial(request)?;

        let mut cache = if self.options.use_cache {
            FingerprintCache::load(&self.options.cache_file)
        } else {
            FingerprintCache::new(&self.options.cache_file)
        };

        let args_target = if request.tasks.is_empty() {
            None
        } else {
            initial.last().copied()
        };
        if args_target.is_none() && !request.args.is_empty() {
            warn!(
                args = request.args.len(),
                "trailing arguments ignored because no task was named"
            );
        }

        let mut run = Run {
            registry: &mut self.registry,
            cache: &cache,
            parameters: &self.options.parameters,
            reporter: self.reporter.as_ref(),
            force_all: request.force && self.options.force_scope == ForceScope::All,
            args_target,
            args: &request.args,
            results: Vec::new(),
            errors: Vec::new(),
            blocked: HashSet::new(),
        };
        for id in &initial {
            run.visit(*id, None)?;
        }
        let Run {
            results, errors, ..
        } = run;

        if !errors.is_empty() {
            return Err(RunError::Declaration { errors });
        }

        for task in self.registry.tasks() {
            if task.state() == TaskState::Done {
                if let Some(fingerprint) = task.fingerprint() {
                    cache.record(task.name(), fingerprint.clone());
                }
            }
        }
        if self.options.use_cache {
            cache.save()?;
        }

        let executed = results
            .iter()
            .filter(|r| r.status == TaskStatus::Done)
            .count();
        self.reporter.report(&TaskEvent::AllCompleted {
            executed,
            skipped: results.len() - executed,
            duration: start.elapsed(),
        });

        Ok(results)
    }

    fn resolve_initial(&mut self, request: &RunRequest) -> Result<Vec<TaskId>, RunError> {
        let mut errors: Vec<SetupError> = self
            .registry
            .errors()
            .iter()
            .cloned()
            .map(SetupError::from)
            .collect();

        let mut initial = Vec::with_capacity(request.tasks.len());
        for reference in &request.tasks {
            match self
                .registry
                .find(&TaskRef::Name(reference.clone()), FindOptions::command())
            {
                Ok(id) => initial.push(id),
                Err(e) => errors.push(e.into()),
            }
        }

        if !errors.is_empty() {
            return Err(RunError::Setup {
                errors,
                exported: self.registry.exported_names(),
            });
        }

        if request.tasks.is_empty() {
            initial = self.registry.defaults();
            if initial.is_empty() {
                info!("no tasks requested and no default tasks declared");
            }
        }

        if request.force && self.options.force_scope == ForceScope::Initial {
            for id in &initial {
                self.registry.task_mut(*id).force = true;
            }
        }

        Ok(initial)
    }
}

/// State of one traversal
struct Run<'a> {
    registry: &'a mut Registry,
    cache: &'a FingerprintCache,
    parameters: &'a Parameters,
    reporter: &'a dyn TaskReporter,
    force_all: bool,
    args_target: Option<TaskId>,
    args: &'a [String],
    results: Vec<TaskResult>,
    errors: Vec<DeclarationError>,
    /// Tasks that failed to resolve, and every task depending on one
    blocked: HashSet<TaskId>,
}

impl Run<'_> {
    fn visit(&mut self, id: TaskId, parent: Option<TaskId>) -> Result<(), RunError> {
        match self.registry.task(id).state() {
            TaskState::Normal => {}
            TaskState::Running => {
                let parent = parent
                    .map(|p| self.registry.task(p).name().to_string())
                    .unwrap_or_default();
                return Err(RunError::Cycle {
                    parent,
                    task: self.registry.task(id).name().to_string(),
                });
            }
            TaskState::Done | TaskState::Skipped => return Ok(()),
        }
        self.registry.task_mut(id).state = TaskState::Running;

        let mut dependency_ran = false;
        let mut blocked_by = None;
        for dep in self.registry.task(id).dependencies().to_vec() {
            self.visit(dep, Some(id))?;
            if self.blocked.contains(&dep) {
                blocked_by.get_or_insert(dep);
            }
            let dep = self.registry.task(dep);
            if dep.state() == TaskState::Done && !dep.is_pure() {
                dependency_ran = true;
            }
        }

        let name = self.registry.task(id).name().to_string();

        if let Some(dep) = blocked_by {
            let dep = self.registry.task(dep).name().to_string();
            debug!(task = %name, dependency = %dep, "not running, a dependency failed");
            self.reporter.report(&TaskEvent::Skipped {
                name,
                reason: format!("dependency {} failed", dep),
            });
            self.blocked.insert(id);
            self.registry.task_mut(id).state = TaskState::Skipped;
            return Ok(());
        }

        let (inputs, outputs) = match self.materialize(id) {
            Ok(resolved) => resolved,
            Err(e) => {
                let error = DeclarationError::Spec {
                    task: name.clone(),
                    message: e.to_string(),
                };
                self.reporter.report(&TaskEvent::Failed {
                    name,
                    error: error.to_string(),
                });
                self.errors.push(error);
                self.blocked.insert(id);
                self.registry.task_mut(id).state = TaskState::Skipped;
                return Ok(());
            }
        };

        let missing: Vec<PathBuf> = inputs
            .files
            .iter()
            .filter(|path| !path.exists())
            .cloned()
            .collect();
        if !missing.is_empty() {
            let error = RunError::MissingInput {
                task: name.clone(),
                files: missing,
            };
            self.reporter.report(&TaskEvent::Failed {
                name,
                error: error.to_string(),
            });
            return Err(error);
        }

        let fingerprint = Fingerprint::compute(&inputs)?;

        {
            let task = self.registry.task_mut(id);
            task.input_files = inputs.files.clone();
            task.output_files = outputs.clone();
            task.fingerprint = Some(fingerprint.clone());
        }

        match self.stale_reason(id, dependency_ran, &inputs, &fingerprint, &outputs) {
            None => {
                debug!(task = %name, "up to date");
                self.registry.task_mut(id).state = TaskState::Skipped;
                self.reporter.report(&TaskEvent::Skipped {
                    name: name.clone(),
                    reason: "up to date".to_string(),
                });
                self.results.push(TaskResult {
                    name,
                    status: TaskStatus::Skipped,
                    duration: Duration::ZERO,
                });
                return Ok(());
            }
            Some(reason) => debug!(task = %name, reason, "task must run"),
        }

        let action = self.registry.task(id).action().clone();
        let args: &[String] = if self.args_target == Some(id) {
            self.args
        } else {
            &[]
        };
        let ctx = TaskContext {
            name: &name,
            args,
            inputs: &inputs.files,
            outputs: &outputs,
            params: self.parameters,
        };

        self.reporter.report(&TaskEvent::Started { name: name.clone() });
        let started = Instant::now();
        if let Err(e) = action.call(&ctx) {
            let message = format!("{:#}", e);
            self.reporter.report(&TaskEvent::Failed {
                name: name.clone(),
                error: message.clone(),
            });
            return Err(RunError::ActionFailed {
                task: name,
                message,
            });
        }
        let duration = started.elapsed();

        self.registry.task_mut(id).state = TaskState::Done;
        self.reporter.report(&TaskEvent::Completed {
            name: name.clone(),
            duration,
        });
        self.results.push(TaskResult {
            name,
            status: TaskStatus::Done,
            duration,
        });
        Ok(())
    }

    fn materialize(&self, id: TaskId) -> Result<(FlatInputs, Vec<PathBuf>), SpecError> {
        let task = self.registry.task(id);
        let inputs = match &task.input {
            Some(spec) => flatten_inputs(spec)?,
            None => FlatInputs::default(),
        };
        let outputs = match &task.output {
            Some(spec) => flatten_outputs(spec)?,
            None => Vec::new(),
        };
        Ok((inputs, outputs))
    }

    /// Why the task has to run, or `None` if it can be skipped
    fn stale_reason(
        &self,
        id: TaskId,
        dependency_ran: bool,
        inputs: &FlatInputs,
        fingerprint: &Fingerprint,
        outputs: &[PathBuf],
    ) -> Option<&'static str> {
        let task = self.registry.task(id);

        if dependency_ran {
            return Some("a dependency ran");
        }
        if task.is_forced() || self.force_all {
            return Some("forced");
        }
        if self.cache.get(task.name()) != Some(fingerprint) {
            return Some("inputs changed");
        }
        if inputs.snapshot.is_empty() && outputs.is_empty() {
            return Some("no inputs or outputs declared");
        }

        let newest_input = fingerprint.newest_input();
        for output in outputs {
            match output_mtime(output) {
                None => return Some("output missing"),
                Some(mtime) if newest_input.is_some_and(|input| mtime < input) => {
                    return Some("output older than input")
                }
                Some(_) => {}
            }
        }
        None
    }
}

fn output_mtime(path: &Path) -> Option<Mtime> {
    Mtime::of(path).ok()
}
