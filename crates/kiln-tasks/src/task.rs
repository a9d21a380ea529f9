//! Task types and definitions

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::Fingerprint;
use crate::context::TaskContext;
use crate::spec::Spec;

/// Suffix on a task reference that forces the task to run
pub const FORCE_MARKER: char = '!';

/// Signature of a task action
pub type ActionFn = dyn Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync;

/// A task's side-effecting operation.
///
/// Actions compare by identity: two clones of the same `Action` are the same
/// action, two separately created closures never are.
#[derive(Clone)]
pub struct Action(Arc<ActionFn>);

impl Action {
    /// Wrap a closure as an action
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Run the action
    pub fn call(&self, ctx: &TaskContext<'_>) -> anyhow::Result<()> {
        (self.0)(ctx)
    }

    /// Whether both handles refer to the same action
    pub fn same_as(&self, other: &Action) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({:p})", Arc::as_ptr(&self.0))
    }
}

/// Identity of a task within a [`Registry`](crate::registry::Registry)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub(crate) usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of a task during one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Not visited yet
    #[default]
    Normal,
    /// Visit in progress; seeing it again means a cycle
    Running,
    /// Action executed
    Done,
    /// Up to date, action not executed
    Skipped,
}

/// A reference to a task
#[derive(Debug, Clone)]
pub enum TaskRef {
    /// By name, optionally suffixed with [`FORCE_MARKER`]
    Name(String),
    /// By registry identity
    Id(TaskId),
    /// By action identity
    Action(Action),
}

impl From<&str> for TaskRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for TaskRef {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<TaskId> for TaskRef {
    fn from(id: TaskId) -> Self {
        Self::Id(id)
    }
}

impl From<Action> for TaskRef {
    fn from(action: Action) -> Self {
        Self::Action(action)
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "\"{}\"", name),
            Self::Id(id) => write!(f, "task {}", id),
            Self::Action(action) => write!(f, "{:?}", action),
        }
    }
}

/// Declaration of a task, consumed by [`Registry::register`](crate::registry::Registry::register)
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Task name
    pub name: String,

    /// Operation to run
    pub action: Action,

    /// Tasks that run first, in order
    pub dependencies: Vec<TaskRef>,

    /// Run when no task is selected on the command line
    pub default: bool,

    /// Selectable from the command line
    pub export: bool,

    /// Running this task never forces its dependents to run
    pub pure: bool,

    /// What the task reads
    pub input: Option<Spec>,

    /// What the task writes
    pub output: Option<Spec>,
}

impl TaskDefinition {
    /// Create a new exported, non-default, impure task definition
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::from_action(name, Action::new(action))
    }

    /// Create a definition around an existing action
    pub fn from_action(name: impl Into<String>, action: Action) -> Self {
        Self {
            name: name.into(),
            action,
            dependencies: Vec::new(),
            default: false,
            export: true,
            pure: false,
            input: None,
            output: None,
        }
    }

    /// Add a dependency
    pub fn with_dependency(mut self, dep: impl Into<TaskRef>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Add several dependencies, in order
    pub fn with_dependencies<I, R>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<TaskRef>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }

    /// Set whether the task runs by default
    pub fn with_default(mut self, default: bool) -> Self {
        self.default = default;
        self
    }

    /// Set whether the task is exported
    pub fn with_export(mut self, export: bool) -> Self {
        self.export = export;
        self
    }

    /// Set whether the task is pure
    pub fn with_pure(mut self, pure: bool) -> Self {
        self.pure = pure;
        self
    }

    /// Set the input specification
    pub fn with_input(mut self, input: impl Into<Spec>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Set the output specification
    pub fn with_output(mut self, output: impl Into<Spec>) -> Self {
        self.output = Some(output.into());
        self
    }
}

/// A registered task and its per-run state
#[derive(Debug)]
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) action: Action,
    pub(crate) dependencies: Vec<TaskId>,
    pub(crate) default: bool,
    pub(crate) export: bool,
    pub(crate) pure: bool,
    pub(crate) input: Option<Spec>,
    pub(crate) output: Option<Spec>,
    /// Forced by a `name!` dependency reference; survives across runs
    pub(crate) pinned_force: bool,
    pub(crate) force: bool,
    pub(crate) state: TaskState,
    pub(crate) input_files: Vec<PathBuf>,
    pub(crate) output_files: Vec<PathBuf>,
    pub(crate) fingerprint: Option<Fingerprint>,
}

impl Task {
    pub(crate) fn new(id: TaskId, definition: TaskDefinition, dependencies: Vec<TaskId>) -> Self {
        Self {
            id,
            name: definition.name,
            action: definition.action,
            dependencies,
            default: definition.default,
            export: definition.export,
            pure: definition.pure,
            input: definition.input,
            output: definition.output,
            pinned_force: false,
            force: false,
            state: TaskState::Normal,
            input_files: Vec::new(),
            output_files: Vec::new(),
            fingerprint: None,
        }
    }

    /// Clear everything a previous run left behind
    pub(crate) fn reset(&mut self) {
        self.force = self.pinned_force;
        self.state = TaskState::Normal;
        self.input_files.clear();
        self.output_files.clear();
        self.fingerprint = None;
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn is_default(&self) -> bool {
        self.default
    }

    pub fn is_exported(&self) -> bool {
        self.export
    }

    pub fn is_pure(&self) -> bool {
        self.pure
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Input files resolved during the current run
    pub fn input_files(&self) -> &[PathBuf] {
        &self.input_files
    }

    /// Output files resolved during the current run
    pub fn output_files(&self) -> &[PathBuf] {
        &self.output_files
    }

    /// Fingerprint computed during the current run
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        self.fingerprint.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_definition_builder() {
        let def = TaskDefinition::new("compile", |_| Ok(()))
            .with_dependency("fetch")
            .with_default(true)
            .with_input("a.txt")
            .with_output("a.out");

        assert_eq!(def.name, "compile");
        assert_eq!(def.dependencies.len(), 1);
        assert!(def.default);
        assert!(def.export);
        assert!(!def.pure);
        assert!(def.input.is_some());
        assert!(def.output.is_some());
    }

    #[test]
    fn test_action_identity() {
        let a = Action::new(|_| Ok(()));
        let b = Action::new(|_| Ok(()));
        assert!(a.same_as(&a.clone()));
        assert!(!a.same_as(&b));
    }

    #[test]
    fn test_task_ref_display() {
        assert_eq!(TaskRef::from("build").to_string(), "\"build\"");
        assert_eq!(TaskRef::from(TaskId(3)).to_string(), "task #3");
    }

    #[test]
    fn test_reset_keeps_pinned_force() {
        let def = TaskDefinition::new("fetch", |_| Ok(()));
        let mut task = Task::new(TaskId(0), def, Vec::new());
        task.pinned_force = true;
        task.state = TaskState::Done;
        task.output_files.push(PathBuf::from("a.txt"));

        task.reset();

        assert!(task.is_forced());
        assert_eq!(task.state(), TaskState::Normal);
        assert!(task.output_files().is_empty());
    }
}
