//! Task registry: declaration, validation and reference resolution

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::task::{Action, Task, TaskDefinition, TaskId, TaskRef, FORCE_MARKER};

/// Problems found while declaring tasks.
///
/// These are collected rather than returned so that a build program can
/// declare everything and have every mistake reported at once.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// The task name cannot be used from the command line
    #[error("Task {task}: invalid name ({reason})")]
    InvalidName { task: String, reason: String },

    /// Another exported task already has this name
    #[error("Task {task}: an exported task with this name already exists")]
    DuplicateName { task: String },

    /// A dependency reference did not resolve
    #[error("Task {task}: dependency {reference} does not match a task")]
    UnresolvedDependency { task: String, reference: String },

    /// `extend` or `depend` named a task that does not exist
    #[error("Task {task}: no such task")]
    UnknownTask { task: String },

    /// An input or output specification could not be flattened
    #[error("Task {task}: {message}")]
    Spec { task: String, message: String },
}

impl DeclarationError {
    /// Name of the task the error belongs to
    pub fn task(&self) -> &str {
        match self {
            Self::InvalidName { task, .. }
            | Self::DuplicateName { task }
            | Self::UnresolvedDependency { task, .. }
            | Self::UnknownTask { task }
            | Self::Spec { task, .. } => task,
        }
    }
}

/// Reference resolution errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Nothing matched the reference
    #[error("{reference} does not match an exported task")]
    NotFound { reference: String },
}

/// How [`Registry::find`] resolves a reference
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Only exported tasks match, and unknown actions are not adopted
    pub require_exported: bool,
}

impl FindOptions {
    /// Resolution rules for references typed on the command line
    pub fn command() -> Self {
        Self {
            require_exported: true,
        }
    }
}

/// All tasks declared by a build program
#[derive(Debug, Default)]
pub struct Registry {
    tasks: Vec<Task>,
    exported: HashMap<String, TaskId>,
    errors: Vec<DeclarationError>,
    anonymous: usize,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task.
    ///
    /// Always returns an identity; problems are recorded in
    /// [`errors`](Self::errors) and abort the run before anything executes.
    pub fn register(&mut self, definition: TaskDefinition) -> TaskId {
        let name = definition.name.clone();
        let export = definition.export;

        if let Err(reason) = validate_name(&name) {
            self.errors.push(DeclarationError::InvalidName {
                task: name.clone(),
                reason,
            });
        }

        let mut dependencies = Vec::with_capacity(definition.dependencies.len());
        for reference in &definition.dependencies {
            match self.find(reference, FindOptions::default()) {
                Ok(dep) => dependencies.push(dep),
                Err(_) => self.errors.push(DeclarationError::UnresolvedDependency {
                    task: name.clone(),
                    reference: reference.to_string(),
                }),
            }
        }

        // Resolving an action dependency may adopt it into the arena first
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task::new(id, definition, dependencies));

        if export {
            if self.exported.contains_key(&name) {
                self.errors
                    .push(DeclarationError::DuplicateName { task: name.clone() });
            } else {
                self.exported.insert(name.clone(), id);
            }
        }

        debug!(task = %name, id = %id, export, "registered task");
        id
    }

    /// Append a dependency to an already declared task
    pub fn depend(&mut self, task: TaskId, dependency: impl Into<TaskRef>) {
        let reference = dependency.into();
        let Some(name) = self.get(task).map(|t| t.name.clone()) else {
            self.errors.push(DeclarationError::UnknownTask {
                task: task.to_string(),
            });
            return;
        };
        match self.find(&reference, FindOptions::default()) {
            Ok(dep) => self.tasks[task.0].dependencies.push(dep),
            Err(_) => self.errors.push(DeclarationError::UnresolvedDependency {
                task: name,
                reference: reference.to_string(),
            }),
        }
    }

    /// Layer a new action over an exported task.
    ///
    /// The task's previous action, dependencies and specifications move into
    /// a new unexported task that becomes the first dependency of the named
    /// task. The named task keeps its identity, so tasks that already depend
    /// on it now run both layers.
    pub fn extend(&mut self, name: &str, action: Action) -> Option<TaskId> {
        let Some(&id) = self.exported.get(name) else {
            self.errors.push(DeclarationError::UnknownTask {
                task: name.to_string(),
            });
            return None;
        };

        let layer = self
            .tasks
            .iter()
            .filter(|t| !t.export && t.name.starts_with(&format!("{}#", name)))
            .count()
            + 1;
        let inner_id = TaskId(self.tasks.len());

        let outer = &mut self.tasks[id.0];
        let previous = std::mem::replace(&mut outer.action, action);
        let inner_definition = TaskDefinition {
            name: format!("{}#{}", name, layer),
            action: previous,
            dependencies: Vec::new(),
            default: false,
            export: false,
            pure: outer.pure,
            input: outer.input.clone(),
            output: outer.output.clone(),
        };
        let inner_dependencies = std::mem::replace(&mut outer.dependencies, vec![inner_id]);

        self.tasks
            .push(Task::new(inner_id, inner_definition, inner_dependencies));
        debug!(task = %name, layer, "extended task");
        Some(id)
    }

    /// Resolve a reference to a task.
    ///
    /// A name suffixed with [`FORCE_MARKER`] resolves to the named task and
    /// forces it. Without `require_exported`, unexported tasks match by name
    /// and an unknown action is adopted as a new unexported task.
    pub fn find(&mut self, reference: &TaskRef, options: FindOptions) -> Result<TaskId, RegistryError> {
        let visible = |task: &Task| task.export || !options.require_exported;

        let found = match reference {
            TaskRef::Id(id) => self.tasks.get(id.0).filter(|t| visible(t)).map(|t| t.id),
            TaskRef::Action(action) => {
                let existing = self
                    .tasks
                    .iter()
                    .find(|t| t.action.same_as(action) && visible(t))
                    .map(|t| t.id);
                match existing {
                    Some(id) => Some(id),
                    None if !options.require_exported => Some(self.adopt(action.clone())),
                    None => None,
                }
            }
            TaskRef::Name(name) => match self.lookup_name(name, options) {
                Some(id) => Some(id),
                None => {
                    let forced = name
                        .strip_suffix(FORCE_MARKER)
                        .and_then(|base| self.lookup_name(base, options));
                    if let Some(id) = forced {
                        let task = &mut self.tasks[id.0];
                        task.force = true;
                        if !options.require_exported {
                            task.pinned_force = true;
                        }
                    }
                    forced
                }
            },
        };

        found.ok_or_else(|| RegistryError::NotFound {
            reference: reference.to_string(),
        })
    }

    fn lookup_name(&self, name: &str, options: FindOptions) -> Option<TaskId> {
        if let Some(&id) = self.exported.get(name) {
            return Some(id);
        }
        if options.require_exported {
            return None;
        }
        self.tasks.iter().find(|t| t.name == name).map(|t| t.id)
    }

    fn adopt(&mut self, action: Action) -> TaskId {
        self.anonymous += 1;
        let name = format!("anonymous-{}", self.anonymous);
        warn!(task = %name, "adopting unregistered action as an unexported task");
        self.register(TaskDefinition::from_action(name, action).with_export(false))
    }

    /// Look up a task by identity
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    pub(crate) fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id.0]
    }

    pub(crate) fn task_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.tasks[id.0]
    }

    pub(crate) fn tasks_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.iter_mut()
    }

    /// All tasks in declaration order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Names of exported tasks in declaration order
    pub fn exported_names(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.export && self.exported.get(&t.name) == Some(&t.id))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Tasks that run when nothing is selected, in declaration order
    pub fn defaults(&self) -> Vec<TaskId> {
        self.tasks.iter().filter(|t| t.default).map(|t| t.id).collect()
    }

    /// Declaration errors collected so far
    pub fn errors(&self) -> &[DeclarationError] {
        &self.errors
    }

    /// Number of declared tasks, unexported ones included
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task was declared
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name cannot be empty".to_string());
    }
    if name.ends_with(FORCE_MARKER) {
        return Err(format!("name cannot end with '{}'", FORCE_MARKER));
    }
    if name.contains('=') {
        return Err("name cannot contain '='".to_string());
    }
    if name.contains('#') {
        return Err("name cannot contain '#'".to_string());
    }
    if name.chars().any(char::is_whitespace) {
        return Err("name cannot contain whitespace".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(name: &str) -> TaskDefinition {
        TaskDefinition::new(name, |_| Ok(()))
    }

    #[test]
    fn test_register_and_find_by_name() {
        let mut registry = Registry::new();
        let id = registry.register(noop("build"));

        assert_eq!(registry.find(&"build".into(), FindOptions::command()), Ok(id));
        assert!(registry.errors().is_empty());
    }

    #[test]
    fn test_dependencies_resolve_in_order() {
        let mut registry = Registry::new();
        let fetch = registry.register(noop("fetch"));
        let gen = registry.register(noop("gen"));
        let build = registry.register(noop("build").with_dependencies(["gen", "fetch"]));

        assert_eq!(registry.get(build).unwrap().dependencies(), &[gen, fetch]);
    }

    #[test]
    fn test_unresolved_dependency_is_collected() {
        let mut registry = Registry::new();
        registry.register(noop("build").with_dependency("missing"));
        registry.register(noop("test").with_dependency("also-missing"));

        assert_eq!(registry.errors().len(), 2);
        assert_eq!(registry.errors()[0].task(), "build");
        assert!(registry.errors()[1].to_string().contains("also-missing"));
    }

    #[test]
    fn test_duplicate_exported_name() {
        let mut registry = Registry::new();
        let first = registry.register(noop("build"));
        registry.register(noop("build"));

        assert_eq!(
            registry.errors(),
            &[DeclarationError::DuplicateName {
                task: "build".to_string()
            }]
        );
        assert_eq!(registry.find(&"build".into(), FindOptions::command()), Ok(first));
        assert_eq!(registry.exported_names(), vec!["build".to_string()]);
    }

    #[test]
    fn test_invalid_names() {
        let mut registry = Registry::new();
        registry.register(noop(""));
        registry.register(noop("deploy!"));
        registry.register(noop("a=b"));
        registry.register(noop("two words"));
        registry.register(noop("build#1"));

        assert_eq!(registry.errors().len(), 5);
        assert!(registry
            .errors()
            .iter()
            .all(|e| matches!(e, DeclarationError::InvalidName { .. })));
    }

    #[test]
    fn test_unexported_tasks_hidden_from_command() {
        let mut registry = Registry::new();
        let helper = registry.register(noop("helper").with_export(false));
        registry.register(noop("build"));

        assert!(registry.find(&"helper".into(), FindOptions::command()).is_err());
        assert!(registry.find(&helper.into(), FindOptions::command()).is_err());
        assert_eq!(registry.find(&"helper".into(), FindOptions::default()), Ok(helper));
        assert_eq!(registry.exported_names(), vec!["build".to_string()]);
    }

    #[test]
    fn test_force_suffix_sets_force() {
        let mut registry = Registry::new();
        let id = registry.register(noop("build"));

        assert_eq!(registry.find(&"build!".into(), FindOptions::command()), Ok(id));
        assert!(registry.get(id).unwrap().is_forced());
        assert!(registry.find(&"nothing!".into(), FindOptions::command()).is_err());
    }

    #[test]
    fn test_forced_dependency_is_pinned() {
        let mut registry = Registry::new();
        let fetch = registry.register(noop("fetch"));
        registry.register(noop("build").with_dependency("fetch!"));

        let task = registry.get(fetch).unwrap();
        assert!(task.pinned_force);
    }

    #[test]
    fn test_find_by_action_identity() {
        let mut registry = Registry::new();
        let action = Action::new(|_| Ok(()));
        let id = registry.register(TaskDefinition::from_action("lint", action.clone()));

        assert_eq!(
            registry.find(&TaskRef::Action(action), FindOptions::command()),
            Ok(id)
        );
    }

    #[test]
    fn test_unknown_action_is_adopted() {
        let mut registry = Registry::new();
        let action = Action::new(|_| Ok(()));
        let build = registry.register(noop("build").with_dependency(action.clone()));

        let dep = registry.get(build).unwrap().dependencies()[0];
        let adopted = registry.get(dep).unwrap();
        assert!(!adopted.is_exported());
        assert!(adopted.action().same_as(&action));
        assert!(registry.errors().is_empty());

        assert!(registry
            .find(&TaskRef::Action(Action::new(|_| Ok(()))), FindOptions::command())
            .is_err());
    }

    #[test]
    fn test_adopted_dependency_keeps_dependent_identity() {
        let mut registry = Registry::new();
        let build_action = Action::new(|_| Ok(()));
        let build = registry.register(
            TaskDefinition::from_action("build", build_action.clone())
                .with_dependency(Action::new(|_| Ok(()))),
        );

        assert_eq!(registry.len(), 2);
        let found = registry.find(&"build".into(), FindOptions::command()).unwrap();
        assert_eq!(found, build);
        let task = registry.get(found).unwrap();
        assert_eq!(task.name(), "build");
        assert_eq!(task.id(), build);
        assert!(task.action().same_as(&build_action));

        let adopted = registry.get(task.dependencies()[0]).unwrap();
        assert_eq!(adopted.name(), "anonymous-1");
        assert_ne!(adopted.id(), build);
        assert!(registry.tasks().enumerate().all(|(i, t)| t.id().0 == i));
    }

    #[test]
    fn test_extend_wraps_previous_action() {
        let mut registry = Registry::new();
        let fetch = registry.register(noop("fetch"));
        let first = Action::new(|_| Ok(()));
        let build = registry.register(
            TaskDefinition::from_action("build", first.clone())
                .with_dependency("fetch")
                .with_input("a.c"),
        );
        let test = registry.register(noop("test").with_dependency("build"));

        let second = Action::new(|_| Ok(()));
        assert_eq!(registry.extend("build", second.clone()), Some(build));

        let outer = registry.get(build).unwrap();
        assert!(outer.action().same_as(&second));
        let inner = registry.get(outer.dependencies()[0]).unwrap();
        assert_eq!(inner.name(), "build#1");
        assert!(!inner.is_exported());
        assert!(inner.action().same_as(&first));
        assert_eq!(inner.dependencies(), &[fetch]);
        assert_eq!(registry.get(test).unwrap().dependencies(), &[build]);

        registry.extend("build", Action::new(|_| Ok(())));
        let outer = registry.get(build).unwrap();
        assert_eq!(registry.get(outer.dependencies()[0]).unwrap().name(), "build#2");
    }

    #[test]
    fn test_extend_unknown_task() {
        let mut registry = Registry::new();
        assert_eq!(registry.extend("ghost", Action::new(|_| Ok(()))), None);
        assert_eq!(registry.errors().len(), 1);
    }

    #[test]
    fn test_depend_after_declaration() {
        let mut registry = Registry::new();
        let a = registry.register(noop("a"));
        let b = registry.register(noop("b").with_dependency("a"));
        registry.depend(a, "b");
        registry.depend(a, "ghost");

        assert_eq!(registry.get(a).unwrap().dependencies(), &[b]);
        assert_eq!(registry.errors().len(), 1);
    }

    #[test]
    fn test_defaults_in_declaration_order() {
        let mut registry = Registry::new();
        let a = registry.register(noop("a").with_default(true));
        registry.register(noop("b"));
        let c = registry.register(noop("c").with_default(true));

        assert_eq!(registry.defaults(), vec![a, c]);
    }
}
