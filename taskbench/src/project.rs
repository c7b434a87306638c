//! Project context: a named directory that owns tasks, task kinds and the
//! process-execution backend every task runs through.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::graph::{GraphError, execution_order};
use crate::core::kinds::{KindError, KindSpec, TaskKinds};
use crate::core::naming::is_valid_task_name;
use crate::io::executor::{ProcessExecutor, SystemExecutor};
use crate::plugins::Plugin;
use crate::task::{ExecTask, Task, TaskContext, TaskType};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("task `{name}` already exists in project `{project}`")]
    NameConflict { project: String, name: String },

    #[error("unknown task kind `{kind}` (apply the plugin that provides it first)")]
    UnknownTaskKind { kind: String },

    #[error("invalid task name {name:?}")]
    InvalidTaskName { name: String },

    #[error("task `{name}` is not of kind `{kind}`")]
    KindMismatch { name: String, kind: String },

    #[error("process executor already installed for project `{project}` (backend `{backend}`)")]
    ExecutorAlreadyInstalled { project: String, backend: String },

    #[error("task `{task}` failed")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Kind(#[from] KindError),
}

/// A build project: directory, task registry and execution backend.
///
/// An ephemeral project owns its directory and deletes it on
/// [`Project::teardown`], or on drop if teardown was never called.
pub struct Project {
    name: String,
    dir: PathBuf,
    ephemeral: bool,
    torn_down: bool,
    kinds: TaskKinds,
    tasks: BTreeMap<String, Box<dyn Task>>,
    registration_order: Vec<String>,
    executor: Box<dyn ProcessExecutor>,
    executor_installed: bool,
    properties: BTreeMap<String, String>,
    plugins: Vec<String>,
}

impl Project {
    /// Project over an existing directory that outlives it.
    pub fn open(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self::with_ownership(name.into(), dir.into(), false)
    }

    /// Project that owns `dir` and removes it at teardown.
    pub fn ephemeral(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self::with_ownership(name.into(), dir.into(), true)
    }

    fn with_ownership(name: String, dir: PathBuf, ephemeral: bool) -> Self {
        let kinds = TaskKinds::seeded([KindSpec::new(ExecTask::KIND)]);
        debug!(project = %name, dir = %dir.display(), ephemeral, "project created");
        Self {
            name,
            dir,
            ephemeral,
            torn_down: false,
            kinds,
            tasks: BTreeMap::new(),
            registration_order: Vec::new(),
            executor: Box::new(SystemExecutor::default()),
            executor_installed: false,
            properties: BTreeMap::new(),
            plugins: Vec::new(),
        }
    }

    /// Replace the default backend while building the project.
    ///
    /// Unlike [`Project::install_executor`] this does not count as an install.
    pub fn with_executor(mut self, executor: Box<dyn ProcessExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral
    }

    pub fn kinds(&self) -> &TaskKinds {
        &self.kinds
    }

    pub fn register_kind(&mut self, spec: KindSpec) -> Result<(), ProjectError> {
        debug!(project = %self.name, kind = %spec.id, "registering task kind");
        self.kinds.register(spec)?;
        Ok(())
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Apply `plugin` once; applying the same plugin id again is a no-op.
    pub fn apply_plugin(&mut self, plugin: &dyn Plugin) -> Result<()> {
        let id = plugin.id().to_string();
        if self.plugins.contains(&id) {
            debug!(project = %self.name, plugin = %id, "plugin already applied");
            return Ok(());
        }
        plugin
            .apply(self)
            .with_context(|| format!("apply plugin `{id}` to project `{}`", self.name))?;
        info!(project = %self.name, plugin = %id, "plugin applied");
        self.plugins.push(id);
        Ok(())
    }

    pub fn has_plugin(&self, id: &str) -> bool {
        self.plugins.iter().any(|applied| applied == id)
    }

    /// Create a task of kind `T`, configure it, and add it to the registry.
    ///
    /// Without an explicit `name` the kind's default-name rule decides. A name
    /// already taken fails with [`ProjectError::NameConflict`] and leaves the
    /// existing task in place.
    pub fn register_task<T, F>(&mut self, name: Option<&str>, configure: F) -> Result<&T, ProjectError>
    where
        T: TaskType,
        F: FnOnce(&mut T),
    {
        let default_name =
            self.kinds
                .default_name(T::KIND)
                .ok_or_else(|| ProjectError::UnknownTaskKind {
                    kind: T::KIND.to_string(),
                })?;
        let name = name.map(str::to_string).unwrap_or(default_name);
        if !is_valid_task_name(&name) {
            return Err(ProjectError::InvalidTaskName { name });
        }
        if self.tasks.contains_key(&name) {
            warn!(project = %self.name, task = %name, "task name conflict");
            return Err(ProjectError::NameConflict {
                project: self.name.clone(),
                name,
            });
        }

        let mut task = T::create(&name);
        configure(&mut task);
        debug!(project = %self.name, task = %name, kind = T::KIND, "task registered");
        self.tasks.insert(name.clone(), Box::new(task));
        self.registration_order.push(name.clone());
        self.task_as::<T>(&name)
            .ok_or(ProjectError::KindMismatch {
                name,
                kind: T::KIND.to_string(),
            })
    }

    pub fn task(&self, name: &str) -> Option<&dyn Task> {
        self.tasks.get(name).map(|task| task.as_ref())
    }

    /// Typed lookup; `None` if missing or of another kind.
    pub fn task_as<T: TaskType>(&self, name: &str) -> Option<&T> {
        self.tasks.get(name)?.as_any().downcast_ref::<T>()
    }

    pub fn task_as_mut<T: TaskType>(&mut self, name: &str) -> Option<&mut T> {
        self.tasks.get_mut(name)?.as_any_mut().downcast_mut::<T>()
    }

    /// Task names in registration order.
    pub fn task_names(&self) -> &[String] {
        &self.registration_order
    }

    pub fn executor(&self) -> &dyn ProcessExecutor {
        self.executor.as_ref()
    }

    /// Substitute the process-execution backend.
    ///
    /// Allowed once per project; a second install fails with
    /// [`ProjectError::ExecutorAlreadyInstalled`] and keeps the first backend.
    #[instrument(skip_all, fields(project = %self.name, backend = executor.backend()))]
    pub fn install_executor(&mut self, executor: Box<dyn ProcessExecutor>) -> Result<(), ProjectError> {
        if self.executor_installed {
            warn!("executor already installed");
            return Err(ProjectError::ExecutorAlreadyInstalled {
                project: self.name.clone(),
                backend: self.executor.backend().to_string(),
            });
        }
        debug!(previous = self.executor.backend(), "installing executor");
        self.executor = executor;
        self.executor_installed = true;
        Ok(())
    }

    /// Run `name` after its transitive dependencies; returns the executed order.
    pub fn run_task(&self, name: &str) -> Result<Vec<String>, ProjectError> {
        self.run_tasks(&[name.to_string()])
    }

    #[instrument(skip_all, fields(project = %self.name))]
    pub fn run_tasks(&self, targets: &[String]) -> Result<Vec<String>, ProjectError> {
        let graph: BTreeMap<String, Vec<String>> = self
            .tasks
            .iter()
            .map(|(name, task)| (name.clone(), task.depends_on().to_vec()))
            .collect();
        let order = execution_order(&graph, targets)?;
        let ctx = TaskContext {
            project_dir: &self.dir,
            executor: self.executor.as_ref(),
        };
        for name in &order {
            let Some(task) = self.tasks.get(name) else {
                return Err(GraphError::UnknownTask { name: name.clone() }.into());
            };
            info!(task = %name, kind = task.kind(), "running task");
            task.run(&ctx).map_err(|source| ProjectError::TaskFailed {
                task: name.clone(),
                source: source.into(),
            })?;
        }
        Ok(order)
    }

    /// Release the project; an ephemeral project deletes its directory.
    #[instrument(skip_all, fields(project = %self.name))]
    pub fn teardown(mut self) -> Result<()> {
        self.torn_down = true;
        if !self.ephemeral {
            return Ok(());
        }
        remove_project_dir(&self.dir)
            .with_context(|| format!("remove project directory {}", self.dir.display()))
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        if self.torn_down || !self.ephemeral {
            return;
        }
        if let Err(err) = remove_project_dir(&self.dir) {
            warn!(dir = %self.dir.display(), err = %err, "failed to remove project directory on drop");
        }
    }
}

impl std::fmt::Debug for Project {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Project")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("ephemeral", &self.ephemeral)
            .field("tasks", &self.registration_order)
            .field("executor", &self.executor.backend())
            .finish()
    }
}

fn remove_project_dir(dir: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "project directory removed");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kinds::DefaultNameRule;
    use crate::core::types::{ExecRequest, ExecResult};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct LogExecutor {
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl ProcessExecutor for LogExecutor {
        fn backend(&self) -> &str {
            "log"
        }

        fn exec(&self, request: &ExecRequest) -> Result<ExecResult> {
            self.seen.borrow_mut().push(request.command_line());
            Ok(ExecResult::success())
        }
    }

    fn project() -> (tempfile::TempDir, Project) {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = Project::open("demo", temp.path());
        (temp, project)
    }

    #[test]
    fn register_task_derives_default_name() {
        let (_temp, mut project) = project();
        let task = project
            .register_task::<ExecTask, _>(None, |task| task.command = "true".into())
            .expect("register");
        assert_eq!(task.name(), "exec");
        assert_eq!(task.command, "true");
    }

    #[test]
    fn explicit_name_ignores_fixed_rule() {
        let (_temp, mut project) = project();
        let mut kinds = TaskKinds::new();
        kinds
            .register(KindSpec::new("Exec").with_rule(DefaultNameRule::Fixed("run".into())))
            .expect("kind");
        project.kinds = kinds;

        let named = project
            .register_task::<ExecTask, _>(Some("fmt"), |_| {})
            .expect("register")
            .name()
            .to_string();
        assert_eq!(named, "fmt");
        let defaulted = project
            .register_task::<ExecTask, _>(None, |_| {})
            .expect("register")
            .name()
            .to_string();
        assert_eq!(defaulted, "run");
    }

    #[test]
    fn duplicate_name_keeps_first_task() {
        let (_temp, mut project) = project();
        project
            .register_task::<ExecTask, _>(Some("fmt"), |task| task.command = "first".into())
            .expect("register");
        let err = project
            .register_task::<ExecTask, _>(Some("fmt"), |task| task.command = "second".into())
            .unwrap_err();
        assert_eq!(err.to_string(), "task `fmt` already exists in project `demo`");
        assert_eq!(project.task_names(), ["fmt".to_string()]);
        assert_eq!(project.task_as::<ExecTask>("fmt").expect("task").command, "first");
    }

    #[test]
    fn configure_is_not_called_on_conflict() {
        let (_temp, mut project) = project();
        project
            .register_task::<ExecTask, _>(None, |_| {})
            .expect("register");
        let mut called = false;
        let _ = project.register_task::<ExecTask, _>(None, |_| called = true);
        assert!(!called);
    }

    #[test]
    fn run_task_runs_dependencies_through_executor() {
        let (_temp, project) = project();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut project = project.with_executor(Box::new(LogExecutor { seen: seen.clone() }));
        project
            .register_task::<ExecTask, _>(Some("fmt"), |task| task.command_line(["cargo", "fmt"]))
            .expect("fmt");
        project
            .register_task::<ExecTask, _>(Some("ci"), |task| {
                task.command_line(["just", "ci"]);
                task.depend_on("fmt");
            })
            .expect("ci");

        let order = project.run_task("ci").expect("run");
        assert_eq!(order, vec!["fmt".to_string(), "ci".to_string()]);
        assert_eq!(*seen.borrow(), vec!["cargo fmt", "just ci"]);
    }

    #[test]
    fn install_executor_twice_is_rejected() {
        let (_temp, mut project) = project();
        project
            .install_executor(Box::new(LogExecutor::default()))
            .expect("first install");
        let err = project
            .install_executor(Box::new(LogExecutor::default()))
            .unwrap_err();
        assert!(matches!(err, ProjectError::ExecutorAlreadyInstalled { .. }));
        assert!(err.to_string().contains("already installed"));
    }

    #[test]
    fn ephemeral_teardown_removes_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("project");
        fs::create_dir_all(dir.join("nested")).expect("mkdir");
        let project = Project::ephemeral("demo", &dir);
        project.teardown().expect("teardown");
        assert!(!dir.exists());
    }

    #[test]
    fn dropping_ephemeral_project_removes_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path().join("project");
        fs::create_dir_all(&dir).expect("mkdir");
        drop(Project::ephemeral("demo", &dir));
        assert!(!dir.exists());
    }

    #[test]
    fn persistent_project_keeps_directory() {
        let (temp, project) = project();
        project.teardown().expect("teardown");
        assert!(temp.path().exists());
    }
}
