//! Task model: the trait every task kind implements, plus the built-in `Exec` kind.

use std::any::Any;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::core::types::ExecRequest;
use crate::io::executor::{ProcessExecutor, exec_checked};

/// What a running task can see of its project.
pub struct TaskContext<'a> {
    pub project_dir: &'a Path,
    /// The project's process-execution backend. Tasks never spawn directly.
    pub executor: &'a dyn ProcessExecutor,
}

impl TaskContext<'_> {
    /// Resolve `path` against the project directory (absolute paths pass through).
    pub fn resolve(&self, path: &Path) -> PathBuf {
        self.project_dir.join(path)
    }
}

/// Fields shared by every task kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskCore {
    name: String,
    pub description: Option<String>,
    /// Tasks that must run before this one, in declaration order.
    pub depends_on: Vec<String>,
}

impl TaskCore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A named unit of work owned by a [`crate::project::Project`].
pub trait Task: Any {
    fn core(&self) -> &TaskCore;

    fn core_mut(&mut self) -> &mut TaskCore;

    /// Identifier of this task's kind in the project's kind registry.
    fn kind(&self) -> &'static str;

    /// Perform the task's action.
    fn run(&self, ctx: &TaskContext<'_>) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        self.core().name()
    }

    fn depends_on(&self) -> &[String] {
        &self.core().depends_on
    }

    fn description(&self) -> Option<&str> {
        self.core().description.as_deref()
    }

    /// Add `name` to this task's dependencies.
    fn depend_on(&mut self, name: &str) {
        self.core_mut().depends_on.push(name.to_string());
    }
}

/// A task kind that can be constructed by name during registration.
pub trait TaskType: Task + Sized {
    /// Kind identifier, looked up in the project's kind registry.
    const KIND: &'static str;

    /// Build an unconfigured task called `name`.
    fn create(name: &str) -> Self;
}

/// Runs one external command through the project's executor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecTask {
    core: TaskCore,
    pub command: String,
    pub args: Vec<String>,
    /// Working directory relative to the project directory.
    pub workdir: Option<PathBuf>,
    /// Treat a non-zero exit code as success.
    pub ignore_exit_code: bool,
}

impl ExecTask {
    /// Set program and arguments from a single list (`["cargo","fmt"]`).
    pub fn command_line<I, S>(&mut self, parts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = parts.into_iter().map(Into::into);
        self.command = parts.next().unwrap_or_default();
        self.args = parts.collect();
    }
}

impl Task for ExecTask {
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut TaskCore {
        &mut self.core
    }

    fn kind(&self) -> &'static str {
        Self::KIND
    }

    #[instrument(skip_all, fields(task = %self.core.name()))]
    fn run(&self, ctx: &TaskContext<'_>) -> Result<()> {
        let workdir = match &self.workdir {
            Some(dir) => ctx.resolve(dir),
            None => ctx.project_dir.to_path_buf(),
        };
        let request = ExecRequest::new(&self.command, workdir).args(self.args.iter().cloned());
        info!(command = %request.command_line(), "running command");
        if self.ignore_exit_code {
            let result = ctx.executor.exec(&request)?;
            if !result.is_success() {
                warn!(exit_code = result.exit_code, "ignoring non-zero exit code");
            }
            return Ok(());
        }
        exec_checked(ctx.executor, &request)?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl TaskType for ExecTask {
    const KIND: &'static str = "Exec";

    fn create(name: &str) -> Self {
        Self {
            core: TaskCore::new(name),
            ..Self::default()
        }
    }
}
