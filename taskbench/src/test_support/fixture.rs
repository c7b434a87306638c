//! Throwaway projects and the task/mocks registered against them.

use std::cell::RefMut;
use std::fmt;
use std::marker::PhantomData;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use crate::plugins::Plugin;
use crate::project::{Project, ProjectError};
use crate::task::TaskType;
use crate::test_support::exec_mock::{ExecMock, StatefulExecMock};
use crate::test_support::scope::{Memoized, TestScope};

pub const DEFAULT_PROJECT_NAME: &str = "test";

type Initializer = Box<dyn FnOnce(&mut Project) -> Result<()>>;

/// Builder for an ephemeral project in a fresh temp directory.
///
/// Initializers run in the order they were added, right after the project
/// exists. If one fails the project is torn down before the error surfaces.
pub struct ProjectFixture {
    name: String,
    initializers: Vec<Initializer>,
}

impl ProjectFixture {
    pub fn new() -> Self {
        Self {
            name: DEFAULT_PROJECT_NAME.to_string(),
            initializers: Vec::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn initializer<F>(mut self, init: F) -> Self
    where
        F: FnOnce(&mut Project) -> Result<()> + 'static,
    {
        self.initializers.push(Box::new(init));
        self
    }

    pub fn apply_plugin<P>(self, plugin: P) -> Self
    where
        P: Plugin + 'static,
    {
        self.initializer(move |project| project.apply_plugin(&plugin))
    }

    pub fn property(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.initializer(move |project| {
            project.set_property(key, value);
            Ok(())
        })
    }

    pub fn build(self) -> Result<Project> {
        let dir = tempfile::Builder::new()
            .prefix("taskbench-")
            .tempdir()
            .context("create fixture project directory")?
            .keep();
        let mut project = Project::ephemeral(&self.name, dir);
        debug!(project = %self.name, initializers = self.initializers.len(), "building fixture");

        for (index, init) in self.initializers.into_iter().enumerate() {
            if let Err(err) = init(&mut project) {
                if let Err(teardown) = project.teardown() {
                    warn!(err = %format!("{teardown:#}"), "fixture teardown failed after initializer error");
                }
                return Err(err.context(format!(
                    "initializer #{} of project `{}` failed",
                    index + 1,
                    self.name
                )));
            }
        }
        Ok(project)
    }

    /// Defer the build to first access; the project is torn down with `scope`.
    pub fn memoized(self, scope: &TestScope) -> Memoized<Project> {
        let label = format!("project `{}`", self.name);
        scope.memoized_with_teardown(&label, move || self.build(), Project::teardown)
    }
}

impl Default for ProjectFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProjectFixture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectFixture")
            .field("name", &self.name)
            .field("initializers", &self.initializers.len())
            .finish()
    }
}

/// Typed reference to a task registered on a project.
pub struct TaskHandle<T> {
    name: String,
    kind: PhantomData<T>,
}

impl<T: TaskType> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get<'p>(&self, project: &'p Project) -> Result<&'p T> {
        project.task_as::<T>(&self.name).ok_or_else(|| {
            anyhow!(
                "task `{}` of kind `{}` not found in project `{}`",
                self.name,
                T::KIND,
                project.name()
            )
        })
    }

    /// Run the task and its dependencies; returns the executed order.
    pub fn run(&self, project: &Project) -> Result<Vec<String>, ProjectError> {
        project.run_task(&self.name)
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.name).finish()
    }
}

/// Register a task of kind `T` on `project` the first time the handle is used.
///
/// Registration borrows the project mutably, so touch the task handle before
/// holding a `project.get()` guard. The same goes for [`exec_mock`] and
/// [`stateful_exec_mock`].
pub fn memoized_task<T, F>(
    scope: &TestScope,
    project: &Memoized<Project>,
    name: Option<&str>,
    configure: F,
) -> Memoized<TaskHandle<T>>
where
    T: TaskType,
    F: FnOnce(&mut T) + 'static,
{
    let project = project.clone();
    let name = name.map(str::to_string);
    let label = format!("task `{}`", name.as_deref().unwrap_or(T::KIND));
    scope.memoized(&label, move || {
        let mut project = borrow_for_setup(&project, "task")?;
        let task = project.register_task::<T, _>(name.as_deref(), configure)?;
        Ok(TaskHandle {
            name: task.name().to_string(),
            kind: PhantomData,
        })
    })
}

fn borrow_for_setup<'a>(project: &'a Memoized<Project>, what: &str) -> Result<RefMut<'a, Project>> {
    project.get_mut().with_context(|| {
        format!(
            "setting up a {what} needs the project mutably; get the {what} before borrowing {}",
            project.label()
        )
    })
}

/// Stateless mock installed on `project`; verified when the scope finishes.
pub fn exec_mock(scope: &TestScope, project: &Memoized<Project>) -> Memoized<ExecMock> {
    let project = project.clone();
    scope.memoized_with_teardown(
        "exec mock",
        move || {
            let mock = ExecMock::new();
            mock.install(&mut *borrow_for_setup(&project, "mock")?)?;
            Ok(mock)
        },
        |mock| Ok(mock.verify()?),
    )
}

/// Ordered mock installed on `project`; leftover expectations fail the scope.
pub fn stateful_exec_mock(scope: &TestScope, project: &Memoized<Project>) -> Memoized<StatefulExecMock> {
    let project = project.clone();
    scope.memoized_with_teardown(
        "stateful exec mock",
        move || {
            let mock = StatefulExecMock::new();
            mock.install(&mut *borrow_for_setup(&project, "mock")?)?;
            Ok(mock)
        },
        |mock| Ok(mock.verify()?),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn initializers_run_in_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let (first, second) = (log.clone(), log.clone());
        let project = ProjectFixture::new()
            .initializer(move |_| {
                first.borrow_mut().push("first");
                Ok(())
            })
            .initializer(move |_| {
                second.borrow_mut().push("second");
                Ok(())
            })
            .build()
            .expect("build");

        assert_eq!(*log.borrow(), vec!["first", "second"]);
        assert_eq!(project.name(), DEFAULT_PROJECT_NAME);
        assert!(project.is_ephemeral());
        let dir = project.dir().to_path_buf();
        assert!(dir.is_dir());
        project.teardown().expect("teardown");
        assert!(!dir.exists());
    }

    #[test]
    fn failing_initializer_tears_project_down() {
        let seen_dir = Rc::new(RefCell::new(None));
        let capture = seen_dir.clone();
        let ran_after = Rc::new(RefCell::new(false));
        let flag = ran_after.clone();

        let err = ProjectFixture::new()
            .name("broken")
            .initializer(move |project| {
                *capture.borrow_mut() = Some(project.dir().to_path_buf());
                Err(anyhow!("chart missing"))
            })
            .initializer(move |_| {
                *flag.borrow_mut() = true;
                Ok(())
            })
            .build()
            .unwrap_err();

        assert_eq!(
            format!("{err:#}"),
            "initializer #1 of project `broken` failed: chart missing"
        );
        assert!(!*ran_after.borrow());
        let dir = seen_dir.borrow().clone().expect("dir captured");
        assert!(!dir.exists());
    }

    #[test]
    fn task_created_while_project_is_borrowed_explains_the_order() {
        let scope = TestScope::new();
        let project = ProjectFixture::new().memoized(&scope);
        let task = memoized_task::<crate::task::ExecTask, _>(&scope, &project, Some("lint"), |_| {});

        let held = project.get().expect("project");
        let err = task.get().unwrap_err();
        assert!(format!("{err:#}").contains("get the task before borrowing project `test`"));
        drop(held);
        scope.finish().expect("finish");
    }

    #[test]
    fn memoized_project_is_removed_when_scope_finishes() {
        let scope = TestScope::new();
        let project = ProjectFixture::new().property("env", "ci").memoized(&scope);
        let dir = {
            let project = project.get().expect("project");
            assert_eq!(project.property("env"), Some("ci"));
            project.dir().to_path_buf()
        };
        scope.finish().expect("finish");
        assert!(!dir.exists());
    }
}
