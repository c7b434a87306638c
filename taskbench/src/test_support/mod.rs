//! Test-only harness for exercising tasks and plugins without real processes.
//!
//! A [`TestScope`] owns everything a test creates. Values come from
//! [`Memoized`] cells that build on first access and are torn down in reverse
//! creation order when the scope finishes, on every exit path. On top of that:
//!
//! - [`ProjectFixture`]: throwaway projects in a temp directory, with ordered
//!   initializers applied right after construction.
//! - [`memoized_task`]: registers a task against a memoized project.
//! - [`ExecMock`] / [`StatefulExecMock`]: process-execution doubles installed
//!   through the project's executor seam.

mod exec_mock;
mod fixture;
mod matcher;
mod scope;

pub use exec_mock::{ExecMock, MockError, SlotState, StatefulExecMock};
pub use fixture::{
    DEFAULT_PROJECT_NAME, ProjectFixture, TaskHandle, exec_mock, memoized_task,
    stateful_exec_mock,
};
pub use matcher::{ArgsPattern, InvocationMatcher, Pattern};
pub use scope::{Memoized, TeardownError, TeardownFailure, TestScope};
