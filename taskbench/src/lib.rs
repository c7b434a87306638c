//! Build-task plugin system with a mockable process-execution seam.
//!
//! - **[`core`]**: Pure logic (task-kind naming rules, dependency ordering,
//!   request/result values). No I/O.
//! - **[`io`]**: Side effects: project file, child processes, and the
//!   [`io::executor::ProcessExecutor`] seam every external command goes through.
//! - **[`project`]**, **[`task`]**, **[`plugins`]**: the project context that owns
//!   tasks and the executor, the task model, and bundled plugins.
//! - **`test_support`** (feature `test-support`): scoped fixtures, throwaway
//!   projects, and recording/verifying executor doubles.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod load;
pub mod logging;
pub mod plugins;
pub mod project;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
