//! Stable exit codes for the `taskbench` CLI.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid project file, unknown task, dependency cycle or other usage errors.
pub const INVALID: i32 = 1;
/// A task ran and failed.
pub const TASK_FAILED: i32 = 2;
