//! Process-execution seam.
//!
//! Every external command a task runs goes through [`ProcessExecutor`]. The
//! project holds one boxed executor; production uses [`SystemExecutor`], tests
//! substitute a recording double without touching task code.

use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument, warn};

use crate::core::types::{ExecRequest, ExecResult};
use crate::io::config::ExecutorConfig;
use crate::io::process::run_captured;

/// Exit code reported when the child was terminated without one (e.g. by a signal).
pub const NO_EXIT_CODE: i32 = -1;

/// Abstraction over external-process backends.
pub trait ProcessExecutor {
    /// Short backend label for logs and diagnostics (e.g. `system`, `mock`).
    fn backend(&self) -> &str;

    /// Run `request` and report its exit code and output.
    ///
    /// A non-zero exit code is not an error at this level; callers decide.
    fn exec(&self, request: &ExecRequest) -> Result<ExecResult>;
}

/// Executor that spawns real child processes.
#[derive(Debug, Clone)]
pub struct SystemExecutor {
    timeout: Duration,
    output_limit_bytes: usize,
}

impl SystemExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl Default for SystemExecutor {
    fn default() -> Self {
        Self::new(&ExecutorConfig::default())
    }
}

impl ProcessExecutor for SystemExecutor {
    fn backend(&self) -> &str {
        "system"
    }

    #[instrument(skip_all, fields(command = %request.command))]
    fn exec(&self, request: &ExecRequest) -> Result<ExecResult> {
        let output = run_captured(request, self.timeout, self.output_limit_bytes)?;
        if output.timed_out {
            return Err(anyhow!(
                "`{}` timed out after {:?}",
                request.command_line(),
                self.timeout
            ));
        }
        let exit_code = match output.status.code() {
            Some(code) => code,
            None => {
                warn!(command = %request.command, "process exited without an exit code");
                NO_EXIT_CODE
            }
        };
        Ok(ExecResult {
            exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Run `request` and fail unless it exits with code 0.
///
/// The error carries the command line, exit code and trimmed stderr.
pub fn exec_checked(executor: &dyn ProcessExecutor, request: &ExecRequest) -> Result<ExecResult> {
    let result = executor.exec(request)?;
    if !result.is_success() {
        warn!(
            backend = executor.backend(),
            exit_code = result.exit_code,
            "command failed"
        );
        let stderr = result.stderr_lossy();
        let stderr = stderr.trim();
        if stderr.is_empty() {
            return Err(anyhow!(
                "`{}` failed with exit code {}",
                request.command_line(),
                result.exit_code
            ));
        }
        return Err(anyhow!(
            "`{}` failed with exit code {}: {}",
            request.command_line(),
            result.exit_code,
            stderr
        ));
    }
    debug!(backend = executor.backend(), "command succeeded");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedExecutor {
        result: ExecResult,
    }

    impl ProcessExecutor for FixedExecutor {
        fn backend(&self) -> &str {
            "fixed"
        }

        fn exec(&self, _request: &ExecRequest) -> Result<ExecResult> {
            Ok(self.result.clone())
        }
    }

    #[test]
    fn exec_checked_passes_success_through() {
        let executor = FixedExecutor {
            result: ExecResult::success().with_stdout("ok"),
        };
        let request = ExecRequest::new("helm", "/work").arg("version");
        let result = exec_checked(&executor, &request).expect("exec");
        assert_eq!(result.stdout_lossy(), "ok");
    }

    #[test]
    fn exec_checked_reports_exit_code_and_stderr() {
        let executor = FixedExecutor {
            result: ExecResult::failure(1).with_stderr("Error: chart not found\n"),
        };
        let request = ExecRequest::new("helm", "/work").args(["lint", "chart"]);
        let err = exec_checked(&executor, &request).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`helm lint chart` failed with exit code 1: Error: chart not found"
        );
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_runs_real_commands() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = SystemExecutor::default();
        let request = ExecRequest::new("sh", temp.path()).args(["-c", "echo out; echo err >&2; exit 4"]);
        let result = executor.exec(&request).expect("exec");
        assert_eq!(result.exit_code, 4);
        assert_eq!(result.stdout_lossy(), "out\n");
        assert_eq!(result.stderr_lossy(), "err\n");
    }

    #[cfg(unix)]
    #[test]
    fn system_executor_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let executor = SystemExecutor::new(&ExecutorConfig {
            timeout_secs: 1,
            output_limit_bytes: 1024,
        });
        let request = ExecRequest::new("sh", temp.path()).args(["-c", "sleep 5"]);
        let err = executor.exec(&request).unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
