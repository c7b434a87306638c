//! Spawning real child processes with a timeout and bounded output capture.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

#[cfg(unix)]
use nix::sys::signal::{Signal, kill};
#[cfg(unix)]
use nix::unistd::Pid;

use crate::core::types::ExecRequest;

/// Captured child process output.
#[derive(Debug)]
pub struct CapturedOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

/// Run `request` to completion, killing it once `timeout` elapses.
///
/// Both pipes are drained concurrently so a chatty child cannot deadlock on a
/// full pipe. At most `output_limit_bytes` of each stream is kept; the rest is
/// read and discarded.
///
/// On unix the child leads its own process group and a timeout kills the
/// whole group, so background jobs holding the pipes open die with it.
#[instrument(skip_all, fields(command = %request.command, timeout_secs = timeout.as_secs()))]
pub fn run_captured(
    request: &ExecRequest,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CapturedOutput> {
    let mut cmd = Command::new(&request.command);
    cmd.args(&request.args)
        .current_dir(&request.workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);

    debug!(workdir = %request.workdir.display(), "spawning child process");
    let mut child = cmd.spawn().map_err(|err| {
        error!(err = %err, "failed to spawn command");
        anyhow::Error::new(err).context(format!("spawn `{}`", request.command_line()))
    })?;

    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(anyhow!("child output was not piped"));
    };
    let readers = [
        thread::spawn(move || read_limited(stdout, output_limit_bytes)),
        thread::spawn(move || read_limited(stderr, output_limit_bytes)),
    ];

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;

    let [stdout_reader, stderr_reader] = readers;
    let (stdout, stdout_truncated) = join_reader(stdout_reader).context("collect stdout")?;
    let (stderr, stderr_truncated) = join_reader(stderr_reader).context("collect stderr")?;
    if stdout_truncated + stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "command output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "child process exited");
    Ok(CapturedOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Wait up to `timeout`; past it the child is killed and reaped.
fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for child")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "deadline passed, killing child");
    kill_tree(child)?;
    let status = child.wait().context("reap killed child")?;
    Ok((status, true))
}

#[cfg(unix)]
fn kill_tree(child: &mut Child) -> Result<()> {
    let pid = i32::try_from(child.id()).context("child pid out of range")?;
    match kill(Pid::from_raw(-pid), Signal::SIGKILL) {
        Ok(()) => Ok(()),
        // Group already gone; fall back to the direct child.
        Err(nix::errno::Errno::ESRCH) => child.kill().context("kill child"),
        Err(err) => Err(anyhow::Error::new(err).context("kill child process group")),
    }
}

#[cfg(not(unix))]
fn kill_tree(child: &mut Child) -> Result<()> {
    child.kill().context("kill child")
}

fn join_reader(handle: JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .unwrap_or_else(|_| Err(anyhow!("output reader thread panicked")))
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        let keep = n.min(remaining);
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}
