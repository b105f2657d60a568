//! Solver process execution under a wall-clock budget.
//!
//! Every solver runs as the leader of its own process group; expiry signals
//! the whole group so helper processes forked by the solver go down with it.

use anyhow::{anyhow, Result};
use std::fs;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    /// Process exited on its own; `None` when it was killed by a signal.
    Exited(Option<i32>),
    TimedOut,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessExit {
    pub kind: ExitKind,
    pub elapsed: Duration,
}

/// Runs `command` with stdout captured into `log_path` (truncated first).
pub fn run_to_log(
    command: &[String],
    log_path: &Path,
    timeout: Duration,
    kill_grace: Duration,
) -> Result<ProcessExit> {
    if command.is_empty() {
        return Err(anyhow!("empty_command: nothing to run for {}", log_path.display()));
    }
    if let Some(parent) = log_path.parent() {
        planlab_core::ensure_dir(parent)?;
    }
    let log = fs::File::create(log_path)?;
    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::from(log))
        .stderr(Stdio::inherit())
        .process_group(0);
    let started = Instant::now();
    let mut child = cmd
        .spawn()
        .map_err(|e| anyhow!("spawn_failed: {:?}: {}", command, e))?;
    let kind = wait_or_kill_group(&mut child, timeout, kill_grace)?;
    Ok(ProcessExit {
        kind,
        elapsed: started.elapsed(),
    })
}

/// Waits for `child` up to `timeout`. On expiry the child's process group gets
/// SIGTERM, then SIGKILL once `kill_grace` has passed, and the child is reaped.
pub fn wait_or_kill_group(
    child: &mut Child,
    timeout: Duration,
    kill_grace: Duration,
) -> Result<ExitKind> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(status) => return Ok(ExitKind::Exited(status.code())),
            None if Instant::now() >= deadline => break,
            None => thread::sleep(POLL_INTERVAL),
        }
    }

    let pgid = child.id() as libc::pid_t;
    tracing::debug!(pgid, "timeout expired, terminating process group");
    signal_group(pgid, libc::SIGTERM);
    let grace_deadline = Instant::now() + kill_grace;
    let mut reaped: Option<ExitStatus> = None;
    loop {
        match child.try_wait()? {
            Some(status) => {
                reaped = Some(status);
                break;
            }
            None if Instant::now() >= grace_deadline => break,
            None => thread::sleep(POLL_INTERVAL),
        }
    }
    // The leader may be gone while descendants ignore SIGTERM; the group id
    // stays valid as long as any member is alive.
    signal_group(pgid, libc::SIGKILL);
    if reaped.is_none() {
        child.wait()?;
    }
    wait_for_group_exit(pgid, kill_grace);
    Ok(ExitKind::TimedOut)
}

fn signal_group(pgid: libc::pid_t, signal: libc::c_int) {
    // SAFETY: killpg has no memory-safety preconditions; ESRCH for an
    // already-empty group is expected and ignored.
    unsafe {
        libc::killpg(pgid, signal);
    }
}

fn group_has_members(pgid: libc::pid_t) -> bool {
    // SAFETY: signal 0 only probes for existence.
    unsafe { libc::killpg(pgid, 0) == 0 }
}

fn wait_for_group_exit(pgid: libc::pid_t, bound: Duration) {
    let deadline = Instant::now() + bound;
    while group_has_members(pgid) && Instant::now() < deadline {
        thread::sleep(POLL_INTERVAL);
    }
}
