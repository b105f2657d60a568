//! Batch dispatch through an external job-queue helper.
//!
//! The helper receives every solver command at once, enforces the timeout and
//! parallelism itself, and reports `RETVAL` lines. Classification happens
//! afterwards in a sequential offline pass over the per-job logs.

use crate::process::ExitKind;
use anyhow::{anyhow, Result};
use planlab_core::config::JobQueueConfig;
use planlab_core::{atomic_write_bytes, Instance};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub binary_index: usize,
    pub instance: Instance,
    pub command: Vec<String>,
    pub log_path: PathBuf,
}

/// `<job-id> <shell-quoted command>` per line.
pub fn render_job_file(jobs: &[Job]) -> String {
    let mut out = String::new();
    for job in jobs {
        out.push_str(&format!("{} {}\n", job.id, shell_join(&job.command)));
    }
    out
}

pub fn write_job_file(path: &Path, jobs: &[Job]) -> Result<()> {
    atomic_write_bytes(path, render_job_file(jobs).as_bytes())
}

/// Runs `<helper...> <job-file> [flags] -T <timeout> -d <log-dir>` and returns
/// its stdout. Blocks until the helper exits.
pub fn run_helper(
    config: &JobQueueConfig,
    job_file: &Path,
    timeout_secs: u64,
    log_dir: &Path,
) -> Result<String> {
    let program = config
        .command
        .first()
        .ok_or_else(|| anyhow!("job_queue_unconfigured: helper command is empty"))?;
    planlab_core::ensure_dir(log_dir)?;
    tracing::info!(job_file = %job_file.display(), "dispatching batch to job-queue helper");
    let output = Command::new(program)
        .args(&config.command[1..])
        .arg(job_file)
        .args(&config.flags)
        .arg("-T")
        .arg(timeout_secs.to_string())
        .arg("-d")
        .arg(log_dir)
        .stdin(Stdio::null())
        .stderr(Stdio::inherit())
        .output()
        .map_err(|e| anyhow!("job_queue_spawn_failed: {:?}: {}", config.command, e))?;
    if !output.status.success() {
        tracing::warn!(status = ?output.status.code(), "job-queue helper exited non-zero");
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Job id to return code, from every stdout line carrying the marker.
pub fn parse_retvals(stdout: &str, config: &JobQueueConfig) -> BTreeMap<u64, i32> {
    let mut retvals = BTreeMap::new();
    for line in stdout.lines() {
        if !line.contains(&config.retval_marker) {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let job_id = tokens
            .get(config.job_id_field)
            .and_then(|t| t.parse::<u64>().ok());
        let retval = tokens
            .get(config.retval_field)
            .and_then(|t| t.parse::<i32>().ok());
        match (job_id, retval) {
            (Some(id), Some(code)) => {
                retvals.insert(id, code);
            }
            _ => tracing::warn!(line, "unparseable RETVAL line"),
        }
    }
    retvals
}

/// How a job ended, judged from the helper's report alone.
pub fn exit_kind_for(retval: Option<i32>, config: &JobQueueConfig) -> ExitKind {
    match retval {
        None => ExitKind::TimedOut,
        Some(code) if config.timeout_return_codes.contains(&code) => ExitKind::TimedOut,
        Some(code) => ExitKind::Exited(Some(code)),
    }
}

/// `<log-dir>/<job-id>/rw`
pub fn job_output_path(log_dir: &Path, job_id: u64) -> PathBuf {
    log_dir.join(job_id.to_string()).join("rw")
}

/// Copies the helper's per-job output to the job's log artifact; a missing
/// output becomes an empty log.
pub fn collect_job_log(log_dir: &Path, job: &Job) -> Result<()> {
    let source = job_output_path(log_dir, job.id);
    if let Some(parent) = job.log_path.parent() {
        planlab_core::ensure_dir(parent)?;
    }
    if source.is_file() {
        fs::copy(&source, &job.log_path)?;
    } else {
        tracing::warn!(job = job.id, path = %source.display(), "job output missing");
        fs::write(&job.log_path, b"")?;
    }
    Ok(())
}

fn shell_join(parts: &[String]) -> String {
    parts
        .iter()
        .map(|p| shell_quote(p))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(s: &str) -> String {
    if s.is_empty() {
        "''".to_string()
    } else if s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "-_./:=".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}
