//! Drives one or two solver binaries across a corpus and persists the flat
//! per-metric result files.

use crate::corpus::Corpus;
use crate::extract::MetricExtractor;
use crate::jobqueue::{self, Job};
use crate::process::ExitKind;
use crate::results::write_result_files;
use crate::runner::{log_artifact_path, InstanceRunner, RunnerSettings, SolverBinary};
use crate::tools::ensure_tool_available;
use crate::validate::{Validator, Verifier};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use planlab_core::config::JobQueueConfig;
use planlab_core::{
    atomic_write_json_pretty, ensure_dir, DomainResultSet, HarnessConfig, Instance, InstanceRecord,
    OutcomeCounters, RunOutcome,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BatchPlan {
    pub corpus_root: PathBuf,
    pub output_dir: PathBuf,
    pub binaries: Vec<SolverBinary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BinaryResults {
    pub label: String,
    pub result_dir: PathBuf,
    pub counters: OutcomeCounters,
    #[serde(skip)]
    pub results: DomainResultSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub output_dir: PathBuf,
    pub skipped: usize,
    pub binaries: Vec<BinaryResults>,
}

impl BatchReport {
    pub fn binary(&self, label: &str) -> Option<&BinaryResults> {
        self.binaries.iter().find(|b| b.label == label)
    }
}

/// Per-binary outcomes and counters, threaded through the batch.
struct BatchAccumulator {
    results: Vec<DomainResultSet>,
    counters: Vec<OutcomeCounters>,
    skipped: usize,
}

impl BatchAccumulator {
    fn new(binaries: usize) -> Self {
        Self {
            results: vec![DomainResultSet::new(); binaries],
            counters: vec![OutcomeCounters::default(); binaries],
            skipped: 0,
        }
    }

    fn record(&mut self, binary: &SolverBinary, index: usize, instance: &Instance, outcome: RunOutcome) {
        self.counters[index].record(&outcome);
        tracing::info!(
            binary = %binary.label,
            domain = instance.domain(),
            instance = %instance.file_name,
            status = outcome.status(),
            counters = %self.counters[index],
            "instance classified"
        );
        self.results[index].push(InstanceRecord {
            key: instance.key.clone(),
            name: instance.file_name.clone(),
            outcome,
        });
    }
}

/// `<out>/<label>_timeout<T>_<stamp>` for one binary, `<out>/<stamp>` when
/// comparing two.
pub fn default_output_dir(
    base: &Path,
    binaries: &[SolverBinary],
    timeout_secs: u64,
    now: DateTime<Utc>,
) -> PathBuf {
    let stamp = now.format("%Y-%m-%d_%H-%M-%S").to_string();
    match binaries {
        [single] => base.join(format!("{}_timeout{}_{}", single.label, timeout_secs, stamp)),
        _ => base.join(stamp),
    }
}

/// Where a binary's result files go: the output dir itself for a single
/// binary, `<output>/<label>` otherwise.
pub fn result_dir(output_dir: &Path, binaries: &[SolverBinary], label: &str) -> PathBuf {
    if binaries.len() == 1 {
        output_dir.to_path_buf()
    } else {
        output_dir.join(label)
    }
}

/// Fails when any configured external tool cannot be launched.
pub fn preflight(config: &HarnessConfig, binaries: &[SolverBinary]) -> Result<()> {
    for binary in binaries {
        ensure_tool_available(&format!("solver {}", binary.label), &binary.command)?;
    }
    ensure_tool_available("validator", &config.validator.command)?;
    if let Some(queue) = &config.job_queue {
        ensure_tool_available("job-queue helper", &queue.command)?;
    }
    Ok(())
}

fn check_plan(plan: &BatchPlan) -> Result<()> {
    match plan.binaries.as_slice() {
        [_] => Ok(()),
        [a, b] if a.label == b.label => Err(anyhow!(
            "duplicate_binary_label: both binaries are labelled {}",
            a.label
        )),
        [_, _] => Ok(()),
        other => Err(anyhow!(
            "unsupported_binary_count: expected 1 or 2 binaries, got {}",
            other.len()
        )),
    }
}

/// Runs the whole batch with the real validator.
pub fn run_batch(config: &HarnessConfig, plan: &BatchPlan) -> Result<BatchReport> {
    config.validate()?;
    check_plan(plan)?;
    preflight(config, &plan.binaries)?;
    let validator = Validator::new(&config.validator);
    run_batch_with(config, plan, &validator)
}

/// Runs the batch with an arbitrary verifier; no tool preflight.
pub fn run_batch_with<V: Verifier>(
    config: &HarnessConfig,
    plan: &BatchPlan,
    verifier: &V,
) -> Result<BatchReport> {
    check_plan(plan)?;
    let corpus = Corpus::open(&plan.corpus_root, &config.corpus)?;
    ensure_dir(&plan.output_dir)?;
    let settings = RunnerSettings::from_config(config);
    let extractor = MetricExtractor::new(config.metrics.clone());
    let runner = InstanceRunner::new(&settings, &extractor, verifier);
    tracing::info!(
        corpus = %corpus.root().display(),
        output = %plan.output_dir.display(),
        binaries = plan.binaries.len(),
        timeout_secs = config.timeout_secs,
        "starting batch"
    );

    let mut acc = BatchAccumulator::new(plan.binaries.len());
    match &config.job_queue {
        Some(queue) => run_job_queue(config, queue, plan, &corpus, &runner, &mut acc)?,
        None => run_sequential(plan, &corpus, &runner, &mut acc)?,
    }

    let mut binaries = Vec::with_capacity(plan.binaries.len());
    for ((binary, results), counters) in plan
        .binaries
        .iter()
        .zip(acc.results)
        .zip(acc.counters)
    {
        let dir = result_dir(&plan.output_dir, &plan.binaries, &binary.label);
        ensure_dir(&dir)?;
        write_result_files(&dir, &results)?;
        tracing::info!(binary = %binary.label, counters = %counters, "batch finished");
        binaries.push(BinaryResults {
            label: binary.label.clone(),
            result_dir: dir,
            counters,
            results,
        });
    }
    if acc.skipped > 0 {
        tracing::warn!(skipped = acc.skipped, "instances skipped for corpus errors");
    }
    Ok(BatchReport {
        output_dir: plan.output_dir.clone(),
        skipped: acc.skipped,
        binaries,
    })
}

fn for_each_instance(
    corpus: &Corpus,
    acc: &mut BatchAccumulator,
    mut visit: impl FnMut(&Instance, &mut BatchAccumulator) -> Result<()>,
) -> Result<()> {
    for item in corpus.instances() {
        match item {
            Ok(instance) => visit(&instance, acc)?,
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => {
                tracing::warn!(error = %e, "skipping instance");
                acc.skipped += 1;
            }
        }
    }
    Ok(())
}

fn run_sequential<V: Verifier>(
    plan: &BatchPlan,
    corpus: &Corpus,
    runner: &InstanceRunner<'_, V>,
    acc: &mut BatchAccumulator,
) -> Result<()> {
    for_each_instance(corpus, acc, |instance, acc| {
        for (index, binary) in plan.binaries.iter().enumerate() {
            let run = runner.run(binary, instance, &plan.output_dir)?;
            acc.record(binary, index, instance, run.outcome);
        }
        Ok(())
    })
}

fn run_job_queue<V: Verifier>(
    config: &HarnessConfig,
    queue: &JobQueueConfig,
    plan: &BatchPlan,
    corpus: &Corpus,
    runner: &InstanceRunner<'_, V>,
    acc: &mut BatchAccumulator,
) -> Result<()> {
    let mut jobs: Vec<Job> = Vec::new();
    for_each_instance(corpus, acc, |instance, _| {
        for (index, binary) in plan.binaries.iter().enumerate() {
            jobs.push(Job {
                id: jobs.len() as u64 + 1,
                binary_index: index,
                instance: instance.clone(),
                command: runner.solver_command(binary, instance),
                log_path: log_artifact_path(&plan.output_dir, instance, &binary.label),
            });
        }
        Ok(())
    })?;
    if jobs.is_empty() {
        tracing::warn!("no instances to dispatch");
        return Ok(());
    }

    let job_file = plan.output_dir.join("jobs.txt");
    let log_dir = plan.output_dir.join("jobs");
    jobqueue::write_job_file(&job_file, &jobs)?;
    let stdout = jobqueue::run_helper(queue, &job_file, config.timeout_secs, &log_dir)?;
    let retvals = jobqueue::parse_retvals(&stdout, queue);
    tracing::info!(jobs = jobs.len(), reported = retvals.len(), "job-queue helper returned");

    for job in &jobs {
        jobqueue::collect_job_log(&log_dir, job)?;
        let exit = jobqueue::exit_kind_for(retvals.get(&job.id).copied(), queue);
        if exit == ExitKind::TimedOut {
            tracing::debug!(job = job.id, "treating job as timed out");
        }
        let outcome = runner.classify(exit, &job.instance, &job.log_path);
        let binary = &plan.binaries[job.binary_index];
        acc.record(binary, job.binary_index, &job.instance, outcome);
    }
    Ok(())
}

/// Writes `<output>/summary.json`; `comparison` carries aggregate statistics
/// when two binaries were compared.
pub fn write_summary(report: &BatchReport, comparison: Option<Value>) -> Result<PathBuf> {
    let path = report.output_dir.join("summary.json");
    let mut summary = json!({
        "output_dir": report.output_dir,
        "skipped": report.skipped,
        "binaries": report.binaries,
        "written_at": Utc::now().to_rfc3339(),
    });
    if let Some(comparison) = comparison {
        summary["comparison"] = comparison;
    }
    atomic_write_json_pretty(&path, &summary)?;
    Ok(path)
}
