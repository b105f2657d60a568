//! Several result directories under one parent, each a labelled run.

use crate::ranking::RunLabel;
use anyhow::{anyhow, Result};
use planlab_core::{DomainResultSet, InstanceKey, MetricId};
use planlab_runner::read_result_files;
use planlab_runner::results::{metric_file, read_metric_file};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDir {
    pub label: RunLabel,
    pub path: PathBuf,
}

/// The run label is the directory name up to its first `_`.
pub fn run_label(dir_name: &str) -> RunLabel {
    RunLabel::new(dir_name.split('_').next().unwrap_or(dir_name))
}

/// Subdirectories of `parent` holding `<metric>.txt`, in label order.
pub fn discover_runs(parent: &Path, metric: MetricId) -> Result<Vec<RunDir>> {
    let entries = fs::read_dir(parent)
        .map_err(|e| anyhow!("runs_unreadable: {}: {}", parent.display(), e))?;
    let mut runs: BTreeMap<RunLabel, PathBuf> = BTreeMap::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() || !metric_file(&path, metric).is_file() {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let label = run_label(&name);
        if let Some(previous) = runs.insert(label.clone(), path.clone()) {
            return Err(anyhow!(
                "duplicate_run_label: {} and {} both map to {}",
                previous.display(),
                path.display(),
                label
            ));
        }
    }
    if runs.is_empty() {
        return Err(anyhow!(
            "no_runs: no directory under {} holds {}.txt",
            parent.display(),
            metric
        ));
    }
    Ok(runs
        .into_iter()
        .map(|(label, path)| RunDir { label, path })
        .collect())
}

pub fn load_runs(runs: &[RunDir]) -> Result<BTreeMap<RunLabel, DomainResultSet>> {
    runs.iter()
        .map(|run| Ok((run.label.clone(), read_result_files(&run.path)?)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutEntry {
    pub label: RunLabel,
    pub sum: f64,
    pub average: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CutStats {
    pub metric: MetricId,
    /// Instances present in every run.
    pub instances: usize,
    pub runs: Vec<CutEntry>,
}

/// Sum and average of `metric` per run, over the instances every run solved.
pub fn cut_stats(runs: &[RunDir], metric: MetricId) -> Result<CutStats> {
    let mut per_run: Vec<(RunLabel, BTreeMap<InstanceKey, f64>)> = Vec::new();
    for run in runs {
        let values = read_metric_file(&metric_file(&run.path, metric), metric)?
            .into_iter()
            .map(|line| (line.key, line.value.as_f64()))
            .collect();
        per_run.push((run.label.clone(), values));
    }
    let mut cut: Option<BTreeSet<InstanceKey>> = None;
    for (_, values) in &per_run {
        let keys: BTreeSet<InstanceKey> = values.keys().cloned().collect();
        cut = Some(match cut {
            None => keys,
            Some(previous) => previous.intersection(&keys).cloned().collect(),
        });
    }
    let cut = cut.unwrap_or_default();
    tracing::debug!(metric = %metric, instances = cut.len(), "computed run cut");

    let entries = per_run
        .into_iter()
        .map(|(label, values)| {
            let sum: f64 = cut.iter().filter_map(|k| values.get(k)).sum();
            let average = (!cut.is_empty()).then(|| sum / cut.len() as f64);
            CutEntry { label, sum, average }
        })
        .collect();
    Ok(CutStats {
        metric,
        instances: cut.len(),
        runs: entries,
    })
}
