use crate::metric::{MetricId, MetricSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Identity of an instance across runs: the domain plus the numeric id taken
/// from the instance file name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceKey {
    pub domain: String,
    pub id: u64,
}

impl fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.domain, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub key: InstanceKey,
    pub file_name: String,
    pub instance_file: PathBuf,
    pub domain_file: PathBuf,
}

impl Instance {
    pub fn domain(&self) -> &str {
        &self.key.domain
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Finished { metrics: MetricSet },
    TimedOut { partial: Option<MetricSet> },
    Errored,
    InvalidSolution,
}

impl RunOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            RunOutcome::Finished { .. } => "finished",
            RunOutcome::TimedOut { .. } => "timed_out",
            RunOutcome::Errored => "errored",
            RunOutcome::InvalidSolution => "invalid_solution",
        }
    }

    pub fn finished_metrics(&self) -> Option<&MetricSet> {
        match self {
            RunOutcome::Finished { metrics } => Some(metrics),
            _ => None,
        }
    }

    pub fn partial_metrics(&self) -> Option<&MetricSet> {
        match self {
            RunOutcome::TimedOut { partial } => partial.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub key: InstanceKey,
    /// Human-facing instance name (file name when known, id otherwise).
    pub name: String,
    pub outcome: RunOutcome,
}

/// Per-domain, ordered outcomes of one binary over one corpus run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainResultSet {
    domains: BTreeMap<String, Vec<InstanceRecord>>,
}

impl DomainResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: InstanceRecord) {
        self.domains
            .entry(record.key.domain.clone())
            .or_default()
            .push(record);
    }

    pub fn domains(&self) -> impl Iterator<Item = (&str, &[InstanceRecord])> {
        self.domains
            .iter()
            .map(|(name, records)| (name.as_str(), records.as_slice()))
    }

    pub fn records(&self) -> impl Iterator<Item = &InstanceRecord> {
        self.domains.values().flatten()
    }

    pub fn get(&self, key: &InstanceKey) -> Option<&InstanceRecord> {
        self.domains
            .get(&key.domain)
            .and_then(|records| records.iter().find(|r| r.key.id == key.id))
    }

    pub fn get_mut(&mut self, key: &InstanceKey) -> Option<&mut InstanceRecord> {
        self.domains
            .get_mut(&key.domain)
            .and_then(|records| records.iter_mut().find(|r| r.key.id == key.id))
    }

    pub fn len(&self) -> usize {
        self.domains.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(key, value)` of every finished instance that has `metric`.
    pub fn finished_values(&self, metric: MetricId) -> Vec<(InstanceKey, f64)> {
        self.records()
            .filter_map(|r| {
                let value = r.outcome.finished_metrics()?.get(metric)?;
                Some((r.key.clone(), value.as_f64()))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounters {
    pub finished: usize,
    pub timed_out: usize,
    pub errored: usize,
    pub invalid: usize,
}

impl OutcomeCounters {
    pub fn record(&mut self, outcome: &RunOutcome) {
        match outcome {
            RunOutcome::Finished { .. } => self.finished += 1,
            RunOutcome::TimedOut { .. } => self.timed_out += 1,
            RunOutcome::Errored => self.errored += 1,
            RunOutcome::InvalidSolution => self.invalid += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.finished + self.timed_out + self.errored + self.invalid
    }
}

impl fmt::Display for OutcomeCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "finished {} instances, did not finish {} instances, {} instances errored, {} invalid solutions",
            self.finished, self.timed_out, self.errored, self.invalid
        )
    }
}
