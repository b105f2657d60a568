//! In-process metric scraping over captured solver logs.
//!
//! The log is read once and scanned per metric. Every lookup returns either a
//! value or an [`Unavailable`] reason for that metric alone.

use planlab_core::{LineSelect, MetricId, MetricSet, MetricSpec, MetricValue, Unavailable};
use std::fs;
use std::path::Path;

/// A captured solver log, held in memory for repeated marker scans.
#[derive(Debug, Clone)]
pub struct SolverLog {
    text: String,
}

impl SolverLog {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            text: String::from_utf8_lossy(bytes).into_owned(),
        }
    }

    pub fn read(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_bytes(&fs::read(path)?))
    }

    pub fn contains(&self, marker: &str) -> bool {
        self.text.lines().any(|line| line.contains(marker))
    }

    pub fn marker_line(&self, marker: &str, select: LineSelect) -> Option<&str> {
        let mut matching = self.text.lines().filter(|line| line.contains(marker));
        match select {
            LineSelect::First => matching.next(),
            LineSelect::Last => matching.last(),
        }
    }

    pub fn extract(&self, spec: &MetricSpec) -> Result<MetricValue, Unavailable> {
        let line = self
            .marker_line(&spec.marker, spec.select)
            .ok_or_else(|| Unavailable::MarkerAbsent(spec.marker.clone()))?;
        let token = line
            .split_whitespace()
            .nth(spec.field)
            .ok_or(Unavailable::FieldMissing { field: spec.field })?;
        let trimmed = if spec.trim.is_empty() {
            token
        } else {
            token.trim_end_matches(|c: char| spec.trim.contains(c))
        };
        spec.metric
            .parse_value(trimmed)
            .ok_or_else(|| Unavailable::Parse {
                token: token.to_string(),
            })
    }
}

/// Metric lookup table keyed by [`MetricId`].
#[derive(Debug, Clone)]
pub struct MetricExtractor {
    specs: Vec<MetricSpec>,
}

impl MetricExtractor {
    pub fn new(specs: Vec<MetricSpec>) -> Self {
        Self { specs }
    }

    pub fn spec(&self, metric: MetricId) -> Option<&MetricSpec> {
        self.specs.iter().find(|s| s.metric == metric)
    }

    pub fn extract(&self, log: &SolverLog, metric: MetricId) -> Result<MetricValue, Unavailable> {
        let spec = self
            .spec(metric)
            .ok_or_else(|| Unavailable::MarkerAbsent(metric.as_str().to_string()))?;
        log.extract(spec)
    }

    /// Reads `log_file` and extracts `metric`; an unreadable file makes the
    /// metric unavailable rather than failing.
    pub fn extract_file(&self, log_file: &Path, metric: MetricId) -> Result<MetricValue, Unavailable> {
        let log = SolverLog::read(log_file).map_err(|_| Unavailable::LogUnreadable)?;
        self.extract(&log, metric)
    }

    pub fn extract_all(&self, log: &SolverLog) -> MetricSet {
        let mut set = MetricSet::new();
        for spec in &self.specs {
            match log.extract(spec) {
                Ok(value) => set.insert(spec.metric, Some(value)),
                Err(reason) => {
                    tracing::debug!(metric = %spec.metric, %reason, "metric unavailable");
                    set.insert(spec.metric, None);
                }
            }
        }
        set
    }
}

impl Default for MetricExtractor {
    fn default() -> Self {
        Self::new(planlab_core::config::default_metric_specs())
    }
}
