use crate::metric::MetricId;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSelect {
    First,
    Last,
}

/// Where a metric lives in a solver log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub metric: MetricId,
    pub marker: String,
    pub select: LineSelect,
    /// Whitespace token index on the marker line.
    pub field: usize,
    /// Trailing characters stripped from the token before parsing.
    #[serde(default)]
    pub trim: String,
}

impl MetricSpec {
    fn new(metric: MetricId, marker: &str, select: LineSelect, field: usize, trim: &str) -> Self {
        Self {
            metric,
            marker: marker.to_string(),
            select,
            field,
            trim: trim.to_string(),
        }
    }
}

pub fn default_metric_specs() -> Vec<MetricSpec> {
    use LineSelect::{First, Last};
    vec![
        MetricSpec::new(MetricId::Runtime, "Found a solution", First, 0, ""),
        MetricSpec::new(MetricId::SearchDepth, "Found a solution", First, 6, "."),
        MetricSpec::new(MetricId::PlanLength, "End of solution plan", First, 8, ")"),
        MetricSpec::new(MetricId::NumClauses, "Total amount of clauses encoded", Last, 6, ""),
        MetricSpec::new(MetricId::DepthLimit, "Iteration", Last, 2, "."),
        MetricSpec::new(MetricId::InvalidSubtasks, "invalid subtasks found", Last, 1, ""),
        MetricSpec::new(
            MetricId::InvalidPreconditions,
            "invalid preconditions found",
            Last,
            1,
            "",
        ),
        MetricSpec::new(MetricId::PreprocessingTime, "Mined", First, 0, ""),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerunConfig {
    pub floor_secs: f64,
    pub count: usize,
    pub pick_index: usize,
}

impl Default for RerunConfig {
    fn default() -> Self {
        Self {
            floor_secs: 0.5,
            count: 10,
            pick_index: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub command: Vec<String>,
    pub verify_flag: String,
    pub success_phrase: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            verify_flag: "-verify".to_string(),
            success_phrase: "Plan verification result: true".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub problem_extension: String,
    pub canonical_domain_file: String,
    pub domain_suffix: String,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            problem_extension: "hddl".to_string(),
            canonical_domain_file: "domain.hddl".to_string(),
            domain_suffix: "-domain".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    pub solution_found: String,
    pub exiting_happily: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            solution_found: "Found a solution".to_string(),
            exiting_happily: "Exiting happily".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobQueueConfig {
    pub command: Vec<String>,
    pub flags: Vec<String>,
    pub retval_marker: String,
    pub job_id_field: usize,
    pub retval_field: usize,
    pub timeout_return_codes: Vec<i32>,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            flags: Vec::new(),
            retval_marker: "RETVAL".to_string(),
            job_id_field: 1,
            retval_field: 2,
            timeout_return_codes: vec![124, 137, 143],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub timeout_secs: u64,
    pub kill_grace_ms: u64,
    pub solver_flags: Vec<String>,
    pub rerun: RerunConfig,
    pub validator: ValidatorConfig,
    pub corpus: CorpusConfig,
    pub markers: MarkerConfig,
    pub metrics: Vec<MetricSpec>,
    pub job_queue: Option<JobQueueConfig>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            kill_grace_ms: 2000,
            solver_flags: vec!["-co=0".to_string()],
            rerun: RerunConfig::default(),
            validator: ValidatorConfig::default(),
            corpus: CorpusConfig::default(),
            markers: MarkerConfig::default(),
            metrics: default_metric_specs(),
            job_queue: None,
        }
    }
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| anyhow!("config_unreadable: {}: {}", path.display(), e))?;
        let config: HarnessConfig = serde_yaml::from_str(&raw)
            .map_err(|e| anyhow!("config_invalid: {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();
        if self.timeout_secs == 0 {
            errors.push("timeout_secs must be > 0".to_string());
        }
        if self.rerun.count > 0 && self.rerun.pick_index >= self.rerun.count {
            errors.push(format!(
                "rerun.pick_index {} must be below rerun.count {}",
                self.rerun.pick_index, self.rerun.count
            ));
        }
        if !self.metrics.iter().any(|m| m.metric == MetricId::Runtime) {
            errors.push("metrics must define runtime".to_string());
        }
        if self.corpus.problem_extension.is_empty() {
            errors.push("corpus.problem_extension must not be empty".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("config_invalid: {}", errors.join("; ")))
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}
