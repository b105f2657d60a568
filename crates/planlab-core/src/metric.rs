use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricId {
    Runtime,
    PlanLength,
    SearchDepth,
    NumClauses,
    InvalidSubtasks,
    InvalidPreconditions,
    PreprocessingTime,
    DepthLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Int,
    Float,
}

impl MetricId {
    pub const ALL: [MetricId; 8] = [
        MetricId::Runtime,
        MetricId::PlanLength,
        MetricId::SearchDepth,
        MetricId::NumClauses,
        MetricId::InvalidSubtasks,
        MetricId::InvalidPreconditions,
        MetricId::PreprocessingTime,
        MetricId::DepthLimit,
    ];

    /// Name used in logs and as the result file stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricId::Runtime => "runtime",
            MetricId::PlanLength => "plan_length",
            MetricId::SearchDepth => "search_depth",
            MetricId::NumClauses => "num_clauses",
            MetricId::InvalidSubtasks => "invalid_subtasks",
            MetricId::InvalidPreconditions => "invalid_preconditions",
            MetricId::PreprocessingTime => "preprocessing_time",
            MetricId::DepthLimit => "depth_limit",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricId::Runtime | MetricId::PreprocessingTime => MetricKind::Float,
            _ => MetricKind::Int,
        }
    }

    pub fn parse_value(&self, token: &str) -> Option<MetricValue> {
        match self.kind() {
            MetricKind::Int => token.parse::<i64>().ok().map(MetricValue::Int),
            MetricKind::Float => token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(MetricValue::Float),
        }
    }
}

impl fmt::Display for MetricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricId::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = MetricId::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown metric '{}' (known: {})", s, known.join(", "))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Int(i64),
    Float(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Int(v) => v as f64,
            MetricValue::Float(v) => v,
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Extracted metrics of one run. A metric that was attempted but could not be
/// read is stored as `None`; each entry is independent of the others.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    values: BTreeMap<MetricId, Option<MetricValue>>,
}

impl MetricSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: MetricId, value: Option<MetricValue>) {
        self.values.insert(id, value);
    }

    pub fn get(&self, id: MetricId) -> Option<MetricValue> {
        self.values.get(&id).copied().flatten()
    }

    pub fn runtime(&self) -> Option<f64> {
        self.get(MetricId::Runtime).map(|v| v.as_f64())
    }

    pub fn search_depth(&self) -> Option<i64> {
        match self.get(MetricId::SearchDepth)? {
            MetricValue::Int(v) => Some(v),
            MetricValue::Float(v) => Some(v as i64),
        }
    }

    /// Metrics that hold a value, in `MetricId` order.
    pub fn available(&self) -> impl Iterator<Item = (MetricId, MetricValue)> + '_ {
        self.values
            .iter()
            .filter_map(|(id, v)| v.map(|value| (*id, value)))
    }

    pub fn is_empty(&self) -> bool {
        self.available().next().is_none()
    }
}
