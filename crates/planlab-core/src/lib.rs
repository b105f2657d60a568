//! Shared data model for the planlab benchmark harness: instances, run
//! outcomes, metric sets, configuration and the errors raised across crates.

pub mod config;
pub mod error;
pub mod fsutil;
pub mod metric;
pub mod model;

pub use config::{HarnessConfig, LineSelect, MetricSpec};
pub use error::{CorpusError, ResultFileError, ToolError, Unavailable};
pub use fsutil::{atomic_write_bytes, atomic_write_json_pretty, ensure_dir};
pub use metric::{MetricId, MetricKind, MetricSet, MetricValue};
pub use model::{
    DomainResultSet, Instance, InstanceKey, InstanceRecord, OutcomeCounters, RunOutcome,
};
