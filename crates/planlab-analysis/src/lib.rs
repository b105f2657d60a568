//! Offline analysis of planlab result sets: paired comparison, multi-run
//! cuts, per-domain ranking and tables.

pub mod compare;
pub mod ranking;
pub mod report;
pub mod runs;
pub mod table;

pub use compare::{compare, AggregateStats, Comparison, ComparisonRecord, DomainStats, Located};
pub use ranking::{domain_values, rank, Direction, DomainAggregate, Ranking, RunLabel};
pub use runs::{cut_stats, discover_runs, load_runs, CutStats, RunDir};
pub use table::{domain_table, DomainTable};
