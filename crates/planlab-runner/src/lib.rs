//! Solver execution: corpus enumeration, process-group bounded runs, log
//! metric extraction, plan validation and batch orchestration.

pub mod corpus;
pub mod extract;
pub mod jobqueue;
pub mod orchestrator;
pub mod process;
pub mod results;
pub mod runner;
pub mod tools;
pub mod validate;

pub use corpus::Corpus;
pub use extract::{MetricExtractor, SolverLog};
pub use orchestrator::{
    default_output_dir, run_batch, run_batch_with, write_summary, BatchPlan, BatchReport,
    BinaryResults,
};
pub use process::{ExitKind, ProcessExit};
pub use results::{read_result_files, write_result_files};
pub use runner::{InstanceRun, InstanceRunner, RunnerSettings, SolverBinary};
pub use tools::ensure_tool_available;
pub use validate::{Validator, Verifier};
