use anyhow::{anyhow, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use planlab_analysis::report;
use planlab_analysis::{DomainAggregate, Direction, RunLabel};
use planlab_core::{ensure_dir, HarnessConfig, MetricId, RunOutcome};
use planlab_runner::{BatchPlan, BatchReport, Corpus, MetricExtractor, SolverBinary, SolverLog};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "planlab", version = "0.3.0", about = "Planning solver benchmark harness")]
struct Cli {
    #[command(flatten)]
    log: LogArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy)]
struct LogArgs {
    /// Debug-level logging (RUST_LOG still takes precedence).
    #[arg(long, global = true)]
    verbose: bool,
    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one solver (or two, for comparison) over a corpus.
    Run {
        #[arg(long)]
        corpus: PathBuf,
        /// Solver command, whitespace separated (e.g. "sh ./lilotane.sh").
        #[arg(long)]
        solver: String,
        /// Second solver command; enables paired comparison.
        #[arg(long)]
        compare_with: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        second_label: Option<String>,
        /// Parent directory for the generated run directory.
        #[arg(long, default_value = "runs")]
        out: PathBuf,
        /// Exact output directory, bypassing the generated name.
        #[arg(long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        timeout: Option<u64>,
        /// Validator command, whitespace separated.
        #[arg(long)]
        validator: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Compare two finished result directories.
    CompareResults {
        first: PathBuf,
        second: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Rank labelled runs per domain.
    Rank {
        runs: PathBuf,
        #[arg(long, default_value = "runtime")]
        metric: MetricId,
        /// mean, sum or count
        #[arg(long, default_value = "mean")]
        aggregate: DomainAggregate,
        #[arg(long)]
        higher_is_better: bool,
        #[arg(long)]
        json: bool,
    },
    /// Sum and average of a metric over the instances every run solved.
    Cut {
        runs: PathBuf,
        #[arg(long, default_value = "runtime")]
        metric: MetricId,
        #[arg(long)]
        json: bool,
    },
    /// Per-domain solved counts and metric averages for one result directory.
    DomainTable {
        results: PathBuf,
        #[arg(long, value_delimiter = ',', default_value = "runtime")]
        metrics: Vec<MetricId>,
        #[arg(long)]
        baseline: Option<PathBuf>,
        #[arg(long, default_value = "num_clauses")]
        relative_metric: MetricId,
        #[arg(long)]
        json: bool,
    },
    /// List the corpus as the batch would see it.
    Describe {
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Extract every metric from one solver log.
    Extract {
        log: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    if !matches!(cli.command, Commands::Run { .. }) {
        init_tracing(cli.log, None)?;
    }
    let result = run_command(cli.command, cli.log);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error("command_failed", err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

/// Installs the global subscriber; `log_file` adds a plain-text copy of
/// every event.
fn init_tracing(log: LogArgs, log_file: Option<&Path>) -> Result<()> {
    let level = if log.verbose { Level::DEBUG } else { Level::INFO };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let file_layer = match log_file {
        Some(path) => {
            let file = File::create(path)
                .map_err(|e| anyhow!("log_file_unwritable: {}: {}", path.display(), e))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    if log.log_json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }
    Ok(())
}

fn run_command(command: Commands, log: LogArgs) -> Result<Option<Value>> {
    match command {
        Commands::Run {
            corpus,
            solver,
            compare_with,
            label,
            second_label,
            out,
            output_dir,
            config,
            timeout,
            validator,
            json,
        } => {
            let mut harness = load_config(config.as_deref())?;
            if let Some(timeout) = timeout {
                harness.timeout_secs = timeout;
            }
            if let Some(validator) = validator {
                harness.validator.command = split_command(&validator)?;
            }
            harness.validate()?;
            let binaries = solver_binaries(&solver, compare_with.as_deref(), label, second_label)?;
            let output_dir = output_dir.unwrap_or_else(|| {
                planlab_runner::default_output_dir(&out, &binaries, harness.timeout_secs, Utc::now())
            });
            ensure_dir(&output_dir)?;
            init_tracing(log, Some(&output_dir.join("run.log")))?;

            let plan = BatchPlan {
                corpus_root: corpus,
                output_dir,
                binaries,
            };
            let batch = planlab_runner::run_batch(&harness, &plan)?;
            let comparison = match batch.binaries.as_slice() {
                [first, second] => Some((
                    first.label.clone(),
                    second.label.clone(),
                    planlab_analysis::compare(&first.results, &second.results),
                )),
                _ => None,
            };
            let comparison_json = comparison
                .as_ref()
                .map(|(_, _, c)| serde_json::to_value(&c.stats))
                .transpose()?;
            let summary_path = planlab_runner::write_summary(&batch, comparison_json.clone())?;

            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "batch": batch_to_json(&batch),
                    "comparison": comparison_json,
                    "summary_path": summary_path,
                })));
            }
            print_batch(&batch);
            if let Some((first, second, comparison)) = &comparison {
                print!("{}", report::render_comparison(first, second, &comparison.stats));
            }
            println!("summary: {}", summary_path.display());
        }
        Commands::CompareResults {
            first,
            second,
            json,
        } => {
            let first_set = planlab_runner::read_result_files(&first)?;
            let second_set = planlab_runner::read_result_files(&second)?;
            let comparison = planlab_analysis::compare(&first_set, &second_set);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "compare-results",
                    "comparable": comparison.stats.has_comparable(),
                    "stats": comparison.stats,
                    "records": comparison.records,
                })));
            }
            print!(
                "{}",
                report::render_comparison(
                    &first.display().to_string(),
                    &second.display().to_string(),
                    &comparison.stats
                )
            );
        }
        Commands::Rank {
            runs,
            metric,
            aggregate,
            higher_is_better,
            json,
        } => {
            let dirs = planlab_analysis::discover_runs(&runs, metric)?;
            let sets = planlab_analysis::load_runs(&dirs)?;
            let values: BTreeMap<RunLabel, BTreeMap<String, f64>> = sets
                .iter()
                .map(|(label, set)| {
                    (
                        label.clone(),
                        planlab_analysis::domain_values(set, metric, aggregate),
                    )
                })
                .collect();
            let direction = if higher_is_better {
                Direction::HigherIsBetter
            } else {
                Direction::LowerIsBetter
            };
            let ranking = planlab_analysis::rank(&values, direction);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "rank",
                    "metric": metric,
                    "ranking": ranking,
                })));
            }
            println!("metric: {}", metric);
            print!("{}", report::render_ranking(&ranking));
        }
        Commands::Cut { runs, metric, json } => {
            let dirs = planlab_analysis::discover_runs(&runs, metric)?;
            let stats = planlab_analysis::cut_stats(&dirs, metric)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "cut",
                    "cut": stats,
                })));
            }
            print!("{}", report::render_cut(&stats));
        }
        Commands::DomainTable {
            results,
            metrics,
            baseline,
            relative_metric,
            json,
        } => {
            let set = planlab_runner::read_result_files(&results)?;
            let baseline_set = baseline
                .as_deref()
                .map(planlab_runner::read_result_files)
                .transpose()?;
            let table = planlab_analysis::domain_table(
                &set,
                &metrics,
                baseline_set.as_ref().map(|b| (b, relative_metric)),
            );
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "domain-table",
                    "table": table,
                })));
            }
            print!("{}", table.render());
        }
        Commands::Describe {
            corpus,
            config,
            json,
        } => {
            let harness = load_config(config.as_deref())?;
            let corpus = Corpus::open(&corpus, &harness.corpus)?;
            let mut domains: BTreeMap<String, Vec<String>> = BTreeMap::new();
            let mut problems = Vec::new();
            for item in corpus.instances() {
                match item {
                    Ok(instance) => domains
                        .entry(instance.domain().to_string())
                        .or_default()
                        .push(instance.file_name),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => problems.push(e.to_string()),
                }
            }
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "describe",
                    "corpus": corpus.root(),
                    "domains": domains,
                    "skipped": problems,
                })));
            }
            println!("corpus: {}", corpus.root().display());
            for (domain, instances) in &domains {
                println!("{}: {} instances", domain, instances.len());
            }
            for problem in &problems {
                println!("skipped: {}", problem);
            }
        }
        Commands::Extract { log, config, json } => {
            let harness = load_config(config.as_deref())?;
            let extractor = MetricExtractor::new(harness.metrics.clone());
            let solver_log = SolverLog::read(&log)
                .map_err(|e| anyhow!("log_unreadable: {}: {}", log.display(), e))?;
            let metrics = extractor.extract_all(&solver_log);
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "extract",
                    "log": log,
                    "metrics": metrics,
                })));
            }
            for metric in MetricId::ALL {
                match metrics.get(metric) {
                    Some(value) => println!("{}: {}", metric, value),
                    None => println!("{}: unavailable", metric),
                }
            }
        }
    }
    Ok(None)
}

fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    match path {
        Some(path) => HarnessConfig::load(path),
        None => Ok(HarnessConfig::default()),
    }
}

fn split_command(raw: &str) -> Result<Vec<String>> {
    let parts: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
    if parts.is_empty() {
        return Err(anyhow!("empty_command: {:?}", raw));
    }
    Ok(parts)
}

/// Default label: file stem of the command's last part.
fn default_label(command: &[String]) -> String {
    command
        .last()
        .and_then(|part| Path::new(part).file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "solver".to_string())
}

fn solver_binaries(
    solver: &str,
    compare_with: Option<&str>,
    label: Option<String>,
    second_label: Option<String>,
) -> Result<Vec<SolverBinary>> {
    let first_command = split_command(solver)?;
    let Some(second) = compare_with else {
        let label = label.unwrap_or_else(|| default_label(&first_command));
        return Ok(vec![SolverBinary::new(label, first_command)]);
    };
    let second_command = split_command(second)?;
    let mut first_label = label.unwrap_or_else(|| default_label(&first_command));
    let mut second_label = second_label.unwrap_or_else(|| default_label(&second_command));
    if first_label == second_label {
        first_label = format!("{}-first", first_label);
        second_label = format!("{}-second", second_label);
    }
    Ok(vec![
        SolverBinary::new(first_label, first_command),
        SolverBinary::new(second_label, second_command),
    ])
}

fn batch_to_json(batch: &BatchReport) -> Value {
    let binaries: Vec<Value> = batch
        .binaries
        .iter()
        .map(|b| {
            let outcomes: Vec<Value> = b
                .results
                .records()
                .map(|r| {
                    json!({
                        "domain": r.key.domain,
                        "id": r.key.id,
                        "name": r.name,
                        "status": r.outcome.status(),
                        "runtime": match &r.outcome {
                            RunOutcome::Finished { metrics } => metrics.runtime(),
                            _ => None,
                        },
                    })
                })
                .collect();
            json!({
                "label": b.label,
                "result_dir": b.result_dir,
                "counters": b.counters,
                "outcomes": outcomes,
            })
        })
        .collect();
    json!({
        "output_dir": batch.output_dir,
        "skipped": batch.skipped,
        "binaries": binaries,
    })
}

fn print_batch(batch: &BatchReport) {
    println!("output_dir: {}", batch.output_dir.display());
    for binary in &batch.binaries {
        println!("{}", report::render_counters(&binary.label, &binary.counters));
    }
    if batch.skipped > 0 {
        println!("skipped instances: {}", batch.skipped);
    }
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. }
        | Commands::CompareResults { json, .. }
        | Commands::Rank { json, .. }
        | Commands::Cut { json, .. }
        | Commands::DomainTable { json, .. }
        | Commands::Describe { json, .. }
        | Commands::Extract { json, .. } => *json,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_default_to_command_stems_and_stay_distinct() {
        let binaries = solver_binaries("sh ./lilotane.sh", Some("./bin/lilotane"), None, None)
            .expect("binaries");
        assert_eq!(binaries[0].label, "lilotane-first");
        assert_eq!(binaries[1].label, "lilotane-second");
        assert_eq!(binaries[0].command, vec!["sh", "./lilotane.sh"]);

        let single = solver_binaries("./crossbow", None, Some("new".to_string()), None)
            .expect("single");
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].label, "new");
    }

    #[test]
    fn empty_commands_are_rejected() {
        assert!(split_command("   ").is_err());
        assert!(solver_binaries("", None, None, None).is_err());
    }

    #[test]
    fn cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "planlab",
            "rank",
            "runs",
            "--metric",
            "plan_length",
            "--aggregate",
            "count",
            "--higher-is-better",
            "--verbose",
        ])
        .expect("parse");
        assert!(cli.log.verbose);
        match cli.command {
            Commands::Rank {
                metric,
                aggregate,
                higher_is_better,
                ..
            } => {
                assert_eq!(metric, MetricId::PlanLength);
                assert_eq!(aggregate, DomainAggregate::Count);
                assert!(higher_is_better);
            }
            _ => panic!("expected rank"),
        }
    }
}
