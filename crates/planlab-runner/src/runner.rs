//! One solver invocation for one instance: launch, bound, classify.

use crate::extract::{MetricExtractor, SolverLog};
use crate::process::{run_to_log, ExitKind};
use crate::validate::Verifier;
use anyhow::Result;
use planlab_core::config::{MarkerConfig, RerunConfig};
use planlab_core::{HarnessConfig, Instance, MetricId, MetricValue, RunOutcome};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A solver under benchmark: a label used in artifact paths and reports plus
/// the command prefix that launches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverBinary {
    pub label: String,
    pub command: Vec<String>,
}

impl SolverBinary {
    pub fn new(label: impl Into<String>, command: Vec<String>) -> Self {
        Self {
            label: label.into(),
            command,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    pub timeout: Duration,
    pub kill_grace: Duration,
    pub solver_flags: Vec<String>,
    pub rerun: RerunConfig,
    pub markers: MarkerConfig,
}

impl RunnerSettings {
    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            timeout: config.timeout(),
            kill_grace: config.kill_grace(),
            solver_flags: config.solver_flags.clone(),
            rerun: config.rerun.clone(),
            markers: config.markers.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceRun {
    pub outcome: RunOutcome,
    pub log_path: PathBuf,
}

pub struct InstanceRunner<'a, V: Verifier> {
    settings: &'a RunnerSettings,
    extractor: &'a MetricExtractor,
    verifier: &'a V,
}

impl<'a, V: Verifier> InstanceRunner<'a, V> {
    pub fn new(settings: &'a RunnerSettings, extractor: &'a MetricExtractor, verifier: &'a V) -> Self {
        Self {
            settings,
            extractor,
            verifier,
        }
    }

    /// `<binary...> <domain-file> <instance-file> [flags]`
    pub fn solver_command(&self, binary: &SolverBinary, instance: &Instance) -> Vec<String> {
        let mut command = binary.command.clone();
        command.push(instance.domain_file.to_string_lossy().into_owned());
        command.push(instance.instance_file.to_string_lossy().into_owned());
        command.extend(self.settings.solver_flags.iter().cloned());
        command
    }

    pub fn run(
        &self,
        binary: &SolverBinary,
        instance: &Instance,
        output_dir: &Path,
    ) -> Result<InstanceRun> {
        let log_path = log_artifact_path(output_dir, instance, &binary.label);
        let command = self.solver_command(binary, instance);
        tracing::info!(
            domain = instance.domain(),
            instance = %instance.file_name,
            binary = %binary.label,
            "starting execution"
        );
        let outcome = self.run_command(&command, instance, &log_path)?;
        Ok(InstanceRun { outcome, log_path })
    }

    /// Executes `command` once under the configured timeout and classifies
    /// the result, applying the re-run policy to very fast finishes.
    pub fn run_command(
        &self,
        command: &[String],
        instance: &Instance,
        log_path: &Path,
    ) -> Result<RunOutcome> {
        let exit = run_to_log(
            command,
            log_path,
            self.settings.timeout,
            self.settings.kill_grace,
        )?;
        let outcome = self.classify(exit.kind, instance, log_path);
        match outcome {
            RunOutcome::Finished { mut metrics } => {
                if let Some(runtime) = metrics.runtime() {
                    if runtime < self.settings.rerun.floor_secs && self.settings.rerun.count > 0 {
                        let stable = self.stabilize_runtime(command, instance, log_path, runtime)?;
                        metrics.insert(MetricId::Runtime, Some(MetricValue::Float(stable)));
                    }
                }
                tracing::info!(
                    log = %log_path.display(),
                    runtime = ?metrics.runtime(),
                    "finished"
                );
                Ok(RunOutcome::Finished { metrics })
            }
            other => Ok(other),
        }
    }

    /// Classifies a terminated run from its exit and the now-static log.
    ///
    /// Timeouts win over everything else; a normal exit needs the solution
    /// marker, then a positive verifier verdict.
    pub fn classify(&self, exit: ExitKind, instance: &Instance, log_path: &Path) -> RunOutcome {
        let log = match SolverLog::read(log_path) {
            Ok(log) => log,
            Err(e) => {
                tracing::warn!(log = %log_path.display(), error = %e, "log unreadable");
                SolverLog::from_bytes(&[])
            }
        };
        match exit {
            ExitKind::TimedOut => {
                tracing::warn!(
                    timeout_secs = self.settings.timeout.as_secs_f64(),
                    log = %log_path.display(),
                    "did not finish in time"
                );
                let partial = log
                    .contains(&self.settings.markers.exiting_happily)
                    .then(|| self.extractor.extract_all(&log));
                RunOutcome::TimedOut { partial }
            }
            ExitKind::Exited(code) => {
                if !log.contains(&self.settings.markers.solution_found) {
                    tracing::warn!(
                        log = %log_path.display(),
                        exit_code = ?code,
                        "found no solution but ended execution (errored?)"
                    );
                    return RunOutcome::Errored;
                }
                if !self
                    .verifier
                    .verify(&instance.domain_file, &instance.instance_file, log_path)
                {
                    tracing::warn!(log = %log_path.display(), "solution rejected by validator");
                    return RunOutcome::InvalidSolution;
                }
                RunOutcome::Finished {
                    metrics: self.extractor.extract_all(&log),
                }
            }
        }
    }

    fn stabilize_runtime(
        &self,
        command: &[String],
        instance: &Instance,
        log_path: &Path,
        measured: f64,
    ) -> Result<f64> {
        let rerun = &self.settings.rerun;
        tracing::debug!(measured, reruns = rerun.count, "runtime below floor, re-running");
        // Re-runs go to a scratch log so the artifact keeps the first run.
        let scratch = rerun_log_path(log_path);
        let mut times = Vec::with_capacity(rerun.count);
        for _ in 0..rerun.count {
            let exit = run_to_log(
                command,
                &scratch,
                self.settings.timeout,
                self.settings.kill_grace,
            )?;
            if exit.kind == ExitKind::TimedOut {
                continue;
            }
            if !self
                .verifier
                .verify(&instance.domain_file, &instance.instance_file, &scratch)
            {
                continue;
            }
            let Ok(log) = SolverLog::read(&scratch) else {
                continue;
            };
            if let Ok(value) = self.extractor.extract(&log, MetricId::Runtime) {
                times.push(value.as_f64());
            }
        }
        if let Err(e) = std::fs::remove_file(&scratch) {
            tracing::debug!(log = %scratch.display(), error = %e, "scratch log not removed");
        }
        let stable = pick_stable_runtime(&mut times, rerun.pick_index).unwrap_or(measured);
        tracing::debug!(stable, validated = times.len(), "stabilized runtime");
        Ok(stable)
    }
}

/// Sorts `times` and returns the value at `pick_index` (the largest one when
/// fewer values exist), or `None` for an empty slice.
pub fn pick_stable_runtime(times: &mut [f64], pick_index: usize) -> Option<f64> {
    if times.is_empty() {
        return None;
    }
    times.sort_by(|a, b| a.total_cmp(b));
    Some(times[pick_index.min(times.len() - 1)])
}

/// `<log>.rerun`, overwritten by every re-run of a fast instance.
pub fn rerun_log_path(log_path: &Path) -> PathBuf {
    let mut name = log_path.as_os_str().to_owned();
    name.push(".rerun");
    PathBuf::from(name)
}

/// `<output>/<domain>/<instance-file>_<label>.log`
pub fn log_artifact_path(output_dir: &Path, instance: &Instance, label: &str) -> PathBuf {
    output_dir
        .join(instance.domain())
        .join(format!("{}_{}.log", instance.file_name, label))
}

#[cfg(test)]
mod tests {
    use super::*;
    use planlab_core::InstanceKey;
    use std::cell::Cell;
    use std::fs;

    struct FixedVerdict {
        valid: bool,
        calls: Cell<usize>,
    }

    impl FixedVerdict {
        fn new(valid: bool) -> Self {
            Self {
                valid,
                calls: Cell::new(0),
            }
        }
    }

    impl Verifier for FixedVerdict {
        fn verify(&self, _: &Path, _: &Path, _: &Path) -> bool {
            self.calls.set(self.calls.get() + 1);
            self.valid
        }
    }

    fn instance(dir: &Path) -> Instance {
        Instance {
            key: InstanceKey {
                domain: "D1".to_string(),
                id: 1,
            },
            file_name: "p01.hddl".to_string(),
            instance_file: dir.join("D1").join("p01.hddl"),
            domain_file: dir.join("D1").join("domain.hddl"),
        }
    }

    fn settings() -> RunnerSettings {
        RunnerSettings {
            timeout: Duration::from_secs(10),
            kill_grace: Duration::from_millis(200),
            solver_flags: vec!["-co=0".to_string()],
            rerun: RerunConfig::default(),
            markers: MarkerConfig::default(),
        }
    }

    fn write_log(dir: &Path, text: &str) -> PathBuf {
        let path = dir.join("run.log");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn median_of_ten_picks_sixth_smallest() {
        let mut times = vec![0.4, 0.2, 0.6, 0.35, 0.1, 0.3, 0.5, 0.2, 0.4, 0.3];
        assert_eq!(pick_stable_runtime(&mut times, 5), Some(0.35));
        assert_eq!(times, vec![0.1, 0.2, 0.2, 0.3, 0.3, 0.35, 0.4, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn short_rerun_lists_fall_back_to_largest_value() {
        let mut times = vec![0.3, 0.1];
        assert_eq!(pick_stable_runtime(&mut times, 5), Some(0.3));
        assert_eq!(pick_stable_runtime(&mut [], 5), None);
    }

    #[test]
    fn solver_command_appends_files_and_flags() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let extractor = MetricExtractor::default();
        let verifier = FixedVerdict::new(true);
        let runner = InstanceRunner::new(&settings, &extractor, &verifier);
        let inst = instance(dir.path());
        let binary = SolverBinary::new("first", vec!["./lilotane".to_string()]);
        let command = runner.solver_command(&binary, &inst);
        assert_eq!(command[0], "./lilotane");
        assert!(command[1].ends_with("domain.hddl"));
        assert!(command[2].ends_with("p01.hddl"));
        assert_eq!(command[3], "-co=0");
        assert_eq!(
            log_artifact_path(dir.path(), &inst, "first"),
            dir.path().join("D1").join("p01.hddl_first.log")
        );
    }

    #[test]
    fn exit_without_solution_marker_is_errored_even_when_exiting_happily() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let extractor = MetricExtractor::default();
        let verifier = FixedVerdict::new(true);
        let runner = InstanceRunner::new(&settings, &extractor, &verifier);
        let log = write_log(dir.path(), "0.5 Iteration 1.\n0.9 Exiting happily.\n");
        let outcome = runner.classify(ExitKind::Exited(Some(0)), &instance(dir.path()), &log);
        assert_eq!(outcome, RunOutcome::Errored);
        assert_eq!(verifier.calls.get(), 0);
    }

    #[test]
    fn timeout_with_exiting_marker_keeps_partial_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let extractor = MetricExtractor::default();
        let verifier = FixedVerdict::new(true);
        let runner = InstanceRunner::new(&settings, &extractor, &verifier);
        let log = write_log(
            dir.path(),
            "0.1 Total amount of clauses encoded: 420\n0.2 Iteration 4.\n9.9 Exiting happily.\n",
        );
        let outcome = runner.classify(ExitKind::TimedOut, &instance(dir.path()), &log);
        let partial = outcome.partial_metrics().expect("partial metrics");
        assert_eq!(partial.get(MetricId::NumClauses), Some(MetricValue::Int(420)));
        assert_eq!(partial.get(MetricId::DepthLimit), Some(MetricValue::Int(4)));
        assert_eq!(partial.get(MetricId::Runtime), None);
    }

    #[test]
    fn timeout_without_exiting_marker_has_no_partial_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let extractor = MetricExtractor::default();
        let verifier = FixedVerdict::new(true);
        let runner = InstanceRunner::new(&settings, &extractor, &verifier);
        let log = write_log(dir.path(), "1.0 Found a solution at layer 3.\n");
        let outcome = runner.classify(ExitKind::TimedOut, &instance(dir.path()), &log);
        assert_eq!(outcome, RunOutcome::TimedOut { partial: None });
    }

    #[test]
    fn rejected_solution_is_invalid_and_accepted_one_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings();
        let extractor = MetricExtractor::default();
        let log = write_log(
            dir.path(),
            "2.5 Found a solution at layer 3.\n2.6 End of solution plan. (counted length of 12)\n",
        );
        let rejecting = FixedVerdict::new(false);
        let runner = InstanceRunner::new(&settings, &extractor, &rejecting);
        assert_eq!(
            runner.classify(ExitKind::Exited(Some(0)), &instance(dir.path()), &log),
            RunOutcome::InvalidSolution
        );

        let accepting = FixedVerdict::new(true);
        let runner = InstanceRunner::new(&settings, &extractor, &accepting);
        let outcome = runner.classify(ExitKind::Exited(Some(1)), &instance(dir.path()), &log);
        let metrics = outcome.finished_metrics().expect("finished");
        assert_eq!(metrics.runtime(), Some(2.5));
        assert_eq!(metrics.search_depth(), Some(3));
        assert_eq!(metrics.get(MetricId::PlanLength), Some(MetricValue::Int(12)));
    }
}
