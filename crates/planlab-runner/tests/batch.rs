#![cfg(unix)]

use planlab_core::config::JobQueueConfig;
use planlab_core::{HarnessConfig, InstanceKey, MetricId, RunOutcome};
use planlab_runner::results::{metric_file, read_metric_file};
use planlab_runner::{
    read_result_files, run_batch_with, write_summary, BatchPlan, SolverBinary, Verifier,
};
use std::fs;
use std::path::Path;

struct AlwaysValid;

impl Verifier for AlwaysValid {
    fn verify(&self, _: &Path, _: &Path, _: &Path) -> bool {
        true
    }
}

const SOLVER_A: &str = r#"case "$2" in
  *p01.hddl) t=2.0 ;;
  *) t=5.0 ;;
esac
echo "0.01 Total amount of clauses encoded: 120"
echo "$t Found a solution at layer 3."
echo "$t End of solution plan. (counted length of 7)"
echo "$t Exiting happily."
"#;

const SOLVER_B: &str = r#"case "$2" in
  *p01.hddl)
    echo "1.0 Found a solution at layer 3."
    echo "1.0 End of solution plan. (counted length of 7)"
    ;;
  *)
    echo "0.5 Iteration 1."
    sleep 30
    ;;
esac
"#;

fn write(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, body).expect("write");
}

fn corpus(root: &Path) -> std::path::PathBuf {
    let corpus = root.join("corpus");
    write(&corpus.join("D1").join("domain.hddl"), "(define (domain d1))");
    write(&corpus.join("D1").join("p01.hddl"), "(define (problem p01))");
    write(&corpus.join("D1").join("p02.hddl"), "(define (problem p02))");
    write(&corpus.join("D2").join("p01.hddl"), "(define (problem orphan))");
    corpus
}

fn sh_binary(root: &Path, label: &str, body: &str) -> SolverBinary {
    let script = root.join(format!("{}.sh", label));
    write(&script, body);
    SolverBinary::new(label, vec!["sh".to_string(), script.display().to_string()])
}

fn config() -> HarnessConfig {
    HarnessConfig {
        timeout_secs: 1,
        kill_grace_ms: 300,
        ..HarnessConfig::default()
    }
}

fn key(id: u64) -> InstanceKey {
    InstanceKey {
        domain: "D1".to_string(),
        id,
    }
}

#[test]
fn two_binary_batch_writes_per_label_result_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let plan = BatchPlan {
        corpus_root: corpus(dir.path()),
        output_dir: dir.path().join("out"),
        binaries: vec![
            sh_binary(dir.path(), "A", SOLVER_A),
            sh_binary(dir.path(), "B", SOLVER_B),
        ],
    };
    let report = run_batch_with(&config(), &plan, &AlwaysValid).expect("batch");

    assert_eq!(report.skipped, 1, "D2 has no domain file");
    let a = report.binary("A").expect("A");
    let b = report.binary("B").expect("B");
    assert_eq!(a.counters.finished, 2);
    assert_eq!(b.counters.finished, 1);
    assert_eq!(b.counters.timed_out, 1);
    assert_eq!(a.result_dir, dir.path().join("out").join("A"));
    assert!(dir
        .path()
        .join("out")
        .join("D1")
        .join("p02.hddl_B.log")
        .is_file());

    let mut runtimes: Vec<_> = read_metric_file(&metric_file(&a.result_dir, MetricId::Runtime), MetricId::Runtime)
        .expect("runtime file")
        .into_iter()
        .map(|l| (l.key.id, l.value.as_f64()))
        .collect();
    runtimes.sort_by_key(|(id, _)| *id);
    assert_eq!(runtimes, vec![(1, 2.0), (2, 5.0)]);

    let b_back = read_result_files(&b.result_dir).expect("B results");
    assert_eq!(
        b_back
            .get(&key(1))
            .and_then(|r| r.outcome.finished_metrics())
            .and_then(|m| m.runtime()),
        Some(1.0)
    );
    assert!(b_back.get(&key(2)).is_none(), "no partial metrics without exit marker");
    assert_eq!(
        b.results.get(&key(2)).map(|r| &r.outcome),
        Some(&RunOutcome::TimedOut { partial: None })
    );

    let summary = write_summary(&report, None).expect("summary");
    let parsed: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(summary).expect("read")).expect("json");
    assert_eq!(parsed["skipped"], 1);
    assert_eq!(parsed["binaries"][1]["counters"]["timed_out"], 1);
}

const HELPER: &str = r#"jobfile="$1"
shift
while [ $# -gt 0 ]; do
  case "$1" in
    -d) logdir="$2"; shift ;;
  esac
  shift
done
while read -r id cmd; do
  mkdir -p "$logdir/$id"
  sh -c "$cmd" > "$logdir/$id/rw" < /dev/null
  rc=$?
  if [ "$rc" -ne 99 ]; then
    echo "RETVAL $id $rc"
  fi
done < "$jobfile"
"#;

const QUEUED_SOLVER: &str = r#"case "$2" in
  *p01.hddl)
    echo "3.5 Found a solution at layer 4."
    ;;
  *p02.hddl)
    echo "0.1 Total amount of clauses encoded: 77"
    echo "0.2 Exiting happily."
    exit 124
    ;;
esac
"#;

#[test]
fn job_queue_dispatch_classifies_offline() {
    let dir = tempfile::tempdir().expect("tempdir");
    let helper = dir.path().join("helper.sh");
    write(&helper, HELPER);
    let mut config = config();
    config.job_queue = Some(JobQueueConfig {
        command: vec!["sh".to_string(), helper.display().to_string()],
        ..JobQueueConfig::default()
    });
    let plan = BatchPlan {
        corpus_root: corpus(dir.path()),
        output_dir: dir.path().join("out"),
        binaries: vec![sh_binary(dir.path(), "queued", QUEUED_SOLVER)],
    };
    let report = run_batch_with(&config, &plan, &AlwaysValid).expect("batch");

    let jobs = fs::read_to_string(dir.path().join("out").join("jobs.txt")).expect("jobs");
    assert_eq!(jobs.lines().count(), 2);
    assert!(jobs.starts_with("1 sh "));

    let queued = report.binary("queued").expect("queued");
    assert_eq!(queued.result_dir, dir.path().join("out"));
    assert_eq!(queued.counters.finished, 1);
    assert_eq!(queued.counters.timed_out, 1);
    let p01 = queued.results.get(&key(1)).expect("p01");
    assert_eq!(
        p01.outcome.finished_metrics().and_then(|m| m.runtime()),
        Some(3.5)
    );
    let p02 = queued.results.get(&key(2)).expect("p02");
    assert_eq!(
        p02.outcome
            .partial_metrics()
            .and_then(|m| m.get(MetricId::NumClauses))
            .map(|v| v.as_f64()),
        Some(77.0)
    );
    let unfinished = fs::read_to_string(
        planlab_runner::results::unfinished_metric_file(&queued.result_dir, MetricId::NumClauses),
    )
    .expect("unfinished");
    assert_eq!(unfinished, "2 D1 77\n");
}
