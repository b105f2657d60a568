//! Flat, line-oriented per-metric result files: `<dir>/<metric>.txt` for
//! finished instances and `<dir>/<metric>_unfinished.txt` for the partial
//! metrics of timed-out ones. Each line is `<instance-id> <domain> <value>`.

use anyhow::Result;
use planlab_core::{
    atomic_write_bytes, DomainResultSet, InstanceKey, InstanceRecord, MetricId, MetricSet,
    MetricValue, ResultFileError, RunOutcome,
};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct ResultLine {
    pub key: InstanceKey,
    pub value: MetricValue,
}

pub fn metric_file(dir: &Path, metric: MetricId) -> PathBuf {
    dir.join(format!("{}.txt", metric.as_str()))
}

pub fn unfinished_metric_file(dir: &Path, metric: MetricId) -> PathBuf {
    dir.join(format!("{}_unfinished.txt", metric.as_str()))
}

/// Truncates and rewrites every metric file for `set`. Metrics with no value
/// anywhere still get an (empty) file so stale content never survives.
pub fn write_result_files(dir: &Path, set: &DomainResultSet) -> Result<()> {
    let mut finished: BTreeMap<MetricId, String> = BTreeMap::new();
    let mut unfinished: BTreeMap<MetricId, String> = BTreeMap::new();
    for metric in MetricId::ALL {
        finished.insert(metric, String::new());
        unfinished.insert(metric, String::new());
    }
    for (domain, records) in set.domains() {
        for record in records {
            let (target, metrics) = match &record.outcome {
                RunOutcome::Finished { metrics } => (&mut finished, metrics),
                RunOutcome::TimedOut {
                    partial: Some(metrics),
                } => (&mut unfinished, metrics),
                _ => continue,
            };
            for (metric, value) in metrics.available() {
                let buf = target.entry(metric).or_default();
                let _ = writeln!(buf, "{} {} {}", record.key.id, domain, value);
            }
        }
    }
    for (metric, content) in finished {
        atomic_write_bytes(&metric_file(dir, metric), content.as_bytes())?;
    }
    for (metric, content) in unfinished {
        atomic_write_bytes(&unfinished_metric_file(dir, metric), content.as_bytes())?;
    }
    Ok(())
}

/// Parses one metric file. A missing file reads as empty.
pub fn read_metric_file(path: &Path, metric: MetricId) -> Result<Vec<ResultLine>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)?;
    let mut lines = Vec::new();
    for (idx, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let malformed = || ResultFileError {
            path: path.to_path_buf(),
            line: idx + 1,
            content: line.to_string(),
        };
        // Domain names may hold spaces: the id is the first token, the value the last.
        let Some((id, rest)) = line.trim().split_once(char::is_whitespace) else {
            return Err(malformed().into());
        };
        let Some((domain, value)) = rest.trim().rsplit_once(char::is_whitespace) else {
            return Err(malformed().into());
        };
        let domain = domain.trim();
        if domain.is_empty() {
            return Err(malformed().into());
        }
        let id = id.parse::<u64>().map_err(|_| malformed())?;
        let value = metric.parse_value(value).ok_or_else(malformed)?;
        lines.push(ResultLine {
            key: InstanceKey {
                domain: domain.to_string(),
                id,
            },
            value,
        });
    }
    Ok(lines)
}

/// Rebuilds a result set from a directory of metric files. Instances appear
/// in id order within each domain; names fall back to the numeric id.
pub fn read_result_files(dir: &Path) -> Result<DomainResultSet> {
    let mut finished: BTreeMap<InstanceKey, MetricSet> = BTreeMap::new();
    let mut unfinished: BTreeMap<InstanceKey, MetricSet> = BTreeMap::new();
    for metric in MetricId::ALL {
        for line in read_metric_file(&metric_file(dir, metric), metric)? {
            finished
                .entry(line.key)
                .or_default()
                .insert(metric, Some(line.value));
        }
        for line in read_metric_file(&unfinished_metric_file(dir, metric), metric)? {
            unfinished
                .entry(line.key)
                .or_default()
                .insert(metric, Some(line.value));
        }
    }
    let mut set = DomainResultSet::new();
    for (key, metrics) in finished {
        unfinished.remove(&key);
        set.push(InstanceRecord {
            name: key.id.to_string(),
            key,
            outcome: RunOutcome::Finished { metrics },
        });
    }
    for (key, partial) in unfinished {
        set.push(InstanceRecord {
            name: key.id.to_string(),
            key,
            outcome: RunOutcome::TimedOut {
                partial: Some(partial),
            },
        });
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(domain: &str, id: u64) -> InstanceKey {
        InstanceKey {
            domain: domain.to_string(),
            id,
        }
    }

    fn finished(domain: &str, id: u64, runtime: f64, depth: i64) -> InstanceRecord {
        let mut metrics = MetricSet::new();
        metrics.insert(MetricId::Runtime, Some(MetricValue::Float(runtime)));
        metrics.insert(MetricId::SearchDepth, Some(MetricValue::Int(depth)));
        metrics.insert(MetricId::NumClauses, None);
        InstanceRecord {
            key: key(domain, id),
            name: format!("p{:02}.hddl", id),
            outcome: RunOutcome::Finished { metrics },
        }
    }

    fn triples(dir: &Path, metric: MetricId) -> Vec<(u64, String, String)> {
        let mut out: Vec<_> = read_metric_file(&metric_file(dir, metric), metric)
            .unwrap()
            .into_iter()
            .map(|l| (l.key.id, l.key.domain, l.value.to_string()))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn files_round_trip_instance_domain_value_triples() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = DomainResultSet::new();
        set.push(finished("Transport", 12, 3.25, 4));
        set.push(finished("Barman-BDI", 1, 0.35, 2));
        set.push(finished("Transport", 3, 10.0, 7));
        let mut partial = MetricSet::new();
        partial.insert(MetricId::NumClauses, Some(MetricValue::Int(900)));
        set.push(InstanceRecord {
            key: key("Transport", 4),
            name: "p04.hddl".to_string(),
            outcome: RunOutcome::TimedOut {
                partial: Some(partial),
            },
        });
        set.push(InstanceRecord {
            key: key("Transport", 5),
            name: "p05.hddl".to_string(),
            outcome: RunOutcome::Errored,
        });

        write_result_files(dir.path(), &set).unwrap();
        let content = fs::read_to_string(metric_file(dir.path(), MetricId::Runtime)).unwrap();
        assert!(content.contains("12 Transport 3.25\n"), "{}", content);
        assert!(content.contains("3 Transport 10\n"), "{}", content);

        let back = read_result_files(dir.path()).unwrap();
        let reread = tempfile::tempdir().unwrap();
        write_result_files(reread.path(), &back).unwrap();
        for metric in [MetricId::Runtime, MetricId::SearchDepth] {
            assert_eq!(triples(dir.path(), metric), triples(reread.path(), metric));
        }
        assert_eq!(triples(dir.path(), MetricId::Runtime).len(), 3);
        assert!(triples(dir.path(), MetricId::NumClauses).is_empty());

        let timed_out = back.get(&key("Transport", 4)).unwrap();
        assert_eq!(
            timed_out
                .outcome
                .partial_metrics()
                .and_then(|m| m.get(MetricId::NumClauses)),
            Some(MetricValue::Int(900))
        );
        assert!(back.get(&key("Transport", 5)).is_none());
        let restored = back.get(&key("Barman-BDI", 1)).unwrap();
        assert_eq!(
            restored.outcome.finished_metrics().unwrap().runtime(),
            Some(0.35)
        );
    }

    #[test]
    fn rewrite_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = DomainResultSet::new();
        set.push(finished("D1", 1, 2.0, 3));
        set.push(finished("D1", 2, 5.0, 3));
        write_result_files(dir.path(), &set).unwrap();
        let mut smaller = DomainResultSet::new();
        smaller.push(finished("D1", 1, 2.0, 3));
        write_result_files(dir.path(), &smaller).unwrap();
        assert_eq!(triples(dir.path(), MetricId::Runtime).len(), 1);
    }

    #[test]
    fn domain_names_with_spaces_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut set = DomainResultSet::new();
        set.push(finished("My Domain", 1, 2.0, 3));
        write_result_files(dir.path(), &set).unwrap();
        assert_eq!(
            triples(dir.path(), MetricId::Runtime),
            vec![(1, "My Domain".to_string(), "2".to_string())]
        );
        let back = read_result_files(dir.path()).unwrap();
        assert!(back.get(&key("My Domain", 1)).is_some());
    }

    #[test]
    fn malformed_line_reports_location() {
        let dir = tempfile::tempdir().unwrap();
        let path = metric_file(dir.path(), MetricId::PlanLength);
        fs::write(&path, "1 D1 12\n2 D1\n").unwrap();
        let err = read_metric_file(&path, MetricId::PlanLength).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("malformed_result_line"), "{}", msg);
        assert!(msg.contains(":2:"), "{}", msg);
    }
}
