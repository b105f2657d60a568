//! Paired runtime comparison of two result sets.

use planlab_core::{DomainResultSet, InstanceKey, InstanceRecord};
use serde::Serialize;

/// One instance solved and accepted on both sides. Differences are
/// `first - second`; the relative one is taken against the smaller time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRecord {
    pub key: InstanceKey,
    pub name: String,
    pub time_first: f64,
    pub time_second: f64,
    pub abs_diff: f64,
    pub rel_diff: f64,
}

impl ComparisonRecord {
    /// `None` when the smaller time is not positive.
    pub fn new(key: InstanceKey, name: String, time_first: f64, time_second: f64) -> Option<Self> {
        let smaller = time_first.min(time_second);
        if smaller <= 0.0 {
            return None;
        }
        let abs_diff = time_first - time_second;
        Some(Self {
            key,
            name,
            time_first,
            time_second,
            abs_diff,
            rel_diff: abs_diff / smaller,
        })
    }
}

/// A signed difference and where it was observed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Located {
    pub value: f64,
    pub domain: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainStats {
    pub domain: String,
    pub comparable: usize,
    pub average_abs: f64,
    pub average_rel: f64,
    pub largest_abs: Located,
    pub largest_rel: Located,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregateStats {
    pub comparable: usize,
    pub differing_depth: usize,
    pub nonpositive_excluded: usize,
    /// Only domains with at least one comparable instance.
    pub domains: Vec<DomainStats>,
    pub overall_average_abs: Option<f64>,
    pub overall_average_rel: Option<f64>,
    pub largest_domain_average_abs: Option<Located>,
    pub largest_domain_average_rel: Option<Located>,
    pub largest_abs: Option<Located>,
    pub largest_rel: Option<Located>,
}

impl AggregateStats {
    pub fn has_comparable(&self) -> bool {
        self.comparable > 0
    }

    pub fn domain_average_abs(&self) -> Vec<(&str, f64)> {
        self.domains
            .iter()
            .map(|d| (d.domain.as_str(), d.average_abs))
            .collect()
    }

    /// Per-domain average relative differences, ascending.
    pub fn domain_average_rel(&self) -> Vec<(&str, f64)> {
        let mut out: Vec<(&str, f64)> = self
            .domains
            .iter()
            .map(|d| (d.domain.as_str(), d.average_rel))
            .collect();
        out.sort_by(|a, b| a.1.total_cmp(&b.1));
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Comparison {
    pub records: Vec<ComparisonRecord>,
    pub stats: AggregateStats,
}

/// Replaces `slot` only on a strictly larger magnitude, so the first
/// occurrence wins among equals.
fn track_largest(slot: &mut Option<Located>, value: f64, domain: &str, instance: Option<&str>) {
    let replace = match slot {
        None => true,
        Some(current) => value.abs() > current.value.abs(),
    };
    if replace {
        *slot = Some(Located {
            value,
            domain: domain.to_string(),
            instance: instance.map(str::to_string),
        });
    }
}

fn paired_runtimes(a: &InstanceRecord, b: &InstanceRecord) -> Option<(f64, f64)> {
    let first = a.outcome.finished_metrics()?.runtime()?;
    let second = b.outcome.finished_metrics()?.runtime()?;
    Some((first, second))
}

fn depths_differ(a: &InstanceRecord, b: &InstanceRecord) -> bool {
    let first = a.outcome.finished_metrics().and_then(|m| m.search_depth());
    let second = b.outcome.finished_metrics().and_then(|m| m.search_depth());
    matches!((first, second), (Some(x), Some(y)) if x != y)
}

/// Compares every instance that finished with an accepted plan on both
/// sides. Statistics are recomputed from scratch on every call.
pub fn compare(first: &DomainResultSet, second: &DomainResultSet) -> Comparison {
    let mut records = Vec::new();
    let mut stats = AggregateStats::default();

    for (domain, instances) in first.domains() {
        let mut domain_records: Vec<ComparisonRecord> = Vec::new();
        let mut largest_abs = None;
        let mut largest_rel = None;
        for record in instances {
            let Some(other) = second.get(&record.key) else {
                continue;
            };
            let Some((time_first, time_second)) = paired_runtimes(record, other) else {
                continue;
            };
            if depths_differ(record, other) {
                tracing::debug!(instance = %record.key, "found different solution depths");
                stats.differing_depth += 1;
            }
            let Some(cmp) =
                ComparisonRecord::new(record.key.clone(), record.name.clone(), time_first, time_second)
            else {
                tracing::warn!(
                    instance = %record.key,
                    time_first,
                    time_second,
                    "non-positive runtime, excluded from comparison"
                );
                stats.nonpositive_excluded += 1;
                continue;
            };
            track_largest(&mut largest_abs, cmp.abs_diff, domain, Some(&cmp.name));
            track_largest(&mut largest_rel, cmp.rel_diff, domain, Some(&cmp.name));
            track_largest(&mut stats.largest_abs, cmp.abs_diff, domain, Some(&cmp.name));
            track_largest(&mut stats.largest_rel, cmp.rel_diff, domain, Some(&cmp.name));
            domain_records.push(cmp);
        }
        let (Some(largest_abs), Some(largest_rel)) = (largest_abs, largest_rel) else {
            continue;
        };

        let n = domain_records.len() as f64;
        let average_abs = domain_records.iter().map(|r| r.abs_diff).sum::<f64>() / n;
        let average_rel = domain_records.iter().map(|r| r.rel_diff).sum::<f64>() / n;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut by_rel: Vec<&ComparisonRecord> = domain_records.iter().collect();
            by_rel.sort_by(|a, b| a.rel_diff.total_cmp(&b.rel_diff));
            for r in by_rel {
                tracing::debug!(domain, instance = %r.name, rel_diff = r.rel_diff, "instance difference");
            }
        }
        track_largest(&mut stats.largest_domain_average_abs, average_abs, domain, None);
        track_largest(&mut stats.largest_domain_average_rel, average_rel, domain, None);
        stats.comparable += domain_records.len();
        stats.domains.push(DomainStats {
            domain: domain.to_string(),
            comparable: domain_records.len(),
            average_abs,
            average_rel,
            largest_abs,
            largest_rel,
        });
        records.extend(domain_records);
    }

    if !stats.domains.is_empty() {
        let n = stats.domains.len() as f64;
        stats.overall_average_abs = Some(stats.domains.iter().map(|d| d.average_abs).sum::<f64>() / n);
        stats.overall_average_rel = Some(stats.domains.iter().map(|d| d.average_rel).sum::<f64>() / n);
    }
    Comparison { records, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planlab_core::{MetricId, MetricSet, MetricValue, RunOutcome};

    fn finished(domain: &str, id: u64, runtime: f64, depth: i64) -> InstanceRecord {
        let mut metrics = MetricSet::new();
        metrics.insert(MetricId::Runtime, Some(MetricValue::Float(runtime)));
        metrics.insert(MetricId::SearchDepth, Some(MetricValue::Int(depth)));
        InstanceRecord {
            key: InstanceKey {
                domain: domain.to_string(),
                id,
            },
            name: format!("p{:02}.hddl", id),
            outcome: RunOutcome::Finished { metrics },
        }
    }

    fn with_outcome(domain: &str, id: u64, outcome: RunOutcome) -> InstanceRecord {
        InstanceRecord {
            key: InstanceKey {
                domain: domain.to_string(),
                id,
            },
            name: format!("p{:02}.hddl", id),
            outcome,
        }
    }

    fn set(records: Vec<InstanceRecord>) -> DomainResultSet {
        let mut set = DomainResultSet::new();
        for r in records {
            set.push(r);
        }
        set
    }

    #[test]
    fn relative_difference_uses_smaller_time() {
        let key = InstanceKey {
            domain: "D".to_string(),
            id: 1,
        };
        let r = ComparisonRecord::new(key.clone(), "p01".to_string(), 10.0, 4.0).unwrap();
        assert_eq!(r.abs_diff, 6.0);
        assert_eq!(r.rel_diff, 1.5);
        let r = ComparisonRecord::new(key.clone(), "p01".to_string(), 4.0, 10.0).unwrap();
        assert_eq!(r.abs_diff, -6.0);
        assert_eq!(r.rel_diff, -1.5);
        assert!(ComparisonRecord::new(key, "p01".to_string(), 0.0, 3.0).is_none());
    }

    #[test]
    fn domains_without_comparable_instances_are_excluded() {
        let first = set(vec![
            finished("A", 1, 10.0, 2),
            finished("A", 2, 2.0, 2),
            finished("B", 1, 3.0, 2),
        ]);
        let second = set(vec![
            finished("A", 1, 4.0, 2),
            finished("A", 2, 4.0, 2),
            with_outcome("B", 1, RunOutcome::TimedOut { partial: None }),
        ]);
        let cmp = compare(&first, &second);
        assert_eq!(cmp.stats.comparable, 2);
        assert_eq!(cmp.stats.domains.len(), 1);
        assert_eq!(cmp.stats.domain_average_abs(), vec![("A", 2.0)]);
        // (1.5 + -1.0) / 2
        assert_eq!(cmp.stats.domain_average_rel(), vec![("A", 0.25)]);
        assert_eq!(cmp.stats.overall_average_rel, Some(0.25));
    }

    #[test]
    fn overall_average_is_mean_of_domain_averages() {
        let first = set(vec![
            finished("A", 1, 2.0, 1),
            finished("A", 2, 4.0, 1),
            finished("A", 3, 6.0, 1),
            finished("B", 1, 9.0, 1),
        ]);
        let second = set(vec![
            finished("A", 1, 1.0, 1),
            finished("A", 2, 1.0, 1),
            finished("A", 3, 1.0, 1),
            finished("B", 1, 8.0, 1),
        ]);
        let stats = compare(&first, &second).stats;
        // A: (1 + 3 + 5) / 3 = 3, B: 1
        assert_eq!(stats.overall_average_abs, Some(2.0));
        let largest = stats.largest_domain_average_abs.unwrap();
        assert_eq!(largest.domain, "A");
        assert_eq!(largest.instance, None);
    }

    #[test]
    fn largest_differences_track_magnitude_and_keep_first_on_ties() {
        let first = set(vec![
            finished("A", 1, 1.0, 1),
            finished("A", 2, 3.0, 1),
            finished("B", 1, 5.0, 1),
        ]);
        let second = set(vec![
            finished("A", 1, 4.0, 1),
            finished("A", 2, 1.0, 1),
            finished("B", 1, 2.0, 1),
        ]);
        let stats = compare(&first, &second).stats;
        let abs = stats.largest_abs.unwrap();
        // |-3| in A/p01 comes before the equal |3| in B/p01.
        assert_eq!(abs.value, -3.0);
        assert_eq!(abs.domain, "A");
        assert_eq!(abs.instance.as_deref(), Some("p01.hddl"));
        let rel = stats.largest_rel.unwrap();
        assert_eq!(rel.value, -3.0);
        let a = &stats.domains[0];
        assert_eq!(a.largest_rel.value, -3.0);
        assert_eq!(a.largest_abs.instance.as_deref(), Some("p01.hddl"));
    }

    #[test]
    fn differing_depths_are_counted_only_for_comparable_pairs() {
        let first = set(vec![
            finished("A", 1, 1.0, 3),
            finished("A", 2, 1.0, 3),
            finished("A", 3, 1.0, 3),
        ]);
        let second = set(vec![
            finished("A", 1, 1.0, 4),
            finished("A", 2, 1.0, 3),
            with_outcome("A", 3, RunOutcome::InvalidSolution),
        ]);
        let cmp = compare(&first, &second);
        assert_eq!(cmp.stats.differing_depth, 1);
        assert_eq!(cmp.records.len(), 2);
    }

    #[test]
    fn nothing_comparable_leaves_overall_statistics_empty() {
        let first = set(vec![finished("A", 1, 1.0, 1)]);
        let second = set(vec![with_outcome("A", 1, RunOutcome::Errored)]);
        let stats = compare(&first, &second).stats;
        assert!(!stats.has_comparable());
        assert!(stats.domains.is_empty());
        assert_eq!(stats.overall_average_abs, None);
        assert_eq!(stats.largest_rel, None);
    }
}
