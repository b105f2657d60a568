//! Per-domain winner selection across several labelled runs.

use planlab_core::{DomainResultSet, MetricId};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Run label. Labels that parse as unsigned integers sort first, numerically;
/// the rest follow lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RunLabel(String);

impl RunLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for RunLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for RunLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RunLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    LowerIsBetter,
    HigherIsBetter,
}

impl Direction {
    fn better(self, candidate: f64, best: f64) -> bool {
        match self {
            Direction::LowerIsBetter => candidate < best,
            Direction::HigherIsBetter => candidate > best,
        }
    }
}

/// How one domain's instances collapse into a single comparable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainAggregate {
    #[default]
    Mean,
    Sum,
    Count,
}

impl std::str::FromStr for DomainAggregate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "count" => Ok(Self::Count),
            other => Err(format!("unknown aggregate {} (expected mean, sum or count)", other)),
        }
    }
}

/// Per-domain value of `metric` over finished instances. Domains where no
/// finished instance carries the metric are absent (except for `Count`).
pub fn domain_values(
    set: &DomainResultSet,
    metric: MetricId,
    aggregate: DomainAggregate,
) -> BTreeMap<String, f64> {
    let mut out = BTreeMap::new();
    for (domain, records) in set.domains() {
        let values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.outcome.finished_metrics()?.get(metric))
            .map(|v| v.as_f64())
            .collect();
        let value = match aggregate {
            DomainAggregate::Count => values.len() as f64,
            _ if values.is_empty() => continue,
            DomainAggregate::Sum => values.iter().sum(),
            DomainAggregate::Mean => values.iter().sum::<f64>() / values.len() as f64,
        };
        out.insert(domain.to_string(), value);
    }
    out
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Ranking {
    /// Rounded value per run, for the ranked domains.
    pub values: BTreeMap<String, BTreeMap<RunLabel, f64>>,
    pub winner_domain: BTreeMap<String, RunLabel>,
    /// Runs that won at least one domain, in label order.
    pub winners: Vec<RunLabel>,
    pub tied_domains: Vec<String>,
}

/// Picks the best run per domain among domains every run reports. Values
/// are compared after rounding to two decimals; when more than one run
/// shares the best value the domain has no winner.
pub fn rank(runs: &BTreeMap<RunLabel, BTreeMap<String, f64>>, direction: Direction) -> Ranking {
    let mut ranking = Ranking::default();
    let Some((_, reference)) = runs.iter().next() else {
        return ranking;
    };
    let domains: Vec<&String> = reference
        .keys()
        .filter(|d| runs.values().all(|values| values.contains_key(*d)))
        .collect();

    let mut winners = BTreeSet::new();
    for domain in domains {
        let per_run: BTreeMap<RunLabel, f64> = runs
            .iter()
            .filter_map(|(label, values)| Some((label.clone(), round2(*values.get(domain)?))))
            .collect();
        let mut best: Option<(&RunLabel, f64)> = None;
        let mut tied = false;
        for (label, &value) in &per_run {
            match best {
                None => best = Some((label, value)),
                Some((_, current)) if direction.better(value, current) => {
                    best = Some((label, value));
                    tied = false;
                }
                Some((_, current)) if value == current => tied = true,
                Some(_) => {}
            }
        }
        match best {
            Some(_) if tied => {
                tracing::debug!(domain = %domain, "tie for best value, no winner");
                ranking.tied_domains.push(domain.clone());
            }
            Some((label, _)) => {
                ranking.winner_domain.insert(domain.clone(), label.clone());
                winners.insert(label.clone());
            }
            None => {}
        }
        ranking.values.insert(domain.clone(), per_run);
    }
    ranking.winners = winners.into_iter().collect();
    ranking
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runs(entries: &[(&str, &[(&str, f64)])]) -> BTreeMap<RunLabel, BTreeMap<String, f64>> {
        entries
            .iter()
            .map(|(label, values)| {
                (
                    RunLabel::new(*label),
                    values.iter().map(|(d, v)| (d.to_string(), *v)).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn labels_sort_numeric_first_then_lexicographic() {
        let mut labels: Vec<RunLabel> = ["b", "10", "2", "a", "1"]
            .iter()
            .map(|s| RunLabel::new(*s))
            .collect();
        labels.sort();
        let order: Vec<&str> = labels.iter().map(RunLabel::as_str).collect();
        assert_eq!(order, vec!["1", "2", "10", "a", "b"]);
    }

    #[test]
    fn exact_tie_suppresses_the_win() {
        let input = runs(&[
            ("1", &[("Transport", 3.0), ("Depots", 2.0)]),
            ("2", &[("Transport", 3.0), ("Depots", 5.0)]),
            ("3", &[("Transport", 4.0), ("Depots", 6.0)]),
        ]);
        let ranking = rank(&input, Direction::LowerIsBetter);
        assert!(!ranking.winner_domain.contains_key("Transport"));
        assert_eq!(ranking.tied_domains, vec!["Transport".to_string()]);
        assert_eq!(ranking.winner_domain["Depots"], RunLabel::new("1"));
        assert_eq!(ranking.winners, vec![RunLabel::new("1")]);
    }

    #[test]
    fn later_strictly_better_value_clears_an_earlier_tie() {
        let input = runs(&[
            ("a", &[("D", 3.0)]),
            ("b", &[("D", 3.0)]),
            ("c", &[("D", 1.0)]),
        ]);
        let ranking = rank(&input, Direction::LowerIsBetter);
        assert_eq!(ranking.winner_domain["D"], RunLabel::new("c"));
        assert!(ranking.tied_domains.is_empty());
    }

    #[test]
    fn rounding_to_two_decimals_decides_ties_and_direction_flips() {
        let input = runs(&[("1", &[("D", 1.004)]), ("2", &[("D", 1.001)])]);
        let ranking = rank(&input, Direction::LowerIsBetter);
        assert!(ranking.winner_domain.is_empty());
        assert!(ranking.winners.is_empty());

        let input = runs(&[("1", &[("D", 12.0)]), ("2", &[("D", 15.0)])]);
        let ranking = rank(&input, Direction::HigherIsBetter);
        assert_eq!(ranking.winner_domain["D"], RunLabel::new("2"));
    }

    #[test]
    fn domains_missing_from_a_run_are_not_ranked() {
        let input = runs(&[("1", &[("A", 1.0), ("B", 1.0)]), ("2", &[("A", 2.0)])]);
        let ranking = rank(&input, Direction::LowerIsBetter);
        assert_eq!(ranking.values.len(), 1);
        assert_eq!(ranking.winner_domain["A"], RunLabel::new("1"));
    }
}
