//! Human-readable console summaries. Advisory only; nothing here is parsed.

use crate::compare::{AggregateStats, Located};
use crate::ranking::Ranking;
use crate::runs::CutStats;
use planlab_core::OutcomeCounters;
use prettytable::{row, Cell, Row, Table};
use std::fmt::Write as _;

pub const NOTHING_COMPARABLE: &str =
    "Could not execute any instance successfully for both binaries";

pub fn render_counters(label: &str, counters: &OutcomeCounters) -> String {
    format!("{}: {}", label, counters)
}

fn located(prefix: &str, loc: &Option<Located>, unit: fn(f64) -> String) -> String {
    match loc {
        Some(l) => match &l.instance {
            Some(instance) => format!(
                "{}: {}, domain: {}, instance: {}",
                prefix,
                unit(l.value),
                l.domain,
                instance
            ),
            None => format!("{}: {}, domain: {}", prefix, unit(l.value), l.domain),
        },
        None => format!("{}: n/a", prefix),
    }
}

fn secs(v: f64) -> String {
    format!("{:.5}s", v)
}

fn percent(v: f64) -> String {
    format!("{:.5}%", v * 100.0)
}

/// Differences read as `first - second`.
pub fn render_comparison(first: &str, second: &str, stats: &AggregateStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "comparison: {} vs {}", first, second);
    if !stats.has_comparable() {
        let _ = writeln!(out, "{}", NOTHING_COMPARABLE);
        return out;
    }
    let _ = writeln!(out, "comparable instances: {}", stats.comparable);
    let _ = writeln!(
        out,
        "instances with differing solution depth: {}",
        stats.differing_depth
    );
    if stats.nonpositive_excluded > 0 {
        let _ = writeln!(
            out,
            "excluded for non-positive runtime: {}",
            stats.nonpositive_excluded
        );
    }

    let mut table = Table::new();
    table.add_row(row!["Domain", "# comparable", "avg abs", "avg rel"]);
    for (domain, rel) in stats.domain_average_rel() {
        let Some(d) = stats.domains.iter().find(|d| d.domain == domain) else {
            continue;
        };
        table.add_row(row![
            domain,
            d.comparable,
            format!("{:.5}s", d.average_abs),
            format!("{:.5}%", rel * 100.0)
        ]);
    }
    let _ = write!(out, "{}", table);

    if let (Some(abs), Some(rel)) = (stats.overall_average_abs, stats.overall_average_rel) {
        let _ = writeln!(out, "overall average absolute difference: {}", secs(abs));
        let _ = writeln!(out, "overall average relative difference: {}", percent(rel));
    }
    let _ = writeln!(
        out,
        "{}",
        located(
            "domain with biggest average absolute",
            &stats.largest_domain_average_abs,
            secs
        )
    );
    let _ = writeln!(
        out,
        "{}",
        located(
            "domain with biggest average relative",
            &stats.largest_domain_average_rel,
            percent
        )
    );
    let _ = writeln!(
        out,
        "{}",
        located("biggest difference absolute", &stats.largest_abs, secs)
    );
    let _ = writeln!(
        out,
        "{}",
        located("biggest difference relative", &stats.largest_rel, percent)
    );
    out
}

/// One column per run; the domain winner is starred.
pub fn render_ranking(ranking: &Ranking) -> String {
    let mut labels: Vec<_> = ranking
        .values
        .values()
        .flat_map(|per_run| per_run.keys().cloned())
        .collect();
    labels.sort();
    labels.dedup();

    let mut table = Table::new();
    let mut header = vec![Cell::new("Domain")];
    header.extend(labels.iter().map(|l| Cell::new(l.as_str())));
    table.add_row(Row::new(header));
    for (domain, per_run) in &ranking.values {
        let winner = ranking.winner_domain.get(domain);
        let mut cells = vec![Cell::new(domain)];
        for label in &labels {
            let text = match per_run.get(label) {
                Some(v) if winner == Some(label) => format!("*{:.2}", v),
                Some(v) => format!("{:.2}", v),
                None => "-".to_string(),
            };
            cells.push(Cell::new(&text));
        }
        table.add_row(Row::new(cells));
    }

    let mut out = table.to_string();
    let winners: Vec<&str> = ranking.winners.iter().map(|l| l.as_str()).collect();
    let _ = writeln!(out, "winners: {}", winners.join(", "));
    if !ranking.tied_domains.is_empty() {
        let _ = writeln!(out, "tied (no winner): {}", ranking.tied_domains.join(", "));
    }
    out
}

pub fn render_cut(stats: &CutStats) -> String {
    let mut table = Table::new();
    table.add_row(row!["Run", "sum", "average"]);
    for entry in &stats.runs {
        let average = entry
            .average
            .map(|a| format!("{:.4}", a))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(row![entry.label.as_str(), format!("{:.4}", entry.sum), average]);
    }
    format!(
        "{} over {} instances solved by every run\n{}",
        stats.metric, stats.instances, table
    )
}
