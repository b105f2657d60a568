use planlab_core::{DomainResultSet, InstanceKey, MetricId};
use prettytable::{Cell, Row, Table};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainRow {
    pub domain: String,
    pub solved: usize,
    /// Same order as `DomainTable::metrics`.
    pub averages: Vec<Option<f64>>,
    pub relative_change: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainTable {
    pub metrics: Vec<MetricId>,
    pub relative_metric: Option<MetricId>,
    pub rows: Vec<DomainRow>,
}

/// Solved count and per-metric averages per domain. With a baseline, also
/// the mean of `(value - baseline) / baseline` for `relative_metric` over
/// instances finished in both sets (zero baselines skipped).
pub fn domain_table(
    set: &DomainResultSet,
    metrics: &[MetricId],
    baseline: Option<(&DomainResultSet, MetricId)>,
) -> DomainTable {
    let mut rows = Vec::new();
    for (domain, records) in set.domains() {
        let finished: Vec<(&InstanceKey, _)> = records
            .iter()
            .filter_map(|r| Some((&r.key, r.outcome.finished_metrics()?)))
            .collect();
        let averages = metrics
            .iter()
            .map(|metric| {
                let values: Vec<f64> = finished
                    .iter()
                    .filter_map(|(_, m)| m.get(*metric))
                    .map(|v| v.as_f64())
                    .collect();
                mean(&values)
            })
            .collect();
        let relative_change = baseline.and_then(|(base, metric)| {
            let changes: Vec<f64> = finished
                .iter()
                .filter_map(|(key, m)| {
                    let value = m.get(metric)?.as_f64();
                    let reference = base.get(key)?.outcome.finished_metrics()?.get(metric)?.as_f64();
                    (reference != 0.0).then(|| (value - reference) / reference)
                })
                .collect();
            mean(&changes)
        });
        rows.push(DomainRow {
            domain: domain.to_string(),
            solved: finished.len(),
            averages,
            relative_change,
        });
    }
    DomainTable {
        metrics: metrics.to_vec(),
        relative_metric: baseline.map(|(_, metric)| metric),
        rows,
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

fn cell(value: Option<f64>) -> Cell {
    match value {
        Some(v) => Cell::new(&format!("{:.2}", v)),
        None => Cell::new("-"),
    }
}

impl DomainTable {
    pub fn render(&self) -> String {
        let mut table = Table::new();
        let mut header = vec![Cell::new("Domain"), Cell::new("# solved")];
        header.extend(self.metrics.iter().map(|m| Cell::new(m.as_str())));
        if let Some(metric) = self.relative_metric {
            header.push(Cell::new(&format!("{} rel. change", metric)));
        }
        table.add_row(Row::new(header));

        for row in &self.rows {
            let mut cells = vec![Cell::new(&row.domain), Cell::new(&row.solved.to_string())];
            cells.extend(row.averages.iter().map(|v| cell(*v)));
            if self.relative_metric.is_some() {
                cells.push(match row.relative_change {
                    Some(v) => Cell::new(&format!("{:+.2}%", v * 100.0)),
                    None => Cell::new("-"),
                });
            }
            table.add_row(Row::new(cells));
        }
        table.to_string()
    }
}
