//! Cross-run comparison: one row per batch size.

use std::collections::BTreeMap;

use crate::aggregate::{summarize, Metric, MetricSummary, RunResult};

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub batch_size: usize,
    /// Number of successful requests the statistics were computed over.
    pub sample_size: usize,
    /// Empty when the run had no successes.
    pub stats: BTreeMap<Metric, MetricSummary>,
}

impl ComparisonRow {
    pub fn stat(&self, metric: Metric) -> Option<&MetricSummary> {
        self.stats.get(&metric)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComparisonTable {
    pub rows: Vec<ComparisonRow>,
}

/// Build the comparison, sorted ascending by batch size. Each row's mean and
/// std describe the spread of per-request values inside that run.
pub fn compare(runs: &[RunResult]) -> ComparisonTable {
    let mut rows: Vec<ComparisonRow> = runs
        .iter()
        .map(|run| ComparisonRow {
            batch_size: run.config.batch_size,
            sample_size: run.successful_requests,
            stats: summarize(run.successes().map(|(_, c)| c)).unwrap_or_default(),
        })
        .collect();
    rows.sort_by_key(|row| row.batch_size);
    ComparisonTable { rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::aggregate::tests::{completed, config};
    use crate::executor::RequestOutcome;

    #[test]
    fn rows_are_sorted_by_batch_size() {
        let runs: Vec<RunResult> = [8, 1, 4, 2]
            .into_iter()
            .map(|bs| aggregate(vec![completed("p", 100.0 * bs as f64, 10)], config(bs)))
            .collect();
        let table = compare(&runs);
        let order: Vec<usize> = table.rows.iter().map(|r| r.batch_size).collect();
        assert_eq!(order, vec![1, 2, 4, 8]);
        assert!((table.rows[3].stat(Metric::Latency).unwrap().mean - 800.0).abs() < 1e-9);
    }

    #[test]
    fn std_is_intra_run_spread() {
        let steady = aggregate(
            vec![completed("a", 100.0, 10), completed("b", 100.0, 10)],
            config(1),
        );
        let noisy = aggregate(
            vec![
                completed("a", 100.0, 10),
                completed("b", 300.0, 10),
                RequestOutcome::failure("c", "HTTP 500: boom"),
            ],
            config(2),
        );
        let table = compare(&[noisy, steady]);

        let steady_latency = table.rows[0].stat(Metric::Latency).unwrap();
        assert_eq!(steady_latency.std, Some(0.0));

        let noisy_row = &table.rows[1];
        assert_eq!(noisy_row.sample_size, 2);
        let noisy_latency = noisy_row.stat(Metric::Latency).unwrap();
        assert!((noisy_latency.mean - 200.0).abs() < 1e-9);
        assert!((noisy_latency.std.unwrap() - 141.42135623730951).abs() < 1e-6);
    }

    #[test]
    fn failed_run_still_gets_a_row() {
        let failed = aggregate(vec![RequestOutcome::failure("a", "boom")], config(4));
        let table = compare(&[failed]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].sample_size, 0);
        assert!(table.rows[0].stats.is_empty());
    }
}
