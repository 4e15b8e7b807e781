//! Per-run aggregation: success rate and per-metric summaries.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::executor::{Completion, RequestOutcome};

/// Every numeric column reported for a successful request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    InputTokens,
    OutputTokens,
    Ttft,
    Tpot,
    Latency,
    Tps,
    Rps,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::InputTokens,
        Metric::OutputTokens,
        Metric::Ttft,
        Metric::Tpot,
        Metric::Latency,
        Metric::Tps,
        Metric::Rps,
    ];

    /// Column name used in every table.
    pub fn name(self) -> &'static str {
        match self {
            Metric::InputTokens => "input_tokens",
            Metric::OutputTokens => "output_tokens",
            Metric::Ttft => "ttft",
            Metric::Tpot => "tpot",
            Metric::Latency => "latency",
            Metric::Tps => "tps",
            Metric::Rps => "rps",
        }
    }

    pub fn value(self, completion: &Completion) -> f64 {
        match self {
            Metric::InputTokens => completion.input_tokens as f64,
            Metric::OutputTokens => completion.output_tokens as f64,
            Metric::Ttft => completion.metrics.ttft_ms,
            Metric::Tpot => completion.metrics.tpot_ms,
            Metric::Latency => completion.metrics.latency_ms,
            Metric::Tps => completion.metrics.tps,
            Metric::Rps => completion.metrics.rps,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary of one metric over a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    /// Sample standard deviation (n - 1). `None` below two samples.
    pub std: Option<f64>,
}

impl MetricSummary {
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
        let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std = (samples.len() > 1).then(|| {
            let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
            var.sqrt()
        });
        Some(Self {
            mean,
            min,
            max,
            std,
        })
    }
}

/// Summaries for every [`Metric`] over a set of successful outcomes.
/// Empty input produces `None`, never a zero-filled table.
pub fn summarize<'a>(
    completions: impl IntoIterator<Item = &'a Completion>,
) -> Option<BTreeMap<Metric, MetricSummary>> {
    let completions: Vec<&Completion> = completions.into_iter().collect();
    if completions.is_empty() {
        return None;
    }
    Metric::ALL
        .iter()
        .map(|&metric| {
            let samples: Vec<f64> = completions.iter().map(|c| metric.value(c)).collect();
            MetricSummary::from_samples(&samples).map(|summary| (metric, summary))
        })
        .collect()
}

/// The configuration one run was measured under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub batch_size: usize,
    pub model: String,
    pub base_url: String,
}

/// All outcomes of one batch-size run plus what was derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub config: RunConfig,
    pub outcomes: Vec<RequestOutcome>,
    pub total_requests: usize,
    pub successful_requests: usize,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    /// `None` when no request succeeded.
    pub summary: Option<BTreeMap<Metric, MetricSummary>>,
}

impl RunResult {
    pub fn successes(&self) -> impl Iterator<Item = (&str, &Completion)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.completion().map(|c| (o.prompt.as_str(), c)))
    }

    /// `(prompt, error)` for every failed request, in submission order.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.error_message().map(|e| (o.prompt.as_str(), e)))
    }

    pub fn is_total_failure(&self) -> bool {
        self.successful_requests == 0
    }

    /// e.g. `"60.00%"`.
    pub fn success_rate_display(&self) -> String {
        format!("{:.2}%", self.success_rate)
    }
}

pub fn aggregate(outcomes: Vec<RequestOutcome>, config: RunConfig) -> RunResult {
    let total_requests = outcomes.len();
    let successful_requests = outcomes.iter().filter(|o| o.is_success()).count();
    let success_rate = if total_requests > 0 {
        successful_requests as f64 / total_requests as f64 * 100.0
    } else {
        0.0
    };
    let summary = summarize(outcomes.iter().filter_map(RequestOutcome::completion));

    RunResult {
        config,
        outcomes,
        total_requests,
        successful_requests,
        success_rate,
        summary,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::metrics::MetricSet;

    pub(crate) fn completed(prompt: &str, latency_ms: f64, output_tokens: usize) -> RequestOutcome {
        let end = latency_ms / 1000.0;
        RequestOutcome::success(
            prompt,
            Completion {
                response_text: "x".repeat(output_tokens),
                input_tokens: prompt.len(),
                output_tokens,
                metrics: MetricSet::compute(0.0, end / 10.0, end, prompt.len(), output_tokens),
            },
        )
    }

    pub(crate) fn config(batch_size: usize) -> RunConfig {
        RunConfig {
            batch_size,
            model: "test-model".to_string(),
            base_url: "http://localhost:8000/v1".to_string(),
        }
    }

    #[test]
    fn summary_stats() {
        let s = MetricSummary::from_samples(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(s.mean, 5.0);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 9.0);
        assert!((s.std.unwrap() - 2.138089935299395).abs() < 1e-12);

        let single = MetricSummary::from_samples(&[3.5]).unwrap();
        assert_eq!((single.mean, single.min, single.max), (3.5, 3.5, 3.5));
        assert_eq!(single.std, None);

        assert!(MetricSummary::from_samples(&[]).is_none());
    }

    #[test]
    fn mixed_run_aggregates_successes_only() {
        let outcomes = vec![
            completed("a", 100.0, 10),
            RequestOutcome::failure("b", "transport error: connection refused"),
            completed("c", 200.0, 20),
            RequestOutcome::failure("d", "no content received"),
            completed("e", 300.0, 30),
        ];
        let run = aggregate(outcomes, config(5));

        assert_eq!(run.total_requests, 5);
        assert_eq!(run.successful_requests, 3);
        assert!((run.success_rate - 60.0).abs() < 1e-9);
        assert_eq!(run.success_rate_display(), "60.00%");

        let summary = run.summary.as_ref().unwrap();
        let latency = summary[&Metric::Latency];
        assert!((latency.mean - 200.0).abs() < 1e-9);
        assert!((latency.min - 100.0).abs() < 1e-9);
        assert!((latency.max - 300.0).abs() < 1e-9);
        assert_eq!(summary[&Metric::OutputTokens].mean, 20.0);
        assert_eq!(summary.len(), Metric::ALL.len());

        let failures: Vec<_> = run.failures().collect();
        assert_eq!(
            failures,
            vec![
                ("b", "transport error: connection refused"),
                ("d", "no content received")
            ]
        );
    }

    #[test]
    fn all_failed_run_omits_summary() {
        let outcomes = vec![
            RequestOutcome::failure("a", "HTTP 401: unauthorized"),
            RequestOutcome::failure("b", "HTTP 401: unauthorized"),
        ];
        let run = aggregate(outcomes, config(2));
        assert!(run.is_total_failure());
        assert!(run.summary.is_none());
        assert_eq!(run.success_rate_display(), "0.00%");
    }

    #[test]
    fn all_succeeding_run() {
        let outcomes = ["A", "B", "C", "D"]
            .iter()
            .map(|p| completed(p, 100.0, 5))
            .collect();
        let run = aggregate(outcomes, config(2));
        assert_eq!(run.total_requests, 4);
        assert_eq!(run.success_rate_display(), "100.00%");
        assert_eq!(run.successes().count(), 4);
    }
}
