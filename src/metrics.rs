//! Per-request derived metrics.

use serde::Serialize;
use tokio::time::Instant;

/// The five derived metrics of one streamed completion.
///
/// Times are milliseconds, rates are per second. Degenerate windows (zero
/// elapsed time, zero output tokens) produce `0.0`, never NaN or infinity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSet {
    pub ttft_ms: f64,
    pub tpot_ms: f64,
    pub latency_ms: f64,
    pub tps: f64,
    pub rps: f64,
}

impl MetricSet {
    /// Compute metrics from three timestamps in seconds on one monotonic
    /// clock. Callers guarantee `start_s <= first_token_s <= end_s`.
    pub fn compute(
        start_s: f64,
        first_token_s: f64,
        end_s: f64,
        _input_tokens: usize,
        output_tokens: usize,
    ) -> Self {
        let total_time = end_s - start_s;
        let generation_time = end_s - first_token_s;

        let tpot_ms = if output_tokens > 0 {
            (generation_time / output_tokens as f64) * 1000.0
        } else {
            0.0
        };
        let (tps, rps) = if total_time > 0.0 {
            (output_tokens as f64 / total_time, 1.0 / total_time)
        } else {
            (0.0, 0.0)
        };

        Self {
            ttft_ms: (first_token_s - start_s) * 1000.0,
            tpot_ms,
            latency_ms: total_time * 1000.0,
            tps,
            rps,
        }
    }

    /// Same as [`MetricSet::compute`], measured from `start`.
    pub fn from_instants(
        start: Instant,
        first_token: Instant,
        end: Instant,
        input_tokens: usize,
        output_tokens: usize,
    ) -> Self {
        let first_s = first_token.saturating_duration_since(start).as_secs_f64();
        let end_s = end.saturating_duration_since(start).as_secs_f64();
        Self::compute(0.0, first_s, end_s, input_tokens, output_tokens)
    }
}
