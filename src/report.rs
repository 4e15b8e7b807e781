//! Output artifacts: per-run detail/stats CSVs, the comparison CSV, and the
//! console renderings of each.

use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::aggregate::{Metric, MetricSummary, RunResult};
use crate::compare::ComparisonTable;

pub const COMPARISON_FILE: &str = "batch_size_comparison.csv";

pub fn detail_path(dir: &Path, batch_size: usize) -> PathBuf {
    dir.join(format!("output_performance_metrics_batch{batch_size}.csv"))
}

pub fn stats_path(dir: &Path, batch_size: usize) -> PathBuf {
    dir.join(format!("output_performance_metrics_batch{batch_size}_stats.csv"))
}

pub fn comparison_path(dir: &Path) -> PathBuf {
    dir.join(COMPARISON_FILE)
}

/// Files written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    pub detail: PathBuf,
    pub stats: PathBuf,
}

fn fmt2(value: f64) -> String {
    format!("{value:.2}")
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(fmt2).unwrap_or_default()
}

fn display_base_url(base_url: &str) -> &str {
    if base_url.is_empty() {
        "default"
    } else {
        base_url
    }
}

// ─── Per-run CSVs ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct DetailRow<'a> {
    prompt: &'a str,
    response: &'a str,
    input_tokens: usize,
    output_tokens: usize,
    ttft: f64,
    tpot: f64,
    latency: f64,
    tps: f64,
    rps: f64,
}

/// One row per successful request, in submission order.
pub fn write_detail_csv<W: Write>(out: W, run: &RunResult) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);
    for (prompt, completion) in run.successes() {
        writer.serialize(DetailRow {
            prompt,
            response: &completion.response_text,
            input_tokens: completion.input_tokens,
            output_tokens: completion.output_tokens,
            ttft: completion.metrics.ttft_ms,
            tpot: completion.metrics.tpot_ms,
            latency: completion.metrics.latency_ms,
            tps: completion.metrics.tps,
            rps: completion.metrics.rps,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Columns after the metrics in the stats CSV, filled only on the
/// `environment` row.
const ENVIRONMENT_COLUMNS: [&str; 5] =
    ["model", "batch_size", "base_url", "total_requests", "success_rate"];

/// mean/min/max rows per metric, then one `environment` row describing the
/// run configuration. Metric and environment values each sit under their
/// own header. Writes nothing for a run without successes.
pub fn write_stats_csv<W: Write>(out: W, run: &RunResult) -> Result<(), csv::Error> {
    let Some(summary) = &run.summary else {
        return Ok(());
    };
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec![String::new()];
    header.extend(Metric::ALL.iter().map(|m| m.name().to_string()));
    header.extend(ENVIRONMENT_COLUMNS.iter().map(|c| c.to_string()));
    writer.write_record(&header)?;

    let rows: [(&str, fn(&MetricSummary) -> f64); 3] =
        [("mean", |s| s.mean), ("min", |s| s.min), ("max", |s| s.max)];
    for (label, pick) in rows {
        let mut record = vec![label.to_string()];
        record.extend(
            Metric::ALL
                .iter()
                .map(|m| summary.get(m).map(|s| fmt2(pick(s))).unwrap_or_default()),
        );
        record.extend(std::iter::repeat(String::new()).take(ENVIRONMENT_COLUMNS.len()));
        writer.write_record(&record)?;
    }

    let mut environment = vec!["environment".to_string()];
    environment.extend(std::iter::repeat(String::new()).take(Metric::ALL.len()));
    environment.extend([
        run.config.model.clone(),
        run.config.batch_size.to_string(),
        display_base_url(&run.config.base_url).to_string(),
        run.total_requests.to_string(),
        run.success_rate_display(),
    ]);
    writer.write_record(&environment)?;
    writer.flush()?;
    Ok(())
}

/// Write both per-run CSVs into `dir`. Returns `None` (and writes nothing)
/// when the run had no successes.
pub fn write_run_artifacts(dir: &Path, run: &RunResult) -> Result<Option<RunArtifacts>> {
    if run.is_total_failure() {
        return Ok(None);
    }
    fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;

    let detail = detail_path(dir, run.config.batch_size);
    let file = fs::File::create(&detail)
        .with_context(|| format!("create {}", detail.display()))?;
    write_detail_csv(file, run).with_context(|| format!("write {}", detail.display()))?;

    let stats = stats_path(dir, run.config.batch_size);
    let file =
        fs::File::create(&stats).with_context(|| format!("create {}", stats.display()))?;
    write_stats_csv(file, run).with_context(|| format!("write {}", stats.display()))?;

    Ok(Some(RunArtifacts { detail, stats }))
}

// ─── Comparison CSV ───────────────────────────────────────────────────────────

pub fn write_comparison_csv<W: Write>(out: W, table: &ComparisonTable) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header = vec!["batch_size".to_string(), "sample_size".to_string()];
    for metric in Metric::ALL {
        for stat in ["mean", "std", "min", "max"] {
            header.push(format!("{metric}_{stat}"));
        }
    }
    writer.write_record(&header)?;

    for row in &table.rows {
        let mut record = vec![row.batch_size.to_string(), row.sample_size.to_string()];
        for metric in Metric::ALL {
            match row.stat(metric) {
                Some(s) => record.extend([
                    fmt2(s.mean),
                    fmt_opt(s.std),
                    fmt2(s.min),
                    fmt2(s.max),
                ]),
                None => record.extend(std::iter::repeat(String::new()).take(4)),
            }
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_comparison(dir: &Path, table: &ComparisonTable) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
    let path = comparison_path(dir);
    let file = fs::File::create(&path).with_context(|| format!("create {}", path.display()))?;
    write_comparison_csv(file, table).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

// ─── Console rendering ────────────────────────────────────────────────────────

/// Environment block, statistics table, and the list of failed requests.
pub fn render_run(run: &RunResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\nEnvironment Information:");
    let _ = writeln!(out, "model: {}", run.config.model);
    let _ = writeln!(out, "batch_size: {}", run.config.batch_size);
    let _ = writeln!(out, "base_url: {}", display_base_url(&run.config.base_url));
    let _ = writeln!(out, "total_requests: {}", run.total_requests);
    let _ = writeln!(out, "success_rate: {}", run.success_rate_display());

    match &run.summary {
        Some(summary) => {
            let _ = writeln!(out, "\nPerformance Statistics:");
            let _ = write!(out, "{:<6}", "");
            for metric in Metric::ALL {
                let _ = write!(out, "{:>15}", metric.name());
            }
            let _ = writeln!(out);
            let rows: [(&str, fn(&MetricSummary) -> f64); 3] =
                [("mean", |s| s.mean), ("min", |s| s.min), ("max", |s| s.max)];
            for (label, pick) in rows {
                let _ = write!(out, "{label:<6}");
                for metric in Metric::ALL {
                    let cell = summary.get(&metric).map(|s| fmt2(pick(s))).unwrap_or_default();
                    let _ = write!(out, "{cell:>15}");
                }
                let _ = writeln!(out);
            }
        }
        None => {
            let _ = writeln!(out, "\nAll requests failed; no statistics.");
        }
    }

    let mut failures = run.failures().peekable();
    if failures.peek().is_some() {
        let _ = writeln!(out, "\nFailed requests:");
        for (prompt, error) in failures {
            let _ = writeln!(out, "Prompt: {prompt}");
            let _ = writeln!(out, "Error: {error}\n");
        }
    }

    out
}

/// Key metrics side by side: latency, TPS, TTFT.
pub fn render_comparison(table: &ComparisonTable) -> String {
    let sections = [
        ("1. Mean latency (ms):", Metric::Latency),
        ("2. TPS (Tokens Per Second):", Metric::Tps),
        ("3. TTFT (Time To First Token) (ms):", Metric::Ttft),
    ];

    let mut out = String::new();
    let _ = writeln!(out, "\nKey metrics by batch size:");
    for (title, metric) in sections {
        let mean_col = format!("{metric}_mean");
        let std_col = format!("{metric}_std");
        let _ = writeln!(out, "\n{title}");
        let _ = writeln!(out, "{:>10} {:>14} {:>14}", "batch_size", mean_col, std_col);
        for row in &table.rows {
            let (mean, std) = match row.stat(metric) {
                Some(s) => (fmt2(s.mean), fmt_opt(s.std)),
                None => (String::new(), String::new()),
            };
            let _ = writeln!(out, "{:>10} {:>14} {:>14}", row.batch_size, mean, std);
        }
    }
    out
}
