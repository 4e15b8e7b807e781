//! llmperf — batch-size sweeps against a streaming chat-completion endpoint.
//!
//!   llmperf --base-url <url> --model <name> --input prompts.csv
//!   llmperf --batch-sizes 1,2,4,8 --yes        → non-interactive

use std::cell::RefCell;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use llm_perf::bench::{Bench, BenchPlan, BenchReport, RunObserver};
use llm_perf::config::{self, EndpointConfig};
use llm_perf::{interactive, logging, report, OpenAiClient, RunResult, TokenCounter};

// ─── Help text ────────────────────────────────────────────────────────────────

const AFTER_HELP: &str = "\
METRICS (per successful request):
    ttft      Time to first token (ms)
    tpot      Time per output token after the first (ms)
    latency   Request start to end of stream (ms)
    tps       Output tokens per second of total time
    rps       1 / total time of the request

OUTPUT (in --output-dir):
    output_performance_metrics_batch<N>.csv         per-request details
    output_performance_metrics_batch<N>_stats.csv   mean/min/max + environment
    batch_size_comparison.csv                       one row per batch size

ENVIRONMENT:
    LLMPERF_BASE_URL    Endpoint base URL (e.g. http://host:8000/v1)
    LLMPERF_API_KEY     Bearer token sent with every request
    LLMPERF_MODEL       Model name sent with every request

EXAMPLES:
    llmperf --base-url http://127.0.0.1:8000/v1 --model qwen2-7b
    llmperf --input prompts.csv --batch-sizes 1,4,16 --yes";

// ─── CLI definition ───────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "llmperf",
    version,
    about = "Measure TTFT/TPOT/latency/throughput of a streaming LLM endpoint across batch sizes",
    after_help = AFTER_HELP
)]
struct Cli {
    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "LLMPERF_BASE_URL", default_value = config::DEFAULT_BASE_URL)]
    base_url: String,
    /// API key (sent as a bearer token when non-empty)
    #[arg(long, env = "LLMPERF_API_KEY", default_value = "", hide_env_values = true)]
    api_key: String,
    /// Model name
    #[arg(long, env = "LLMPERF_MODEL", default_value = config::DEFAULT_MODEL)]
    model: String,
    /// CSV file with a `prompt` column
    #[arg(long, default_value = "./input/short_input_long_output_prompts.csv")]
    input: PathBuf,
    /// Directory for the CSV reports
    #[arg(long, default_value = "./output")]
    output_dir: PathBuf,
    /// Comma-separated batch sizes; prompted for when omitted
    #[arg(long)]
    batch_sizes: Option<String>,
    /// Start without asking for confirmation
    #[arg(long, short = 'y')]
    yes: bool,
    /// Abort any single request after this many seconds
    #[arg(long)]
    request_timeout_secs: Option<u64>,
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Log format (text, json)
    #[arg(long, default_value = "text")]
    log_format: String,
}

// ─── Dispatch ─────────────────────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = logging::init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("error: cannot initialise logging: {err:#}");
        return ExitCode::FAILURE;
    }

    let endpoint = match EndpointConfig::new(
        &cli.base_url,
        &cli.api_key,
        &cli.model,
        cli.request_timeout_secs.map(Duration::from_secs),
    ) {
        Ok(endpoint) => endpoint,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let batch_sizes = match resolve_batch_sizes(cli.batch_sizes.as_deref()) {
        Ok(Some(sizes)) => sizes,
        Ok(None) => {
            println!("Test cancelled");
            return ExitCode::SUCCESS;
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let plan = BenchPlan {
        endpoint,
        input: cli.input,
        output_dir: cli.output_dir,
        batch_sizes,
    };
    print_plan(&plan);

    if !cli.yes {
        let stdin = io::stdin();
        match interactive::confirm(&mut stdin.lock(), &mut io::stdout(), "\nStart the test?") {
            Ok(true) => {}
            Ok(false) => {
                println!("Test cancelled");
                return ExitCode::SUCCESS;
            }
            Err(err) => {
                eprintln!("error: cannot read confirmation: {err}");
                return ExitCode::FAILURE;
            }
        }
    }

    match run_sweep(plan) {
        Ok(Some(report)) => {
            print_summary(&report);
            ExitCode::SUCCESS
        }
        Ok(None) => {
            eprintln!("\nTest interrupted by user");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("\nerror: test failed: {err:#}");
            eprintln!("{err:?}");
            ExitCode::FAILURE
        }
    }
}

fn resolve_batch_sizes(flag: Option<&str>) -> Result<Option<Vec<usize>>> {
    if let Some(raw) = flag {
        return Ok(Some(config::parse_batch_sizes(raw)?));
    }
    let stdin = io::stdin();
    let sizes = interactive::ask_batch_sizes(&mut stdin.lock(), &mut io::stdout())
        .context("cannot read batch sizes")?;
    Ok(sizes)
}

fn print_plan(plan: &BenchPlan) {
    println!("\nTest configuration:");
    println!("Model: {}", plan.endpoint.model);
    println!("Base URL: {}", plan.endpoint.base_url);
    println!("Batch sizes: {:?}", plan.batch_sizes);
    println!("Input file: {}", plan.input.display());
    println!("Output dir: {}", plan.output_dir.display());
}

// ─── Sweep ────────────────────────────────────────────────────────────────────

/// `Ok(None)` when interrupted with Ctrl-C.
fn run_sweep(plan: BenchPlan) -> Result<Option<BenchReport>> {
    let tokens = TokenCounter::for_model(&plan.endpoint.model)?;
    if tokens.is_fallback() {
        println!("Tokenizer: {} (no encoding registered for this model)", tokens.encoding());
    } else {
        println!("Tokenizer: {}", tokens.encoding());
    }
    let client = OpenAiClient::new(plan.endpoint.clone())?;
    let bench = Bench::new(plan, Arc::new(client), Arc::new(tokens));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("cannot start async runtime")?;

    let observer = ProgressObserver::default();
    rt.block_on(async {
        tokio::select! {
            result = bench.run_all(&observer) => result.map(Some),
            _ = tokio::signal::ctrl_c() => {
                observer.abandon();
                Ok(None)
            }
        }
    })
}

fn print_summary(report: &BenchReport) {
    print!("{}", report::render_comparison(&report.comparison));

    println!("\nTest complete!");
    let details = report.detail_files();
    if details.is_empty() {
        println!("No per-run results were written (every run failed).");
    } else {
        let paths: Vec<String> = details.iter().map(|p| p.display().to_string()).collect();
        println!("Per-run results saved to: {}", paths.join(", "));
    }
    println!(
        "Comparison report saved to: {}",
        report.comparison_file.display()
    );
    let _ = io::stdout().flush();
}

// ─── Progress display ─────────────────────────────────────────────────────────

#[derive(Default)]
struct ProgressObserver {
    bar: RefCell<Option<ProgressBar>>,
}

impl ProgressObserver {
    fn abandon(&self) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.abandon();
        }
    }
}

impl RunObserver for ProgressObserver {
    fn run_started(&self, batch_size: usize, total_prompts: usize) {
        println!("\nStarting batch_size = {batch_size}");
        let bar = ProgressBar::new(total_prompts as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>5}/{len:5} {msg}",
        ) {
            bar.set_style(style);
        }
        bar.set_message(format!("batch_size={batch_size}"));
        *self.bar.borrow_mut() = Some(bar);
    }

    fn group_finished(&self, completed: usize) {
        if let Some(bar) = self.bar.borrow().as_ref() {
            bar.inc(completed as u64);
        }
    }

    fn run_finished(&self, run: &RunResult) {
        if let Some(bar) = self.bar.borrow_mut().take() {
            bar.finish();
        }
        print!("{}", report::render_run(run));
    }
}
