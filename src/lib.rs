//! llm-perf — serving-performance sweeps for streaming chat-completion
//! endpoints.
//!
//! A sweep sends every prompt of a dataset once per batch size. Within a run,
//! prompts go out in groups of `batch_size` concurrent requests; each request
//! is timed at token granularity (TTFT, TPOT, latency, TPS, RPS). Runs are
//! summarised individually and then compared side by side.
//!
//! Layers, bottom up:
//!   tokenizer / metrics   → pure building blocks
//!   client / executor     → one timed streaming request
//!   dispatch              → grouped fan-out/fan-in
//!   aggregate / compare   → per-run and cross-run statistics
//!   dataset / report      → CSV in, CSV + console out
//!   bench                 → the sweep itself

pub mod aggregate;
pub mod bench;
pub mod client;
pub mod compare;
pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod executor;
pub mod interactive;
pub mod logging;
pub mod metrics;
pub mod report;
pub mod tokenizer;

pub use aggregate::{aggregate, Metric, MetricSummary, RunConfig, RunResult};
pub use bench::{Bench, BenchPlan, BenchReport, RunObserver};
pub use client::{ChatChunk, ChunkStream, ClientError, CompletionClient, OpenAiClient};
pub use compare::{compare, ComparisonRow, ComparisonTable};
pub use config::{parse_batch_sizes, EndpointConfig};
pub use dispatch::BatchDispatcher;
pub use executor::{Completion, OutcomeStatus, RequestExecutor, RequestOutcome};
pub use metrics::MetricSet;
pub use tokenizer::{TokenCount, TokenCounter};
