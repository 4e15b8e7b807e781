//! Batch-size sweep: one full run per batch size, then the comparison.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::aggregate::{aggregate, RunConfig, RunResult};
use crate::client::CompletionClient;
use crate::compare::{compare, ComparisonTable};
use crate::config::EndpointConfig;
use crate::dataset::load_prompts;
use crate::dispatch::BatchDispatcher;
use crate::executor::RequestExecutor;
use crate::report::{self, RunArtifacts};
use crate::tokenizer::TokenCount;

/// Everything a sweep needs besides the client and tokenizer.
#[derive(Debug, Clone)]
pub struct BenchPlan {
    pub endpoint: EndpointConfig,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub batch_sizes: Vec<usize>,
}

/// Progress hooks for the caller's UI. All methods default to no-ops.
pub trait RunObserver {
    fn run_started(&self, _batch_size: usize, _total_prompts: usize) {}
    fn group_finished(&self, _completed: usize) {}
    fn run_finished(&self, _run: &RunResult) {}
}

impl RunObserver for () {}

#[derive(Debug)]
pub struct BenchReport {
    pub runs: Vec<RunResult>,
    /// Artifacts per run, `None` for runs without any success.
    pub artifacts: Vec<Option<RunArtifacts>>,
    pub comparison: ComparisonTable,
    pub comparison_file: PathBuf,
}

impl BenchReport {
    pub fn detail_files(&self) -> Vec<PathBuf> {
        self.artifacts
            .iter()
            .flatten()
            .map(|a| a.detail.clone())
            .collect()
    }
}

pub struct Bench {
    plan: BenchPlan,
    dispatcher: BatchDispatcher,
}

impl Bench {
    pub fn new(
        plan: BenchPlan,
        client: Arc<dyn CompletionClient>,
        tokens: Arc<dyn TokenCount>,
    ) -> Self {
        let dispatcher = BatchDispatcher::new(RequestExecutor::new(client, tokens));
        Self { plan, dispatcher }
    }

    /// Run one batch size end to end: load the dataset, dispatch, aggregate.
    /// Dataset problems abort the run; request failures never do.
    pub async fn run_batch(
        &self,
        batch_size: usize,
        observer: &dyn RunObserver,
    ) -> Result<RunResult> {
        let prompts = load_prompts(&self.plan.input)
            .with_context(|| format!("loading prompts for batch_size={batch_size}"))?;

        tracing::info!(batch_size, prompts = prompts.len(), "starting run");
        observer.run_started(batch_size, prompts.len());

        let outcomes = self
            .dispatcher
            .run_with_progress(&prompts, batch_size, |n| observer.group_finished(n))
            .await?;

        let run = aggregate(
            outcomes,
            RunConfig {
                batch_size,
                model: self.plan.endpoint.model.clone(),
                base_url: self.plan.endpoint.base_url.clone(),
            },
        );
        tracing::info!(
            batch_size,
            total = run.total_requests,
            succeeded = run.successful_requests,
            success_rate = %run.success_rate_display(),
            "run finished"
        );
        observer.run_finished(&run);
        Ok(run)
    }

    /// Run every planned batch size in order, write per-run artifacts as each
    /// run completes, then write the comparison.
    pub async fn run_all(&self, observer: &dyn RunObserver) -> Result<BenchReport> {
        let mut runs = Vec::with_capacity(self.plan.batch_sizes.len());
        let mut artifacts = Vec::with_capacity(self.plan.batch_sizes.len());

        for &batch_size in &self.plan.batch_sizes {
            let run = self.run_batch(batch_size, observer).await?;
            let written = report::write_run_artifacts(&self.plan.output_dir, &run)?;
            match &written {
                Some(a) => tracing::info!(path = %a.detail.display(), "wrote run details"),
                None => tracing::warn!(batch_size, "every request failed, no run artifacts"),
            }
            runs.push(run);
            artifacts.push(written);
        }

        let comparison = compare(&runs);
        let comparison_file = report::write_comparison(&self.plan.output_dir, &comparison)?;
        tracing::info!(path = %comparison_file.display(), "wrote comparison");

        Ok(BenchReport {
            runs,
            artifacts,
            comparison,
            comparison_file,
        })
    }
}
