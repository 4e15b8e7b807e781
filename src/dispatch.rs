//! Fan-out/fan-in batch scheduling.
//!
//! Prompts are cut into consecutive groups of `batch_size`. Every request in a
//! group is in flight at once; the next group starts only after the whole
//! group has settled. No pipelining across groups: the group size is the
//! concurrency level being measured.

use futures::future::join_all;

use crate::executor::{RequestExecutor, RequestOutcome};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("batch size must be greater than 0")]
pub struct ZeroBatchSize;

pub struct BatchDispatcher {
    executor: RequestExecutor,
}

impl BatchDispatcher {
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    pub async fn run(
        &self,
        prompts: &[String],
        batch_size: usize,
    ) -> Result<Vec<RequestOutcome>, ZeroBatchSize> {
        self.run_with_progress(prompts, batch_size, |_| {}).await
    }

    /// Like [`BatchDispatcher::run`], calling `on_group_done(group_len)` after
    /// each group settles.
    pub async fn run_with_progress<F>(
        &self,
        prompts: &[String],
        batch_size: usize,
        mut on_group_done: F,
    ) -> Result<Vec<RequestOutcome>, ZeroBatchSize>
    where
        F: FnMut(usize),
    {
        if batch_size == 0 {
            return Err(ZeroBatchSize);
        }

        let mut outcomes = Vec::with_capacity(prompts.len());
        for (group_index, group) in prompts.chunks(batch_size).enumerate() {
            tracing::debug!(group = group_index, size = group.len(), "dispatching group");

            // join_all yields results in submission order, not completion order.
            let settled = join_all(group.iter().map(|prompt| self.executor.execute(prompt))).await;

            for (offset, outcome) in settled.iter().enumerate() {
                if let Some(error) = outcome.error_message() {
                    tracing::warn!(
                        index = group_index * batch_size + offset,
                        error,
                        "request failed"
                    );
                }
            }
            outcomes.extend(settled);
            on_group_done(group.len());
        }

        Ok(outcomes)
    }
}
