//! Runs one prompt against the completion endpoint and times it.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tokio::time::Instant;

use crate::client::{ClientError, CompletionClient};
use crate::metrics::MetricSet;
use crate::tokenizer::TokenCount;

pub const NO_CONTENT_MESSAGE: &str = "no content received";

/// The result of executing one prompt. Failures carry only the error text;
/// successes carry everything measured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestOutcome {
    pub prompt: String,
    pub status: OutcomeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success(Completion),
    Failure { error_message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Completion {
    pub response_text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
    #[serde(flatten)]
    pub metrics: MetricSet,
}

impl RequestOutcome {
    pub fn success(prompt: impl Into<String>, completion: Completion) -> Self {
        Self {
            prompt: prompt.into(),
            status: OutcomeStatus::Success(completion),
        }
    }

    pub fn failure(prompt: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            status: OutcomeStatus::Failure {
                error_message: error_message.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, OutcomeStatus::Success(_))
    }

    pub fn completion(&self) -> Option<&Completion> {
        match &self.status {
            OutcomeStatus::Success(completion) => Some(completion),
            OutcomeStatus::Failure { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.status {
            OutcomeStatus::Success(_) => None,
            OutcomeStatus::Failure { error_message } => Some(error_message),
        }
    }
}

/// What the stream delivered before it ended.
struct StreamCapture {
    first_token: Option<Instant>,
    text: String,
}

/// Executes prompts one at a time; clone-cheap and shared by every task in a
/// group. Each call owns its own timestamps and response buffer.
#[derive(Clone)]
pub struct RequestExecutor {
    client: Arc<dyn CompletionClient>,
    tokens: Arc<dyn TokenCount>,
}

impl RequestExecutor {
    pub fn new(client: Arc<dyn CompletionClient>, tokens: Arc<dyn TokenCount>) -> Self {
        Self { client, tokens }
    }

    /// Never fails: transport, protocol and empty-stream errors all become a
    /// [`OutcomeStatus::Failure`].
    pub async fn execute(&self, prompt: &str) -> RequestOutcome {
        let input_tokens = self.tokens.count(prompt);

        let start = Instant::now();
        let capture = match self.consume(prompt).await {
            Ok(capture) => capture,
            Err(err) => {
                tracing::debug!(error = %err, "request failed");
                return RequestOutcome::failure(prompt, err.to_string());
            }
        };
        let end = Instant::now();

        let Some(first_token) = capture.first_token else {
            return RequestOutcome::failure(prompt, NO_CONTENT_MESSAGE);
        };

        let output_tokens = self.tokens.count(&capture.text);
        let metrics =
            MetricSet::from_instants(start, first_token, end, input_tokens, output_tokens);
        tracing::trace!(
            input_tokens,
            output_tokens,
            ttft_ms = metrics.ttft_ms,
            latency_ms = metrics.latency_ms,
            "request completed"
        );

        RequestOutcome::success(
            prompt,
            Completion {
                response_text: capture.text,
                input_tokens,
                output_tokens,
                metrics,
            },
        )
    }

    async fn consume(&self, prompt: &str) -> Result<StreamCapture, ClientError> {
        let mut stream = self.client.stream_chat(prompt).await?;
        let mut capture = StreamCapture {
            first_token: None,
            text: String::new(),
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(fragment) = chunk.fragment() {
                if capture.first_token.is_none() {
                    capture.first_token = Some(Instant::now());
                }
                capture.text.push_str(fragment);
            }
        }

        Ok(capture)
    }
}
