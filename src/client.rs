//! Streaming chat-completion client.
//!
//! The executor only sees [`CompletionClient`]: open a stream for a prompt and
//! pull [`ChatChunk`]s until it ends. [`OpenAiClient`] speaks the
//! OpenAI-compatible `POST {base}/chat/completions` SSE protocol
//! (vLLM, llama.cpp server, TGI, OpenAI itself).

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;

/// One streamed fragment. `content` is `None` for role-only, usage-only or
/// finish chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatChunk {
    pub content: Option<String>,
}

impl ChatChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    pub fn empty() -> Self {
        Self { content: None }
    }

    /// The fragment, if it carries any text.
    pub fn fragment(&self) -> Option<&str> {
        self.content.as_deref().filter(|s| !s.is_empty())
    }
}

pub type ChunkStream = BoxStream<'static, Result<ChatChunk, ClientError>>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    #[error("request could not be built: {0}")]
    Request(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("API error: {0}")]
    Api(String),
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Issue one streaming completion for `prompt`.
    ///
    /// Errors may surface either here or as items of the returned stream;
    /// the stream ends when the server signals completion.
    async fn stream_chat(&self, prompt: &str) -> Result<ChunkStream, ClientError>;
}

// ─── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Marks the end of an OpenAI-style event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Decode one SSE `data:` payload. `Ok(None)` means end of stream.
pub fn decode_chunk(data: &str) -> Result<Option<ChatChunk>, ClientError> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(None);
    }
    let response: StreamResponse = serde_json::from_str(data)
        .map_err(|e| ClientError::Protocol(format!("malformed chunk: {e}")))?;
    if let Some(error) = response.error {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ClientError::Api(message));
    }
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta)
        .and_then(|delta| delta.content);
    Ok(Some(ChatChunk { content }))
}

// ─── OpenAI-compatible client ─────────────────────────────────────────────────

pub struct OpenAiClient {
    http: reqwest::Client,
    config: EndpointConfig,
}

impl OpenAiClient {
    pub fn new(config: EndpointConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .tcp_nodelay(true)
            .build()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn request(&self, prompt: &str) -> reqwest::RequestBuilder {
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            stream: true,
        };
        let mut request = self
            .http
            .post(self.config.chat_completions_url())
            .json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }
        if let Some(timeout) = self.config.request_timeout {
            request = request.timeout(timeout);
        }
        request
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn stream_chat(&self, prompt: &str) -> Result<ChunkStream, ClientError> {
        let mut source = self
            .request(prompt)
            .eventsource()
            .map_err(|e| ClientError::Request(e.to_string()))?;
        source.set_retry_policy(Box::new(reqwest_eventsource::retry::Never));

        Ok(stream::unfold(Some(source), next_chunk).boxed())
    }
}

/// Pull the next chunk out of the event source. The source is dropped (and
/// closed) after `[DONE]`, end of stream, or the first error, so a failed
/// request is never reconnected.
async fn next_chunk(
    state: Option<EventSource>,
) -> Option<(Result<ChatChunk, ClientError>, Option<EventSource>)> {
    let mut source = state?;
    loop {
        let event = match source.next().await {
            Some(event) => event,
            None => return None,
        };
        match event {
            Ok(Event::Open) => continue,
            Ok(Event::Message(message)) => match decode_chunk(&message.data) {
                Ok(Some(chunk)) => return Some((Ok(chunk), Some(source))),
                Ok(None) => {
                    source.close();
                    return None;
                }
                Err(err) => {
                    source.close();
                    return Some((Err(err), None));
                }
            },
            Err(reqwest_eventsource::Error::StreamEnded) => {
                source.close();
                return None;
            }
            Err(err) => {
                source.close();
                return Some((Err(convert_error(err).await), None));
            }
        }
    }
}

async fn convert_error(err: reqwest_eventsource::Error) -> ClientError {
    use reqwest_eventsource::Error;

    match err {
        Error::InvalidStatusCode(status, response) => {
            let body = response.text().await.unwrap_or_default();
            ClientError::Status {
                code: status.as_u16(),
                body: truncate(body.trim(), 512),
            }
        }
        Error::InvalidContentType(content_type, response) => {
            let status = response.status();
            ClientError::Protocol(format!(
                "expected text/event-stream, got {} (HTTP {})",
                content_type.to_str().unwrap_or("<binary>"),
                status.as_u16()
            ))
        }
        Error::Transport(e) => ClientError::Transport(transport_message(&e)),
        other => ClientError::Protocol(other.to_string()),
    }
}

/// reqwest's `Display` stops at the outermost layer ("error sending request
/// for url ..."); the cause sits further down the source chain.
fn transport_message(err: &reqwest::Error) -> String {
    let message = error_chain(err);
    if err.is_timeout() && !message.contains("timed out") {
        format!("request timed out: {message}")
    } else {
        message
    }
}

/// `outer: cause: root cause`, skipping causes already spelled out by the
/// layer above.
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
