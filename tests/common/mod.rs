#![allow(dead_code)]

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};

pub fn llmperf_bin() -> &'static str {
    env!("CARGO_BIN_EXE_llmperf")
}

pub fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("127.0.0.1:{port}")
}

// ─── Mock chat-completions endpoint ───────────────────────────────────────────
//
// Behaviour is picked by the prompt text:
//   "status:<code>"  → plain HTTP error with body "mock failure <code>"
//   "malformed"      → one SSE event that is not JSON
//   "api-error"      → one SSE event carrying an OpenAI-style error object
//   "empty"          → role chunk, finish chunk, [DONE]; no content
//   "hang"           → role chunk, one content chunk, then nothing, forever
//   anything else    → "reply to <prompt>" streamed word by word, then [DONE]

/// Delay before every event the mock emits.
pub const EVENT_DELAY: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub prompt: String,
    pub model: String,
    pub stream: bool,
    pub authorization: Option<String>,
}

#[derive(Default)]
pub struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockServer {
    pub base_url: String,
    state: Arc<MockState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Bind on a random local port and serve until dropped. Must be called
    /// from inside a tokio runtime.
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock server");
        });
        Self {
            base_url: format!("http://{addr}/v1"),
            state,
            handle,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.state.requests.lock().unwrap().len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Expected response text for a prompt that takes the echo path.
pub fn echo_reply(prompt: &str) -> String {
    format!("reply to {prompt}")
}

async fn chat_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let prompt = body["messages"][0]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        prompt: prompt.clone(),
        model: body["model"].as_str().unwrap_or_default().to_string(),
        stream: body["stream"].as_bool().unwrap_or(false),
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    if let Some(code) = prompt.strip_prefix("status:") {
        let status = code
            .trim()
            .parse::<u16>()
            .ok()
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, format!("mock failure {}", status.as_u16())).into_response();
    }

    if prompt == "hang" {
        let events = vec![role_chunk(), content_chunk("partial")];
        return Sse::new(sse_events(events).chain(stream::pending())).into_response();
    }

    let events = match prompt.as_str() {
        "malformed" => vec!["{not json".to_string()],
        "api-error" => vec![json!({"error": {"message": "model overloaded"}}).to_string()],
        "empty" => vec![role_chunk(), finish_chunk(), "[DONE]".to_string()],
        _ => {
            let mut events = vec![role_chunk()];
            let reply = echo_reply(&prompt);
            let words: Vec<&str> = reply.split(' ').collect();
            for (i, word) in words.iter().enumerate() {
                let piece = if i == 0 {
                    word.to_string()
                } else {
                    format!(" {word}")
                };
                events.push(content_chunk(&piece));
            }
            events.push(finish_chunk());
            events.push("[DONE]".to_string());
            events
        }
    };

    Sse::new(sse_events(events)).into_response()
}

fn sse_events(events: Vec<String>) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(events.into_iter(), |mut events| async move {
        let data = events.next()?;
        tokio::time::sleep(EVENT_DELAY).await;
        Some((Ok(Event::default().data(data)), events))
    })
}

fn role_chunk() -> String {
    json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]}).to_string()
}

fn content_chunk(text: &str) -> String {
    json!({"choices": [{"index": 0, "delta": {"content": text}}]}).to_string()
}

fn finish_chunk() -> String {
    json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]}).to_string()
}

// ─── Datasets and files ───────────────────────────────────────────────────────

/// Write a one-column `prompt` CSV.
pub fn write_dataset(dir: &Path, prompts: &[&str]) -> PathBuf {
    let path = dir.join("prompts.csv");
    let mut writer = csv::Writer::from_path(&path).expect("create dataset");
    writer.write_record(["prompt"]).unwrap();
    for prompt in prompts {
        writer.write_record([prompt]).unwrap();
    }
    writer.flush().unwrap();
    path
}

/// Read a CSV written by the benchmark into header + rows.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .unwrap_or_else(|e| panic!("open {}: {e}", path.display()));
    let header = reader.headers().unwrap().iter().map(str::to_string).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

// ─── Binary helpers ───────────────────────────────────────────────────────────

/// Run `llmperf` with `args`, feeding `stdin` and clearing the endpoint env
/// vars so the host environment cannot leak in.
pub fn run_llmperf(dir: &Path, args: &[&str], stdin: &str) -> Output {
    use std::io::Write;

    let mut cmd = Command::new(llmperf_bin());
    cmd.current_dir(dir)
        .args(args)
        .env_remove("LLMPERF_BASE_URL")
        .env_remove("LLMPERF_API_KEY")
        .env_remove("LLMPERF_MODEL")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn().expect("spawn llmperf");
    if let Some(mut pipe) = child.stdin.take() {
        let _ = pipe.write_all(stdin.as_bytes());
    }
    child.wait_with_output().expect("run llmperf")
}

pub fn assert_ok(output: &Output, context: &str) {
    assert!(
        output.status.success(),
        "{context} failed (status {:?})\nstdout:\n{}\nstderr:\n{}",
        output.status.code(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn stdout_str(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr_str(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
