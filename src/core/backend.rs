//! Completion backends: anything that turns a prompt into an ordered stream of
//! text fragments.
//!
//! The HTTP backend speaks the OpenAI-compatible `chat/completions` streaming
//! protocol (server-sent events). Every built-in provider exposes that shape.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use memchr::memchr;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::providers::ProviderSession;
use crate::utils::auth::add_auth_headers;
use crate::utils::url::construct_api_url;

pub type FragmentStream = BoxStream<'static, Result<String, BackendError>>;

/// Failures raised while talking to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The request could not be sent or the connection dropped.
    Request(String),
    /// The backend answered with a non-success status.
    Status { code: u16, summary: String },
    /// The backend reported an error inside the stream.
    Stream(String),
    /// The stream could not be decoded.
    Protocol(String),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Request(message) => write!(f, "request failed: {message}"),
            BackendError::Status { code, summary } => write!(f, "HTTP {code}: {summary}"),
            BackendError::Stream(message) => write!(f, "backend error: {message}"),
            BackendError::Protocol(message) => write!(f, "malformed stream: {message}"),
        }
    }
}

impl std::error::Error for BackendError {}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Opens a response stream for `prompt`. Dropping the returned stream
    /// releases the backend-side handle.
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream, BackendError>;
}

/// Builds a backend for a resolved provider session.
pub trait BackendFactory: Send + Sync {
    fn connect(&self, session: ProviderSession) -> Arc<dyn CompletionBackend>;
}

pub struct HttpBackendFactory {
    client: reqwest::Client,
}

impl HttpBackendFactory {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for HttpBackendFactory {
    fn connect(&self, session: ProviderSession) -> Arc<dyn CompletionBackend> {
        Arc::new(HttpBackend {
            client: self.client.clone(),
            session,
        })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponseDelta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseChoice {
    delta: ChatResponseDelta,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatResponseChoice>,
}

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant serving the Subconscious network.";

pub struct HttpBackend {
    client: reqwest::Client,
    session: ProviderSession,
}

#[async_trait]
impl CompletionBackend for HttpBackend {
    async fn stream_completion(&self, prompt: &str) -> Result<FragmentStream, BackendError> {
        let request = ChatRequest {
            model: &self.session.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: true,
        };

        let chat_url = construct_api_url(&self.session.provider.base_url, "chat/completions");
        debug!(provider = %self.session.provider.id, model = %self.session.model, "opening completion stream");

        let http_request = self
            .client
            .post(chat_url)
            .header("Content-Type", "application/json");
        let http_request = add_auth_headers(http_request, &self.session.provider, &self.session.api_key);

        let response = http_request
            .json(&request)
            .send()
            .await
            .map_err(|err| BackendError::Request(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(BackendError::Status {
                code: status.as_u16(),
                summary: summarize_api_error(&body),
            });
        }

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(|err| err.to_string()))
            .boxed();
        Ok(sse_fragments(bytes))
    }
}

/// One decoded server-sent-events line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SseLine {
    Fragment(String),
    Done,
    Error(String),
    Ignore,
}

pub(crate) fn parse_sse_line(line: &str) -> SseLine {
    let Some(payload) = line.strip_prefix("data:").map(str::trim_start) else {
        return SseLine::Ignore;
    };

    if payload == "[DONE]" {
        return SseLine::Done;
    }
    if payload.trim().is_empty() {
        return SseLine::Ignore;
    }

    match serde_json::from_str::<ChatResponse>(payload) {
        Ok(response) => match response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
        {
            Some(content) if !content.is_empty() => SseLine::Fragment(content),
            _ => SseLine::Ignore,
        },
        Err(_) => SseLine::Error(summarize_api_error(payload)),
    }
}

struct SseState {
    bytes: BoxStream<'static, Result<Vec<u8>, String>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String, BackendError>>,
    finished: bool,
}

impl SseState {
    /// Moves every complete line out of the buffer. Returns `true` once the
    /// stream reached a terminal line.
    fn drain_lines(&mut self) -> bool {
        while let Some(newline_pos) = memchr(b'\n', &self.buffer) {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if self.push_line(&line) {
                return true;
            }
        }
        false
    }

    fn push_line(&mut self, raw: &[u8]) -> bool {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(err) => {
                debug!(error = %err, "skipping invalid UTF-8 in stream");
                return false;
            }
        };
        match parse_sse_line(line) {
            SseLine::Fragment(text) => {
                self.pending.push_back(Ok(text));
                false
            }
            SseLine::Done => true,
            SseLine::Error(summary) => {
                self.pending.push_back(Err(BackendError::Stream(summary)));
                true
            }
            SseLine::Ignore => false,
        }
    }
}

/// Decodes a raw SSE byte stream into text fragments.
///
/// The fragment stream ends after `[DONE]`, after the first in-stream error,
/// or when the connection closes.
pub(crate) fn sse_fragments(
    bytes: BoxStream<'static, Result<Vec<u8>, String>>,
) -> FragmentStream {
    let state = SseState {
        bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.buffer.extend_from_slice(&chunk);
                    state.finished = state.drain_lines();
                }
                Some(Err(err)) => {
                    state.pending.push_back(Err(BackendError::Request(err)));
                    state.finished = true;
                }
                None => {
                    if !state.buffer.is_empty() {
                        let rest = std::mem::take(&mut state.buffer);
                        state.push_line(&rest);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Reduces an error body to a single line suitable for the transcript.
pub(crate) fn summarize_api_error(error_text: &str) -> String {
    let trimmed = error_text.trim();

    if trimmed.is_empty() {
        return "<empty response>".to_string();
    }

    if let Ok(json_value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(summary) = extract_error_summary(&json_value).filter(|s| !s.is_empty()) {
            return summary;
        }
        return json_value.to_string();
    }

    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}
