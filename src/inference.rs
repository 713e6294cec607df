//! Ollama inference client.
//!
//! Speaks the `/api/generate` wire contract in single-shot and streaming
//! modes, with timeouts scaled to input size and cooperative cancellation.
//! Cancellation is a first-class outcome: callers can always tell a cancelled
//! request from a failed one.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::assemble::MessagePair;
use crate::progress::{ProgressReporter, StreamThrottle, WaitTicker};

/// User messages longer than this always stream, regardless of configuration.
pub const FORCED_STREAMING_THRESHOLD: usize = 100_000;

#[derive(Debug, Error)]
pub enum InferenceError {
    /// The caller cancelled the request. Not a failure.
    #[error("request cancelled")]
    Cancelled,
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("failed to connect to Ollama at {url}; ensure Ollama is running on the configured port")]
    Unreachable {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Ollama API error: {status}. {body}")]
    Api { status: u16, body: String },
    #[error("invalid response from Ollama API")]
    InvalidResponse,
    #[error("transport error")]
    Transport(#[from] reqwest::Error),
}

impl InferenceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InferenceError::Cancelled)
    }
}

pub type InferenceResult<T> = std::result::Result<T, InferenceError>;

/// Connection settings for the inference backend. Constructed once by the
/// caller (from configuration or storage) and passed in explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceConfig {
    pub host: String,
    pub port: u16,
    pub model: String,
    pub streaming: bool,
    pub temperature: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            model: "phi3:medium".to_string(),
            streaming: false,
            temperature: 0.7,
        }
    }
}

impl InferenceConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// The seam the report orchestrator talks through, so workflows can be tested
/// against a scripted backend.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn query(
        &self,
        messages: &MessagePair,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> InferenceResult<String>;
}

pub struct InferenceClient {
    http: reqwest::Client,
    config: InferenceConfig,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
}

#[derive(Deserialize)]
struct StreamFragment {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
}

impl InferenceClient {
    pub fn new(config: InferenceConfig) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// Single-shot request with a waiting ticker on stderr-style progress.
    async fn query_single(
        &self,
        prompt: String,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> InferenceResult<String> {
        let prompt_len = prompt.chars().count();
        let timeout_seconds = single_shot_timeout_seconds(prompt_len);
        let body = self.request_body(&prompt, prompt_len, false);
        let url = format!("{}/api/generate", self.config.base_url());
        debug!(model = %self.config.model, prompt_len, timeout_seconds, "single-shot request");

        progress.report("Sending request to Ollama...");
        let started = Instant::now();
        let mut ticker = WaitTicker::new(started);
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        let deadline = tokio::time::sleep(Duration::from_secs(timeout_seconds));
        tokio::pin!(deadline);

        let request = async {
            let response = self
                .http
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| transport_error(&url, e))?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(InferenceError::Api { status, body });
            }
            let data: GenerateResponse = response.json().await?;
            data.response
                .map(|text| text.trim().to_string())
                .ok_or(InferenceError::InvalidResponse)
        };
        tokio::pin!(request);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(InferenceError::Cancelled),
                _ = &mut deadline => {
                    warn!(timeout_seconds, "single-shot request timed out");
                    return Err(InferenceError::Timeout { seconds: timeout_seconds });
                }
                _ = interval.tick() => {
                    if let Some(message) = ticker.tick(Instant::now()) {
                        progress.report(&message);
                    }
                }
                result = &mut request => {
                    progress.report("Processing response...");
                    return result;
                }
            }
        }
    }

    /// Streaming request: NDJSON fragments accumulated into the full
    /// response, with throttled token-progress updates. Unparseable fragments
    /// are skipped, matching how lenient the wire format is in practice.
    async fn query_streaming(
        &self,
        prompt: String,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> InferenceResult<String> {
        let prompt_len = prompt.chars().count();
        let timeout_seconds = streaming_timeout_seconds(prompt_len);
        let body = self.request_body(&prompt, prompt_len, true);
        let url = format!("{}/api/generate", self.config.base_url());
        debug!(model = %self.config.model, prompt_len, timeout_seconds, "streaming request");

        progress.report("Sending streaming request to Ollama...");
        let deadline = tokio::time::sleep(Duration::from_secs(timeout_seconds));
        tokio::pin!(deadline);

        let send = self.http.post(&url).json(&body).send();
        tokio::pin!(send);
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(InferenceError::Cancelled),
            _ = &mut deadline => return Err(InferenceError::Timeout { seconds: timeout_seconds }),
            sent = &mut send => sent.map_err(|e| transport_error(&url, e))?,
        };
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api { status, body });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut full = String::new();
        let mut throttle = StreamThrottle::new(Instant::now());

        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(InferenceError::Cancelled),
                _ = &mut deadline => {
                    warn!(timeout_seconds, "streaming request timed out");
                    return Err(InferenceError::Timeout { seconds: timeout_seconds });
                }
                chunk = stream.next() => chunk,
            };
            let Some(bytes) = chunk else { break };
            buffer.push_str(&String::from_utf8_lossy(&bytes?));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                if line.is_empty() {
                    continue;
                }
                let fragment: StreamFragment = match serde_json::from_str(&line) {
                    Ok(fragment) => fragment,
                    Err(err) => {
                        warn!(%err, "skipping unparseable stream fragment");
                        continue;
                    }
                };
                if let Some(delta) = fragment.response {
                    let tokens = delta.split_whitespace().count().max(1) as u64;
                    full.push_str(&delta);
                    if let Some(message) = throttle.record(tokens, Instant::now()) {
                        progress.report(&message);
                    }
                }
                if fragment.done {
                    debug!(tokens = throttle.token_count(), "streaming complete");
                    return Ok(full.trim().to_string());
                }
            }
        }

        absorb_trailing_fragment(&buffer, &mut full);
        Ok(full.trim().to_string())
    }

    fn request_body(&self, prompt: &str, prompt_len: usize, stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model,
            "prompt": prompt,
            "options": {
                "temperature": self.config.temperature,
                "num_ctx": context_window(prompt_len),
            },
            "stream": stream,
        })
    }

    /// Installed models from `GET /api/tags`.
    pub async fn list_models(&self) -> InferenceResult<Vec<String>> {
        let url = format!("{}/api/tags", self.config.base_url());
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::Api { status, body });
        }
        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl InferenceBackend for InferenceClient {
    /// Dispatch to single-shot or streaming mode. Oversized user messages
    /// force streaming even when it is configured off.
    async fn query(
        &self,
        messages: &MessagePair,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> InferenceResult<String> {
        let prompt = format_prompt(messages);
        let forced = messages.user.chars().count() > FORCED_STREAMING_THRESHOLD;
        if forced && !self.config.streaming {
            progress.report("Large input detected - using streaming mode...");
        }
        if self.config.streaming || forced {
            self.query_streaming(prompt, cancel, progress).await
        } else {
            self.query_single(prompt, cancel, progress).await
        }
    }
}

/// Flatten the message pair into the role-tagged prompt the backend expects.
pub fn format_prompt(messages: &MessagePair) -> String {
    format!(
        "System: {}\n\nHuman: {}\n\nAssistant:",
        messages.system, messages.user
    )
}

/// Context window tier by formatted prompt length.
pub fn context_window(prompt_len: usize) -> u32 {
    if prompt_len > 50_000 {
        16_384
    } else if prompt_len > 20_000 {
        8_192
    } else {
        4_096
    }
}

/// Single-shot timeout: one second per thousand chars, clamped to 120..=300.
pub fn single_shot_timeout_seconds(prompt_len: usize) -> u64 {
    (prompt_len.div_ceil(1000) as u64).clamp(120, 300)
}

/// Streaming timeout: one second per five hundred chars, clamped to 180..=600.
pub fn streaming_timeout_seconds(prompt_len: usize) -> u64 {
    (prompt_len.div_ceil(500) as u64).clamp(180, 600)
}

/// Fold a final partial NDJSON line into the accumulated response. Streams
/// can end without a trailing newline, leaving one fragment in the buffer.
fn absorb_trailing_fragment(buffer: &str, full: &mut String) {
    let line = buffer.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<StreamFragment>(line) {
        Ok(fragment) => {
            if let Some(delta) = fragment.response {
                full.push_str(&delta);
            }
        }
        Err(err) => warn!(%err, "skipping unparseable trailing fragment"),
    }
}

fn transport_error(url: &str, err: reqwest::Error) -> InferenceError {
    if err.is_connect() {
        InferenceError::Unreachable {
            url: url.to_string(),
            source: err,
        }
    } else {
        InferenceError::Transport(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_formatting_is_role_tagged() {
        let pair = MessagePair {
            system: "You are helpful.".to_string(),
            user: "Hi".to_string(),
        };
        assert_eq!(
            format_prompt(&pair),
            "System: You are helpful.\n\nHuman: Hi\n\nAssistant:"
        );
    }

    #[test]
    fn context_window_tiers() {
        assert_eq!(context_window(0), 4_096);
        assert_eq!(context_window(20_000), 4_096);
        assert_eq!(context_window(20_001), 8_192);
        assert_eq!(context_window(50_001), 16_384);
    }

    #[test]
    fn timeout_clamping() {
        assert_eq!(single_shot_timeout_seconds(1_000), 120);
        assert_eq!(single_shot_timeout_seconds(200_000), 200);
        assert_eq!(single_shot_timeout_seconds(1_000_000), 300);
        assert_eq!(streaming_timeout_seconds(1_000), 180);
        assert_eq!(streaming_timeout_seconds(150_000), 300);
        assert_eq!(streaming_timeout_seconds(1_000_000), 600);
    }

    #[test]
    fn trailing_fragment_without_newline_is_absorbed() {
        let mut full = "Hello".to_string();
        absorb_trailing_fragment(r#"{"response": " world", "done": true}"#, &mut full);
        assert_eq!(full, "Hello world");

        // Blank or unparseable remainders leave the response alone.
        absorb_trailing_fragment("  ", &mut full);
        absorb_trailing_fragment("{not json", &mut full);
        assert_eq!(full, "Hello world");
    }

    #[test]
    fn cancellation_is_distinguishable() {
        assert!(InferenceError::Cancelled.is_cancelled());
        assert!(!InferenceError::Timeout { seconds: 120 }.is_cancelled());
        let api = InferenceError::Api {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(api.to_string(), "Ollama API error: 500. boom");
    }
}
