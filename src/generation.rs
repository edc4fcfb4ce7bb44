//! Generation client with model rotation.
//!
//! Both the blocking and streaming calls route through one dispatch loop that
//! walks an ordered list of candidate models: the first is preferred, the
//! rest are fallbacks. Each candidate gets one attempt with a per-attempt
//! timeout (shorter while other candidates remain, longer on the last one),
//! so the retry budget equals the number of candidates, never unbounded.
//!
//! Streaming delivers fragments over an mpsc channel in arrival order. The
//! channel closes without an error item on cancellation; a mid-stream
//! transport failure forwards one `Err` item before closing.

use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::RagError;

/// Per-attempt timeout while further candidates remain.
const EARLY_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(12);
/// Per-attempt timeout on the final candidate.
const FINAL_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(25);
/// Pause before rotating to the next candidate.
const DEFAULT_ROTATION_DELAY: Duration = Duration::from_secs(2);

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 2048;

/// Fragments of generated text, in arrival order.
pub type FragmentReceiver = mpsc::Receiver<Result<String, RagError>>;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamEvent {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    /// Some upstream models interleave a reasoning segment with content.
    reasoning: Option<String>,
}

/// Chat-completions client over OpenRouter with multi-model fallback.
///
/// Holds a reused transport handle and no per-request state, so one instance
/// serves concurrent requests.
#[derive(Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    models: Vec<String>,
    rotation_delay: Duration,
    early_timeout: Duration,
    final_timeout: Duration,
}

impl ChatClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
        models: Vec<String>,
    ) -> Result<Self, RagError> {
        if models.is_empty() {
            return Err(RagError::Configuration(
                "at least one generation model candidate is required".into(),
            ));
        }
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            models,
            rotation_delay: DEFAULT_ROTATION_DELAY,
            early_timeout: EARLY_ATTEMPT_TIMEOUT,
            final_timeout: FINAL_ATTEMPT_TIMEOUT,
        })
    }

    /// Overrides the pause between model rotations. Tests shrink it.
    #[must_use]
    pub fn with_rotation_delay(mut self, delay: Duration) -> Self {
        self.rotation_delay = delay;
        self
    }

    /// Overrides the per-attempt timeouts. Tests shrink them.
    #[must_use]
    pub fn with_attempt_timeouts(mut self, early: Duration, last: Duration) -> Self {
        self.early_timeout = early;
        self.final_timeout = last;
        self
    }

    /// Sends a prompt and returns the complete response text.
    pub async fn generate_blocking(
        &self,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, RagError> {
        let response = self.dispatch(system_prompt, user_message, false, None).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| RagError::Generation(format!("invalid completion response: {err}")))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_else(|| "No response generated.".to_string()))
    }

    /// Starts a streaming completion. Model rotation applies to establishing
    /// the stream; once fragments flow, a mid-stream failure terminates the
    /// stream with an error item rather than re-dialing another candidate.
    pub async fn generate_streaming(
        &self,
        system_prompt: &str,
        user_message: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentReceiver, RagError> {
        let response = self
            .dispatch(system_prompt, user_message, true, Some(&cancel))
            .await?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(forward_fragments(response, tx, cancel));
        Ok(rx)
    }

    /// Walks the candidate list, one attempt per model, rotating on any
    /// failure after a fixed pause. Propagates the last error once every
    /// candidate has been tried.
    async fn dispatch(
        &self,
        system_prompt: &str,
        user_message: &str,
        stream: bool,
        cancel: Option<&CancellationToken>,
    ) -> Result<reqwest::Response, RagError> {
        let mut last_error = String::new();

        for (attempt, model) in self.models.iter().enumerate() {
            let is_last = attempt + 1 == self.models.len();
            let attempt_timeout = if is_last {
                self.final_timeout
            } else {
                self.early_timeout
            };
            debug!(
                model,
                attempt = attempt + 1,
                timeout_ms = attempt_timeout.as_millis() as u64,
                stream,
                "sending generation request"
            );

            match self
                .try_model(model, system_prompt, user_message, stream, attempt_timeout, cancel)
                .await
            {
                Ok(response) => return Ok(response),
                Err(RagError::Cancelled) => return Err(RagError::Cancelled),
                Err(err) => {
                    warn!(model, error = %err, "generation attempt failed");
                    last_error = err.to_string();
                    if !is_last {
                        tokio::time::sleep(self.rotation_delay).await;
                    }
                }
            }
        }

        Err(RagError::Generation(format!(
            "all {} candidate models failed; last error: {last_error}",
            self.models.len()
        )))
    }

    async fn try_model(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
        stream: bool,
        attempt_timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<reqwest::Response, RagError> {
        let body = ChatRequest {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_message,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            stream,
        };

        let mut request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);
        if !stream {
            // For blocking calls the deadline covers the body read as well;
            // streaming bodies outlive the establishment timeout by design.
            request = request.timeout(attempt_timeout);
        }

        let attempt = async {
            let response = tokio::time::timeout(attempt_timeout, request.send())
                .await
                .map_err(|_| {
                    RagError::Generation(format!(
                        "model {model} timed out after {}s",
                        attempt_timeout.as_secs()
                    ))
                })?
                .map_err(|err| RagError::Generation(err.to_string()))?;
            response
                .error_for_status()
                .map_err(|err| RagError::Generation(err.to_string()))
        };

        match cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => Err(RagError::Cancelled),
                    result = attempt => result,
                }
            }
            None => attempt.await,
        }
    }
}

/// Reads the SSE body and forwards content fragments until the stream ends,
/// the caller cancels, or the transport fails.
async fn forward_fragments(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<String, RagError>>,
    cancel: CancellationToken,
) {
    let mut byte_stream = response.bytes_stream();
    let mut line_buffer = String::new();
    let mut fragments = 0usize;

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => {
                debug!(fragments, "stream cancelled by caller");
                return;
            }
            chunk = byte_stream.next() => chunk,
        };

        match next {
            None => break,
            Some(Err(err)) => {
                warn!(error = %err, "generation stream failed mid-flight");
                let _ = tx.send(Err(RagError::Generation(err.to_string()))).await;
                return;
            }
            Some(Ok(bytes)) => {
                line_buffer.push_str(&String::from_utf8_lossy(&bytes));
                while let Some(newline) = line_buffer.find('\n') {
                    let line = line_buffer[..newline].trim().to_string();
                    line_buffer.drain(..=newline);
                    match process_sse_line(&line) {
                        SseLine::Fragment(fragment) => {
                            fragments += 1;
                            if tx.send(Ok(fragment)).await.is_err() {
                                // Receiver dropped; nothing left to deliver.
                                return;
                            }
                        }
                        SseLine::Done => {
                            debug!(fragments, "generation stream complete");
                            return;
                        }
                        SseLine::Skip => {}
                    }
                }
            }
        }
    }

    // Flush a final unterminated data line, then close normally.
    if let SseLine::Fragment(fragment) = process_sse_line(line_buffer.trim()) {
        let _ = tx.send(Ok(fragment)).await;
    }
    debug!(fragments, "generation stream closed by upstream");
}

enum SseLine {
    Fragment(String),
    Done,
    Skip,
}

fn process_sse_line(line: &str) -> SseLine {
    let Some(data) = line.strip_prefix("data:").map(str::trim_start) else {
        return SseLine::Skip;
    };
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => {
            let delta = event
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.delta)
                .unwrap_or_default();
            // Reasoning text surfaces inline, ahead of the content it led to.
            let mut fragment = delta.reasoning.unwrap_or_default();
            fragment.push_str(delta.content.as_deref().unwrap_or_default());
            if fragment.is_empty() {
                SseLine::Skip
            } else {
                SseLine::Fragment(fragment)
            }
        }
        Err(err) => {
            warn!(error = %err, "unparseable SSE data line; skipping");
            SseLine::Skip
        }
    }
}
