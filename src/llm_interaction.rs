use axum::body::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use tracing::{debug, error, instrument};

use crate::error::NicError;
use crate::models::ChatMessage;

const SERVICE: &str = "chat completion";

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, NicError>> + Send>>;

// Structures matching the OpenAI-compatible /chat/completions endpoint
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Debug)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize, Debug)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    // Sent in place of a delta when the provider fails mid-stream
    #[serde(default)]
    error: Option<ChunkError>,
}

#[derive(Deserialize, Debug)]
struct ChunkError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Debug, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Client for a hosted chat-completion provider.
#[derive(Clone)]
pub struct CompletionClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl CompletionClient {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn send(
        &self,
        model: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, NicError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = CompletionRequest {
            model,
            messages,
            stream,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NicError::transport(SERVICE, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %error_body, "Chat completion request failed");
            return Err(NicError::status(SERVICE, status, &error_body));
        }
        Ok(response)
    }

    /// Requests a full reply and returns its text.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, NicError> {
        let response = self.send(model, messages, false).await?;
        let completion = response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| NicError::transport(SERVICE, e))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| NicError::invalid_response(SERVICE, "reply contained no choices"))?;

        debug!(response = ?content, "Received completion");
        Ok(content)
    }

    /// Requests a streamed reply and yields its token deltas as they arrive.
    #[instrument(skip(self, messages), fields(message_count = messages.len()))]
    pub async fn complete_stream(
        &self,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<TokenStream, NicError> {
        let response = self.send(model, messages, true).await?;
        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Incremental decoder for `data: {...}` server-sent event lines.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
    failure: Option<NicError>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `data: [DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Takes the error event the provider sent, if any. Nothing is decoded after one.
    pub fn take_failure(&mut self) -> Option<NicError> {
        self.failure.take()
    }

    /// Feeds raw bytes; returns the tokens of every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut tokens = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line, &mut tokens);
        }
        tokens
    }

    /// Flushes a trailing line that had no newline.
    pub fn finish(&mut self) -> Vec<String> {
        let mut tokens = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut tokens);
        }
        tokens
    }

    fn decode_line(&mut self, raw: &[u8], tokens: &mut Vec<String>) {
        if self.done || self.failure.is_some() {
            return;
        }
        let line = String::from_utf8_lossy(raw);
        let Some(data) = line.trim().strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == "[DONE]" {
            self.done = true;
            return;
        }
        match serde_json::from_str::<CompletionChunk>(data) {
            Ok(CompletionChunk {
                error: Some(failure),
                ..
            }) => {
                let message = failure
                    .message
                    .unwrap_or_else(|| "provider reported an error".to_string());
                error!(kind = ?failure.kind, %message, "Error event in completion stream");
                self.failure = Some(NicError::stream_failure(SERVICE, message));
            }
            Ok(chunk) => {
                if let Some(content) = chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
                    if !content.is_empty() {
                        tokens.push(content);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Failed to parse event line: {} - Error: {}", data, e);
            }
        }
    }
}

struct DecodeState<S> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    failure: Option<NicError>,
    finished: bool,
}

// Tokens decoded before a failure are still yielded; the failure comes last.
fn decode_event_stream<S>(bytes: S) -> TokenStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        failure: None,
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(token) = state.pending.pop_front() {
                return Some((Ok(token), state));
            }
            if let Some(failure) = state.failure.take() {
                return Some((Err(failure), state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => {
                    state.pending.extend(state.decoder.push(&chunk));
                    if let Some(failure) = state.decoder.take_failure() {
                        state.failure = Some(failure);
                        state.finished = true;
                    } else if state.decoder.is_done() {
                        state.finished = true;
                    }
                }
                Some(Err(e)) => {
                    error!("Stream error: {}", e);
                    state.finished = true;
                    return Some((Err(NicError::transport(SERVICE, e)), state));
                }
                None => {
                    state.pending.extend(state.decoder.finish());
                    state.failure = state.decoder.take_failure();
                    if state.failure.is_none() && !state.decoder.is_done() {
                        error!("Completion stream ended before [DONE]");
                        state.failure = Some(NicError::stream_failure(
                            SERVICE,
                            "stream ended before [DONE]",
                        ));
                    }
                    state.finished = true;
                }
            }
        }
    }))
}
