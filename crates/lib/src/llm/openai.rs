//! OpenAI-compatible chat completions client (any provider exposing
//! `/chat/completions` and `/models`, e.g. DashScope compatible mode).
//!
//! Streaming responses are server-sent events: one `data:` line per chunk,
//! terminated by `data: [DONE]`. The body is decoded lazily as the caller
//! pulls fragments; dropping the stream drops the HTTP body.

use crate::llm::{ConversationMessage, FragmentStream, LlmBackend, LlmError};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DONE_MARKER: &str = "[DONE]";

/// Client for an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// GET /models: ids of the models the provider advertises.
    pub async fn list_models(&self) -> Result<Vec<String>, LlmError> {
        let url = format!("{}/models", self.base_url);
        let res = self.authorized(self.client.get(&url)).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let data: ModelsResponse = res.json().await?;
        Ok(data
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .collect())
    }

    /// POST /chat/completions with stream: true. Returns once response headers arrive;
    /// fragments are decoded as the returned stream is polled.
    pub async fn chat_stream(
        &self,
        model: &str,
        messages: &[ConversationMessage],
    ) -> Result<FragmentStream, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatCompletionRequest {
            model,
            messages,
            stream: true,
        };
        let res = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("{} {}", status, body)));
        }
        let body = res
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(LlmError::Request))
            .boxed();
        Ok(fragment_stream(body))
    }
}

#[async_trait]
impl LlmBackend for OpenAiClient {
    async fn stream_complete(
        &self,
        model: &str,
        messages: &[ConversationMessage],
    ) -> Result<FragmentStream, LlmError> {
        self.chat_stream(model, messages).await
    }
}

/// Incremental SSE line decoder: feeds raw body chunks, returns the payload of each
/// complete `data:` line. Other fields (event:, id:, comments) are ignored.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(i) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=i).collect();
            if let Some(data) = data_payload(&line) {
                out.push(data);
            }
        }
        out
    }

    /// Payload of a trailing line that never got its newline.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        data_payload(&rest)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data).to_string())
}

struct FragmentState {
    body: BoxStream<'static, Result<Vec<u8>, LlmError>>,
    decoder: SseDecoder,
    queued: VecDeque<Result<String, LlmError>>,
    done: bool,
}

impl FragmentState {
    fn push_payload(&mut self, payload: &str) {
        if self.done {
            return;
        }
        let payload = payload.trim();
        if payload.is_empty() {
            return;
        }
        if payload == DONE_MARKER {
            self.done = true;
            return;
        }
        let chunk: StreamChunk = match serde_json::from_str(payload) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("skipping unparseable stream event: {}", e);
                return;
            }
        };
        if let Some(err) = chunk.error {
            self.queued.push_back(Err(LlmError::Api(err.message)));
            self.done = true;
            return;
        }
        for choice in chunk.choices.unwrap_or_default() {
            if let Some(content) = choice.delta.and_then(|d| d.content) {
                if !content.is_empty() {
                    self.queued.push_back(Ok(content));
                }
            }
        }
    }
}

/// Turn a raw SSE body into content fragments. Ends on `[DONE]`, on body EOF, or after
/// yielding the first error.
pub(crate) fn fragment_stream(body: BoxStream<'static, Result<Vec<u8>, LlmError>>) -> FragmentStream {
    let state = FragmentState {
        body,
        decoder: SseDecoder::default(),
        queued: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queued.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for payload in state.decoder.feed(&chunk) {
                        state.push_payload(&payload);
                    }
                }
                Some(Err(e)) => {
                    state.queued.push_back(Err(e));
                    state.done = true;
                }
                None => {
                    if let Some(payload) = state.decoder.finish() {
                        state.push_payload(&payload);
                    }
                    state.done = true;
                }
            }
        }
    })
    .boxed()
}

// --- wire types ---

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Option<Vec<ModelObject>>,
}

#[derive(Debug, Deserialize)]
struct ModelObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Option<Vec<StreamChoice>>,
    #[serde(default)]
    error: Option<StreamErrorBody>,
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

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    #[serde(default)]
    message: String,
}
