use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::debug;

use crmdesk_core::config::LlmConfig;

use crate::conversation::{Entry, OperationCall};
use crate::llm::{LlmClient, LlmError, ModelEvent, ModelRequest, ModelStream};
use crate::sse::{SseDecoder, SseFrame};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic Messages API client using streamed responses.
pub struct AnthropicClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .require_api_key()
            .map_err(|error| LlmError::Configuration(error.to_string()))?
            .clone();
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn request_body(&self, request: &ModelRequest) -> Value {
        let tools: Vec<Value> = request
            .operations
            .iter()
            .map(|spec| {
                json!({
                    "name": spec.name,
                    "description": spec.description,
                    "input_schema": spec.input_schema,
                })
            })
            .collect();

        json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "system": request.system,
            "stream": true,
            "tools": tools,
            "messages": encode_messages(&request.entries),
        })
    }
}

impl fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, LlmError> {
        let url = format!("{}/v1/messages", self.base_url);
        debug!(
            event_name = "agent.model.http_request",
            model = %self.model,
            entries = request.entries.len(),
            "sending streamed messages request"
        );

        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(&request))
            .send()
            .await
            .map_err(|error| LlmError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        Ok(decode_stream(response.bytes_stream()))
    }
}

fn status_error(status: StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());
    LlmError::Status { status: status.as_u16(), message }
}

/// Conversation entries in Messages API form. Operation results travel as user turns.
fn encode_messages(entries: &[Entry]) -> Vec<Value> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::User { text } => Some(json!({ "role": "user", "content": text })),
            Entry::Assistant { text, calls } => {
                let mut content = Vec::new();
                if !text.is_empty() {
                    content.push(json!({ "type": "text", "text": text }));
                }
                for call in calls {
                    let input = match &call.arguments {
                        Value::Object(_) => call.arguments.clone(),
                        _ => Value::Object(Map::new()),
                    };
                    content.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": call.name,
                        "input": input,
                    }));
                }
                (!content.is_empty()).then(|| json!({ "role": "assistant", "content": content }))
            }
            Entry::OperationResults(results) => {
                let content: Vec<Value> = results
                    .iter()
                    .map(|result| {
                        json!({
                            "type": "tool_result",
                            "tool_use_id": result.call_id,
                            "content": result.content.to_string(),
                            "is_error": result.is_error,
                        })
                    })
                    .collect();
                Some(json!({ "role": "user", "content": content }))
            }
        })
        .collect()
}

struct PendingCall {
    id: String,
    name: String,
    input_json: String,
}

/// Turns Messages API stream events into model events.
#[derive(Default)]
struct StreamAccumulator {
    calls: HashMap<u64, PendingCall>,
    stop_reason: Option<String>,
    finished: bool,
}

impl StreamAccumulator {
    fn handle(&mut self, frame: &SseFrame) -> Result<Vec<ModelEvent>, LlmError> {
        let data: Value = serde_json::from_str(&frame.data)
            .map_err(|error| LlmError::Protocol(format!("event data is not JSON: {error}")))?;
        let kind = data["type"].as_str().or(frame.event.as_deref()).unwrap_or_default();
        let index = data["index"].as_u64().unwrap_or_default();
        let mut events = Vec::new();

        match kind {
            "content_block_start" => {
                let block = &data["content_block"];
                match block["type"].as_str() {
                    Some("text") => push_text(&mut events, block["text"].as_str()),
                    Some("tool_use") => {
                        self.calls.insert(
                            index,
                            PendingCall {
                                id: block["id"].as_str().unwrap_or_default().to_string(),
                                name: block["name"].as_str().unwrap_or_default().to_string(),
                                input_json: String::new(),
                            },
                        );
                    }
                    _ => {}
                }
            }
            "content_block_delta" => {
                let delta = &data["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => push_text(&mut events, delta["text"].as_str()),
                    Some("input_json_delta") => {
                        let call = self.calls.get_mut(&index).ok_or_else(|| {
                            LlmError::Protocol(format!("input delta for unknown block {index}"))
                        })?;
                        let fragment = delta["partial_json"].as_str().unwrap_or_default();
                        call.input_json.push_str(fragment);
                    }
                    _ => {}
                }
            }
            "content_block_stop" => {
                if let Some(call) = self.calls.remove(&index) {
                    let arguments = if call.input_json.trim().is_empty() {
                        Value::Object(Map::new())
                    } else {
                        serde_json::from_str(&call.input_json).map_err(|error| {
                            LlmError::Protocol(format!("operation input is not JSON: {error}"))
                        })?
                    };
                    events.push(ModelEvent::OperationCall(OperationCall {
                        id: call.id,
                        name: call.name,
                        arguments,
                    }));
                }
            }
            "message_delta" => {
                if let Some(reason) = data["delta"]["stop_reason"].as_str() {
                    self.stop_reason = Some(reason.to_string());
                }
            }
            "message_stop" => {
                self.finished = true;
                events.push(ModelEvent::Finished { stop_reason: self.stop_reason.take() });
            }
            "error" => {
                return Err(LlmError::Provider {
                    kind: data["error"]["type"].as_str().unwrap_or("error").to_string(),
                    message: data["error"]["message"].as_str().unwrap_or_default().to_string(),
                });
            }
            _ => {}
        }

        Ok(events)
    }
}

fn push_text(events: &mut Vec<ModelEvent>, text: Option<&str>) {
    if let Some(text) = text.filter(|text| !text.is_empty()) {
        events.push(ModelEvent::TextDelta(text.to_string()));
    }
}

struct DecodeState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    accumulator: StreamAccumulator,
    pending: VecDeque<Result<ModelEvent, LlmError>>,
    done: bool,
}

impl<S> DecodeState<S> {
    fn absorb(&mut self, frames: Vec<SseFrame>) {
        for frame in frames {
            if self.done {
                return;
            }
            match self.accumulator.handle(&frame) {
                Ok(events) => {
                    self.pending.extend(events.into_iter().map(Ok));
                    self.done = self.accumulator.finished;
                }
                Err(error) => {
                    self.pending.push_back(Err(error));
                    self.done = true;
                }
            }
        }
    }
}

/// Decode a raw event-stream body into model events.
fn decode_stream<S, B, E>(body: S) -> ModelStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = DecodeState {
        body: Box::pin(body),
        decoder: SseDecoder::new(),
        accumulator: StreamAccumulator::default(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(chunk.as_ref());
                    state.absorb(frames);
                }
                Some(Err(error)) => {
                    state.pending.push_back(Err(LlmError::Transport(error.to_string())));
                    state.done = true;
                }
                None => {
                    let frames: Vec<SseFrame> = state.decoder.finish().into_iter().collect();
                    state.absorb(frames);
                    if !state.accumulator.finished {
                        state.pending.push_back(Err(LlmError::Protocol(
                            "stream ended before message_stop".to_string(),
                        )));
                    }
                    state.done = true;
                }
            }
        }
    }))
}
