use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use futures_util::stream::{self, Stream};
use serde_json::Value;
use thiserror::Error;

use crate::conversation::{Entry, OperationCall};

/// An operation as advertised to the model.
#[derive(Clone, Debug, PartialEq)]
pub struct OperationSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

/// One model round-trip: the fixed directive, the conversation so far, and the catalog.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub system: String,
    pub entries: Vec<Entry>,
    pub operations: Vec<OperationSpec>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    OperationCall(OperationCall),
    Finished { stop_reason: Option<String> },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("model client is not configured: {0}")]
    Configuration(String),
    #[error("model transport failed: {0}")]
    Transport(String),
    #[error("model returned status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model provider error `{kind}`: {message}")]
    Provider { kind: String, message: String },
    #[error("malformed model stream: {0}")]
    Protocol(String),
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelEvent, LlmError>> + Send>>;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Start one model round-trip. Events arrive in emission order.
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, LlmError>;
}

pub type ScriptedTurn = Vec<Result<ModelEvent, LlmError>>;

/// Replays canned model turns, one per `stream` call. Used by tests and offline runs.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    repeat: Option<ScriptedTurn>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedLlm {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self { turns: Mutex::new(turns.into()), ..Self::default() }
    }

    /// Answers every call with the same turn.
    pub fn repeating(turn: ScriptedTurn) -> Self {
        Self { repeat: Some(turn), ..Self::default() }
    }

    /// A turn that streams `text` and finishes.
    pub fn text_turn(text: &str) -> ScriptedTurn {
        vec![
            Ok(ModelEvent::TextDelta(text.to_string())),
            Ok(ModelEvent::Finished { stop_reason: Some("end_turn".to_string()) }),
        ]
    }

    /// A turn that requests a single operation.
    pub fn call_turn(id: &str, name: &str, arguments: Value) -> ScriptedTurn {
        vec![
            Ok(ModelEvent::OperationCall(OperationCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            })),
            Ok(ModelEvent::Finished { stop_reason: Some("tool_use".to_string()) }),
        ]
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, LlmError> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request);

        let next = self.turns.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        let turn = match (next, &self.repeat) {
            (Some(turn), _) => turn,
            (None, Some(turn)) => turn.clone(),
            (None, None) => {
                return Err(LlmError::Transport("scripted model has no turns left".to_string()))
            }
        };

        Ok(Box::pin(stream::iter(turn)))
    }
}
