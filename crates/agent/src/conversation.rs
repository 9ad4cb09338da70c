use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const SYSTEM_PROMPT: &str = "You are a helpful CRM assistant. You can help users with:
- Viewing and managing contacts, leads, and tasks
- Creating new entries
- Updating existing data
- Answering questions about the CRM data

When users ask questions, use the provided functions to retrieve or modify data.
Be concise and helpful. If you create or update data, confirm the action was successful.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One caller-supplied history message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// An operation invocation requested by the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OperationCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The outcome of one operation invocation, as the model will read it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationResult {
    pub call_id: String,
    pub content: Value,
    pub is_error: bool,
}

impl OperationResult {
    pub fn success(call_id: impl Into<String>, content: Value) -> Self {
        Self { call_id: call_id.into(), content, is_error: false }
    }

    pub fn failure(call_id: impl Into<String>, content: Value) -> Self {
        Self { call_id: call_id.into(), content, is_error: true }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    User { text: String },
    Assistant { text: String, calls: Vec<OperationCall> },
    OperationResults(Vec<OperationResult>),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("conversation history must contain at least one message")]
    EmptyHistory,
    #[error("conversation history must contain a user message")]
    NoUserMessage,
}

/// The running conversation of one chat request.
#[derive(Clone, Debug)]
pub struct Conversation {
    system: String,
    entries: Vec<Entry>,
}

impl Conversation {
    pub fn from_history(history: Vec<ChatMessage>) -> Result<Self, ConversationError> {
        if history.is_empty() {
            return Err(ConversationError::EmptyHistory);
        }
        if !history.iter().any(|message| message.role == Role::User) {
            return Err(ConversationError::NoUserMessage);
        }

        let entries = history
            .into_iter()
            .map(|message| match message.role {
                Role::User => Entry::User { text: message.content },
                Role::Assistant => Entry::Assistant { text: message.content, calls: Vec::new() },
            })
            .collect();

        Ok(Self { system: SYSTEM_PROMPT.to_string(), entries })
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn push_assistant(&mut self, text: String, calls: Vec<OperationCall>) {
        self.entries.push(Entry::Assistant { text, calls });
    }

    pub fn push_results(&mut self, results: Vec<OperationResult>) {
        if !results.is_empty() {
            self.entries.push(Entry::OperationResults(results));
        }
    }
}
