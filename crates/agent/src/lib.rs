//! Agent runtime: lets a language model read and change CRM records through a fixed catalog
//! of validated operations.
//!
//! - `catalog` - the operations, their argument schemas and their executors
//! - `conversation` - history, assistant turns and operation results
//! - `llm` - the streaming model contract plus a scripted client for tests
//! - `anthropic` / `sse` - the Anthropic Messages API client
//! - `runtime` - the round-limited loop that streams events to the caller
//!
//! The model never touches the store directly. Every call it emits is parsed into a typed
//! operation first; a call that fails to parse is reported back to the model and never
//! reaches the store.

pub mod anthropic;
pub mod catalog;
pub mod conversation;
pub mod llm;
pub mod runtime;
pub mod sse;

pub use anthropic::AnthropicClient;
pub use catalog::{Operation, OperationCatalog, OperationError, OperationKind, OperationOutcome};
pub use conversation::{ChatMessage, Conversation, ConversationError, Role};
pub use llm::{LlmClient, LlmError, ModelEvent, ModelRequest, ScriptedLlm};
pub use runtime::{AgentError, AgentEvent, AgentRuntime, RefreshNotice, RuntimeSettings};
