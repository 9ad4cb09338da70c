use std::collections::BTreeSet;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crmdesk_core::config::AgentConfig;
use crmdesk_core::domain::Collection;
use crmdesk_db::RepositoryError;

use crate::catalog::{OperationCatalog, OperationError};
use crate::conversation::{
    ChatMessage, Conversation, ConversationError, OperationCall, OperationResult,
};
use crate::llm::{LlmClient, LlmError, ModelEvent, ModelRequest};

const REFRESH_CAPACITY: usize = 32;
const FAILED_MESSAGE: &str = "The assistant could not complete the request.";

/// Progress of one chat request, in the order the caller should render it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    TextDelta { text: String },
    OperationStarted { call_id: String, name: String },
    OperationFinished { call_id: String, name: String, ok: bool, summary: String },
    Completed { rounds: u32, records_changed: u32 },
    Failed { message: String },
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Published after a chat request completes so record views can reload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RefreshNotice {
    pub correlation_id: String,
    pub collections: Vec<Collection>,
    pub records_changed: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub max_rounds: u32,
    pub event_buffer: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { max_rounds: crmdesk_core::config::DEFAULT_MAX_ROUNDS, event_buffer: 64 }
    }
}

impl From<&AgentConfig> for RuntimeSettings {
    fn from(config: &AgentConfig) -> Self {
        Self { max_rounds: config.max_rounds.max(1), event_buffer: config.event_buffer.max(1) }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Conversation(#[from] ConversationError),
    #[error(transparent)]
    Model(#[from] LlmError),
    #[error("record store unavailable: {0}")]
    Store(RepositoryError),
    #[error("caller disconnected")]
    Cancelled,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: u32,
    pub records_changed: u32,
    pub collections: BTreeSet<Collection>,
}

/// Drives chat requests: model round-trips, operation execution and event streaming.
#[derive(Clone)]
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    catalog: OperationCatalog,
    settings: RuntimeSettings,
    refresh: broadcast::Sender<RefreshNotice>,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: OperationCatalog,
        settings: RuntimeSettings,
    ) -> Self {
        let (refresh, _) = broadcast::channel(REFRESH_CAPACITY);
        Self { llm, catalog, settings, refresh }
    }

    pub fn catalog(&self) -> &OperationCatalog {
        &self.catalog
    }

    pub fn settings(&self) -> RuntimeSettings {
        self.settings
    }

    pub fn subscribe_refresh(&self) -> broadcast::Receiver<RefreshNotice> {
        self.refresh.subscribe()
    }

    /// Validate the history and run the request on its own task.
    ///
    /// The returned receiver yields events until a terminal `completed` or `failed`. Dropping
    /// it cancels the run at the next yield point; an operation already started finishes.
    pub fn start(
        &self,
        history: Vec<ChatMessage>,
    ) -> Result<mpsc::Receiver<AgentEvent>, AgentError> {
        let conversation = Conversation::from_history(history)?;
        let (sender, receiver) = mpsc::channel(self.settings.event_buffer);
        let correlation_id = Uuid::new_v4().to_string();

        let runtime = self.clone();
        tokio::spawn(async move { runtime.drive(conversation, sender, correlation_id).await });

        Ok(receiver)
    }

    async fn drive(
        self,
        conversation: Conversation,
        sender: mpsc::Sender<AgentEvent>,
        correlation_id: String,
    ) {
        match self.run(conversation, &sender, &correlation_id).await {
            Ok(summary) => {
                let notice = RefreshNotice {
                    correlation_id: correlation_id.clone(),
                    collections: summary.collections.iter().copied().collect(),
                    records_changed: summary.records_changed,
                };
                // No subscribers is fine.
                let _ = self.refresh.send(notice);

                info!(
                    event_name = "agent.run.completed",
                    correlation_id = %correlation_id,
                    rounds = summary.rounds,
                    records_changed = summary.records_changed,
                    "chat request completed"
                );
                let _ = sender
                    .send(AgentEvent::Completed {
                        rounds: summary.rounds,
                        records_changed: summary.records_changed,
                    })
                    .await;
            }
            Err(AgentError::Cancelled) => {
                info!(
                    event_name = "agent.run.cancelled",
                    correlation_id = %correlation_id,
                    "caller disconnected, run stopped"
                );
            }
            Err(err) => {
                error!(
                    event_name = "agent.run.failed",
                    correlation_id = %correlation_id,
                    error = %err,
                    "chat request failed"
                );
                let failed = AgentEvent::Failed { message: FAILED_MESSAGE.to_string() };
                let _ = sender.send(failed).await;
            }
        }
    }

    /// Run one request to completion, forwarding events into `sink`.
    pub async fn run(
        &self,
        mut conversation: Conversation,
        sink: &mpsc::Sender<AgentEvent>,
        correlation_id: &str,
    ) -> Result<RunSummary, AgentError> {
        let mut summary = RunSummary::default();

        loop {
            if sink.is_closed() {
                return Err(AgentError::Cancelled);
            }
            let request = ModelRequest {
                system: conversation.system().to_string(),
                entries: conversation.entries().to_vec(),
                operations: self.catalog.specs(),
            };
            info!(
                event_name = "agent.model.requested",
                correlation_id = %correlation_id,
                round = summary.rounds + 1,
                entries = request.entries.len(),
                "awaiting model"
            );

            let mut stream = self.llm.stream(request).await?;
            let mut text = String::new();
            let mut calls: Vec<OperationCall> = Vec::new();
            while let Some(event) = stream.next().await {
                match event? {
                    ModelEvent::TextDelta(delta) => {
                        text.push_str(&delta);
                        emit(sink, AgentEvent::TextDelta { text: delta }).await?;
                    }
                    ModelEvent::OperationCall(call) => calls.push(call),
                    ModelEvent::Finished { .. } => break,
                }
            }

            conversation.push_assistant(text, calls.clone());
            if calls.is_empty() {
                break;
            }

            let results = self.execute_calls(calls, sink, correlation_id, &mut summary).await?;
            conversation.push_results(results);
            summary.rounds += 1;

            if summary.rounds >= self.settings.max_rounds {
                warn!(
                    event_name = "agent.run.round_limit",
                    correlation_id = %correlation_id,
                    rounds = summary.rounds,
                    "round limit reached, finalizing"
                );
                break;
            }
        }

        Ok(summary)
    }

    async fn execute_calls(
        &self,
        calls: Vec<OperationCall>,
        sink: &mpsc::Sender<AgentEvent>,
        correlation_id: &str,
        summary: &mut RunSummary,
    ) -> Result<Vec<OperationResult>, AgentError> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            if sink.is_closed() {
                return Err(AgentError::Cancelled);
            }
            emit(
                sink,
                AgentEvent::OperationStarted { call_id: call.id.clone(), name: call.name.clone() },
            )
            .await?;

            let (result, finished) = match self.catalog.invoke(&call.name, call.arguments).await {
                Ok(outcome) => {
                    if outcome.mutated() {
                        summary.records_changed += 1;
                        summary.collections.insert(outcome.kind.collection());
                    }
                    info!(
                        event_name = "agent.operation.executed",
                        correlation_id = %correlation_id,
                        operation = %call.name,
                        call_id = %call.id,
                        "{}",
                        outcome.summary
                    );
                    let finished = AgentEvent::OperationFinished {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        ok: true,
                        summary: outcome.summary,
                    };
                    (OperationResult::success(call.id, outcome.payload), finished)
                }
                Err(OperationError::Store(error)) => return Err(AgentError::Store(error)),
                Err(error) => {
                    info!(
                        event_name = "agent.operation.failed",
                        correlation_id = %correlation_id,
                        operation = %call.name,
                        call_id = %call.id,
                        kind = error.kind(),
                        error = %error,
                        "operation failed, reporting to model"
                    );
                    let finished = AgentEvent::OperationFinished {
                        call_id: call.id.clone(),
                        name: call.name.clone(),
                        ok: false,
                        summary: error.to_string(),
                    };
                    (OperationResult::failure(call.id, error.payload()), finished)
                }
            };

            results.push(result);
            emit(sink, finished).await?;
        }

        Ok(results)
    }
}

async fn emit(sink: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> Result<(), AgentError> {
    sink.send(event).await.map_err(|_| AgentError::Cancelled)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;
    use tokio::sync::mpsc;

    use crmdesk_core::domain::lead::NewLead;
    use crmdesk_core::domain::parse_validated;
    use crmdesk_db::RecordStore;

    use super::{AgentEvent, AgentRuntime, RuntimeSettings};
    use crate::catalog::OperationCatalog;
    use crate::conversation::ChatMessage;
    use crate::llm::{LlmError, ModelEvent, ScriptedLlm};

    fn runtime(llm: Arc<ScriptedLlm>, max_rounds: u32) -> AgentRuntime {
        AgentRuntime::new(
            llm,
            OperationCatalog::new(RecordStore::in_memory()),
            RuntimeSettings { max_rounds, event_buffer: 64 },
        )
    }

    async fn collect(mut receiver: mpsc::Receiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = receiver.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn text_only_reply_completes_in_zero_rounds() {
        let llm = Arc::new(ScriptedLlm::new(vec![ScriptedLlm::text_turn("Hello!")]));
        let runtime = runtime(llm.clone(), 3);

        let events =
            collect(runtime.start(vec![ChatMessage::user("hi")]).expect("start")).await;

        assert_eq!(
            events,
            vec![
                AgentEvent::TextDelta { text: "Hello!".to_string() },
                AgentEvent::Completed { rounds: 0, records_changed: 0 },
            ]
        );
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn model_that_always_calls_an_operation_is_capped_at_max_rounds() {
        let llm = Arc::new(ScriptedLlm::repeating(ScriptedLlm::call_turn(
            "call",
            "list_leads",
            json!({}),
        )));
        let runtime = runtime(llm.clone(), 3);

        let events =
            collect(runtime.start(vec![ChatMessage::user("loop")]).expect("start")).await;

        let executed = events
            .iter()
            .filter(|event| matches!(event, AgentEvent::OperationFinished { .. }))
            .count();
        assert_eq!(executed, 3);
        assert_eq!(llm.calls(), 3);
        assert_eq!(events.last(), Some(&AgentEvent::Completed { rounds: 3, records_changed: 0 }));
    }

    #[tokio::test]
    async fn create_then_confirm_publishes_refresh() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::call_turn(
                "call-1",
                "create_lead",
                json!({ "name": "Ada", "email": "ada@x.com" }),
            ),
            ScriptedLlm::text_turn("Created Ada."),
        ]));
        let runtime = runtime(llm.clone(), 3);
        let mut refresh = runtime.subscribe_refresh();

        let events = collect(
            runtime.start(vec![ChatMessage::user("Add lead Ada ada@x.com")]).expect("start"),
        )
        .await;

        assert!(events.contains(&AgentEvent::OperationFinished {
            call_id: "call-1".to_string(),
            name: "create_lead".to_string(),
            ok: true,
            summary: "Created lead: Ada".to_string(),
        }));
        assert_eq!(events.last(), Some(&AgentEvent::Completed { rounds: 1, records_changed: 1 }));

        let notice = refresh.recv().await.expect("refresh notice");
        assert_eq!(notice.records_changed, 1);

        let second_request = &llm.requests()[1];
        assert_eq!(second_request.entries.len(), 3);
        let leads = runtime.catalog().store().list_leads().await.expect("list");
        assert_eq!(leads.len(), 1);
    }

    #[tokio::test]
    async fn invalid_arguments_are_reported_back_and_the_run_continues() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::call_turn("call-1", "update_lead", json!({ "id": "x", "status": "won" })),
            ScriptedLlm::text_turn("That status is not valid."),
        ]));
        let runtime = runtime(llm.clone(), 3);

        let events =
            collect(runtime.start(vec![ChatMessage::user("mark x as won")]).expect("start")).await;

        assert!(events.iter().any(|event| matches!(
            event,
            AgentEvent::OperationFinished { ok: false, .. }
        )));
        assert_eq!(events.last(), Some(&AgentEvent::Completed { rounds: 1, records_changed: 0 }));
    }

    #[tokio::test]
    async fn model_failure_ends_with_generic_failed_event() {
        let llm = Arc::new(ScriptedLlm::new(vec![vec![
            Ok(ModelEvent::TextDelta("Let me".to_string())),
            Err(LlmError::Transport("connection reset".to_string())),
        ]]));
        let runtime = runtime(llm, 3);

        let events = collect(runtime.start(vec![ChatMessage::user("hi")]).expect("start")).await;

        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[1],
            AgentEvent::Failed { message } if !message.contains("connection reset")
        ));
    }

    #[tokio::test]
    async fn empty_history_is_rejected_before_spawning() {
        let llm = Arc::new(ScriptedLlm::new(Vec::new()));
        let runtime = runtime(llm.clone(), 3);

        assert!(runtime.start(Vec::new()).is_err());
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let value = serde_json::to_value(AgentEvent::OperationFinished {
            call_id: "c".to_string(),
            name: "list_leads".to_string(),
            ok: true,
            summary: "Found 0 leads".to_string(),
        })
        .expect("serialize");

        assert_eq!(value["type"], "operation_finished");
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn dropped_receiver_stops_the_run_after_the_started_operation() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::call_turn(
                "call-1",
                "create_lead",
                json!({ "name": "Ada", "email": "ada@x.com" }),
            ),
            ScriptedLlm::text_turn("Created Ada."),
        ]));
        // One slot: the run parks on the finish event until the caller reads `started`.
        let runtime = AgentRuntime::new(
            llm.clone(),
            OperationCatalog::new(RecordStore::in_memory()),
            RuntimeSettings { max_rounds: 3, event_buffer: 1 },
        );
        let mut refresh = runtime.subscribe_refresh();

        let mut receiver = runtime.start(vec![ChatMessage::user("add Ada")]).expect("start");
        let first = receiver.recv().await.expect("first event");
        assert!(matches!(
            first,
            AgentEvent::OperationStarted { ref name, .. } if name == "create_lead"
        ));
        drop(receiver);

        tokio::time::sleep(Duration::from_millis(50)).await;

        let leads = runtime.catalog().store().list_leads().await.expect("list");
        assert_eq!(leads.len(), 1);
        assert_eq!(llm.calls(), 1);
        assert!(refresh.try_recv().is_err());
    }

    #[tokio::test]
    async fn update_without_fields_does_not_count_as_a_change() {
        let store = RecordStore::in_memory();
        let lead = store
            .create_lead(
                parse_validated::<NewLead>(json!({ "name": "Ada", "email": "ada@x.com" }))
                    .expect("valid lead"),
            )
            .await
            .expect("create");
        let llm = Arc::new(ScriptedLlm::new(vec![
            ScriptedLlm::call_turn("call-1", "update_lead", json!({ "id": lead.id.as_str() })),
            ScriptedLlm::text_turn("Nothing to change."),
        ]));
        let runtime =
            AgentRuntime::new(llm, OperationCatalog::new(store), RuntimeSettings::default());
        let mut refresh = runtime.subscribe_refresh();

        let events =
            collect(runtime.start(vec![ChatMessage::user("touch Ada")]).expect("start")).await;

        assert_eq!(events.last(), Some(&AgentEvent::Completed { rounds: 1, records_changed: 0 }));
        let notice = refresh.recv().await.expect("refresh notice");
        assert_eq!(notice.records_changed, 0);
        assert!(notice.collections.is_empty());
    }
}
