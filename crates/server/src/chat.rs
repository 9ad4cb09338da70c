//! Chat and refresh streams.
//!
//! `POST /api/chat` answers with `text/event-stream`, one `AgentEvent` per SSE `data` line,
//! ending with `completed` or `failed`. A request whose model call fails before anything was
//! streamed gets a plain 500 instead. `GET /api/refresh` streams a notice after every completed
//! chat request so record views can reload.

use std::convert::Infallible;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use crmdesk_agent::{AgentEvent, AgentRuntime, ChatMessage, RefreshNotice};
use futures_util::{future, stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::{BroadcastStream, ReceiverStream};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ChatState {
    runtime: AgentRuntime,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

pub fn router(runtime: AgentRuntime) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/refresh", get(refresh))
        .with_state(ChatState { runtime })
}

pub async fn chat(State(state): State<ChatState>, Json(request): Json<ChatRequest>) -> Response {
    let message_count = request.messages.len();
    let mut events = match state.runtime.start(request.messages) {
        Ok(events) => events,
        Err(error) => {
            warn!(
                event_name = "server.chat.rejected",
                message_count,
                error = %error,
                "chat request rejected"
            );
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": error.to_string() })))
                .into_response();
        }
    };

    let first = match events.recv().await {
        Some(AgentEvent::Failed { .. }) | None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Internal Server Error" })),
            )
                .into_response();
        }
        Some(event) => event,
    };
    info!(event_name = "server.chat.streaming", message_count, "chat stream opened");

    let events = stream::once(future::ready(first))
        .chain(ReceiverStream::new(events))
        .map(|event| Ok::<_, Infallible>(sse_event(&event)));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

pub async fn refresh(
    State(state): State<ChatState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let notices = BroadcastStream::new(state.runtime.subscribe_refresh()).filter_map(|notice| {
        future::ready(match notice {
            Ok(notice) => Some(Ok(sse_event(&RefreshFrame::from(notice)))),
            Err(error) => {
                warn!(
                    event_name = "server.refresh.lagged",
                    error = %error,
                    "refresh subscriber fell behind"
                );
                None
            }
        })
    });
    Sse::new(notices).keep_alive(KeepAlive::default())
}

#[derive(Debug, Serialize)]
struct RefreshFrame {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    notice: RefreshNotice,
}

impl From<RefreshNotice> for RefreshFrame {
    fn from(notice: RefreshNotice) -> Self {
        Self { kind: "refresh", notice }
    }
}

fn sse_event<T: Serialize>(payload: &T) -> Event {
    Event::default().json_data(payload).unwrap_or_else(|error| {
        warn!(event_name = "server.sse.encode_failed", error = %error, "dropping sse payload");
        Event::default().comment("unencodable event")
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{body::to_bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
    use crmdesk_agent::{
        AgentRuntime, ChatMessage, OperationCatalog, RuntimeSettings, ScriptedLlm,
    };
    use crmdesk_db::RecordStore;
    use futures_util::StreamExt;
    use serde_json::{json, Value};

    use super::{chat, refresh, ChatRequest, ChatState};

    fn state(llm: ScriptedLlm) -> (ChatState, RecordStore) {
        let store = RecordStore::in_memory();
        let runtime = AgentRuntime::new(
            Arc::new(llm),
            OperationCatalog::new(store.clone()),
            RuntimeSettings::default(),
        );
        (ChatState { runtime }, store)
    }

    fn data_lines(body: &str) -> Vec<Value> {
        body.lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).expect("event json"))
            .collect()
    }

    #[tokio::test]
    async fn chat_streams_text_then_completed() {
        let (state, _) = state(ScriptedLlm::new(vec![ScriptedLlm::text_turn("Hello there")]));

        let response = chat(
            State(state),
            Json(ChatRequest { messages: vec![ChatMessage::user("hi")] }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let events = data_lines(&String::from_utf8_lossy(&body));

        assert_eq!(events[0], json!({ "type": "text_delta", "text": "Hello there" }));
        assert_eq!(events.last().expect("terminal")["type"], "completed");
    }

    #[tokio::test]
    async fn chat_with_empty_history_is_a_bad_request() {
        let (state, _) = state(ScriptedLlm::default());

        let response = chat(State(state), Json(ChatRequest { messages: Vec::new() })).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn model_failure_before_output_is_a_generic_500() {
        let (state, _) = state(ScriptedLlm::default());

        let response = chat(
            State(state),
            Json(ChatRequest { messages: vec![ChatMessage::user("hi")] }),
        )
        .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(body, json!({ "error": "Internal Server Error" }));
    }

    #[tokio::test]
    async fn completed_chat_publishes_a_refresh_notice() {
        let (state, store) = state(ScriptedLlm::new(vec![
            ScriptedLlm::call_turn(
                "call-1",
                "create_contact",
                json!({ "name": "Ada Lovelace", "email": "ada@example.com" }),
            ),
            ScriptedLlm::text_turn("Created Ada."),
        ]));

        let subscription = refresh(State(state.clone())).await.into_response();
        let mut frames = subscription.into_body().into_data_stream();

        let response = chat(
            State(state),
            Json(ChatRequest { messages: vec![ChatMessage::user("add Ada")] }),
        )
        .await;
        to_bytes(response.into_body(), usize::MAX).await.expect("drain chat");

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("refresh frame in time")
            .expect("stream open")
            .expect("frame bytes");
        let events = data_lines(&String::from_utf8_lossy(&frame));

        assert_eq!(events[0]["type"], "refresh");
        assert_eq!(events[0]["records_changed"], 1);
        assert_eq!(events[0]["collections"], json!(["contacts"]));
        assert_eq!(store.list_contacts().await.expect("list").len(), 1);
    }
}
