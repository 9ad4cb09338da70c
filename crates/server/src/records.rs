//! Collection endpoints over the record store.
//!
//! - `GET  /api/contacts`, `POST /api/contacts`
//! - `GET  /api/leads[?status=]`, `POST /api/leads`, `PUT /api/leads/{id}`
//! - `GET  /api/tasks[?status=]`, `POST /api/tasks`, `PUT /api/tasks/{id}`
//!
//! Bodies go through the same validating parse the agent catalog uses. Update bodies are
//! resolved with `resolve_patch`, so `id` and `created_at` in a body are ignored.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use crmdesk_core::domain::{filter_by_status, parse_validated, RecordId};
use crmdesk_core::errors::{ApplicationError, InterfaceError};
use crmdesk_core::update::resolve_patch;
use crmdesk_core::{
    Contact, Lead, LeadPatch, LeadStatus, NewContact, NewLead, NewTask, Task, TaskPatch, TaskStatus,
};
use crmdesk_db::RecordStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct RecordsState {
    store: RecordStore,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

pub fn router(store: RecordStore) -> Router {
    Router::new()
        .route("/api/contacts", get(list_contacts).post(create_contact))
        .route("/api/leads", get(list_leads).post(create_lead))
        .route("/api/leads/{id}", put(update_lead))
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/{id}", put(update_task))
        .with_state(RecordsState { store })
}

pub async fn list_contacts(
    State(state): State<RecordsState>,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let contacts = state.store.list_contacts().await.map_err(|e| reject("list_contacts", e))?;
    Ok(Json(contacts))
}

pub async fn create_contact(
    State(state): State<RecordsState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let new = parse_validated::<NewContact>(body).map_err(|e| reject("create_contact", e))?;
    let contact = state.store.create_contact(new).await.map_err(|e| reject("create_contact", e))?;

    info!(
        event_name = "server.records.contact_created",
        record_id = %contact.id,
        "contact created via api"
    );
    Ok((StatusCode::CREATED, Json(contact)))
}

pub async fn list_leads(
    State(state): State<RecordsState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<Lead>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<LeadStatus>)
        .transpose()
        .map_err(|e| reject("list_leads", e))?;
    let leads = state.store.list_leads().await.map_err(|e| reject("list_leads", e))?;
    Ok(Json(filter_by_status(leads, status)))
}

pub async fn create_lead(
    State(state): State<RecordsState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Lead>), ApiError> {
    let new = parse_validated::<NewLead>(body).map_err(|e| reject("create_lead", e))?;
    let lead = state.store.create_lead(new).await.map_err(|e| reject("create_lead", e))?;

    info!(event_name = "server.records.lead_created", record_id = %lead.id, "lead created via api");
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn update_lead(
    State(state): State<RecordsState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Lead>, ApiError> {
    let update = resolve_patch::<LeadPatch>(RecordId(id), body)
        .map_err(|e| reject("update_lead", e))?;
    let lead = state.store.update_lead(update).await.map_err(|e| reject("update_lead", e))?;

    info!(event_name = "server.records.lead_updated", record_id = %lead.id, "lead updated via api");
    Ok(Json(lead))
}

pub async fn list_tasks(
    State(state): State<RecordsState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(|e| reject("list_tasks", e))?;
    let tasks = state.store.list_tasks().await.map_err(|e| reject("list_tasks", e))?;
    Ok(Json(filter_by_status(tasks, status)))
}

pub async fn create_task(
    State(state): State<RecordsState>,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let new = parse_validated::<NewTask>(body).map_err(|e| reject("create_task", e))?;
    let task = state.store.create_task(new).await.map_err(|e| reject("create_task", e))?;

    info!(event_name = "server.records.task_created", record_id = %task.id, "task created via api");
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<RecordsState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Task>, ApiError> {
    let update = resolve_patch::<TaskPatch>(RecordId(id), body)
        .map_err(|e| reject("update_task", e))?;
    let task = state.store.update_task(update).await.map_err(|e| reject("update_task", e))?;

    info!(event_name = "server.records.task_updated", record_id = %task.id, "task updated via api");
    Ok(Json(task))
}

/// Map any layer's failure onto a status code and a caller-safe body.
fn reject(operation: &'static str, error: impl Into<ApplicationError>) -> ApiError {
    let correlation_id = Uuid::new_v4().to_string();
    let interface = error.into().into_interface(correlation_id.clone());

    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(
            event_name = "server.records.failed",
            correlation_id = %correlation_id,
            operation,
            error = %interface,
            "record request failed"
        );
    } else {
        warn!(
            event_name = "server.records.rejected",
            correlation_id = %correlation_id,
            operation,
            error = %interface,
            "record request rejected"
        );
    }

    (status, Json(ErrorBody { error: interface.public_message(), correlation_id }))
}
