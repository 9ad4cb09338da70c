use std::collections::HashSet;

use crmdesk_core::domain::lead::{LeadPatch, LeadStatus, NewLead};
use crmdesk_core::domain::task::{NewTask, TaskPriority, TaskStatus};
use crmdesk_core::domain::{filter_by_status, parse_validated, RecordId};
use crmdesk_core::update::{resolve_patch, ResolvedUpdate};
use crmdesk_db::migrations::run_pending;
use crmdesk_db::{connect_with_settings, RecordStore, RepositoryError};
use serde_json::json;

type TestResult<T = ()> = Result<T, String>;

async fn sql_store() -> TestResult<RecordStore> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .map_err(|err| format!("connect failed: {err}"))?;
    run_pending(&pool).await.map_err(|err| format!("migrations failed: {err}"))?;
    Ok(RecordStore::sql(pool))
}

fn new_lead(name: &str, status: LeadStatus) -> NewLead {
    NewLead {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        phone: None,
        company: None,
        status,
        value: None,
        notes: None,
    }
}

#[tokio::test]
async fn lead_lifecycle_create_then_qualify() -> TestResult {
    let store = sql_store().await?;

    let created = store
        .create_lead(
            parse_validated::<NewLead>(json!({ "name": "Ada", "email": "ada@x.com" }))
                .map_err(|err| err.to_string())?,
        )
        .await
        .map_err(|err| err.to_string())?;
    if created.status != LeadStatus::New || created.value.is_some() || created.notes.is_some() {
        return Err(format!("unexpected defaults on created lead: {created:?}"));
    }
    if created.id.as_str().is_empty() {
        return Err("created lead should carry an id".to_string());
    }

    let resolved = resolve_patch::<LeadPatch>(created.id.clone(), json!({ "status": "qualified" }))
        .map_err(|err| err.to_string())?;
    store.update_lead(resolved).await.map_err(|err| err.to_string())?;

    let leads = store.list_leads().await.map_err(|err| err.to_string())?;
    let [lead] = leads.as_slice() else {
        return Err(format!("expected exactly one lead, found {}", leads.len()));
    };
    if lead.status != LeadStatus::Qualified || lead.name != "Ada" || lead.email != "ada@x.com" {
        return Err(format!("update touched the wrong fields: {lead:?}"));
    }
    if lead.created_at != created.created_at {
        return Err("created_at must not change on update".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn update_ignores_id_and_created_at_in_body() -> TestResult {
    let store = sql_store().await?;
    let created = store
        .create_lead(new_lead("Grace", LeadStatus::New))
        .await
        .map_err(|err| err.to_string())?;

    let resolved = resolve_patch::<LeadPatch>(
        created.id.clone(),
        json!({
            "id": "hijacked",
            "created_at": "1999-01-01T00:00:00.000000Z",
            "notes": "met at conference"
        }),
    )
    .map_err(|err| err.to_string())?;
    let updated = store.update_lead(resolved).await.map_err(|err| err.to_string())?;

    if updated.id != created.id || updated.created_at != created.created_at {
        return Err(format!("identity changed: {updated:?}"));
    }
    if updated.notes.as_deref() != Some("met at conference") {
        return Err("notes should be set".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn update_on_unknown_id_fails_without_creating() -> TestResult {
    let store = sql_store().await?;

    let result = store
        .update_lead(
            resolve_patch::<LeadPatch>(RecordId::from("missing"), json!({ "status": "lost" }))
                .map_err(|err| err.to_string())?,
        )
        .await;

    match result {
        Err(RepositoryError::NotFound { .. }) => {}
        other => return Err(format!("expected NotFound, got {other:?}")),
    }
    let leads = store.list_leads().await.map_err(|err| err.to_string())?;
    if !leads.is_empty() {
        return Err("failed update must not create a lead".to_string());
    }
    Ok(())
}

#[tokio::test]
async fn status_filter_returns_matching_subset_newest_first() -> TestResult {
    let store = sql_store().await?;
    let statuses = [
        LeadStatus::New,
        LeadStatus::Qualified,
        LeadStatus::New,
        LeadStatus::Lost,
        LeadStatus::New,
    ];
    let mut created = Vec::new();
    for (index, status) in statuses.into_iter().enumerate() {
        let lead = store
            .create_lead(new_lead(&format!("Lead{index}"), status))
            .await
            .map_err(|err| err.to_string())?;
        created.push(lead);
    }

    let listed = store.list_leads().await.map_err(|err| err.to_string())?;
    let filtered = filter_by_status(listed, Some(LeadStatus::New));

    let expected: Vec<RecordId> = created
        .iter()
        .rev()
        .filter(|lead| lead.status == LeadStatus::New)
        .map(|lead| lead.id.clone())
        .collect();
    let actual: Vec<RecordId> = filtered.iter().map(|lead| lead.id.clone()).collect();
    if actual != expected {
        return Err(format!("expected {expected:?}, got {actual:?}"));
    }
    Ok(())
}

#[tokio::test]
async fn task_defaults_apply_when_omitted() -> TestResult {
    let store = sql_store().await?;

    let task = store
        .create_task(
            parse_validated::<NewTask>(json!({ "title": "Call Ada" }))
                .map_err(|err| err.to_string())?,
        )
        .await
        .map_err(|err| err.to_string())?;

    if task.status != TaskStatus::Todo || task.priority != TaskPriority::Medium {
        return Err(format!("unexpected task defaults: {task:?}"));
    }
    Ok(())
}

#[tokio::test]
async fn out_of_enum_status_is_rejected_before_the_store() -> TestResult {
    let store = sql_store().await?;
    let created = store
        .create_lead(new_lead("Ada", LeadStatus::New))
        .await
        .map_err(|err| err.to_string())?;

    if resolve_patch::<LeadPatch>(created.id.clone(), json!({ "status": "won" })).is_ok() {
        return Err("`won` must not resolve into a lead patch".to_string());
    }

    let leads = store.list_leads().await.map_err(|err| err.to_string())?;
    if leads.first().map(|lead| lead.status) != Some(LeadStatus::New) {
        return Err("stored status must be unchanged".to_string());
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_and_updates_on_a_shared_file_store() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| format!("tempdir failed: {err}"))?;
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("crmdesk.db").display());
    let pool =
        connect_with_settings(&url, 5, 30).await.map_err(|err| format!("connect failed: {err}"))?;
    run_pending(&pool).await.map_err(|err| format!("migrations failed: {err}"))?;
    let store = RecordStore::sql(pool.clone());

    let ada = store
        .create_lead(new_lead("Ada", LeadStatus::New))
        .await
        .map_err(|err| err.to_string())?;

    let mut handles = Vec::new();
    for index in 0..40 {
        let store = store.clone();
        let ada_id = ada.id.clone();
        handles.push(tokio::spawn(async move {
            if index % 2 == 0 {
                store.create_lead(new_lead(&format!("Lead{index}"), LeadStatus::New)).await?;
            } else {
                let notes = Some(format!("note {index}"));
                let patch = LeadPatch { notes, ..LeadPatch::default() };
                store.update_lead(ResolvedUpdate::new(ada_id, patch)).await?;
            }
            Ok::<(), RepositoryError>(())
        }));
    }

    let mut errors = Vec::new();
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => errors.push(err.to_string()),
            Err(err) => errors.push(format!("task panicked: {err}")),
        }
    }
    if !errors.is_empty() {
        return Err(format!("concurrent writes failed: {errors:?}"));
    }

    let leads = store.list_leads().await.map_err(|err| err.to_string())?;
    if leads.len() != 21 {
        return Err(format!("expected 21 leads, found {}", leads.len()));
    }
    let ids: HashSet<&RecordId> = leads.iter().map(|lead| &lead.id).collect();
    if ids.len() != leads.len() {
        return Err("lead ids must be unique".to_string());
    }

    let Some(updated) = leads.iter().find(|lead| lead.id == ada.id) else {
        return Err("updated lead disappeared".to_string());
    };
    if updated.name != ada.name
        || updated.email != ada.email
        || updated.status != ada.status
        || updated.value.is_some()
        || updated.created_at != ada.created_at
    {
        return Err(format!("update touched fields it did not carry: {updated:?}"));
    }
    if !updated.notes.as_deref().is_some_and(|notes| notes.starts_with("note ")) {
        return Err(format!("notes should hold one of the written values: {updated:?}"));
    }

    pool.close().await;
    Ok(())
}
