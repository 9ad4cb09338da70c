use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crmdesk_core::domain::contact::Contact;
use crmdesk_core::domain::lead::{Lead, LeadPatch};
use crmdesk_core::domain::task::{Task, TaskPatch};
use crmdesk_core::domain::{Collection, RecordId};
use crmdesk_core::update::{PartialUpdate, ResolvedUpdate};

use super::{ContactRepository, LeadRepository, RepositoryError, TaskRepository};

/// Records in insertion order. Listing reproduces `ORDER BY created_at DESC, rowid DESC`.
fn newest_first<T: Clone>(records: &[T], created_at: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut listed: Vec<T> = records.iter().rev().cloned().collect();
    listed.sort_by(|left, right| created_at(right).cmp(&created_at(left)));
    listed
}

fn ensure_unique<T>(
    records: &[T],
    id: &RecordId,
    record_id: impl Fn(&T) -> &RecordId,
) -> Result<(), RepositoryError> {
    if records.iter().any(|record| record_id(record) == id) {
        return Err(RepositoryError::Decode(format!("duplicate record id `{id}`")));
    }
    Ok(())
}

#[derive(Default)]
pub struct InMemoryContactRepository {
    contacts: RwLock<Vec<Contact>>,
}

#[async_trait::async_trait]
impl ContactRepository for InMemoryContactRepository {
    async fn list(&self) -> Result<Vec<Contact>, RepositoryError> {
        let contacts = self.contacts.read().await;
        Ok(newest_first(&contacts, |contact| contact.created_at))
    }

    async fn insert(&self, contact: Contact) -> Result<(), RepositoryError> {
        let mut contacts = self.contacts.write().await;
        ensure_unique(&contacts, &contact.id, |existing| &existing.id)?;
        contacts.push(contact);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryLeadRepository {
    leads: RwLock<Vec<Lead>>,
}

#[async_trait::async_trait]
impl LeadRepository for InMemoryLeadRepository {
    async fn list(&self) -> Result<Vec<Lead>, RepositoryError> {
        let leads = self.leads.read().await;
        Ok(newest_first(&leads, |lead| lead.created_at))
    }

    async fn insert(&self, lead: Lead) -> Result<(), RepositoryError> {
        let mut leads = self.leads.write().await;
        ensure_unique(&leads, &lead.id, |existing| &existing.id)?;
        leads.push(lead);
        Ok(())
    }

    async fn update(&self, update: &ResolvedUpdate<LeadPatch>) -> Result<Lead, RepositoryError> {
        let mut leads = self.leads.write().await;
        let lead = leads.iter_mut().find(|lead| lead.id == update.id).ok_or_else(|| {
            RepositoryError::NotFound { collection: Collection::Leads, id: update.id.to_string() }
        })?;
        update.patch.apply_to(lead);
        Ok(lead.clone())
    }
}

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<Vec<Task>>,
}

#[async_trait::async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn list(&self) -> Result<Vec<Task>, RepositoryError> {
        let tasks = self.tasks.read().await;
        Ok(newest_first(&tasks, |task| task.created_at))
    }

    async fn insert(&self, task: Task) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.write().await;
        ensure_unique(&tasks, &task.id, |existing| &existing.id)?;
        tasks.push(task);
        Ok(())
    }

    async fn update(&self, update: &ResolvedUpdate<TaskPatch>) -> Result<Task, RepositoryError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.iter_mut().find(|task| task.id == update.id).ok_or_else(|| {
            RepositoryError::NotFound { collection: Collection::Tasks, id: update.id.to_string() }
        })?;
        update.patch.apply_to(task);
        Ok(task.clone())
    }
}
