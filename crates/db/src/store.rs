use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crmdesk_core::domain::contact::{Contact, NewContact};
use crmdesk_core::domain::lead::{Lead, LeadPatch, NewLead};
use crmdesk_core::domain::task::{NewTask, Task, TaskPatch};
use crmdesk_core::domain::RecordId;
use crmdesk_core::update::ResolvedUpdate;

use crate::repositories::{
    ContactRepository, InMemoryContactRepository, InMemoryLeadRepository, InMemoryTaskRepository,
    LeadRepository, RepositoryError, SqlContactRepository, SqlLeadRepository, SqlTaskRepository,
    TaskRepository,
};
use crate::DbPool;

/// Handle over the three record collections.
///
/// The store is the only place identifiers and creation timestamps are issued. Clones share
/// the same repositories and the same timestamp sequence.
#[derive(Clone)]
pub struct RecordStore {
    contacts: Arc<dyn ContactRepository>,
    leads: Arc<dyn LeadRepository>,
    tasks: Arc<dyn TaskRepository>,
    last_stamp: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl RecordStore {
    pub fn new(
        contacts: Arc<dyn ContactRepository>,
        leads: Arc<dyn LeadRepository>,
        tasks: Arc<dyn TaskRepository>,
    ) -> Self {
        Self { contacts, leads, tasks, last_stamp: Arc::new(Mutex::new(None)) }
    }

    pub fn sql(pool: DbPool) -> Self {
        Self::new(
            Arc::new(SqlContactRepository::new(pool.clone())),
            Arc::new(SqlLeadRepository::new(pool.clone())),
            Arc::new(SqlTaskRepository::new(pool)),
        )
    }

    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryContactRepository::default()),
            Arc::new(InMemoryLeadRepository::default()),
            Arc::new(InMemoryTaskRepository::default()),
        )
    }

    pub async fn list_contacts(&self) -> Result<Vec<Contact>, RepositoryError> {
        self.contacts.list().await
    }

    pub async fn create_contact(&self, new: NewContact) -> Result<Contact, RepositoryError> {
        let contact = new.into_contact(next_id(), self.stamp());
        self.contacts.insert(contact.clone()).await?;
        info!(
            event_name = "store.contact.created",
            record_id = %contact.id,
            "contact created"
        );
        Ok(contact)
    }

    pub async fn list_leads(&self) -> Result<Vec<Lead>, RepositoryError> {
        self.leads.list().await
    }

    pub async fn create_lead(&self, new: NewLead) -> Result<Lead, RepositoryError> {
        let lead = new.into_lead(next_id(), self.stamp());
        self.leads.insert(lead.clone()).await?;
        info!(
            event_name = "store.lead.created",
            record_id = %lead.id,
            status = %lead.status,
            "lead created"
        );
        Ok(lead)
    }

    pub async fn update_lead(
        &self,
        update: ResolvedUpdate<LeadPatch>,
    ) -> Result<Lead, RepositoryError> {
        let lead = self.leads.update(&update).await?;
        info!(
            event_name = "store.lead.updated",
            record_id = %lead.id,
            status = %lead.status,
            "lead updated"
        );
        Ok(lead)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, RepositoryError> {
        self.tasks.list().await
    }

    pub async fn create_task(&self, new: NewTask) -> Result<Task, RepositoryError> {
        let task = new.into_task(next_id(), self.stamp());
        self.tasks.insert(task.clone()).await?;
        info!(
            event_name = "store.task.created",
            record_id = %task.id,
            status = %task.status,
            "task created"
        );
        Ok(task)
    }

    pub async fn update_task(
        &self,
        update: ResolvedUpdate<TaskPatch>,
    ) -> Result<Task, RepositoryError> {
        let task = self.tasks.update(&update).await?;
        info!(
            event_name = "store.task.updated",
            record_id = %task.id,
            status = %task.status,
            "task updated"
        );
        Ok(task)
    }

    /// Current time at stored precision, never earlier than the previous stamp.
    fn stamp(&self) -> DateTime<Utc> {
        let now = Utc::now().trunc_subsecs(6);
        let mut last = self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner);
        let issued = match *last {
            Some(previous) if previous > now => {
                debug!(event_name = "store.clock.held", "wall clock went backwards");
                previous
            }
            _ => now,
        };
        *last = Some(issued);
        issued
    }
}

fn next_id() -> RecordId {
    RecordId(Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crmdesk_core::domain::contact::NewContact;
    use crmdesk_core::domain::lead::{LeadPatch, LeadStatus, NewLead};
    use crmdesk_core::domain::RecordId;
    use crmdesk_core::update::ResolvedUpdate;

    use super::RecordStore;
    use crate::repositories::RepositoryError;

    fn new_contact(n: usize) -> NewContact {
        NewContact {
            name: format!("Contact {n}"),
            email: format!("c{n}@example.com"),
            phone: None,
            company: None,
        }
    }

    #[tokio::test]
    async fn creates_issue_unique_ids_and_non_decreasing_timestamps() {
        let store = RecordStore::in_memory();
        let mut created = Vec::new();
        for n in 0..25 {
            created.push(store.create_contact(new_contact(n)).await.expect("create"));
        }

        let ids: HashSet<_> = created.iter().map(|contact| contact.id.clone()).collect();
        assert_eq!(ids.len(), created.len());
        assert!(created.windows(2).all(|pair| pair[0].created_at <= pair[1].created_at));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = RecordStore::in_memory();
        let first = store.create_contact(new_contact(1)).await.expect("create");
        let second = store.create_contact(new_contact(2)).await.expect("create");

        let listed = store.list_contacts().await.expect("list");

        assert_eq!(listed, vec![second, first]);
    }

    #[tokio::test]
    async fn update_lead_keeps_identity() {
        let store = RecordStore::in_memory();
        let lead = store
            .create_lead(NewLead {
                name: "Ada".to_string(),
                email: "ada@x.com".to_string(),
                phone: None,
                company: None,
                status: LeadStatus::New,
                value: None,
                notes: None,
            })
            .await
            .expect("create");

        let updated = store
            .update_lead(ResolvedUpdate::new(
                lead.id.clone(),
                LeadPatch { status: Some(LeadStatus::Contacted), ..LeadPatch::default() },
            ))
            .await
            .expect("update");

        assert_eq!(updated.id, lead.id);
        assert_eq!(updated.created_at, lead.created_at);
        assert_eq!(updated.status, LeadStatus::Contacted);
    }

    #[tokio::test]
    async fn update_task_on_unknown_id_creates_nothing() {
        let store = RecordStore::in_memory();

        let error = store
            .update_task(ResolvedUpdate::new(RecordId::from("nope"), Default::default()))
            .await
            .expect_err("unknown task");

        assert!(matches!(error, RepositoryError::NotFound { .. }));
        assert!(store.list_tasks().await.expect("list").is_empty());
    }
}
