use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteRow};
use sqlx::Row;
use thiserror::Error;

use crmdesk_core::domain::contact::Contact;
use crmdesk_core::domain::lead::{Lead, LeadPatch};
use crmdesk_core::domain::task::{Task, TaskPatch};
use crmdesk_core::domain::Collection;
use crmdesk_core::errors::{ApplicationError, DomainError};
use crmdesk_core::update::ResolvedUpdate;

pub mod contact;
pub mod lead;
pub mod memory;
pub mod task;

pub use contact::SqlContactRepository;
pub use lead::SqlLeadRepository;
pub use memory::{InMemoryContactRepository, InMemoryLeadRepository, InMemoryTaskRepository};
pub use task::SqlTaskRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("{collection} record `{id}` was not found")]
    NotFound { collection: Collection, id: String },
}

impl RepositoryError {
    /// True when the store itself could not be reached or read.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound { collection, id } => {
                ApplicationError::Domain(DomainError::NotFound { collection, id })
            }
            other => ApplicationError::Persistence(other.to_string()),
        }
    }
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    /// Newest first.
    async fn list(&self) -> Result<Vec<Contact>, RepositoryError>;
    async fn insert(&self, contact: Contact) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Newest first.
    async fn list(&self) -> Result<Vec<Lead>, RepositoryError>;
    async fn insert(&self, lead: Lead) -> Result<(), RepositoryError>;
    async fn update(&self, update: &ResolvedUpdate<LeadPatch>) -> Result<Lead, RepositoryError>;
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Newest first.
    async fn list(&self) -> Result<Vec<Task>, RepositoryError>;
    async fn insert(&self, task: Task) -> Result<(), RepositoryError>;
    async fn update(&self, update: &ResolvedUpdate<TaskPatch>) -> Result<Task, RepositoryError>;
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))
}

pub(crate) fn decode_created_at(
    raw: &str,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    crmdesk_core::domain::timestamp::parse(raw)
        .map_err(|e| RepositoryError::Decode(format!("created_at `{raw}`: {e}")))
}
