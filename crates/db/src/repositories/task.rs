use std::str::FromStr;

use chrono::NaiveDate;
use sqlx::{QueryBuilder, Sqlite};

use crmdesk_core::domain::task::{Task, TaskPatch, TaskPriority, TaskStatus, DUE_DATE_FORMAT};
use crmdesk_core::domain::{timestamp, Collection, RecordId};
use crmdesk_core::update::{PartialUpdate, ResolvedUpdate};

use super::{column, decode_created_at, RepositoryError, TaskRepository};
use crate::DbPool;

const TASK_COLUMNS: &str =
    "id, title, description, status, priority, due_date, contact_id, lead_id, created_at";

pub struct SqlTaskRepository {
    pool: DbPool,
}

impl SqlTaskRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<Task, RepositoryError> {
    let status_str: String = column(row, "status")?;
    let priority_str: String = column(row, "priority")?;
    let due_date_str: Option<String> = column(row, "due_date")?;
    let contact_id: Option<String> = column(row, "contact_id")?;
    let lead_id: Option<String> = column(row, "lead_id")?;
    let created_at_str: String = column(row, "created_at")?;

    let status = TaskStatus::from_str(&status_str)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let priority = TaskPriority::from_str(&priority_str)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let due_date = due_date_str
        .map(|raw| {
            NaiveDate::parse_from_str(&raw, DUE_DATE_FORMAT)
                .map_err(|e| RepositoryError::Decode(format!("due_date `{raw}`: {e}")))
        })
        .transpose()?;

    Ok(Task {
        id: RecordId(column(row, "id")?),
        title: column(row, "title")?,
        description: column(row, "description")?,
        status,
        priority,
        due_date,
        contact_id: contact_id.map(RecordId),
        lead_id: lead_id.map(RecordId),
        created_at: decode_created_at(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl TaskRepository for SqlTaskRepository {
    async fn list(&self) -> Result<Vec<Task>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_task).collect()
    }

    async fn insert(&self, task: Task) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO tasks (id, title, description, status, priority, due_date,
                                contact_id, lead_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(task.id.as_str())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.due_date.map(|date| date.format(DUE_DATE_FORMAT).to_string()))
        .bind(task.contact_id.as_ref().map(|id| id.as_str()))
        .bind(task.lead_id.as_ref().map(|id| id.as_str()))
        .bind(timestamp::format(&task.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, update: &ResolvedUpdate<TaskPatch>) -> Result<Task, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let assignments = update.patch.assignments();
        if !assignments.is_empty() {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE tasks SET ");
            let mut separated = builder.separated(", ");
            for assignment in &assignments {
                separated.push(assignment.column());
                separated.push_unseparated(" = ");
                separated.push_bind_unseparated(assignment.value.clone());
            }
            builder.push(" WHERE id = ");
            builder.push_bind(update.id.as_str());
            builder.build().execute(&mut *tx).await?;
        }

        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
            .bind(update.id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(RepositoryError::NotFound {
                collection: Collection::Tasks,
                id: update.id.to_string(),
            });
        };
        let task = row_to_task(&row)?;
        tx.commit().await?;

        Ok(task)
    }
}
