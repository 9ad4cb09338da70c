use std::str::FromStr;

use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Sqlite};

use crmdesk_core::domain::lead::{Lead, LeadPatch, LeadStatus};
use crmdesk_core::domain::{timestamp, Collection, RecordId};
use crmdesk_core::update::{PartialUpdate, ResolvedUpdate};

use super::{column, decode_created_at, LeadRepository, RepositoryError};
use crate::DbPool;

const LEAD_COLUMNS: &str = "id, name, email, phone, company, status, value, notes, created_at";

pub struct SqlLeadRepository {
    pool: DbPool,
}

impl SqlLeadRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_lead(row: &sqlx::sqlite::SqliteRow) -> Result<Lead, RepositoryError> {
    let status_str: String = column(row, "status")?;
    let value_str: Option<String> = column(row, "value")?;
    let created_at_str: String = column(row, "created_at")?;

    let status = LeadStatus::from_str(&status_str)
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let value = value_str
        .map(|raw| {
            Decimal::from_str(&raw)
                .map_err(|e| RepositoryError::Decode(format!("lead value `{raw}`: {e}")))
        })
        .transpose()?;

    Ok(Lead {
        id: RecordId(column(row, "id")?),
        name: column(row, "name")?,
        email: column(row, "email")?,
        phone: column(row, "phone")?,
        company: column(row, "company")?,
        status,
        value,
        notes: column(row, "notes")?,
        created_at: decode_created_at(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl LeadRepository for SqlLeadRepository {
    async fn list(&self) -> Result<Vec<Lead>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads ORDER BY created_at DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_lead).collect()
    }

    async fn insert(&self, lead: Lead) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO leads (id, name, email, phone, company, status, value, notes, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(lead.id.as_str())
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.phone)
        .bind(&lead.company)
        .bind(lead.status.as_str())
        .bind(lead.value.map(|value| value.to_string()))
        .bind(&lead.notes)
        .bind(timestamp::format(&lead.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, update: &ResolvedUpdate<LeadPatch>) -> Result<Lead, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let assignments = update.patch.assignments();
        if !assignments.is_empty() {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE leads SET ");
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

        let row = sqlx::query(&format!("SELECT {LEAD_COLUMNS} FROM leads WHERE id = ?"))
            .bind(update.id.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(RepositoryError::NotFound {
                collection: Collection::Leads,
                id: update.id.to_string(),
            });
        };
        let lead = row_to_lead(&row)?;
        tx.commit().await?;

        Ok(lead)
    }
}
