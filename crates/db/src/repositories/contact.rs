use crmdesk_core::domain::contact::Contact;
use crmdesk_core::domain::{timestamp, RecordId};

use super::{column, decode_created_at, ContactRepository, RepositoryError};
use crate::DbPool;

pub struct SqlContactRepository {
    pool: DbPool,
}

impl SqlContactRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_contact(row: &sqlx::sqlite::SqliteRow) -> Result<Contact, RepositoryError> {
    let created_at_str: String = column(row, "created_at")?;

    Ok(Contact {
        id: RecordId(column(row, "id")?),
        name: column(row, "name")?,
        email: column(row, "email")?,
        phone: column(row, "phone")?,
        company: column(row, "company")?,
        created_at: decode_created_at(&created_at_str)?,
    })
}

#[async_trait::async_trait]
impl ContactRepository for SqlContactRepository {
    async fn list(&self) -> Result<Vec<Contact>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, email, phone, company, created_at
             FROM contacts ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_contact).collect()
    }

    async fn insert(&self, contact: Contact) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO contacts (id, name, email, phone, company, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(contact.id.as_str())
        .bind(&contact.name)
        .bind(&contact.email)
        .bind(&contact.phone)
        .bind(&contact.company)
        .bind(timestamp::format(&contact.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, SubsecRound, Utc};

    use crmdesk_core::domain::contact::Contact;
    use crmdesk_core::domain::RecordId;

    use super::SqlContactRepository;
    use crate::migrations::run_pending;
    use crate::repositories::ContactRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        pool
    }

    fn contact(id: &str, name: &str, offset_secs: i64) -> Contact {
        Contact {
            id: RecordId::from(id),
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
            company: Some("Analytical Engines".to_string()),
            created_at: Utc::now().trunc_subsecs(6) + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn list_returns_newest_first() {
        let repo = SqlContactRepository::new(setup().await);
        let older = contact("c-1", "Ada", 0);
        let newer = contact("c-2", "Grace", 5);

        repo.insert(older.clone()).await.expect("insert older");
        repo.insert(newer.clone()).await.expect("insert newer");

        let listed = repo.list().await.expect("list");
        assert_eq!(listed, vec![newer, older]);
    }

    #[tokio::test]
    async fn equal_timestamps_fall_back_to_insertion_order() {
        let repo = SqlContactRepository::new(setup().await);
        let first = contact("c-1", "Ada", 0);
        let mut second = contact("c-2", "Grace", 0);
        second.created_at = first.created_at;

        repo.insert(first.clone()).await.expect("insert first");
        repo.insert(second.clone()).await.expect("insert second");

        let ids: Vec<String> =
            repo.list().await.expect("list").into_iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec!["c-2".to_string(), "c-1".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let repo = SqlContactRepository::new(setup().await);
        let record = contact("c-1", "Ada", 0);

        repo.insert(record.clone()).await.expect("insert");
        assert!(repo.insert(record).await.is_err());
    }
}
