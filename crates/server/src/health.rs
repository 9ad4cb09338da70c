//! `GET /health`: the record store answers and every collection table is migrated.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use crmdesk_core::domain::Collection;
use crmdesk_db::{connection::ping, DbPool};
use serde::Serialize;
use tracing::warn;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreReadiness {
    pub status: Readiness,
    pub detail: String,
    /// Collections whose table is absent. Empty once migrations have run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_collections: Vec<Collection>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub record_store: StoreReadiness,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let record_store = record_store_readiness(&state.db_pool).await;
    if record_store.status == Readiness::Degraded {
        warn!(
            event_name = "server.health.degraded",
            detail = %record_store.detail,
            "record store not ready"
        );
    }

    let report = HealthReport {
        status: record_store.status,
        record_store,
        checked_at: Utc::now().to_rfc3339(),
    };
    let status_code = match report.status {
        Readiness::Ready => StatusCode::OK,
        Readiness::Degraded => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(report))
}

async fn record_store_readiness(pool: &DbPool) -> StoreReadiness {
    if let Err(error) = ping(pool).await {
        return StoreReadiness {
            status: Readiness::Degraded,
            detail: format!("record store unreachable: {error}"),
            missing_collections: Vec::new(),
        };
    }

    let tables = sqlx::query_scalar::<_, String>(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name IN ('contacts', 'leads', 'tasks')",
    )
    .fetch_all(pool)
    .await;
    let tables = match tables {
        Ok(tables) => tables,
        Err(error) => {
            return StoreReadiness {
                status: Readiness::Degraded,
                detail: format!("schema lookup failed: {error}"),
                missing_collections: Vec::new(),
            }
        }
    };

    let missing: Vec<Collection> = Collection::ALL
        .into_iter()
        .filter(|collection| !tables.iter().any(|table| table == collection.as_str()))
        .collect();
    if missing.is_empty() {
        StoreReadiness {
            status: Readiness::Ready,
            detail: "record store reachable and migrated".to_string(),
            missing_collections: missing,
        }
    } else {
        StoreReadiness {
            status: Readiness::Degraded,
            detail: "record store is missing migrations; run `crmdesk migrate`".to_string(),
            missing_collections: missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{extract::State, http::StatusCode, Json};
    use crmdesk_core::domain::Collection;
    use crmdesk_db::{connect_with_settings, migrations, DbPool};

    use super::{health, HealthState, Readiness};

    async fn pool() -> DbPool {
        connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect")
    }

    #[tokio::test]
    async fn migrated_store_is_ready() {
        let pool = pool().await;
        migrations::run_pending(&pool).await.expect("migrate");

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(report.status, Readiness::Ready);
        assert!(report.record_store.missing_collections.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn unmigrated_store_reports_every_missing_collection() {
        let pool = pool().await;

        let (status, Json(report)) = health(State(HealthState { db_pool: pool.clone() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(report.status, Readiness::Degraded);
        assert_eq!(report.record_store.missing_collections, Collection::ALL.to_vec());

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_pool_is_unreachable() {
        let pool = pool().await;
        pool.close().await;

        let (status, Json(report)) = health(State(HealthState { db_pool: pool })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(report.record_store.detail.starts_with("record store unreachable"));
    }
}
