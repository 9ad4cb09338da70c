use axum::Router;
use crmdesk_agent::AgentRuntime;
use crmdesk_db::{DbPool, RecordStore};

use crate::{chat, health, records};

/// Every route the server exposes. `store` should be the store behind `runtime`'s catalog.
pub fn router(db_pool: DbPool, store: RecordStore, runtime: AgentRuntime) -> Router {
    Router::new()
        .merge(health::router(db_pool))
        .merge(records::router(store))
        .merge(chat::router(runtime))
}
