use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::debug;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    // Every connection to an in-memory database opens its own empty database.
    let in_memory = is_in_memory(database_url);
    let max_connections = if in_memory { 1 } else { max_connections.max(1) };
    debug!(
        event_name = "system.db.connect",
        max_connections,
        timeout_secs,
        "opening sqlite pool"
    );

    let mut options = SqlitePoolOptions::new().max_connections(max_connections);
    if in_memory {
        // Recycling the only connection would drop the database with it.
        options = options.idle_timeout(None).max_lifetime(None);
    }

    options
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}

/// Cheap readiness probe used by health checks.
pub async fn ping(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}
