use std::sync::Arc;

use crmdesk_agent::{
    AgentRuntime, AnthropicClient, LlmClient, LlmError, OperationCatalog, RuntimeSettings,
};
use crmdesk_core::config::{AppConfig, ConfigError};
use crmdesk_db::{connect_with_settings, migrations, DbPool, RecordStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: RecordStore,
    pub agent_runtime: AgentRuntime,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("model client setup failed: {0}")]
    Llm(#[source] LlmError),
}

/// Connect, migrate and wire the agent runtime against the Anthropic client.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let llm = AnthropicClient::from_config(&config.llm).map_err(BootstrapError::Llm)?;
    bootstrap_with_llm(config, Arc::new(llm)).await
}

pub async fn bootstrap_with_llm(
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let store = RecordStore::sql(db_pool.clone());
    let settings = RuntimeSettings::from(&config.agent);
    let agent_runtime = AgentRuntime::new(llm, OperationCatalog::new(store.clone()), settings);
    info!(
        event_name = "system.bootstrap.agent_ready",
        correlation_id = "bootstrap",
        model = %config.llm.model,
        max_rounds = settings.max_rounds,
        "agent runtime initialized"
    );

    Ok(Application { config, db_pool, store, agent_runtime })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crmdesk_agent::ScriptedLlm;
    use crmdesk_core::config::{AppConfig, ConfigOverrides, LoadOptions};

    use crate::bootstrap::{bootstrap_with_config, bootstrap_with_llm, Application, BootstrapError};

    async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
        bootstrap_with_config(AppConfig::load(options)?).await
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_with_blank_api_key() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_api_key: Some("   ".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        let error = result.err().expect("blank key should be rejected");
        assert!(matches!(error, BootstrapError::Llm(_)));
        assert!(error.to_string().contains("llm.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_with_key_migrates_and_exposes_record_tables() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                llm_api_key: Some("sk-test".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with an api key");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('contacts', 'leads', 'tasks')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("count tables");
        assert_eq!(table_count, 3);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn runtime_and_store_share_the_same_records() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.agent.max_rounds = 2;

        let app = bootstrap_with_llm(config, Arc::new(ScriptedLlm::default()))
            .await
            .expect("bootstrap with scripted model");

        app.store
            .create_contact(crmdesk_core::NewContact {
                name: "Grace Hopper".to_string(),
                email: "grace@navy.mil".to_string(),
                phone: None,
                company: None,
            })
            .await
            .expect("create contact");

        let listed = app.agent_runtime.catalog().store().list_contacts().await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(app.agent_runtime.settings().max_rounds, 2);
    }
}
