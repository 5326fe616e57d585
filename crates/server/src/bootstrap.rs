use std::sync::Arc;

use axum::{middleware, Router};
use huddle_agent::llm::{build_client, LlmClient};
use huddle_agent::pipeline::AnalysisPipeline;
use huddle_core::config::{AppConfig, ConfigError};
use huddle_db::{connect_with_config, migrations, DbPool, MessageRepository, SqlMessageRepository};
use thiserror::Error;
use tracing::info;

use crate::api::{self, AppState};
use crate::dashboard;
use crate::health::{self, HealthState};
use crate::request_id::request_id_middleware;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub store: Arc<dyn MessageRepository>,
    pub llm: Arc<dyn LlmClient>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        llm_provider = config.llm.provider.as_str(),
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
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

    let store: Arc<dyn MessageRepository> = Arc::new(SqlMessageRepository::new(db_pool.clone()));
    let llm = build_client(&config.llm);

    Ok(Application { config, db_pool, store, llm })
}

impl Application {
    pub fn router(&self) -> Router {
        let pipeline = AnalysisPipeline::new(
            self.store.clone(),
            self.llm.clone(),
            self.config.analysis.window_size,
        );
        let state =
            AppState::new(self.store.clone(), pipeline, self.config.analysis.messages_limit);
        let health_state = HealthState::new(
            self.db_pool.clone(),
            self.llm.provider_name(),
            self.config.llm.model.clone(),
        );

        Router::new()
            .merge(api::router(state.clone()))
            .merge(dashboard::router(state))
            .merge(health::router(health_state))
            .layer(middleware::from_fn(request_id_middleware))
    }
}
