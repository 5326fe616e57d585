use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use huddle_db::{DbPool, SqlMessageRepository};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    llm_provider: &'static str,
    llm_model: String,
}

impl HealthState {
    pub fn new(db_pool: DbPool, llm_provider: &'static str, llm_model: impl Into<String>) -> Self {
        Self { db_pool, llm_provider, llm_model: llm_model.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    /// Configuration only; the generative-text service is never called here.
    pub llm: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "huddle-server runtime initialized".to_string(),
        },
        database,
        llm: HealthCheck {
            status: "configured",
            detail: format!("provider {} with model {}", state.llm_provider, state.llm_model),
        },
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match SqlMessageRepository::new(pool.clone()).count().await {
        Ok(count) => {
            HealthCheck { status: "ready", detail: format!("message store reachable ({count} messages)") }
        }
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("message store query failed: {error}") }
        }
    }
}
