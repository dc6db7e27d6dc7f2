use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    knowledge_mode: &'static str,
    card_api: String,
}

impl HealthState {
    pub fn new(knowledge_mode: &'static str, card_api: impl Into<String>) -> Self {
        Self { knowledge_mode, card_api: card_api.into() }
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
    pub knowledge: HealthCheck,
    pub card_api: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// Liveness only: collaborators are reported as configured, not contacted.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "healthy",
        service: HealthCheck {
            status: "ready",
            detail: "finagent-server runtime initialized".to_string(),
        },
        knowledge: HealthCheck {
            status: "configured",
            detail: format!("retriever mode: {}", state.knowledge_mode),
        },
        card_api: HealthCheck { status: "configured", detail: state.card_api.clone() },
        checked_at: Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(payload))
}
