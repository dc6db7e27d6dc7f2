use std::collections::BTreeMap;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use finagent_agent::runtime::AgentRuntime;
use finagent_core::domain::card::mask_card_identifier;
use finagent_core::domain::intent::{ActionDetails, IntentKind, Request};
use finagent_core::errors::{ApplicationError, InterfaceError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::health::{self, HealthState};

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub intent: IntentKind,
    pub correlation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CardOperationBody {
    pub operation: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardOperationResponse {
    pub success: bool,
    pub message: String,
    pub card_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

/// Full HTTP surface: health plus the chat and card-operation endpoints.
pub fn app(runtime: Arc<AgentRuntime>, health: HealthState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/cards/operation", post(card_operation))
        .with_state(ApiState { runtime })
        .merge(health::router(health))
}

pub async fn serve(
    bind_address: &str,
    port: u16,
    router: Router,
    drain_timeout: Duration,
) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(
        event_name = "system.server.listening",
        correlation_id = "bootstrap",
        bind_address = %address,
        "http server listening"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = stop_rx.await;
    });
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => return result,
        signal = tokio::signal::ctrl_c() => signal?,
    }

    info!(
        event_name = "system.server.draining",
        correlation_id = "shutdown",
        drain_timeout_secs = drain_timeout.as_secs(),
        "shutdown requested; draining in-flight requests"
    );
    let _ = stop_tx.send(());
    match tokio::time::timeout(drain_timeout, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                event_name = "system.server.drain_timeout",
                correlation_id = "shutdown",
                "in-flight requests did not finish before the drain deadline"
            );
            Ok(())
        }
    }
}

fn reject(error: ApplicationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    let interface = error.into_interface(correlation_id);
    let status = match interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

async fn chat(State(state): State<ApiState>, Json(body): Json<ChatBody>) -> ApiResult<ChatResponse> {
    let correlation_id = Uuid::new_v4().to_string();
    let query = body.query.trim();
    if query.is_empty() {
        return Err(reject(
            ApplicationError::InvalidInput("query must not be empty".to_string()),
            &correlation_id,
        ));
    }

    info!(event_name = "api.chat.received", correlation_id = %correlation_id, "chat request");
    let result =
        state.runtime.route_with_correlation(&Request::new(query), correlation_id.clone()).await;

    Ok(Json(ChatResponse {
        response: result.final_message,
        success: result.error_detail.is_none(),
        error: result.error_detail,
        intent: result.intent_kind,
        correlation_id,
    }))
}

async fn card_operation(
    State(state): State<ApiState>,
    Json(body): Json<CardOperationBody>,
) -> ApiResult<CardOperationResponse> {
    let correlation_id = Uuid::new_v4().to_string();
    let card_identifier = ["cardLastFour", "cardNumber"]
        .iter()
        .find_map(|key| body.payload.get(*key).and_then(scalar_to_string))
        .unwrap_or_default();
    let parameters: BTreeMap<String, String> = body
        .payload
        .iter()
        .filter(|(key, _)| key.as_str() != "cardLastFour" && key.as_str() != "cardNumber")
        .filter_map(|(key, value)| scalar_to_string(value).map(|value| (key.clone(), value)))
        .collect();

    let mut details = ActionDetails::new(body.operation.trim(), card_identifier.trim());
    details.parameters = parameters;

    info!(
        event_name = "api.card_operation.received",
        correlation_id = %correlation_id,
        operation = %details.action,
        card = %mask_card_identifier(&details.card_identifier),
        "card operation request"
    );
    let execution = state.runtime.card_executor().execute_detailed(Some(&details)).await;

    Ok(Json(CardOperationResponse {
        success: execution.outcome.succeeded(),
        message: execution.outcome.message().to_string(),
        card_number: mask_card_identifier(&details.card_identifier),
        data: execution.response.and_then(|response| response.data),
    }))
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}
