//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::health::HealthSnapshot;
use crate::hasher::{HashInput, HashOutput};
use crate::service::{HashService, HashTask};

/// Body of every 500 response. Internals are logged, never returned.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error please try later";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub content: String,
    pub hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": INTERNAL_ERROR_MESSAGE })),
    )
        .into_response()
}

async fn health_check<T: HashTask>(
    State(service): State<Arc<HashService<T>>>,
) -> Json<HealthSnapshot> {
    Json(service.health())
}

async fn hash<T: HashTask>(
    State(service): State<Arc<HashService<T>>>,
    Json(input): Json<HashInput>,
) -> Response {
    match service.hash(input).await {
        Ok(output) => (StatusCode::OK, Json(output)).into_response(),
        Err(_) => internal_error(),
    }
}

async fn verify<T: HashTask>(
    State(service): State<Arc<HashService<T>>>,
    Json(request): Json<VerifyRequest>,
) -> Response {
    let input = HashInput {
        content: request.content,
    };
    let output = HashOutput { hash: request.hash };

    match service.verify(input, output).await {
        Ok(valid) => (StatusCode::OK, Json(VerifyResponse { valid })).into_response(),
        Err(_) => internal_error(),
    }
}

async fn shutdown<T: HashTask>(State(service): State<Arc<HashService<T>>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (
        StatusCode::OK,
        Json(serde_json::json!({ "status": "shutting down" })),
    )
}

pub fn routes<T: HashTask>(service: Arc<HashService<T>>) -> Router {
    Router::new()
        .route("/health-check", get(health_check::<T>))
        .route("/hash", post(hash::<T>))
        .route("/verify", post(verify::<T>))
        .route("/shutdown", post(shutdown::<T>))
        .with_state(service)
}
