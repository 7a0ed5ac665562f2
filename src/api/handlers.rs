//! HTTP request handlers

use super::types::{AcceptedResponse, ErrorResponse, HealthResponse};
use super::AppState;
use crate::reconcile::SweepReport;
use crate::transport::ReactionEvent;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Reaction-add notifications from the gateway bridge
        .route("/api/reactions", post(enqueue_reaction))
        .route("/api/resync", post(run_resync))
        .route("/api/health", get(health))
        .route("/version", get(get_version))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================
// Reaction ingress
// ============================================================

async fn enqueue_reaction(
    State(state): State<AppState>,
    Json(event): Json<ReactionEvent>,
) -> Result<(StatusCode, Json<AcceptedResponse>), AppError> {
    tracing::debug!(message = %event.message, emote = %event.emote, user = %event.user, "Reaction received");
    state
        .events
        .send(event)
        .await
        .map_err(|_| AppError::Unavailable("Event router has stopped".to_string()))?;

    Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { queued: true })))
}

// ============================================================
// Resync
// ============================================================

async fn run_resync(State(state): State<AppState>) -> Json<SweepReport> {
    tracing::info!("On-demand resync requested");
    Json(state.sweep.resync().await)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

async fn get_version() -> &'static str {
    concat!("votekeeper ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

enum AppError {
    Unavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
