use super::state::AppState;
use crate::channel::Route;
use crate::orchestrator::{VoiceInputSnapshot, VoiceInputState};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::info;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SupportResponse {
    /// Capture device and recorder are present; `false` is permanent
    pub supported: bool,
    pub connected: bool,
}

#[derive(Debug, Serialize)]
pub struct RoutesResponse {
    pub routes: Vec<Route>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /voice/support
pub async fn get_support(State(state): State<AppState>) -> impl IntoResponse {
    Json(SupportResponse {
        supported: state.orchestrator.check_support(),
        connected: state.orchestrator.is_connected(),
    })
}

/// GET /voice/state
pub async fn get_state(State(state): State<AppState>) -> Json<VoiceInputSnapshot> {
    Json(state.orchestrator.snapshot())
}

/// POST /voice/start
/// Begin a voice input cycle. Failures, an unsupported host included, leave
/// the orchestrator in `error` and answer 422 with that snapshot.
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    info!("Voice input requested over HTTP");
    state.clear_routes();

    let snapshot = state.orchestrator.start_recording().await;
    respond_with(snapshot)
}

/// POST /voice/stop
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.orchestrator.stop_recording().await;
    respond_with(snapshot)
}

/// POST /voice/cancel
pub async fn cancel_recording(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.orchestrator.cancel_recording().await;
    respond_with(snapshot)
}

/// POST /voice/reset
pub async fn reset_state(State(state): State<AppState>) -> impl IntoResponse {
    state.clear_routes();
    let snapshot = state.orchestrator.reset_state().await;
    respond_with(snapshot)
}

/// GET /voice/routes
/// Routes pre-computed by the backend for the last recognized pair
pub async fn get_routes(State(state): State<AppState>) -> impl IntoResponse {
    match state.routes() {
        Some(routes) => (StatusCode::OK, Json(RoutesResponse { routes })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No routes calculated yet".to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

fn respond_with(snapshot: VoiceInputSnapshot) -> axum::response::Response {
    let status = if snapshot.state == VoiceInputState::Error {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    (status, Json(snapshot)).into_response()
}
