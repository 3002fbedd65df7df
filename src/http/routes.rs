use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Observable state
        .route("/voice/support", get(handlers::get_support))
        .route("/voice/state", get(handlers::get_state))
        .route("/voice/routes", get(handlers::get_routes))
        // Commands
        .route("/voice/start", post(handlers::start_recording))
        .route("/voice/stop", post(handlers::stop_recording))
        .route("/voice/cancel", post(handlers::cancel_recording))
        .route("/voice/reset", post(handlers::reset_state))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        // The voice UI is served from its own origin
        .layer(CorsLayer::permissive())
        .with_state(state)
}
