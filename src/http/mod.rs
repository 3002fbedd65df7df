//! HTTP bridge between a UI and the voice input orchestrator
//!
//! - GET /voice/support - Capture support and channel connectivity
//! - GET /voice/state - Current snapshot
//! - POST /voice/start | /voice/stop | /voice/cancel | /voice/reset - Commands
//! - GET /voice/routes - Last `route_calculated` payload
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
