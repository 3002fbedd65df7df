use crate::channel::Route;
use crate::orchestrator::VoiceInputOrchestrator;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<VoiceInputOrchestrator>,

    /// Most recent `route_calculated` payload, filled by the orchestrator callback
    pub last_routes: Arc<RwLock<Option<Vec<Route>>>>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<VoiceInputOrchestrator>,
        last_routes: Arc<RwLock<Option<Vec<Route>>>>,
    ) -> Self {
        Self {
            orchestrator,
            last_routes,
        }
    }

    /// Store routes delivered by the orchestrator callback
    pub fn record_routes(last_routes: &RwLock<Option<Vec<Route>>>, routes: &[Route]) {
        *last_routes.write().unwrap_or_else(PoisonError::into_inner) = Some(routes.to_vec());
    }

    pub fn routes(&self) -> Option<Vec<Route>> {
        self.last_routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear_routes(&self) {
        self.last_routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
