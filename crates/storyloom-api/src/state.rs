//! Shared application state.

use std::sync::Arc;

use storyloom_progression::application::orchestrator::Orchestrator;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The progression engine; also gives access to its store.
    pub engine: Arc<Orchestrator>,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(engine: Arc<Orchestrator>) -> Self {
        Self { engine }
    }
}
