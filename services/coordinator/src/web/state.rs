//! services/coordinator/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use std::sync::Arc;
use tutoring_core::client::ResourceClient;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub client: Arc<ResourceClient>,
    pub config: Arc<Config>,
}
