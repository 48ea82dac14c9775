pub mod rest;
pub mod state;

// Re-export the router builder so the binary and the integration tests
// assemble the exact same application.
pub use rest::{api_router, ApiDoc};
