//! HTTP server for the lantern exposure-notification backend.

pub mod auth;
pub mod error;
pub mod fake_keys;
pub mod handlers;
pub mod insert;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
