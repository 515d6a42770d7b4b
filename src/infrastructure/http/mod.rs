//! HTTP surface (axum).

pub mod auth;
pub mod correlation;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod server;
pub mod state;

pub use auth::{ApiKeyRegistry, AuthenticatedCaller, API_KEY_HEADER};
pub use correlation::{CorrelationId, CORRELATION_ID_HEADER};
pub use error::{ApiError, ErrorResponse};
pub use extract::{ValidJson, ValidQuery};
pub use server::{build_router, serve};
pub use state::AppState;
