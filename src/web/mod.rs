//! REST API surface for the orchestration core.

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod state;

pub use errors::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
