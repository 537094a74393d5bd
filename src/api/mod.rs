pub mod context;
pub mod handlers;
pub mod render;
pub mod routes;

pub use context::RequestContext;
pub use handlers::{AppState, SharedState};
pub use render::{ApiResult, ErrorResponse};
pub use routes::*;
