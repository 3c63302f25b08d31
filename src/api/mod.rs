pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod server;
pub mod tracking;

pub use auth::{AuthError, Claims, JwtAuth};
pub use error::ApiError;
pub use handlers::AppState;
pub use rate_limit::RateLimitConfig;
pub use server::{build_router, run_server};
