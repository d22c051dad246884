pub mod rate_limiter;
pub mod tracing;

pub use rate_limiter::{rate_limit_layer, RateLimiter};
pub use tracing::request_tracing;
