mod auth;
mod cache;
mod circuit_breaker;
mod error_handler;
mod rate_limit;

pub use auth::{Admin, Authentication, Principal, authenticate};
pub use cache::{Cached, cache_annotate, no_cache};
pub use circuit_breaker::{CircuitBreaker, circuit_breaker};
pub use error_handler::log_errors;
pub use rate_limit::{RateLimiter, rate_limit};
