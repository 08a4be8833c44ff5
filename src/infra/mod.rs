//! Infrastructure layer: concrete implementations of domain traits.

pub mod jwt;
pub mod observability;
pub mod rate_limit;

pub use jwt::JwtVerifier;
pub use rate_limit::{MemoryStore, RateLimitBackend, RedisRateLimiter, RedisStore};
