//! Rate-limit store implementations.

mod memory;
mod redis_store;

use std::sync::Arc;

pub use memory::MemoryStore;
pub use redis_store::{RedisRateLimiter, RedisStore};

use crate::domain::{RateLimit, RateLimitStore, RegistrationError};

/// Selects which store backs rate-limited routes.
#[derive(Clone, Default)]
pub enum RateLimitBackend {
    /// Per-process counters.
    #[default]
    Memory,
    /// Counters shared through Redis.
    Redis(Arc<RedisStore>),
}

impl RateLimitBackend {
    /// Builds a store enforcing `limit`, with counters namespaced by `scope`.
    ///
    /// # Errors
    /// Returns `RegistrationError::InvalidRateLimit` for a zero count or period.
    pub fn store_for(
        &self,
        limit: RateLimit,
        scope: &str,
    ) -> Result<Arc<dyn RateLimitStore>, RegistrationError> {
        match self {
            RateLimitBackend::Memory => Ok(Arc::new(MemoryStore::new(limit)?)),
            RateLimitBackend::Redis(store) => Ok(Arc::new(RedisRateLimiter::new(
                Arc::clone(store),
                limit,
                scope,
            )?)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RateLimitBackend::Memory => "memory",
            RateLimitBackend::Redis(_) => "redis",
        }
    }
}
