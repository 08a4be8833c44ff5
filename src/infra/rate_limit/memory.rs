//! In-process rate-limit store backed by a keyed `governor` limiter.

use async_trait::async_trait;
use governor::{
    Quota, RateLimiter, clock::DefaultClock, state::keyed::DashMapStateStore,
};

use crate::domain::{RateLimit, RateLimitStore, RegistrationError, StoreError};

/// Bucket count above which fully replenished buckets are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

type KeyedLimiter = RateLimiter<String, DashMapStateStore<String>, DefaultClock>;

/// Single-instance store: each identifier gets a GCRA bucket holding `count`
/// cells, one cell replenished every `period / count`.
pub struct MemoryStore {
    limiter: KeyedLimiter,
}

impl MemoryStore {
    /// # Errors
    /// Returns `RegistrationError::InvalidRateLimit` for a zero count or period.
    pub fn new(limit: RateLimit) -> Result<Self, RegistrationError> {
        limit.validate()?;
        let replenish = limit.period / limit.count;
        let quota = Quota::with_period(replenish)
            .ok_or_else(|| {
                RegistrationError::InvalidRateLimit("period is too short for count".to_string())
            })?
            .allow_burst(limit.burst()?);

        Ok(Self {
            limiter: RateLimiter::dashmap(quota),
        })
    }

    /// Drops buckets that are back to full capacity.
    pub fn retain_recent(&self) {
        self.limiter.retain_recent();
    }
}

#[async_trait]
impl RateLimitStore for MemoryStore {
    async fn allow(&self, identifier: &str) -> Result<bool, StoreError> {
        let admitted = self.limiter.check_key(&identifier.to_string()).is_ok();
        if self.limiter.len() > PRUNE_THRESHOLD {
            self.retain_recent();
        }
        Ok(admitted)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
