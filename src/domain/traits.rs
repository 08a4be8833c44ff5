//! Domain traits defining contracts for external collaborators.

use async_trait::async_trait;

use super::error::{ApiError, StoreError};
use super::types::Claims;

/// Verifies a bearer token and returns its claims.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify `token`. Failures are returned to the caller unchanged.
    async fn verify(&self, token: &str) -> Result<Claims, ApiError>;
}

/// Admission decision backend for the rate-limit middleware.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Returns `Ok(true)` when the request identified by `identifier` may proceed.
    async fn allow(&self, identifier: &str) -> Result<bool, StoreError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str {
        "unknown"
    }
}
