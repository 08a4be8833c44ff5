//! Mock implementations for testing.
//!
//! In-memory stand-ins for the token verifier and the rate-limit store,
//! configurable to succeed, deny or fail.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::domain::{ApiError, Claims, RateLimitStore, StoreError, TokenVerifier};

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// If true, operations will fail.
    pub should_fail: bool,
    /// Custom error message for failures.
    pub error_message: Option<String>,
}

impl MockConfig {
    /// Creates a config that always succeeds.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a config that always fails.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
        }
    }

    fn message(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| "Mock failure".to_string())
    }
}

/// Token verifier backed by a fixed token table.
///
/// # Example
///
/// ```
/// use restwire::domain::Claims;
/// use restwire::test_utils::MockTokenVerifier;
///
/// let verifier = MockTokenVerifier::new().with_token("t-1", Claims {
///     sub: "john".to_string(),
///     ..Claims::default()
/// });
/// ```
#[derive(Default)]
pub struct MockTokenVerifier {
    tokens: HashMap<String, Claims>,
    calls: AtomicU64,
}

impl MockTokenVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` and resolve it to `claims`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, claims: Claims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenVerifier for MockTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(ApiError::unauthenticated)
    }
}

/// Rate-limit store with a fixed verdict that records every identifier it sees.
pub struct MockRateLimitStore {
    allow: bool,
    config: MockConfig,
    seen: Arc<Mutex<Vec<String>>>,
}

impl MockRateLimitStore {
    /// Admits every request.
    #[must_use]
    pub fn allowing() -> Self {
        Self::with_config(true, MockConfig::success())
    }

    /// Denies every request.
    #[must_use]
    pub fn denying() -> Self {
        Self::with_config(false, MockConfig::success())
    }

    /// Fails every lookup as an unreachable backend would.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_config(true, MockConfig::failure("connection refused"))
    }

    #[must_use]
    pub fn with_config(allow: bool, config: MockConfig) -> Self {
        Self {
            allow,
            config,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared log of identifiers passed to `allow`.
    pub fn seen(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.seen)
    }
}

#[async_trait]
impl RateLimitStore for MockRateLimitStore {
    async fn allow(&self, identifier: &str) -> Result<bool, StoreError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(identifier.to_string());
        }

        if self.config.should_fail {
            return Err(StoreError::Connection(self.config.message()));
        }
        Ok(self.allow)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
