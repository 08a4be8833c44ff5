//! Redis-backed fixed-window rate limiting shared across instances.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::{Client, aio::MultiplexedConnection};
use tracing::{error, warn};
use uuid::Uuid;

use crate::domain::{RateLimit, RateLimitStore, RegistrationError, StoreError};

/// Lifetime of the per-identifier lock.
const LOCK_TTL_MS: u64 = 100;

const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Deletes the lock only if it still holds our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Connection factory and lock client for the distributed limiter.
pub struct RedisStore {
    client: Client,
}

impl RedisStore {
    /// Parses `redis_url`; no connection is made until first use.
    ///
    /// # Errors
    /// Returns `StoreError::Connection` if the URL is not a valid Redis URL.
    pub fn open(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Connection(format!("Failed to create Redis client: {e}")))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StoreError::Connection("Timed out connecting to Redis".to_string()))?
        .map_err(StoreError::from)
    }

    /// Tries to take `key` for [`LOCK_TTL_MS`]. Returns the lock token on success.
    async fn obtain_lock(
        &self,
        con: &mut MultiplexedConnection,
        key: &str,
    ) -> Result<Option<String>, StoreError> {
        let token = Uuid::new_v4().to_string();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(LOCK_TTL_MS)
            .query_async(con)
            .await?;
        Ok(acquired.map(|_| token))
    }

    async fn release_lock(
        &self,
        con: &mut MultiplexedConnection,
        key: &str,
        token: &str,
    ) -> Result<(), StoreError> {
        let script = redis::Script::new(RELEASE_SCRIPT);
        let _: i64 = script.key(key).arg(token).invoke_async(con).await?;
        Ok(())
    }

    /// Checks Redis connectivity with `PING`.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut con = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        Ok(())
    }
}

/// Fixed-window counter per identifier, serialized by a short-lived lock.
pub struct RedisRateLimiter {
    store: Arc<RedisStore>,
    limit: RateLimit,
    scope: String,
}

impl RedisRateLimiter {
    /// # Errors
    /// Returns `RegistrationError::InvalidRateLimit` for a zero count or period.
    pub fn new(
        store: Arc<RedisStore>,
        limit: RateLimit,
        scope: impl Into<String>,
    ) -> Result<Self, RegistrationError> {
        limit.validate()?;
        Ok(Self {
            store,
            limit,
            scope: scope.into(),
        })
    }

    fn counter_key(&self, identifier: &str) -> String {
        format!("ratelimit:{}:{}", self.scope, identifier)
    }

    async fn admit(
        &self,
        con: &mut MultiplexedConnection,
        counter_key: &str,
    ) -> Result<bool, StoreError> {
        let current: Option<u64> = redis::cmd("GET")
            .arg(counter_key)
            .query_async(con)
            .await?;

        match current {
            None => {
                let period_ms = u64::try_from(self.limit.period.as_millis()).unwrap_or(u64::MAX);
                let _: () = redis::cmd("SET")
                    .arg(counter_key)
                    .arg(1u64)
                    .arg("PX")
                    .arg(period_ms)
                    .query_async(con)
                    .await?;
                Ok(true)
            }
            Some(count) if count >= u64::from(self.limit.count) => Ok(false),
            Some(_) => {
                let _: u64 = redis::cmd("INCR").arg(counter_key).query_async(con).await?;
                Ok(true)
            }
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn allow(&self, identifier: &str) -> Result<bool, StoreError> {
        let mut con = self.store.connection().await?;
        let counter_key = self.counter_key(identifier);
        let lock_key = format!("lock_{counter_key}");

        let Some(token) = self.store.obtain_lock(&mut con, &lock_key).await? else {
            warn!(identifier = %identifier, "Rate limit lock busy, denying request");
            return Ok(false);
        };

        let decision = self.admit(&mut con, &counter_key).await;

        if let Err(e) = self.store.release_lock(&mut con, &lock_key, &token).await {
            error!(error = %e, lock = %lock_key, "Failed to release rate limit lock");
        }

        decision
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
