//! Startup configuration loaded from the environment.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use validator::Validate;

use crate::domain::ConfigError;

/// OpenAPI `info` block.
#[derive(Debug, Clone, Validate)]
pub struct ApiInfo {
    #[validate(length(min = 1))]
    pub title: String,
    pub description: String,
    #[validate(length(min = 1))]
    pub version: String,
}

impl Default for ApiInfo {
    fn default() -> Self {
        Self {
            title: "My API".to_string(),
            description: "This is a sample RESTful API server.".to_string(),
            version: "1.0.0".to_string(),
        }
    }
}

/// Bearer token verification material. At most one source is used; a
/// public key takes precedence over a shared secret.
#[derive(Debug, Default)]
pub struct JwtConfig {
    pub secret: Option<SecretString>,
    pub public_key_pem: Option<String>,
    pub algorithm: String,
}

/// Server configuration.
#[derive(Debug, Validate)]
pub struct Config {
    #[validate(range(min = 1))]
    pub port: u16,
    #[validate(nested)]
    pub info: ApiInfo,
    /// Public URL advertised in the OpenAPI document.
    #[validate(url)]
    pub server_url: String,
    /// Enables the Redis rate-limit store when set.
    pub redis_url: Option<String>,
    pub jwt: JwtConfig,
    pub shutdown_timeout: Duration,
    pub request_timeout: Duration,
    /// Identify rate-limited clients by `X-Forwarded-For` / `X-Real-IP`.
    /// Only safe behind a proxy that overwrites those headers.
    pub trust_proxy_headers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            info: ApiInfo::default(),
            server_url: "http://localhost:3000".to_string(),
            redis_url: None,
            jwt: JwtConfig {
                algorithm: "EdDSA".to_string(),
                ..JwtConfig::default()
            },
            shutdown_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            trust_proxy_headers: true,
        }
    }
}

impl Config {
    /// Load and validate configuration from process environment variables.
    ///
    /// # Errors
    /// Returns a `ConfigError` when a value fails to parse or validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load and validate configuration from an arbitrary key lookup.
    ///
    /// # Errors
    /// Returns a `ConfigError` when a value fails to parse or validate.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Config {
            port: parse_or(&get, "RESTWIRE_PORT", defaults.port)?,
            info: ApiInfo {
                title: get("RESTWIRE_INFO_TITLE").unwrap_or(defaults.info.title),
                description: get("RESTWIRE_INFO_DESCRIPTION")
                    .unwrap_or(defaults.info.description),
                version: get("RESTWIRE_INFO_VERSION").unwrap_or(defaults.info.version),
            },
            server_url: get("RESTWIRE_SERVER_URL").unwrap_or(defaults.server_url),
            redis_url: get("RESTWIRE_REDIS_URL"),
            jwt: JwtConfig {
                secret: get("RESTWIRE_JWT_SECRET").map(SecretString::from),
                public_key_pem: get("RESTWIRE_JWT_PUBLIC_KEY"),
                algorithm: get("RESTWIRE_JWT_ALGORITHM").unwrap_or(defaults.jwt.algorithm),
            },
            shutdown_timeout: Duration::from_secs(parse_or(
                &get,
                "RESTWIRE_SHUTDOWN_TIMEOUT_SECS",
                defaults.shutdown_timeout.as_secs(),
            )?),
            request_timeout: Duration::from_secs(parse_or(
                &get,
                "RESTWIRE_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            trust_proxy_headers: parse_or(
                &get,
                "RESTWIRE_TRUST_PROXY_HEADERS",
                defaults.trust_proxy_headers,
            )?,
        };

        config.check()?;
        Ok(config)
    }

    /// Runs the declarative rules plus the checks they cannot express.
    ///
    /// # Errors
    /// Returns `ConfigError::Validation` or `ConfigError::InvalidValue`.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if let Some(url) = &self.redis_url {
            if !url.starts_with("redis://") && !url.starts_with("rediss://") {
                return Err(ConfigError::InvalidValue {
                    key: "RESTWIRE_REDIS_URL".to_string(),
                    message: "must start with 'redis://' or 'rediss://'".to_string(),
                });
            }
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "RESTWIRE_REQUEST_TIMEOUT_SECS".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.info.title, "My API");
        assert_eq!(config.info.description, "This is a sample RESTful API server.");
        assert_eq!(config.info.version, "1.0.0");
        assert_eq!(config.server_url, "http://localhost:3000");
        assert!(config.redis_url.is_none());
        assert!(config.jwt.secret.is_none());
        assert_eq!(config.jwt.algorithm, "EdDSA");
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert!(config.trust_proxy_headers);
    }

    #[test]
    fn test_proxy_headers_can_be_distrusted() {
        let config =
            Config::from_lookup(lookup(&[("RESTWIRE_TRUST_PROXY_HEADERS", "false")])).unwrap();
        assert!(!config.trust_proxy_headers);

        let err = Config::from_lookup(lookup(&[("RESTWIRE_TRUST_PROXY_HEADERS", "maybe")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key, .. } if key == "RESTWIRE_TRUST_PROXY_HEADERS"
        ));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("RESTWIRE_PORT", "8080"),
            ("RESTWIRE_INFO_TITLE", "Inventory API"),
            ("RESTWIRE_SERVER_URL", "https://api.example.com"),
            ("RESTWIRE_REDIS_URL", "redis://127.0.0.1:6379"),
            ("RESTWIRE_JWT_SECRET", "s3cret"),
            ("RESTWIRE_SHUTDOWN_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.info.title, "Inventory API");
        assert_eq!(config.server_url, "https://api.example.com");
        assert_eq!(config.redis_url.as_deref(), Some("redis://127.0.0.1:6379"));
        assert!(config.jwt.secret.is_some());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("RESTWIRE_PORT", "  ")])).unwrap();
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_invalid_port() {
        let err = Config::from_lookup(lookup(&[("RESTWIRE_PORT", "http")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "RESTWIRE_PORT"));

        let err = Config::from_lookup(lookup(&[("RESTWIRE_PORT", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_server_url() {
        let err =
            Config::from_lookup(lookup(&[("RESTWIRE_SERVER_URL", "not a url")])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_invalid_redis_url() {
        let err = Config::from_lookup(lookup(&[("RESTWIRE_REDIS_URL", "http://localhost:6379")]))
            .unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidValue { key, .. } if key == "RESTWIRE_REDIS_URL")
        );
    }

    #[test]
    fn test_zero_request_timeout_rejected() {
        let err = Config::from_lookup(lookup(&[("RESTWIRE_REQUEST_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
