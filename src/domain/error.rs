//! Error types for startup, registration, rate-limit stores and requests.

use thiserror::Error;

/// Fatal configuration problems detected while loading the environment.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Validation failed: {0}")]
    Validation(String),
}

impl From<&str> for ConfigError {
    fn from(s: &str) -> Self {
        ConfigError::ParseError(s.to_string())
    }
}

impl From<validator::ValidationErrors> for ConfigError {
    fn from(err: validator::ValidationErrors) -> Self {
        ConfigError::Validation(err.to_string())
    }
}

/// Fatal problems detected while registering a route.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Route {method} {path} requires authentication but no token verifier is configured")]
    MissingVerifier { method: String, path: String },
    #[error("Route {method} {path} is already registered")]
    DuplicateRoute { method: String, path: String },
    #[error("Invalid route path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
    #[error("Route path {path} conflicts with {existing}: parameter names differ")]
    ConflictingRoute { path: String, existing: String },
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),
    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),
}

/// Failures of a rate-limit backend. These never reach the client directly.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    Connection(String),
    #[error("Store command failed: {0}")]
    Command(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            StoreError::Connection(err.to_string())
        } else {
            StoreError::Command(err.to_string())
        }
    }
}

/// Per-request failure, translated to `{"error": ...}` by the error handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    MethodNotAllowed(String),
    #[error("{0}")]
    UnsupportedMediaType(String),
    #[error("{0}")]
    TooManyRequests(String),
    /// Domain error carrying an explicit HTTP status code.
    #[error("{message}")]
    Status { status: u16, message: String },
    /// Detail is logged, never returned to the caller.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        ApiError::Unauthenticated("Unauthenticated".to_string())
    }

    pub fn permission_denied() -> Self {
        ApiError::PermissionDenied("Permission denied".to_string())
    }

    pub fn too_many_requests() -> Self {
        ApiError::TooManyRequests("Too many requests".to_string())
    }

    pub fn not_found() -> Self {
        ApiError::NotFound("Not Found".to_string())
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        ApiError::Status {
            status,
            message: message.into(),
        }
    }

    /// HTTP status code this error maps to.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthenticated(_) => 401,
            ApiError::PermissionDenied(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::MethodNotAllowed(_) => 405,
            ApiError::UnsupportedMediaType(_) => 415,
            ApiError::TooManyRequests(_) => 429,
            ApiError::Status { status, .. } => *status,
            ApiError::Internal(_) => 500,
        }
    }

    /// Message safe to return to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Internal(_) => "Internal Server Error".to_string(),
            ApiError::Status { status, .. } if *status >= 500 => {
                "Internal Server Error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
