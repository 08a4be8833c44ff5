use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::error::{ApiError, RegistrationError};

/// Identity assertions carried by a verified bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,
    /// Session ID
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sid: String,
    /// Super-admin flag
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub adm: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
}

/// The resolved identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub session_id: String,
    pub is_super_admin: bool,
}

impl Principal {
    /// Fails with 403 unless the principal holds the super-admin flag.
    pub fn require_super_admin(&self) -> Result<&Self, ApiError> {
        if self.is_super_admin {
            Ok(self)
        } else {
            Err(ApiError::permission_denied())
        }
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            session_id: claims.sid,
            is_super_admin: claims.adm,
        }
    }
}

/// Request shape for handlers that take no input.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Empty {}

/// Basic response carrying a single message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Admit at most `count` requests per `period` for one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub count: u32,
    pub period: Duration,
}

impl RateLimit {
    pub fn new(count: u32, period: Duration) -> Self {
        Self { count, period }
    }

    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.count == 0 {
            return Err(RegistrationError::InvalidRateLimit(
                "count must be greater than 0".to_string(),
            ));
        }
        if self.period.is_zero() {
            return Err(RegistrationError::InvalidRateLimit(
                "period must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn burst(&self) -> Result<NonZeroU32, RegistrationError> {
        NonZeroU32::new(self.count).ok_or_else(|| {
            RegistrationError::InvalidRateLimit("count must be greater than 0".to_string())
        })
    }
}
