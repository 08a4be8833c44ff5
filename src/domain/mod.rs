//! Domain layer containing core types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{ApiError, ConfigError, RegistrationError, StoreError};
pub use traits::{RateLimitStore, TokenVerifier};
pub use types::{
    Claims, Empty, ErrorBody, MessageResponse, Principal, RateLimit, StatusResponse,
};
