//! restwire
//!
//! Declarative, typed JSON HTTP routes on top of axum. A handler is an async
//! function from a request shape to a response shape; registering it derives
//! request binding, JSON encoding and an OpenAPI operation, and layers
//! optional authentication, super-admin and rate-limit middleware on top.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                   API Layer                  │
//! │ registrar, binding, OpenAPI, middleware      │
//! ├─────────────────────────────────────────────┤
//! │               Application Layer              │
//! │      configuration, server lifecycle         │
//! ├─────────────────────────────────────────────┤
//! │                 Domain Layer                 │
//! │          traits, types, errors               │
//! ├─────────────────────────────────────────────┤
//! │             Infrastructure Layer             │
//! │   JWT verifier, rate-limit stores, tracing   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use axum::http::Method;
//! use restwire::api::{RequestContext, RouteConfig};
//! use restwire::app::{Config, Server};
//! use restwire::domain::{ApiError, Empty, MessageResponse};
//!
//! async fn hello(_ctx: RequestContext, _input: Empty) -> Result<MessageResponse, ApiError> {
//!     Ok(MessageResponse::new("Hello, World!"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Server::new(Config::from_env()?)?;
//!     server.add(Method::GET, "/hello", hello, RouteConfig::new().summary("Say hello"))?;
//!     server.start().await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod app;
pub mod domain;
pub mod infra;

// Test utilities are available in tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
