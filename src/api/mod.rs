//! The API layer: typed route registration, request binding, OpenAPI
//! generation, middleware and built-in endpoints.

pub mod binding;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod registrar;

pub use openapi::{BEARER_SCHEME, DocumentBuilder, format_openapi_path};
pub use registrar::{Access, Handler, RequestContext, RouteConfig};
