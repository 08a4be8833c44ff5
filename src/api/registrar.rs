//! Typed route registration: per-route settings, the handler contract and
//! the adapter that turns a typed handler into an axum endpoint.

use std::future::Future;
use std::time::Duration;

use axum::{
    Json,
    body::{self, Body},
    extract::{FromRequestParts, RawPathParams},
    http::{HeaderMap, Request, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use super::binding::{BindSource, bind};
use crate::domain::{ApiError, Principal, RateLimit};

/// Largest request body the adapter will buffer.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Who may call a route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Access {
    #[default]
    Public,
    /// Any valid bearer token.
    Authenticated,
    /// A valid bearer token carrying the super-admin claim.
    SuperAdmin,
    /// A valid bearer token; the name is recorded for documentation.
    Permission(String),
}

impl Access {
    pub fn requires_token(&self) -> bool {
        !matches!(self, Access::Public)
    }

    pub fn requires_super_admin(&self) -> bool {
        matches!(self, Access::SuperAdmin)
    }
}

/// Per-route settings. Defaults to a public, unlimited, undocumented route.
#[derive(Debug, Clone, Default)]
pub struct RouteConfig {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub access: Access,
    pub rate_limit: Option<RateLimit>,
}

impl RouteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn authenticated(mut self) -> Self {
        self.access = Access::Authenticated;
        self
    }

    pub fn super_admin(mut self) -> Self {
        self.access = Access::SuperAdmin;
        self
    }

    pub fn permission(mut self, name: impl Into<String>) -> Self {
        self.access = Access::Permission(name.into());
        self
    }

    /// Admit at most `count` requests per `period` from one client.
    pub fn rate_limit(mut self, count: u32, period: Duration) -> Self {
        self.rate_limit = Some(RateLimit::new(count, period));
        self
    }
}

/// Request-scoped values handed to every handler.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    principal: Option<Principal>,
    headers: HeaderMap,
}

impl RequestContext {
    pub fn new(principal: Option<Principal>, headers: HeaderMap) -> Self {
        Self { principal, headers }
    }

    /// The authenticated caller.
    ///
    /// # Errors
    /// `ApiError::Unauthenticated` on a public route, where no token was
    /// verified.
    pub fn principal(&self) -> Result<&Principal, ApiError> {
        self.principal.as_ref().ok_or_else(ApiError::unauthenticated)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// An async function from a decoded input to a serializable output.
///
/// Implemented for every `Fn(RequestContext, I) -> impl Future<Output =
/// Result<O, ApiError>>` that is cheap to clone and thread safe.
pub trait Handler<I, O>: Clone + Send + Sync + 'static {
    type Future: Future<Output = Result<O, ApiError>> + Send + 'static;

    fn call(&self, ctx: RequestContext, input: I) -> Self::Future;
}

impl<F, Fut, I, O> Handler<I, O> for F
where
    F: Fn(RequestContext, I) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<O, ApiError>> + Send + 'static,
{
    type Future = Fut;

    fn call(&self, ctx: RequestContext, input: I) -> Self::Future {
        self(ctx, input)
    }
}

/// Binds the input, invokes the handler and encodes the output as JSON.
pub(crate) async fn dispatch<H, I, O>(handler: H, request: Request<Body>) -> Response
where
    H: Handler<I, O>,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    match invoke(handler, request).await {
        Ok(output) => (StatusCode::OK, Json(output)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn invoke<H, I, O>(handler: H, request: Request<Body>) -> Result<O, ApiError>
where
    H: Handler<I, O>,
    I: DeserializeOwned + Send + 'static,
    O: Serialize + Send + 'static,
{
    let (mut parts, body) = request.into_parts();

    let path_params = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(params) => params
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect(),
        Err(rejection) if rejection.status() == StatusCode::BAD_REQUEST => {
            return Err(ApiError::BadRequest(rejection.body_text()));
        }
        Err(_) => Vec::new(),
    };

    let body = body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| ApiError::with_status(413, "Payload Too Large"))?;

    let input: I = bind(BindSource {
        method: &parts.method,
        headers: &parts.headers,
        path_params,
        uri: &parts.uri,
        body: &body,
    })?;

    let principal = parts.extensions.remove::<Principal>();
    let ctx = RequestContext::new(principal, parts.headers);

    handler.call(ctx, input).await
}
