//! Per-route middleware: bearer authentication and client rate limiting.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::counter;
use tracing::{debug, error, warn};

use super::registrar::Access;
use crate::domain::{ApiError, Principal, RateLimit, RateLimitStore, TokenVerifier};

/// State for [`authorize`].
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<dyn TokenVerifier>,
    pub access: Access,
}

/// Verifies the bearer token, applies the access level and stores the
/// resulting [`Principal`] in request extensions.
pub async fn authorize(
    State(auth): State<AuthState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    match resolve_principal(&auth, request.headers()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => {
            counter!("restwire_auth_failures_total", "status" => err.status_code().to_string())
                .increment(1);
            debug!(error = %err, "Request rejected by authorization");
            err.into_response()
        }
    }
}

async fn resolve_principal(auth: &AuthState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| {
        ApiError::Unauthenticated("No access token provided".to_string())
    })?;

    let principal = Principal::from(auth.verifier.verify(token).await?);

    if auth.access.requires_super_admin() {
        principal.require_super_admin()?;
    }

    Ok(principal)
}

/// The `Authorization` value with any `Bearer ` prefix removed.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

/// State for [`rate_limit`].
#[derive(Clone)]
pub struct RateLimitState {
    pub store: Arc<dyn RateLimitStore>,
    pub limit: RateLimit,
    pub trust_proxy_headers: bool,
}

/// Admits or denies the request based on the client's address.
///
/// A store failure denies the request.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client = client_ip(&request, state.trust_proxy_headers);

    match state.store.allow(&client).await {
        Ok(true) => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert("X-RateLimit-Limit", HeaderValue::from(state.limit.count));
            response
        }
        Ok(false) => {
            counter!("restwire_rate_limited_total", "store" => state.store.name()).increment(1);
            warn!(client = %client, store = state.store.name(), "Rate limit exceeded");
            ApiError::too_many_requests().into_response()
        }
        Err(err) => {
            counter!("restwire_rate_limit_store_errors_total", "store" => state.store.name())
                .increment(1);
            error!(
                client = %client,
                store = state.store.name(),
                error = %err,
                "Rate-limit store unavailable, denying request"
            );
            ApiError::too_many_requests().into_response()
        }
    }
}

/// Client address from `X-Forwarded-For`, `X-Real-IP` or the socket peer.
///
/// Any client can set the forwarding headers, so `trust_proxy_headers`
/// must only be on when a proxy in front of the server overwrites them.
/// Otherwise clients can rotate the header to escape their rate limit.
pub fn client_ip<B>(request: &Request<B>, trust_proxy_headers: bool) -> String {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ip.to_string();
        }
    }

    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok());
    forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok())
    })
}
