//! The server object: route registration, router assembly and lifecycle.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
    middleware,
    routing::{MethodFilter, get, on},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::{net::TcpListener, signal, sync::watch};
use tower::ServiceBuilder;
use tower_http::{
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, error, info, warn};
use utoipa::ToSchema;
use utoipa::openapi::OpenApi;

use super::config::Config;
use crate::api::handlers::{
    DocsState, docs_handler, method_not_allowed_handler, not_found_handler, openapi_handler,
    status_handler,
};
use crate::api::middleware::{AuthState, RateLimitState, authorize, rate_limit};
use crate::api::openapi::{DocumentBuilder, format_openapi_path};
use crate::api::registrar::{Handler, RouteConfig, dispatch};
use crate::domain::{ConfigError, RegistrationError, TokenVerifier};
use crate::infra::{JwtVerifier, RateLimitBackend, RedisStore};

/// Paths served by the server itself.
const BUILTIN_ROUTES: [&str; 3] = ["/", "/docs", "/openapi.json"];

/// Triggers graceful shutdown of a running [`Server`] from another task.
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// An HTTP server assembled from typed routes.
///
/// Routes are registered with [`Server::add`] before [`Server::start`];
/// registration takes `&mut self`, so the OpenAPI document is never
/// written concurrently.
pub struct Server {
    config: Config,
    router: Router,
    docs: DocumentBuilder,
    verifier: Option<Arc<dyn TokenVerifier>>,
    rate_limits: RateLimitBackend,
    routes: HashSet<(Method, String)>,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Builds a server from validated configuration.
    ///
    /// A JWT verifier is created when a public key or secret is configured,
    /// and the Redis rate-limit store when a Redis URL is.
    ///
    /// # Errors
    /// Returns a `ConfigError` for unusable key material or Redis URL.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.check()?;

        let verifier: Option<Arc<dyn TokenVerifier>> = match (
            config.jwt.public_key_pem.as_deref(),
            config.jwt.secret.as_ref(),
        ) {
            (Some(pem), _) => Some(Arc::new(JwtVerifier::from_public_key_pem(
                pem,
                &config.jwt.algorithm,
            )?)),
            (None, Some(secret)) => Some(Arc::new(JwtVerifier::from_secret(secret))),
            (None, None) => None,
        };

        let rate_limits = rate_limit_backend(&config)?;
        Ok(Self::assemble(config, verifier, rate_limits))
    }

    /// Builds a server that authenticates with `verifier`.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the configuration fails validation.
    pub fn with_verifier(
        config: Config,
        verifier: Arc<dyn TokenVerifier>,
    ) -> Result<Self, ConfigError> {
        config.check()?;
        let rate_limits = rate_limit_backend(&config)?;
        Ok(Self::assemble(config, Some(verifier), rate_limits))
    }

    /// Replaces the store used by routes registered after this call.
    #[must_use]
    pub fn with_rate_limit_backend(mut self, backend: RateLimitBackend) -> Self {
        self.rate_limits = backend;
        self
    }

    fn assemble(
        config: Config,
        verifier: Option<Arc<dyn TokenVerifier>>,
        rate_limits: RateLimitBackend,
    ) -> Self {
        let docs = DocumentBuilder::new(&config.info, &config.server_url);
        let routes = BUILTIN_ROUTES
            .iter()
            .map(|path| (Method::GET, (*path).to_string()))
            .collect();

        info!(
            authentication = verifier.is_some(),
            rate_limit_store = rate_limits.name(),
            "Server configured"
        );

        Self {
            config,
            router: Router::new(),
            docs,
            verifier,
            rate_limits,
            routes,
            shutdown: ShutdownHandle::new(),
        }
    }

    /// Registers `handler` at `method path`.
    ///
    /// `path` may use `:name` or `{name}` placeholders. The request is bound
    /// into `I`, the handler's `O` is returned as JSON with status 200, and
    /// an OpenAPI operation is derived from both types.
    ///
    /// # Errors
    /// Returns a `RegistrationError` for a malformed path, an unsupported
    /// method, a duplicate or conflicting route, an invalid rate limit, or a
    /// protected route with no verifier.
    pub fn add<H, I, O>(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
        config: RouteConfig,
    ) -> Result<&mut Self, RegistrationError>
    where
        H: Handler<I, O>,
        I: DeserializeOwned + ToSchema + Send + 'static,
        O: Serialize + ToSchema + Send + 'static,
    {
        let path = format_openapi_path(path);
        check_path(&path)?;
        let filter = MethodFilter::try_from(method.clone())
            .map_err(|_| RegistrationError::UnsupportedMethod(method.to_string()))?;

        if self.routes.contains(&(method.clone(), path.clone())) {
            return Err(RegistrationError::DuplicateRoute {
                method: method.to_string(),
                path,
            });
        }

        if let Some((_, existing)) = self
            .routes
            .iter()
            .find(|(_, existing)| placeholders_conflict(existing, &path))
        {
            return Err(RegistrationError::ConflictingRoute {
                existing: existing.clone(),
                path,
            });
        }

        let mut route = on(filter, move |request: Request<Body>| {
            dispatch::<H, I, O>(handler.clone(), request)
        });

        if config.access.requires_token() {
            let verifier = self.verifier.clone().ok_or_else(|| {
                RegistrationError::MissingVerifier {
                    method: method.to_string(),
                    path: path.clone(),
                }
            })?;
            route = route.layer(middleware::from_fn_with_state(
                AuthState {
                    verifier,
                    access: config.access.clone(),
                },
                authorize,
            ));
        }

        if let Some(limit) = config.rate_limit {
            limit.validate()?;
            let store = self
                .rate_limits
                .store_for(limit, &format!("{method} {path}"))?;
            route = route.layer(middleware::from_fn_with_state(
                RateLimitState {
                    store,
                    limit,
                    trust_proxy_headers: self.config.trust_proxy_headers,
                },
                rate_limit,
            ));
        }

        self.router = std::mem::take(&mut self.router).route(&path, route);
        self.docs.add_operation::<I, O>(&method, &path, &config);

        info!(method = %method, path = %path, access = ?config.access, "Route registered");
        self.routes.insert((method, path));
        Ok(self)
    }

    /// The finalized router, including built-in endpoints and fallbacks.
    pub fn router(&self) -> Router {
        let openapi = self.docs.to_json().unwrap_or_else(|e| {
            error!(error = %e, "Failed to serialize OpenAPI document");
            serde_json::Value::Object(serde_json::Map::new())
        });
        let docs = Arc::new(DocsState::new(&self.config.info.title, openapi));

        let builtin = Router::new()
            .route("/", get(status_handler))
            .route("/docs", get(docs_handler))
            .route("/openapi.json", get(openapi_handler))
            .with_state(docs);

        let layers = ServiceBuilder::new()
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.request_timeout,
            ));

        self.router
            .clone()
            .merge(builtin)
            .method_not_allowed_fallback(method_not_allowed_handler)
            .fallback(not_found_handler)
            .layer(layers)
    }

    pub fn openapi(&self) -> &OpenApi {
        self.docs.document()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A handle that stops [`Server::start`] / [`Server::serve`] gracefully.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Binds `0.0.0.0:<port>` and serves until a shutdown signal.
    ///
    /// # Errors
    /// Returns the I/O error if binding or serving fails.
    pub async fn start(self) -> io::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serves on an existing listener until Ctrl+C, SIGTERM or
    /// [`ShutdownHandle::shutdown`], then waits at most the configured
    /// shutdown timeout for in-flight requests.
    ///
    /// # Errors
    /// Returns the I/O error if serving fails.
    pub async fn serve(self, listener: TcpListener) -> io::Result<()> {
        let local_addr = listener.local_addr()?;
        if let RateLimitBackend::Redis(store) = &self.rate_limits {
            if let Err(e) = store.ping().await {
                warn!(error = %e, "Redis unreachable, rate-limited routes will deny requests");
            }
        }
        let grace = self.config.shutdown_timeout;
        let shutdown_rx = self.shutdown.subscribe();
        let app = self.router();

        let (drain_tx, drain_rx) = tokio::sync::oneshot::channel::<()>();
        let mut server = tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = drain_rx.await;
            })
            .await
        });

        info!(address = %local_addr, "Server listening");

        tokio::select! {
            result = &mut server => return flatten(result),
            () = shutdown_signal(shutdown_rx) => {}
        }

        let _ = drain_tx.send(());
        match tokio::time::timeout(grace, &mut server).await {
            Ok(result) => {
                info!("Server stopped");
                flatten(result)
            }
            Err(_) => {
                warn!(
                    timeout_secs = grace.as_secs(),
                    "Graceful shutdown timed out, abandoning in-flight requests"
                );
                server.abort();
                Ok(())
            }
        }
    }
}

/// Rejects paths the router cannot insert.
fn check_path(path: &str) -> Result<(), RegistrationError> {
    let invalid = |reason: &str| RegistrationError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let segments: Vec<&str> = path.split('/').skip(1).collect();
    let mut names = HashSet::new();

    for (i, segment) in segments.iter().enumerate() {
        if segment.starts_with('*') {
            return Err(invalid("wildcard segments must be written as {*name}"));
        }
        if segment.starts_with(':') {
            return Err(invalid("placeholder name is empty"));
        }

        match placeholder(segment) {
            Some(inner) => {
                let (name, catch_all) = match inner.strip_prefix('*') {
                    Some(name) => (name, true),
                    None => (inner, false),
                };
                if name.is_empty() || name.contains(['{', '}', '*', ':', '/']) {
                    return Err(invalid("placeholder name is empty or malformed"));
                }
                if catch_all && i + 1 != segments.len() {
                    return Err(invalid("catch-all placeholder must be the last segment"));
                }
                if !names.insert(name) {
                    return Err(invalid("placeholder name is repeated"));
                }
            }
            None if segment.contains(['{', '}']) => {
                return Err(invalid("placeholders must span a whole segment"));
            }
            None => {}
        }
    }

    Ok(())
}

fn placeholder(segment: &str) -> Option<&str> {
    segment.strip_prefix('{')?.strip_suffix('}')
}

/// True when both paths share a prefix and then place differently named
/// placeholders at the same position.
fn placeholders_conflict(existing: &str, path: &str) -> bool {
    for (a, b) in existing.split('/').zip(path.split('/')) {
        if a != b {
            return placeholder(a).is_some() && placeholder(b).is_some();
        }
    }
    false
}

/// Redis when a URL is configured, otherwise in-memory counters.
fn rate_limit_backend(config: &Config) -> Result<RateLimitBackend, ConfigError> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let store = RedisStore::open(url).map_err(|e| ConfigError::InvalidValue {
                key: "RESTWIRE_REDIS_URL".to_string(),
                message: e.to_string(),
            })?;
            Ok(RateLimitBackend::Redis(Arc::new(store)))
        }
        None => Ok(RateLimitBackend::Memory),
    }
}

fn flatten(result: Result<io::Result<()>, tokio::task::JoinError>) -> io::Result<()> {
    result.map_err(io::Error::other)?
}

async fn shutdown_signal(mut handle: watch::Receiver<bool>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let requested = async {
        if handle.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        () = terminate => info!("Received terminate signal, initiating graceful shutdown"),
        () = requested => info!("Shutdown requested, initiating graceful shutdown"),
    }
}
