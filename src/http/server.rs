//! HTTP server setup and the relay handler.
//!
//! # Responsibilities
//! - Create the Axum router: the relay path plus a JSON 404 fallback
//! - Wire up middleware (request ID, tracing)
//! - Answer preflights locally and hand everything else to the relay engine
//! - Bind server to listener and drain on shutdown
//!
//! # Design Decisions
//! - No router-wide timeout: relayed bodies may stream for as long as the
//!   origin keeps sending (see `resilience::timeouts` for the phases that are
//!   bounded)
//! - Every response, including errors and 404s, carries the CORS set

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::http::cors;
use crate::lifecycle::shutdown;
use crate::net::tls::TlsError;
use crate::observability::metrics;
use crate::relay::error::ErrorBody;
use crate::relay::{build_outbound_headers, resolve_target, RelayEngine, RelayError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails only when the upstream TLS settings cannot be turned into a
    /// client configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, TlsError> {
        let engine = Arc::new(RelayEngine::new(&config.upstream)?);
        let router = Self::build_router(&config, AppState { engine });
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route(&config.listener.path, any(relay_handler))
            .fallback(not_found)
            .with_state(state)
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            path = %self.config.listener.path,
            verify_tls = self.config.upstream.verify_tls,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Span for one inbound request. The query is left out since it carries
/// the full target URL.
fn request_span(request: &Request<Body>) -> tracing::Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// Main relay handler.
/// Resolves the target, rewrites headers and streams the origin response back.
async fn relay_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().clone();

    if method == Method::OPTIONS {
        metrics::record_request(method.as_str(), StatusCode::NO_CONTENT.as_u16(), start_time);
        return cors::preflight();
    }

    let (parts, body) = request.into_parts();
    let target = match resolve_target(parts.uri.query()) {
        Ok(target) => target,
        Err(e) => return reject(&method, e, start_time),
    };

    let headers = build_outbound_headers(&parts.headers, &target);
    tracing::debug!(method = %method, upstream = %target.origin(), "Relaying request");

    match state.engine.relay(method.clone(), &target, headers, body).await {
        Ok(response) => {
            let status = response.status();
            metrics::record_request(method.as_str(), status.as_u16(), start_time);
            tracing::info!(
                method = %method,
                upstream = %target.origin(),
                status = %status,
                elapsed_ms = start_time.elapsed().as_millis() as u64,
                "Relayed response head"
            );
            response
        }
        Err(e) => reject(&method, e, start_time),
    }
}

fn reject(method: &Method, error: RelayError, start_time: Instant) -> Response {
    if error.is_client_error() {
        tracing::warn!(kind = error.kind(), error = %error, "Rejected request");
    } else {
        tracing::error!(kind = error.kind(), error = %error, "Relay failed");
        metrics::record_upstream_error(error.kind());
    }

    let response = error.into_response();
    metrics::record_request(method.as_str(), response.status().as_u16(), start_time);
    response
}

/// Anything off the relay path. Preflights are still answered so browsers
/// see a consistent CORS surface.
async fn not_found(method: Method) -> Response {
    if method == Method::OPTIONS {
        return cors::preflight();
    }

    let mut response = (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "Not found",
            details: None,
        }),
    )
        .into_response();
    cors::apply_cors(response.headers_mut());
    response
}
