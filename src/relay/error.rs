//! Relay error taxonomy and the caller-visible error payload.

use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::http::cors::apply_cors;

/// Everything that can stop a request from being relayed.
#[derive(Debug, Error)]
pub enum RelayError {
    /// No `url` query parameter, or an empty one.
    #[error("missing `url` query parameter")]
    MissingTarget,

    /// The decoded `url` value is not an absolute http(s) URL.
    #[error("{0}")]
    InvalidTarget(String),

    #[error("dns lookup for {host} failed: {reason}")]
    DnsFailure { host: String, reason: String },

    #[error("connect to {authority} failed: {source}")]
    ConnectFailure {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tls handshake with {host} failed: {reason}")]
    TlsHandshake { host: String, reason: String },

    /// HTTP exchange failed before a response head was received.
    #[error("upstream exchange failed: {0}")]
    Transport(#[source] hyper::Error),

    #[error("upstream timed out waiting for {phase} after {after:?}")]
    UpstreamTimeout { phase: &'static str, after: Duration },

    /// The origin body broke after the response head was committed.
    #[error("upstream body failed mid-stream: {0}")]
    UpstreamMidStream(String),

    /// The caller went away; never rendered.
    #[error("client disconnected")]
    ClientDisconnected,
}

impl RelayError {
    /// Stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::MissingTarget => "missing_target",
            RelayError::InvalidTarget(_) => "invalid_target",
            RelayError::DnsFailure { .. } => "dns_failure",
            RelayError::ConnectFailure { .. } => "connect_failure",
            RelayError::TlsHandshake { .. } => "tls_handshake",
            RelayError::Transport(_) => "transport",
            RelayError::UpstreamTimeout { .. } => "upstream_timeout",
            RelayError::UpstreamMidStream(_) => "upstream_mid_stream",
            RelayError::ClientDisconnected => "client_disconnected",
        }
    }

    /// Status for errors raised before the response head is committed.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingTarget | RelayError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            RelayError::UpstreamTimeout { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the caller, not the origin, caused the failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RelayError::MissingTarget | RelayError::InvalidTarget(_))
    }

    fn payload(&self) -> ErrorBody {
        match self {
            RelayError::MissingTarget => ErrorBody {
                error: "Missing target",
                details: Some("expected ?url=<absolute http(s) URL>".to_string()),
            },
            RelayError::InvalidTarget(reason) => ErrorBody {
                error: "Invalid target",
                details: Some(reason.clone()),
            },
            other => ErrorBody {
                error: "Proxy error",
                details: Some(other.to_string()),
            },
        }
    }
}

/// JSON body written for failures: `{ "error": ..., "details"?: ... }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let mut response = (self.status(), Json(self.payload())).into_response();
        apply_cors(response.headers_mut());
        response
    }
}
