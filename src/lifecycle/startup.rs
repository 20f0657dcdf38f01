//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the listener before anything else can fail late
//! - Start the metrics exporter when enabled
//! - Install signal handling and serve until shutdown
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Configuration arrives already validated (see `config::validation`)

use std::net::{AddrParseError, SocketAddr};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::net::tls::TlsError;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid metrics address: {0}")]
    MetricsAddress(#[from] AddrParseError),

    #[error("failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("upstream TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Run the relay until SIGINT/SIGTERM, then drain and return.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    let address = config.listener.bind_address.clone();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })?;

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    spawn_signal_handler(shutdown);

    server.run(listener, server_shutdown).await.map_err(StartupError::Serve)
}
