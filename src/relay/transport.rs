//! Outbound connection establishment.
//!
//! # Responsibilities
//! - Resolve the target host (DNS failures are reported separately)
//! - Open a TCP connection, trying every resolved address in order
//! - Wrap it in TLS for `https` targets
//!
//! # Design Decisions
//! - One fresh connection per request; nothing is pooled or shared
//! - The connect deadline covers DNS, TCP and the TLS handshake together

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use rustls::pki_types::ServerName;
use tokio::net::{lookup_host, TcpStream};
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::config::UpstreamConfig;
use crate::net::tls::{self, TlsError};
use crate::relay::error::RelayError;
use crate::relay::target::TargetDescriptor;
use crate::resilience::timeouts;

/// Opens plain and encrypted connections to origins.
#[derive(Clone)]
pub struct Transport {
    tls: TlsConnector,
    connect_timeout: Option<Duration>,
}

impl Transport {
    pub fn new(config: &UpstreamConfig) -> Result<Self, TlsError> {
        Ok(Self {
            tls: tls::connector(config)?,
            connect_timeout: timeouts::from_secs(config.connect_timeout_secs),
        })
    }

    /// Plain TCP connection for `http` targets.
    pub async fn connect_plain(&self, target: &TargetDescriptor) -> Result<TcpStream, RelayError> {
        timeouts::with_deadline(self.connect_timeout, "connect", connect_tcp(target)).await
    }

    /// TLS connection for `https` targets.
    pub async fn connect_tls(
        &self,
        target: &TargetDescriptor,
    ) -> Result<TlsStream<TcpStream>, RelayError> {
        timeouts::with_deadline(self.connect_timeout, "connect", async {
            let tcp = connect_tcp(target).await?;
            tls_handshake(&self.tls, tcp, target).await
        })
        .await
    }
}

async fn resolve(target: &TargetDescriptor) -> Result<Vec<SocketAddr>, RelayError> {
    let host = target.connect_host();
    let dns_failure = |reason: String| RelayError::DnsFailure {
        host: host.to_string(),
        reason,
    };

    let addrs: Vec<SocketAddr> = lookup_host((host, target.port))
        .await
        .map_err(|e| dns_failure(e.to_string()))?
        .collect();

    if addrs.is_empty() {
        return Err(dns_failure("no addresses returned".to_string()));
    }
    Ok(addrs)
}

async fn connect_tcp(target: &TargetDescriptor) -> Result<TcpStream, RelayError> {
    let mut last_error = None;
    for addr in resolve(target).await? {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!(%addr, error = %e, "Failed to set TCP_NODELAY");
                }
                tracing::trace!(%addr, upstream = %target.origin(), "Connected");
                return Ok(stream);
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "Connect attempt failed");
                last_error = Some(e);
            }
        }
    }

    Err(RelayError::ConnectFailure {
        authority: target.authority(),
        source: last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses")),
    })
}

async fn tls_handshake(
    connector: &TlsConnector,
    tcp: TcpStream,
    target: &TargetDescriptor,
) -> Result<TlsStream<TcpStream>, RelayError> {
    let host = target.connect_host();
    let handshake_failure = |reason: String| RelayError::TlsHandshake {
        host: host.to_string(),
        reason,
    };

    let server_name =
        ServerName::try_from(host.to_string()).map_err(|e| handshake_failure(e.to_string()))?;

    connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| handshake_failure(e.to_string()))
}
