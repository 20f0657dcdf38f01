//! Shared origins and proxy harness for integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, Issuer, KeyPair, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use cors_relay::config::ProxyConfig;
use cors_relay::http::HttpServer;
use cors_relay::lifecycle::Shutdown;

/// A relay running in-process on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestProxy {
    /// `/?url=<encoded target>` on this proxy.
    pub fn url_for(&self, target: &str) -> String {
        format!("http://{}/?url={}", self.addr, urlencoding::encode(target))
    }

    /// Same as [`TestProxy::url_for`] but with the target left unencoded.
    pub fn raw_url_for(&self, target: &str) -> String {
        format!("http://{}/?url={}", self.addr, target)
    }
}

impl Drop for TestProxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub async fn spawn_proxy() -> TestProxy {
    spawn_proxy_with(ProxyConfig::default()).await
}

pub async fn spawn_proxy_with(config: ProxyConfig) -> TestProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    TestProxy { addr, shutdown }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Start an origin that echoes what it receives.
///
/// - `/headers`: JSON map of request header name to all its values
/// - `/secure`: response carrying security and encoding headers
/// - `/status/{code}`: empty response with that status
/// - anything else: echoes the body, with `x-echo-method` and `x-echo-uri`
pub async fn start_echo_origin() -> SocketAddr {
    let app = Router::new()
        .route("/headers", any(echo_headers))
        .route("/secure", get(secure))
        .route("/status/{code}", any(status))
        .fallback(echo)
        .layer(DefaultBodyLimit::disable());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn echo(method: Method, uri: Uri, body: Bytes) -> Response {
    (
        [
            ("x-echo-method", method.as_str().to_string()),
            ("x-echo-uri", uri.to_string()),
        ],
        body,
    )
        .into_response()
}

async fn echo_headers(headers: HeaderMap) -> Json<BTreeMap<String, Vec<String>>> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &headers {
        seen.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Json(seen)
}

async fn secure() -> Response {
    (
        [
            ("content-security-policy", "default-src 'none'"),
            ("x-frame-options", "DENY"),
            ("content-encoding", "identity"),
            ("access-control-allow-origin", "https://only.example"),
            ("x-origin-header", "kept"),
        ],
        "secure",
    )
        .into_response()
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Origin that promises 100 bytes, sends 10, then closes the connection.
pub async fn start_truncating_origin() -> SocketAddr {
    serve_raw(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\n0123456789").await
}

/// Origin answering every connection with `response`, counting connections.
pub async fn start_counting_origin(response: &'static [u8]) -> (SocketAddr, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let counter = hits.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(answer_raw(socket, response));
        }
    });
    (addr, hits)
}

async fn serve_raw(response: &'static [u8]) -> SocketAddr {
    start_counting_origin(response).await.0
}

async fn answer_raw<S>(mut socket: S, response: &'static [u8])
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; 8192];
    let mut read = 0;
    while !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") && read < buf.len() {
        match socket.read(&mut buf[read..]).await {
            Ok(0) | Err(_) => return,
            Ok(n) => read += n,
        }
    }
    let _ = socket.write_all(response).await;
    let _ = socket.shutdown().await;
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// HTTPS origin whose certificate chains to a throwaway CA.
pub struct TlsOrigin {
    pub addr: SocketAddr,
    /// PEM of the CA that signed the origin certificate.
    pub ca_pem: String,
}

impl TlsOrigin {
    /// Write the CA to a fresh file and return its path.
    pub fn write_ca_bundle(&self) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "cors-relay-test-ca-{}-{}.pem",
            std::process::id(),
            self.addr.port()
        ));
        std::fs::write(&path, &self.ca_pem).unwrap();
        path
    }
}

/// Start a TLS origin for `127.0.0.1` answering every connection with
/// `response`. Failed handshakes are ignored.
pub async fn start_tls_origin(response: &'static [u8]) -> TlsOrigin {
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name.push(DnType::CommonName, "cors-relay test CA");
    let ca_key = KeyPair::generate().unwrap();
    let ca_cert = ca_params.self_signed(&ca_key).unwrap();
    let ca_pem = ca_cert.pem();
    let issuer = Issuer::new(ca_params, ca_key);

    let mut leaf_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    leaf_params.subject_alt_names = vec![SanType::IpAddress(std::net::Ipv4Addr::LOCALHOST.into())];
    leaf_params.distinguished_name.push(DnType::CommonName, "127.0.0.1");
    let leaf_key = KeyPair::generate().unwrap();
    let leaf_cert = leaf_params.signed_by(&leaf_key, &issuer).unwrap();

    let chain = vec![CertificateDer::from(leaf_cert.der().to_vec())];
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));
    let server_config = rustls::ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(chain, key)
    .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(server_config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                if let Ok(stream) = acceptor.accept(socket).await {
                    answer_raw(stream, response).await;
                }
            });
        }
    });

    TlsOrigin { addr, ca_pem }
}
