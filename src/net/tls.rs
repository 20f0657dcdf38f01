//! Outbound TLS configuration.
//!
//! Certificate verification is on unless `upstream.verify_tls = false`.
//! Turning it off trusts any certificate the origin presents, which lets
//! anyone on the network path impersonate the origin; it exists for
//! development origins with self-signed certificates.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use thiserror::Error;
use tokio_rustls::TlsConnector;

use crate::config::UpstreamConfig;

/// Error building the outbound TLS configuration.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read CA bundle {path:?}: {source}")]
    CaBundle {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CA bundle {0:?} contains no usable certificates")]
    EmptyCaBundle(PathBuf),

    #[error("tls setup failed: {0}")]
    Rustls(#[from] rustls::Error),
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(crypto::ring::default_provider())
}

/// Load PEM certificates from `path` into `roots`, returning how many were added.
fn load_ca_bundle(roots: &mut RootCertStore, path: &Path) -> Result<usize, TlsError> {
    let io_err = |source| TlsError::CaBundle {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut added = 0;
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(io_err)?;
        match roots.add(cert) {
            Ok(()) => added += 1,
            Err(e) => tracing::warn!(path = ?path, error = %e, "Skipping unusable CA certificate"),
        }
    }

    if added == 0 {
        return Err(TlsError::EmptyCaBundle(path.to_path_buf()));
    }
    Ok(added)
}

/// Build the rustls client configuration for origin connections.
pub fn client_config(config: &UpstreamConfig) -> Result<ClientConfig, TlsError> {
    let provider = provider();
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()?;

    let mut tls = if config.verify_tls {
        let mut roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        if let Some(path) = &config.ca_bundle_path {
            let added = load_ca_bundle(&mut roots, path)?;
            tracing::info!(path = ?path, certificates = added, "Loaded extra CA bundle");
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        tracing::warn!("Upstream TLS certificate verification is DISABLED");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth()
    };

    tls.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(tls)
}

/// Connector used for `https` targets.
pub fn connector(config: &UpstreamConfig) -> Result<TlsConnector, TlsError> {
    Ok(TlsConnector::from(Arc::new(client_config(config)?)))
}

/// Accepts any server certificate. Handshake signatures are still checked
/// so the session keys belong to whoever holds the presented certificate.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
