//! Relaying to `https` origins under each certificate policy.

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};

use cors_relay::config::{ProxyConfig, UpstreamConfig};
use cors_relay::relay::{resolve_target, RelayEngine, RelayError};

mod common;

const RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 9\r\nX-Origin: tls\r\nConnection: close\r\n\r\nover-tls!";

#[tokio::test]
async fn default_config_rejects_untrusted_certificate() {
    let origin = common::start_tls_origin(RESPONSE).await;
    let engine = RelayEngine::new(&UpstreamConfig::default()).unwrap();
    let target = resolve_target(Some(&format!(
        "url={}",
        urlencoding::encode(&format!("https://{}/", origin.addr))
    )))
    .unwrap();

    let err = engine
        .relay(Method::GET, &target, HeaderMap::new(), Body::empty())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::TlsHandshake { .. }), "got {err:?}");
}

#[tokio::test]
async fn default_config_reports_untrusted_certificate_as_proxy_error() {
    let origin = common::start_tls_origin(RESPONSE).await;
    let proxy = common::spawn_proxy().await;

    let response = common::client()
        .get(proxy.url_for(&format!("https://{}/", origin.addr)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = serde_json::from_slice(&response.bytes().await.unwrap()).unwrap();
    assert_eq!(body["error"], "Proxy error");
    assert!(body["details"].as_str().unwrap().contains("tls handshake"));
}

#[tokio::test]
async fn skip_verify_relays_over_tls() {
    let origin = common::start_tls_origin(RESPONSE).await;
    let mut config = ProxyConfig::default();
    config.upstream.verify_tls = false;
    let proxy = common::spawn_proxy_with(config).await;

    let response = common::client()
        .get(proxy.url_for(&format!("https://{}/", origin.addr)))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-origin"], "tls");
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert_eq!(&response.bytes().await.unwrap()[..], b"over-tls!");
}

#[tokio::test]
async fn extra_ca_bundle_trusts_origin() {
    let origin = common::start_tls_origin(RESPONSE).await;
    let bundle = origin.write_ca_bundle();
    let mut config = ProxyConfig::default();
    config.upstream.ca_bundle_path = Some(bundle.clone());
    let proxy = common::spawn_proxy_with(config).await;

    let response = common::client()
        .get(proxy.url_for(&format!("https://{}/", origin.addr)))
        .send()
        .await
        .unwrap();
    std::fs::remove_file(&bundle).unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-origin"], "tls");
    assert_eq!(&response.bytes().await.unwrap()[..], b"over-tls!");
}
