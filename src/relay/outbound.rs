//! Outbound header construction.
//!
//! Builds a fresh header set per request from the inbound one. The inbound
//! map is only read, never edited in place.

use axum::http::{
    header::{COOKIE, HOST},
    HeaderMap, HeaderName, HeaderValue,
};

use crate::relay::target::TargetDescriptor;
use crate::security::headers::{is_hop_by_hop, is_platform_or_forwarding};

/// Caller-supplied credential that is remapped onto a cookie.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Cookie name the auth token is delivered under.
pub const AUTH_COOKIE_NAME: &str = "WorkstationJwtPartitioned";

/// Derive the headers sent to the origin.
pub fn build_outbound_headers(inbound: &HeaderMap, target: &TargetDescriptor) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len() + 1);

    let mut auth_token: Option<&HeaderValue> = None;
    for (name, value) in inbound {
        if name.as_str() == AUTH_TOKEN_HEADER {
            auth_token.get_or_insert(value);
        }
        if !is_stripped(name) {
            outbound.append(name.clone(), value.clone());
        }
    }

    if let Some(token) = auth_token {
        let mut cookie = Vec::with_capacity(AUTH_COOKIE_NAME.len() + 1 + token.len());
        cookie.extend_from_slice(AUTH_COOKIE_NAME.as_bytes());
        cookie.push(b'=');
        cookie.extend_from_slice(token.as_bytes());
        match HeaderValue::from_bytes(&cookie) {
            Ok(value) => {
                outbound.insert(COOKIE, value);
            }
            Err(e) => tracing::warn!(error = %e, "Dropping unusable x-auth-token"),
        }
    }

    match HeaderValue::from_str(&target.authority()) {
        Ok(host) => {
            outbound.insert(HOST, host);
        }
        Err(e) => tracing::warn!(upstream = %target.origin(), error = %e, "Target authority is not a valid Host header"),
    }

    outbound
}

/// True when `name` would be stripped by [`build_outbound_headers`].
pub fn is_stripped(name: &HeaderName) -> bool {
    let key = name.as_str();
    key == AUTH_TOKEN_HEADER || is_hop_by_hop(key) || is_platform_or_forwarding(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::target::resolve_target;

    fn target(query: &str) -> TargetDescriptor {
        resolve_target(Some(query)).unwrap()
    }

    fn inbound(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.append(*name, HeaderValue::from_static(*value));
        }
        headers
    }

    #[test]
    fn strips_transport_and_platform_headers() {
        let headers = inbound(&[
            ("host", "proxy.example"),
            ("connection", "keep-alive"),
            ("content-length", "12"),
            ("transfer-encoding", "chunked"),
            ("accept-encoding", "gzip, br"),
            ("keep-alive", "timeout=5"),
            ("proxy-authorization", "Basic Zm9v"),
            ("te", "trailers"),
            ("upgrade", "websocket"),
            ("x-forwarded-for", "10.0.0.1"),
            ("x-forwarded-host", "proxy.example"),
            ("x-forwarded-proto", "https"),
            ("x-vercel-id", "iad1::abc"),
            ("x-vercel-proxy-signature", "sig"),
            ("content-type", "application/octet-stream"),
        ]);

        let out = build_outbound_headers(&headers, &target("url=http%3A%2F%2Forigin.test%2F"));

        assert_eq!(out.len(), 2);
        assert_eq!(out[HOST], "origin.test");
        assert_eq!(out["content-type"], "application/octet-stream");
        for (name, _) in &out {
            assert!(name == HOST || !is_stripped(name), "{name} leaked");
        }
    }

    #[test]
    fn auth_token_becomes_cookie() {
        let headers = inbound(&[("x-auth-token", "ABC"), ("cookie", "session=old")]);

        let out = build_outbound_headers(&headers, &target("url=http%3A%2F%2Forigin.test%2F"));

        let cookies: Vec<_> = out.get_all(COOKIE).iter().collect();
        assert_eq!(cookies, vec!["WorkstationJwtPartitioned=ABC"]);
        assert!(out.get(AUTH_TOKEN_HEADER).is_none());
    }

    #[test]
    fn first_auth_token_wins() {
        let headers = inbound(&[("x-auth-token", "first"), ("x-auth-token", "second")]);
        let out = build_outbound_headers(&headers, &target("url=http%3A%2F%2Forigin.test%2F"));
        assert_eq!(out[COOKIE], "WorkstationJwtPartitioned=first");
    }

    #[test]
    fn cookie_untouched_without_token() {
        let headers = inbound(&[("cookie", "a=1"), ("cookie", "b=2")]);
        let out = build_outbound_headers(&headers, &target("url=http%3A%2F%2Forigin.test%2F"));
        assert_eq!(out.get_all(COOKIE).iter().count(), 2);
    }

    #[test]
    fn host_carries_non_default_port() {
        let headers = inbound(&[("host", "proxy.example")]);

        let out = build_outbound_headers(&headers, &target("url=https%3A%2F%2Forigin.test%3A8443%2F"));
        assert_eq!(out[HOST], "origin.test:8443");

        let out = build_outbound_headers(&headers, &target("url=http%3A%2F%2Forigin.test%3A80%2F"));
        assert_eq!(out[HOST], "origin.test");
    }

    #[test]
    fn preserves_duplicates_and_other_headers() {
        let headers = inbound(&[
            ("accept", "text/html"),
            ("accept", "application/json"),
            ("authorization", "Bearer t"),
            ("x-requested-with", "XMLHttpRequest"),
        ]);

        let out = build_outbound_headers(&headers, &target("url=http%3A%2F%2Forigin.test%2F"));

        let accepts: Vec<_> = out.get_all("accept").iter().collect();
        assert_eq!(accepts, vec!["text/html", "application/json"]);
        assert_eq!(out["authorization"], "Bearer t");
        assert_eq!(out["x-requested-with"], "XMLHttpRequest");
    }

    #[test]
    fn inbound_map_is_not_modified() {
        let headers = inbound(&[("x-auth-token", "ABC"), ("host", "proxy.example")]);
        let snapshot = headers.clone();
        let _ = build_outbound_headers(&headers, &target("url=http%3A%2F%2Forigin.test%2F"));
        assert_eq!(headers, snapshot);
    }
}
