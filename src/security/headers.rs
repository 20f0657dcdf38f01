//! Header tables shared by both relay directions.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Strip platform-injected and forwarding headers before they reach an origin
//! - Strip response-security headers that would block cross-origin reads
//!
//! # Design Decisions
//! - All comparisons are ASCII case-insensitive
//! - `HeaderName` is always lowercase, so plain string equality would work,
//!   but the helpers accept arbitrary `&str` and stay case-insensitive

/// Headers meaningful only for one transport leg.
///
/// `host`, `content-length` and `accept-encoding` are not hop-by-hop in
/// the RFC sense but are owned by the connection that carries them, so the
/// relay treats them the same way.
pub const HOP_BY_HOP: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "accept-encoding",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// Forwarding headers that describe the caller's hop, not ours.
pub const FORWARDING: &[&str] = &["x-forwarded-for", "x-forwarded-host", "x-forwarded-proto"];

/// Prefix of headers injected by the hosting platform.
pub const PLATFORM_PREFIX: &str = "x-vercel-";

/// Response headers that stop a browser from consuming proxied content in
/// another origin context.
pub const RESPONSE_SECURITY: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "cross-origin-resource-policy",
    "reporting-endpoints",
    "report-to",
];

fn contains(table: &[&str], name: &str) -> bool {
    table.iter().any(|h| name.eq_ignore_ascii_case(h))
}

/// Returns true for connection-scoped headers.
pub fn is_hop_by_hop(name: &str) -> bool {
    contains(HOP_BY_HOP, name)
}

/// Returns true for headers that must never leak to a third-party origin.
pub fn is_platform_or_forwarding(name: &str) -> bool {
    let platform = name.len() >= PLATFORM_PREFIX.len()
        && name.as_bytes()[..PLATFORM_PREFIX.len()].eq_ignore_ascii_case(PLATFORM_PREFIX.as_bytes());
    platform || contains(FORWARDING, name)
}

/// Returns true for response headers dropped on the way back to the caller.
pub fn is_response_security(name: &str) -> bool {
    contains(RESPONSE_SECURITY, name)
}
