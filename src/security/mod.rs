//! Header sanitization tables.
//!
//! # Data Flow
//! ```text
//! inbound headers  → headers.rs (hop-by-hop, platform, forwarding) → origin
//! origin headers   → headers.rs (hop-by-hop, response-security)    → caller
//! ```

pub mod headers;
