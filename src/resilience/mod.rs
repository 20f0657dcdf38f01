//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request to origin:
//!     → timeouts.rs (connect deadline, response-head deadline)
//!     → on elapse: UpstreamTimeout, surfaced as 502
//! ```
//!
//! # Design Decisions
//! - No retries: the caller owns retry policy
//! - Idle timeouts on the response body live in `relay::body`

pub mod timeouts;
