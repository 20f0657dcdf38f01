//! Request/response relay pipeline.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → target.rs   (?url= → TargetDescriptor)          400 on failure
//!     → outbound.rs (fresh outbound header set)
//!     → engine.rs   (transport.rs dispatch, HTTP/1.1 exchange)
//!                                                        500/502 before the head
//!     → filter.rs   (origin headers → caller headers + CORS)
//!     → body.rs     (stream origin body to caller)       abort on mid-stream failure
//! ```
//!
//! # Design Decisions
//! - Everything is request-scoped; the engine holds configuration only
//! - Bodies are streamed in both directions, never collected

pub mod body;
pub mod engine;
pub mod error;
pub mod filter;
pub mod outbound;
pub mod target;
pub mod transport;

pub use engine::RelayEngine;
pub use error::RelayError;
pub use filter::filter_response_headers;
pub use outbound::build_outbound_headers;
pub use target::{resolve_target, Scheme, TargetDescriptor};
