//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay pipeline produces:
//!     → logging.rs (structured log events, per-request spans from tower-http)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is attached to every log line of a request
//! - Metrics are optional and disabled by default

pub mod logging;
pub mod metrics;
