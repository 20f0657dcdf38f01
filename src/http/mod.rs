//! Inbound HTTP surface.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → OPTIONS: cors.rs preflight (204, no origin contact)
//!     → otherwise: relay pipeline (see `crate::relay`)
//!     → cors.rs headers on every response
//! ```

pub mod cors;
pub mod server;

pub use server::HttpServer;
