//! CORS relay: a stateless HTTP forwarder that fetches `?url=<target>` on
//! behalf of browser clients and returns the origin response with
//! permissive CORS headers.

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod relay;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::{RelayEngine, RelayError};
