//! Network layer subsystem.
//!
//! Only the outbound side needs anything beyond plain sockets: `tls.rs`
//! builds the client configuration used to reach `https` origins.

pub mod tls;
