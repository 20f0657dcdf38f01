//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, the route path and referenced files
//! - Reject contradictory TLS settings
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// The relay path is registered as a literal route; anything the router
/// would read as a parameter or wildcard is rejected here instead.
fn route_path_problem(path: &str) -> Option<&'static str> {
    if !path.starts_with('/') {
        Some("must start with `/`")
    } else if path.contains(['{', '}', '*']) {
        Some("must not contain `{`, `}` or `*`")
    } else if path.split('/').any(|segment| segment.starts_with(':')) {
        Some("segments must not start with `:`")
    } else {
        None
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    if let Some(problem) = route_path_problem(&config.listener.path) {
        errors.push(ValidationError::new("listener.path", problem));
    }

    if let Some(path) = &config.upstream.ca_bundle_path {
        if !config.upstream.verify_tls {
            errors.push(ValidationError::new(
                "upstream.ca_bundle_path",
                "has no effect while verify_tls = false",
            ));
        } else if !path.is_file() {
            errors.push(ValidationError::new(
                "upstream.ca_bundle_path",
                format!("{} does not exist", path.display()),
            ));
        }
    }

    if config.observability.log_level.trim().is_empty() {
        errors.push(ValidationError::new("observability.log_level", "must not be empty"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
