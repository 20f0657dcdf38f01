//! Target URL extraction and validation.
//!
//! # Design Decisions
//! - The `url` value runs from after `url=` to the END of the raw query
//!   string. Targets carrying their own query strings therefore survive
//!   even when the caller did not percent-encode their `&`. This differs
//!   from regular query splitting, which would cut the target at the first
//!   `&`.
//! - The value is percent-decoded exactly once; `+` stays a literal `+`.

use std::fmt;

use url::Url;

use crate::relay::error::RelayError;

/// Name of the query parameter carrying the target.
pub const TARGET_PARAM: &str = "url";

/// Transport selected for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn default_port(self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A validated relay destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    pub scheme: Scheme,
    /// Host as written in an authority (IPv6 literals keep their brackets).
    pub host: String,
    pub port: u16,
    pub path: String,
    pub query: Option<String>,
}

impl TargetDescriptor {
    /// `host[:port]`, with the port only when it is not the scheme default.
    pub fn authority(&self) -> String {
        if self.port == self.scheme.default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// `scheme://authority`, safe to log (no path or query).
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme.as_str(), self.authority())
    }

    /// Origin-form request target.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// Host suitable for DNS lookup and TLS server names.
    pub fn connect_host(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    fn from_url(url: &Url) -> Result<Self, RelayError> {
        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(RelayError::InvalidTarget(format!(
                    "unsupported scheme `{other}`, expected http or https"
                )))
            }
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(RelayError::InvalidTarget("target has no host".to_string())),
        };

        Ok(Self {
            scheme,
            host,
            port: url.port().unwrap_or_else(|| scheme.default_port()),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
        })
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme.as_str(), self.authority(), self.path_and_query())
    }
}

/// Returns the raw (still encoded) target value, if any.
///
/// The first segment whose key is exactly `url` wins; its value extends to
/// the end of the query string.
fn raw_target(query: &str) -> Option<&str> {
    let mut offset = 0;
    for segment in query.split('&') {
        let (key, has_value) = match segment.split_once('=') {
            Some((key, _)) => (key, true),
            None => (segment, false),
        };
        if key == TARGET_PARAM {
            if !has_value {
                return Some("");
            }
            return Some(&query[offset + TARGET_PARAM.len() + 1..]);
        }
        offset += segment.len() + 1;
    }
    None
}

/// Resolve the relay destination from an inbound request's raw query string.
pub fn resolve_target(query: Option<&str>) -> Result<TargetDescriptor, RelayError> {
    let raw = query.and_then(raw_target).unwrap_or_default();
    if raw.is_empty() {
        return Err(RelayError::MissingTarget);
    }

    let decoded = urlencoding::decode(raw)
        .map_err(|e| RelayError::InvalidTarget(format!("target is not valid UTF-8: {e}")))?;
    if decoded.trim().is_empty() {
        return Err(RelayError::MissingTarget);
    }

    let url = Url::parse(&decoded)
        .map_err(|e| RelayError::InvalidTarget(format!("`{decoded}` is not an absolute URL: {e}")))?;

    TargetDescriptor::from_url(&url)
}
