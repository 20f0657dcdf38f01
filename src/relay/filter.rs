//! Response header filtering.
//!
//! Decides, per origin header, whether it reaches the caller, then layers
//! the fixed CORS set on top.

use axum::http::{header::CONTENT_ENCODING, HeaderMap};

use crate::http::cors::apply_cors;
use crate::security::headers::{is_hop_by_hop, is_response_security};

fn is_dropped(name: &str) -> bool {
    // accept-encoding is stripped outbound, so this only drops stray labels.
    name.eq_ignore_ascii_case(CONTENT_ENCODING.as_str())
        || is_hop_by_hop(name)
        || is_response_security(name)
}

/// Build the caller-facing header map from the origin's response headers.
pub fn filter_response_headers(origin: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(origin.len() + 4);
    for (name, value) in origin {
        if is_dropped(name.as_str()) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }
    apply_cors(&mut headers);
    headers
}
