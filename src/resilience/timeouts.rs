//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream phases (connect, response head) with an optional deadline
//! - Turn an elapsed deadline into `RelayError::UpstreamTimeout`
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A zero-second configuration disables the deadline

use std::future::Future;
use std::time::Duration;

use crate::relay::error::RelayError;

/// Convert a configured number of seconds into an optional deadline.
pub fn from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Run `fut`, failing with `UpstreamTimeout` if `limit` elapses first.
pub async fn with_deadline<F, T>(
    limit: Option<Duration>,
    phase: &'static str,
    fut: F,
) -> Result<T, RelayError>
where
    F: Future<Output = Result<T, RelayError>>,
{
    match limit {
        Some(after) => tokio::time::timeout(after, fut)
            .await
            .map_err(|_| RelayError::UpstreamTimeout { phase, after })?,
        None => fut.await,
    }
}
