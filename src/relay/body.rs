//! Streaming relay of the origin response body.
//!
//! # Responsibilities
//! - Pass origin frames to the caller one by one, never buffering the body
//! - Convert an origin read failure into a body error so the server aborts
//!   the caller connection instead of ending the response cleanly
//! - Enforce the optional idle timeout between frames
//! - Tear down the outbound connection when the caller goes away

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use tokio::task::AbortHandle;
use tokio::time::{Instant, Sleep};

use crate::observability::metrics;
use crate::relay::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Streaming,
    Complete,
    Failed,
}

struct IdleTimer {
    limit: Duration,
    sleep: Pin<Box<Sleep>>,
}

impl IdleTimer {
    fn new(limit: Duration) -> Self {
        Self {
            limit,
            sleep: Box::pin(tokio::time::sleep(limit)),
        }
    }

    fn reset(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.limit);
    }
}

/// Caller-facing body wrapping the origin's response body.
pub struct RelayBody<B: Body> {
    inner: Pin<Box<B>>,
    idle: Option<IdleTimer>,
    connection: Option<AbortHandle>,
    target: Arc<str>,
    relayed: u64,
    state: StreamState,
}

impl<B> RelayBody<B>
where
    B: Body<Data = Bytes>,
{
    pub fn new(inner: B, target: Arc<str>) -> Self {
        Self {
            inner: Box::pin(inner),
            idle: None,
            connection: None,
            target,
            relayed: 0,
            state: StreamState::Streaming,
        }
    }

    /// Fail the stream when no frame arrives within `limit`.
    pub fn idle_timeout(mut self, limit: Option<Duration>) -> Self {
        self.idle = limit.map(IdleTimer::new);
        self
    }

    /// Connection task to abort when the stream ends abnormally.
    pub fn connection(mut self, handle: AbortHandle) -> Self {
        self.connection = Some(handle);
        self
    }

    /// Bytes handed to the caller so far.
    pub fn relayed(&self) -> u64 {
        self.relayed
    }

    fn fail(&mut self, error: RelayError) -> Poll<Option<Result<Frame<Bytes>, RelayError>>> {
        self.state = StreamState::Failed;
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        tracing::warn!(
            upstream = %self.target,
            relayed = self.relayed,
            error = %error,
            "Aborting response stream"
        );
        metrics::record_stream_outcome(error.kind(), self.relayed);
        Poll::Ready(Some(Err(error)))
    }
}

impl<B> Body for RelayBody<B>
where
    B: Body<Data = Bytes>,
    B::Error: std::fmt::Display,
{
    type Data = Bytes;
    type Error = RelayError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        if this.state != StreamState::Streaming {
            return Poll::Ready(None);
        }

        match this.inner.as_mut().poll_frame(cx) {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.relayed += data.len() as u64;
                }
                if let Some(idle) = this.idle.as_mut() {
                    idle.reset();
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Poll::Ready(Some(Err(e))) => this.fail(RelayError::UpstreamMidStream(e.to_string())),
            Poll::Ready(None) => {
                this.state = StreamState::Complete;
                tracing::debug!(upstream = %this.target, bytes = this.relayed, "Response stream complete");
                metrics::record_stream_outcome("complete", this.relayed);
                Poll::Ready(None)
            }
            Poll::Pending => {
                let elapsed = match this.idle.as_mut() {
                    Some(idle) => idle.sleep.as_mut().poll(cx).is_ready().then_some(idle.limit),
                    None => None,
                };
                match elapsed {
                    Some(after) => this.fail(RelayError::UpstreamTimeout {
                        phase: "response body",
                        after,
                    }),
                    None => Poll::Pending,
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.state != StreamState::Streaming || self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl<B: Body> Drop for RelayBody<B> {
    fn drop(&mut self) {
        if self.state != StreamState::Streaming || self.inner.is_end_stream() {
            return;
        }
        if let Some(connection) = self.connection.take() {
            connection.abort();
        }
        let reason = RelayError::ClientDisconnected;
        tracing::debug!(
            upstream = %self.target,
            relayed = self.relayed,
            reason = %reason,
            "Response stream dropped before completion"
        );
        metrics::record_stream_outcome(reason.kind(), self.relayed);
    }
}
