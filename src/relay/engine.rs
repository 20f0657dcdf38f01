//! Relay engine: sends the outbound request and hands back the filtered,
//! still-streaming origin response.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, Response};
use http_body::Body as HttpBody;
use hyper::body::Incoming;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::AbortHandle;

use crate::config::UpstreamConfig;
use crate::net::tls::TlsError;
use crate::relay::body::RelayBody;
use crate::relay::error::RelayError;
use crate::relay::filter::filter_response_headers;
use crate::relay::target::{Scheme, TargetDescriptor};
use crate::relay::transport::Transport;
use crate::resilience::timeouts;

/// Immutable after construction and shared by all requests.
#[derive(Clone)]
pub struct RelayEngine {
    transport: Transport,
    response_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
}

/// GET and HEAD never carry a body; neither does an inbound body that is
/// already finished.
fn outbound_body(method: &Method, body: Body) -> Body {
    if *method == Method::GET || *method == Method::HEAD || body.is_end_stream() {
        Body::empty()
    } else {
        body
    }
}

impl RelayEngine {
    pub fn new(config: &UpstreamConfig) -> Result<Self, TlsError> {
        Ok(Self {
            transport: Transport::new(config)?,
            response_timeout: timeouts::from_secs(config.response_timeout_secs),
            idle_timeout: timeouts::from_secs(config.idle_timeout_secs),
        })
    }

    /// Relay one request to `target`.
    ///
    /// `headers` must already be the outbound set. On success the response
    /// carries the origin status, filtered headers and a body that streams
    /// from the origin as the caller reads it.
    pub async fn relay(
        &self,
        method: Method,
        target: &TargetDescriptor,
        headers: HeaderMap,
        body: Body,
    ) -> Result<Response<Body>, RelayError> {
        let body = outbound_body(&method, body);
        let mut request = Request::builder()
            .method(method)
            .uri(target.path_and_query())
            .body(body)
            .map_err(|e| RelayError::InvalidTarget(format!("unusable request target: {e}")))?;
        *request.headers_mut() = headers;

        let (response, connection) = match target.scheme {
            Scheme::Http => {
                let io = self.transport.connect_plain(target).await?;
                self.exchange(io, request).await?
            }
            Scheme::Https => {
                let io = self.transport.connect_tls(target).await?;
                self.exchange(io, request).await?
            }
        };

        let (parts, incoming) = response.into_parts();
        tracing::debug!(upstream = %target.origin(), status = %parts.status, "Response head received");

        let body = RelayBody::new(incoming, Arc::from(target.origin()))
            .idle_timeout(self.idle_timeout)
            .connection(connection);

        let mut relayed = Response::new(Body::new(body));
        *relayed.status_mut() = parts.status;
        *relayed.headers_mut() = filter_response_headers(&parts.headers);
        Ok(relayed)
    }

    /// HTTP/1.1 exchange over an established connection.
    ///
    /// The connection is driven by its own task; the returned handle aborts
    /// it if the caller stops reading early.
    async fn exchange<IO>(
        &self,
        io: IO,
        request: Request<Body>,
    ) -> Result<(Response<Incoming>, AbortHandle), RelayError>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut sender, connection) = hyper::client::conn::http1::handshake(TokioIo::new(io))
            .await
            .map_err(RelayError::Transport)?;

        let task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::debug!(error = %e, "Upstream connection ended with error");
            }
        });
        let handle = task.abort_handle();

        let response = timeouts::with_deadline(self.response_timeout, "response head", async {
            sender.send_request(request).await.map_err(RelayError::Transport)
        })
        .await;

        match response {
            Ok(response) => Ok((response, handle)),
            Err(e) => {
                handle.abort();
                Err(e)
            }
        }
    }
}
