//! Request/response logging middleware.

use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use tower::Layer;
use tower_service::Service;
use tracing::{Instrument, Level, info, span, warn};

use crate::transport::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Layer that logs each dispatched request with its outcome and latency.
///
/// # Example
///
/// ```ignore
/// use clientele::{ClientConfig, middleware::LoggingLayer};
///
/// let config = ClientConfig::builder(base_url)
///     .handler(LoggingLayer::new("github"))
///     .build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct LoggingLayer {
    client: String,
}

impl LoggingLayer {
    /// Create a logging layer tagged with the client name.
    #[must_use]
    pub fn new(client: impl Into<String>) -> Self {
        Self {
            client: client.into(),
        }
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            client: self.client.clone(),
        }
    }
}

/// Service that logs requests and responses.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    client: String,
}

impl<S> Service<Request<Bytes>> for Logging<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let method = request.method();
        let url = request.url().to_string();
        let span = span!(Level::INFO, "http_request", client = %self.client, %method, %url);

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let start = Instant::now();
                let result = inner.call(request).await;
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        if response.is_success() {
                            info!(status, elapsed_ms, "request completed");
                        } else {
                            warn!(status, elapsed_ms, "request failed with HTTP error");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, elapsed_ms, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
