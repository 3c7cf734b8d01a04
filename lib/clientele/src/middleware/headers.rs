//! Default request headers middleware.

use std::task::{Context, Poll};

use bytes::Bytes;
use tower::Layer;
use tower_service::Service;

use crate::{HeaderList, Request};

/// Layer that stamps default headers on outgoing requests.
///
/// Headers are applied in their configured order, and only when the request
/// does not already carry a header with the same name (case-insensitive), so
/// per-request values always win over defaults.
#[derive(Debug, Clone, Default)]
pub struct SetDefaultHeadersLayer {
    headers: HeaderList,
}

impl SetDefaultHeadersLayer {
    /// Create a layer applying the given defaults.
    #[must_use]
    pub fn new(headers: HeaderList) -> Self {
        Self { headers }
    }
}

impl<S> Layer<S> for SetDefaultHeadersLayer {
    type Service = SetDefaultHeaders<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SetDefaultHeaders {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Service applying default headers before delegating.
#[derive(Debug, Clone)]
pub struct SetDefaultHeaders<S> {
    inner: S,
    headers: HeaderList,
}

impl<S> Service<Request<Bytes>> for SetDefaultHeaders<S>
where
    S: Service<Request<Bytes>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), S::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        for (name, value) in self.headers.iter() {
            if !request.headers().contains(name) {
                request.headers_mut().append(name, value);
            }
        }
        self.inner.call(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Method};
    use std::future::{Ready, ready};

    #[derive(Debug, Clone)]
    struct Capture;

    impl Service<Request<Bytes>> for Capture {
        type Response = Request<Bytes>;
        type Error = Error;
        type Future = Ready<Result<Request<Bytes>, Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request<Bytes>) -> Self::Future {
            ready(Ok(request))
        }
    }

    fn request() -> Request<Bytes> {
        let url = url::Url::parse("https://example.com/items").expect("url");
        Request::builder(Method::Get, url)
            .header("Accept", "text/plain")
            .build()
    }

    #[tokio::test]
    async fn applies_missing_headers_in_order() {
        let mut defaults = HeaderList::new();
        defaults.append("Accept", "application/json");
        defaults.append("User-Agent", "clientele-tests");

        let mut service = SetDefaultHeadersLayer::new(defaults).layer(Capture);
        let seen = service.call(request()).await.expect("call");

        // Request value wins over the default, case-insensitively
        assert_eq!(seen.headers().get("accept"), Some("text/plain"));
        assert_eq!(seen.headers().get("User-Agent"), Some("clientele-tests"));
    }

    #[derive(Debug, Clone)]
    struct StringErrorInner;

    impl Service<Request<Bytes>> for StringErrorInner {
        type Response = Request<Bytes>;
        type Error = String;
        type Future = Ready<Result<Request<Bytes>, String>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), String>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, request: Request<Bytes>) -> Self::Future {
            ready(Ok(request))
        }
    }

    #[tokio::test]
    async fn layer_passes_through_foreign_error_types() {
        let mut defaults = HeaderList::new();
        defaults.append("Accept", "application/json");

        let mut service = SetDefaultHeadersLayer::new(defaults).layer(StringErrorInner);
        let seen = service.call(request()).await.expect("call");

        assert_eq!(seen.headers().get("User-Agent"), None);
        assert_eq!(seen.headers().get("accept"), Some("text/plain"));
    }
}
