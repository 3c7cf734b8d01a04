//! Pooled HTTP transport built on hyper-util.
//!
//! A [`HyperTransport`] is the innermost link of every composed client: it
//! owns a hyper connection pool and translates between clientele request and
//! response types and hyper's. The factory recycles transports once their
//! configured lifetime window elapses.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::{Error, HeaderList, Request, Response, Result, config::ClientConfig, connector::https_connector};

/// Type-erased service for middleware composition.
///
/// This type allows storing and composing arbitrary Tower layers without
/// exposing complex generic types to users.
pub type BoxedService = BoxCloneService<Request<Bytes>, Response<Bytes>, Error>;

/// Future type for Tower Service implementations.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response<Bytes>>> + Send + 'static>>;

/// Thread-safe wrapper for [`BoxedService`].
///
/// Uses a Mutex to make the composed service `Sync`, which the
/// [`clientele_core::HttpClient`] trait requires.
#[derive(Clone)]
pub(crate) struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    pub(crate) fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    pub(crate) fn call(&self, request: Request<Bytes>) -> ServiceFuture {
        // Lock, clone the service, and release the lock immediately
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        Box::pin(async move { service.call(request).await })
    }
}

/// Pooled HTTP transport over a rustls connector.
///
/// Cheap to clone; clones share the same underlying connection pool, so
/// concurrent requests against the same configuration reuse connections.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    request_timeout: std::time::Duration,
}

impl std::fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperTransport")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Create a transport with pool tuning from the given configuration.
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool_idle_timeout())
            .pool_max_idle_per_host(config.pool_idle_per_host())
            .build(https_connector());

        Self {
            inner,
            request_timeout: config.request_timeout(),
        }
    }

    /// Build a hyper request from a clientele request.
    fn build_hyper_request(request: Request<Bytes>) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, headers, body) = request.into_parts();

        let mut builder = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str());

        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }

        let body = body.map_or_else(Full::default, Full::new);
        builder
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    /// Extract response headers preserving wire order.
    fn extract_headers(headers: &http::HeaderMap) -> HeaderList {
        let mut list = HeaderList::new();
        for (name, value) in headers {
            if let Ok(value) = value.to_str() {
                list.append(name.to_string(), value.to_string());
            }
        }
        list
    }

    async fn dispatch(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let hyper_request = Self::build_hyper_request(request)?;

        let response =
            tokio::time::timeout(self.request_timeout, self.inner.request(hyper_request))
                .await
                .map_err(|_| Error::Timeout)?
                .map_err(Self::map_hyper_error)?;

        let status = response.status().as_u16();
        let response_headers = Self::extract_headers(response.headers());

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::connection(e.to_string()))?
            .to_bytes();

        Ok(Response::new(status, response_headers, body))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = err.to_string();

        if err.is_connect() {
            return Error::connection(msg);
        }

        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

impl Service<Request<Bytes>> for HyperTransport {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let transport = self.clone();
        Box::pin(async move { transport.dispatch(request).await })
    }
}

impl clientele_core::HttpClient for HyperTransport {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.dispatch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;

    #[test]
    fn transport_from_config() {
        let base = url::Url::parse("https://api.example.com").expect("url");
        let config = ClientConfig::builder(base).build();
        let transport = HyperTransport::new(&config);

        assert_eq!(transport.request_timeout, config.request_timeout());
        let _cloned = transport.clone();
    }

    #[test]
    fn hyper_request_carries_headers_in_order() {
        let url = url::Url::parse("https://api.example.com/items").expect("url");
        let request = Request::builder(Method::Get, url)
            .header("X-A", "1")
            .header("X-B", "2")
            .build();

        let hyper_request = HyperTransport::build_hyper_request(request).expect("build");
        let names: Vec<&str> = hyper_request
            .headers()
            .keys()
            .map(http::HeaderName::as_str)
            .collect();
        assert_eq!(names, vec!["x-a", "x-b"]);
    }
}
