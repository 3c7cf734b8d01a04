//! Per-client configuration.
//!
//! A [`ClientConfig`] is the immutable recipe a factory composes a client
//! from: base URL, default headers, an ordered handler chain, an optional
//! fault-tolerance policy, and transport tuning. Configurations are built
//! once at registration time and never mutated afterwards.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tower::Layer;
use tower::util::BoxCloneService;
use tower_service::Service;
use url::Url;

use crate::policy::{PolicySelector, PolicySpec};
use crate::transport::BoxedService;
use crate::{Error, HeaderList, Request, Response};

/// Default transport lifetime before the factory recycles pooled connections.
pub const DEFAULT_HANDLER_LIFETIME: Duration = Duration::from_secs(120);

/// Default per-request timeout applied at the transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default idle timeout for pooled connections.
pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Default maximum idle connections kept per host.
pub const DEFAULT_POOL_IDLE_PER_HOST: usize = 32;

/// Type-erased middleware constructor.
///
/// Stored instead of the layer itself so heterogeneous layers fit in one
/// ordered list; each entry wraps the service below it.
pub(crate) type HandlerFn = Arc<dyn Fn(BoxedService) -> BoxedService + Send + Sync>;

/// Immutable configuration for a named client.
///
/// # Example
///
/// ```ignore
/// use clientele::ClientConfig;
/// use clientele::policy::PolicySpec;
///
/// let config = ClientConfig::builder("https://api.github.com".parse()?)
///     .default_header("Accept", "application/vnd.github.v3+json")
///     .default_header("User-Agent", "clientele-demo")
///     .policy(PolicySpec::retry(3))
///     .build();
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    base_url: Url,
    default_headers: HeaderList,
    handlers: Vec<HandlerFn>,
    policy: Option<PolicySpec>,
    policy_selector: Option<PolicySelector>,
    handler_lifetime: Duration,
    request_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_idle_per_host: usize,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url.as_str())
            .field("default_headers", &self.default_headers)
            .field("handlers", &self.handlers.len())
            .field("policy", &self.policy)
            .field("has_policy_selector", &self.policy_selector.is_some())
            .field("handler_lifetime", &self.handler_lifetime)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl ClientConfig {
    /// Start building a configuration rooted at `base_url`.
    #[must_use]
    pub fn builder(base_url: Url) -> ClientConfigBuilder {
        ClientConfigBuilder {
            base_url,
            default_headers: HeaderList::new(),
            handlers: Vec::new(),
            policy: None,
            policy_selector: None,
            handler_lifetime: DEFAULT_HANDLER_LIFETIME,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
            pool_idle_per_host: DEFAULT_POOL_IDLE_PER_HOST,
        }
    }

    /// Base URL all requests for this client resolve against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Headers applied to every request unless already present.
    #[must_use]
    pub fn default_headers(&self) -> &HeaderList {
        &self.default_headers
    }

    pub(crate) fn handlers(&self) -> &[HandlerFn] {
        &self.handlers
    }

    /// Static fault-tolerance policy, if any.
    #[must_use]
    pub fn policy(&self) -> Option<&PolicySpec> {
        self.policy.as_ref()
    }

    pub(crate) fn policy_selector(&self) -> Option<&PolicySelector> {
        self.policy_selector.as_ref()
    }

    /// How long a composed transport is reused before recycling.
    #[must_use]
    pub fn handler_lifetime(&self) -> Duration {
        self.handler_lifetime
    }

    /// Per-request timeout at the transport.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Idle timeout for pooled connections.
    #[must_use]
    pub fn pool_idle_timeout(&self) -> Duration {
        self.pool_idle_timeout
    }

    /// Maximum idle pooled connections per host.
    #[must_use]
    pub fn pool_idle_per_host(&self) -> usize {
        self.pool_idle_per_host
    }

    /// Resolve a request path against the base URL.
    pub fn resolve(&self, path: &str) -> Result<Url, Error> {
        self.base_url.join(path).map_err(Error::from)
    }
}

/// Builder for [`ClientConfig`].
pub struct ClientConfigBuilder {
    base_url: Url,
    default_headers: HeaderList,
    handlers: Vec<HandlerFn>,
    policy: Option<PolicySpec>,
    policy_selector: Option<PolicySelector>,
    handler_lifetime: Duration,
    request_timeout: Duration,
    pool_idle_timeout: Duration,
    pool_idle_per_host: usize,
}

impl std::fmt::Debug for ClientConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfigBuilder")
            .field("base_url", &self.base_url.as_str())
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl ClientConfigBuilder {
    /// Add a default header.
    ///
    /// Default headers are applied in insertion order, and only when the
    /// outgoing request does not already carry a header with the same name.
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.append(name, value);
        self
    }

    /// Add several default headers at once.
    #[must_use]
    pub fn default_headers(
        mut self,
        headers: impl IntoIterator<Item = (String, String)>,
    ) -> Self {
        self.default_headers.extend(headers);
        self
    }

    /// Append a middleware handler to the chain.
    ///
    /// The first handler added is the outermost: it sees the request first
    /// and the response last.
    #[must_use]
    pub fn handler<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<Request<Bytes>>>::Future: Send + 'static,
    {
        self.handlers.push(Arc::new(move |service| {
            BoxCloneService::new(layer.layer(service))
        }));
        self
    }

    /// Attach a static fault-tolerance policy wrapping the whole chain.
    #[must_use]
    pub fn policy(mut self, spec: PolicySpec) -> Self {
        self.policy = Some(spec);
        self
    }

    /// Attach a per-request policy selector.
    ///
    /// When both a static policy and a selector are configured, the selector
    /// wins.
    ///
    /// The factory keeps one circuit-breaker state per distinct breaker
    /// configuration for its whole lifetime, so selectors should pick breaker
    /// configurations from a fixed set rather than compute them from
    /// unbounded request data.
    #[must_use]
    pub fn policy_selector(mut self, selector: PolicySelector) -> Self {
        self.policy_selector = Some(selector);
        self
    }

    /// Override the transport recycling window.
    #[must_use]
    pub fn handler_lifetime(mut self, lifetime: Duration) -> Self {
        self.handler_lifetime = lifetime;
        self
    }

    /// Override the per-request transport timeout.
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Override the idle timeout for pooled connections.
    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    /// Override the maximum idle pooled connections per host.
    #[must_use]
    pub fn pool_idle_per_host(mut self, max: usize) -> Self {
        self.pool_idle_per_host = max;
        self
    }

    /// Finalize the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        ClientConfig {
            base_url: self.base_url,
            default_headers: self.default_headers,
            handlers: self.handlers,
            policy: self.policy,
            policy_selector: self.policy_selector,
            handler_lifetime: self.handler_lifetime,
            request_timeout: self.request_timeout,
            pool_idle_timeout: self.pool_idle_timeout,
            pool_idle_per_host: self.pool_idle_per_host,
        }
    }
}
