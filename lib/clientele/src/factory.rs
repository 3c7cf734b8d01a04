//! Client factory: composes handler chains over pooled transports.
//!
//! A [`ClientFactory`] owns a frozen [`ClientRegistry`] plus the two pieces
//! of state that must outlive individual client handles: the pooled
//! transports (recycled after each configuration's handler lifetime) and the
//! circuit-breaker registry (so breaker counters survive re-composition).
//!
//! [`ClientFactory::client`] composes a fresh chain per call:
//!
//! ```text
//! policy wrapper -> default headers -> handlers (first = outermost) -> transport
//! ```
//!
//! Handles are cheap; the expensive part (the connection pool) is shared.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;
use tower::Layer;
use tower::util::BoxCloneService;
use url::Url;

use crate::config::ClientConfig;
use crate::middleware::SetDefaultHeadersLayer;
use crate::policy::{BreakerRegistry, PolicyLayer};
use crate::registry::ClientRegistry;
use crate::transport::{BoxedService, HyperTransport, SyncService};
use crate::typed::TypedClient;
use crate::{Error, Method, Request, RequestBuilder, Response, Result};

struct TransportEntry {
    transport: HyperTransport,
    created_at: Instant,
}

/// Factory producing composed clients from a registry.
///
/// # Example
///
/// ```ignore
/// use clientele::{ClientFactory, RegistryBuilder};
///
/// let registry = RegistryBuilder::new()
///     .register("github", github_config)?
///     .build();
/// let factory = ClientFactory::new(registry);
///
/// let github = factory.client("github")?;
/// let response = github.get("/users/octocat").await?;
/// ```
pub struct ClientFactory {
    registry: ClientRegistry,
    transports: Mutex<HashMap<String, TransportEntry>>,
    breakers: BreakerRegistry,
}

impl std::fmt::Debug for ClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientFactory")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ClientFactory {
    /// Create a factory over a frozen registry.
    #[must_use]
    pub fn new(registry: ClientRegistry) -> Self {
        Self {
            registry,
            transports: Mutex::new(HashMap::new()),
            breakers: BreakerRegistry::new(),
        }
    }

    /// The registry this factory serves.
    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Compose a client for a registered name.
    ///
    /// Each call returns a fresh handle; the pooled transport underneath is
    /// shared and recycled per the configuration's handler lifetime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] for unknown names.
    pub fn client(&self, name: &str) -> Result<Client> {
        let entry = self.registry.entry(name)?;
        let service = self.compose(name, &entry.config);

        Ok(Client {
            name: Arc::from(name),
            base_url: entry.config.base_url().clone(),
            service,
        })
    }

    /// Compose a typed client for a name registered with an endpoint spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] for unknown names and
    /// [`Error::InvalidRequest`] when the client has no endpoint spec.
    pub fn typed_client(&self, name: &str) -> Result<TypedClient> {
        let entry = self.registry.entry(name)?;
        let spec = entry.typed.clone().ok_or_else(|| {
            Error::invalid_request(format!("client '{name}' has no typed endpoint specification"))
        })?;

        let client = self.client(name)?;
        Ok(TypedClient::new(client, spec))
    }

    /// Drop the cached transport for a client, forcing the next composition
    /// to build a fresh connection pool.
    pub fn invalidate(&self, name: &str) {
        let mut transports = self
            .transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if transports.remove(name).is_some() {
            tracing::debug!(client = name, "transport invalidated");
        }
    }

    /// Reuse the cached transport while its lifetime window holds, rebuild
    /// otherwise. The lock serializes creation, so concurrent callers racing
    /// past an expired entry all receive the winner's instance.
    fn transport_for(&self, name: &str, config: &ClientConfig) -> HyperTransport {
        let mut transports = self
            .transports
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(entry) = transports.get(name) {
            if entry.created_at.elapsed() < config.handler_lifetime() {
                return entry.transport.clone();
            }
            tracing::debug!(client = name, "transport lifetime elapsed, recycling");
        } else {
            tracing::debug!(client = name, "transport created");
        }

        let transport = HyperTransport::new(config);
        transports.insert(
            name.to_string(),
            TransportEntry {
                transport: transport.clone(),
                created_at: Instant::now(),
            },
        );
        transport
    }

    fn compose(&self, name: &str, config: &ClientConfig) -> SyncService {
        let transport = self.transport_for(name, config);
        let mut service: BoxedService = BoxCloneService::new(transport);

        // Wrap innermost-first so the first registered handler ends up
        // outermost: it sees the request first and the response last.
        for handler in config.handlers().iter().rev() {
            service = handler(service);
        }

        if !config.default_headers().is_empty() {
            let layer = SetDefaultHeadersLayer::new(config.default_headers().clone());
            service = BoxCloneService::new(layer.layer(service));
        }

        // A dynamic selector takes precedence over a static policy.
        let policy_layer = match (config.policy_selector(), config.policy()) {
            (Some(selector), _) => Some(PolicyLayer::dynamic(Arc::clone(selector))),
            (None, Some(spec)) => Some(PolicyLayer::new(spec.clone())),
            (None, None) => None,
        };
        if let Some(layer) = policy_layer {
            let layer = layer.scoped(name, self.breakers.clone());
            service = BoxCloneService::new(layer.layer(service));
        }

        SyncService::new(service)
    }
}

/// A composed client handle bound to one registered configuration.
///
/// Cheap to clone; clones share the composed chain and its transport.
#[derive(Clone)]
pub struct Client {
    name: Arc<str>,
    base_url: Url,
    service: SyncService,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// The registered name this client was composed for.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base URL requests resolve against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Start a request for a path relative to the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the path does not resolve.
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let url = self.base_url.join(path)?;
        Ok(Request::builder(method, url))
    }

    /// Dispatch a request through the composed chain.
    ///
    /// # Errors
    ///
    /// Surfaces transport, policy, and middleware errors.
    pub async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.service.call(request).await
    }

    /// Dispatch a request, abandoning it when `cancel` resolves first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] when the cancel future wins the race.
    pub async fn execute_with_cancel(
        &self,
        request: Request<Bytes>,
        cancel: impl Future<Output = ()> + Send,
    ) -> Result<Response<Bytes>> {
        let dispatch = self.service.call(request);
        tokio::pin!(cancel);

        tokio::select! {
            result = dispatch => result,
            () = &mut cancel => Err(Error::Cancelled),
        }
    }

    /// Dispatch a one-off request described by its parts.
    ///
    /// # Errors
    ///
    /// Surfaces URL resolution and dispatch errors.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        headers: impl IntoIterator<Item = (String, String)>,
        body: Option<Bytes>,
    ) -> Result<Response<Bytes>> {
        let mut builder = self.request(method, path)?.headers(headers);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        self.execute(builder.build()).await
    }

    /// GET a path relative to the base URL.
    ///
    /// # Errors
    ///
    /// Surfaces URL resolution and dispatch errors.
    pub async fn get(&self, path: &str) -> Result<Response<Bytes>> {
        let request = self.request(Method::Get, path)?.build();
        self.execute(request).await
    }

    /// POST a JSON body to a path relative to the base URL.
    ///
    /// # Errors
    ///
    /// Surfaces serialization, URL resolution, and dispatch errors.
    pub async fn post_json<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response<Bytes>> {
        let request = self.request(Method::Post, path)?.json(body)?.build();
        self.execute(request).await
    }

    /// DELETE a path relative to the base URL.
    ///
    /// # Errors
    ///
    /// Surfaces URL resolution and dispatch errors.
    pub async fn delete(&self, path: &str) -> Result<Response<Bytes>> {
        let request = self.request(Method::Delete, path)?.build();
        self.execute(request).await
    }
}

impl clientele_core::HttpClient for Client {
    async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        self.service.call(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;

    fn factory() -> ClientFactory {
        let base = Url::parse("https://api.example.com").expect("valid url");
        let registry = RegistryBuilder::new()
            .register("github", ClientConfig::builder(base).build())
            .expect("register")
            .build();
        ClientFactory::new(registry)
    }

    #[test]
    fn client_for_registered_name() {
        let factory = factory();
        let client = factory.client("github").expect("client");

        assert_eq!(client.name(), "github");
        assert_eq!(client.base_url().as_str(), "https://api.example.com/");
    }

    #[test]
    fn unknown_name_fails() {
        let factory = factory();
        let err = factory.client("nope").expect_err("missing");
        assert!(matches!(err, Error::ConfigurationMissing { name } if name == "nope"));
    }

    #[test]
    fn typed_client_requires_spec() {
        let factory = factory();
        let err = factory.typed_client("github").expect_err("no spec");
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn request_resolves_relative_path() {
        let factory = factory();
        let client = factory.client("github").expect("client");

        let request = client
            .request(Method::Get, "/users/octocat")
            .expect("request")
            .build();
        assert_eq!(
            request.url().as_str(),
            "https://api.example.com/users/octocat"
        );
    }

    #[test]
    fn invalidate_unknown_name_is_noop() {
        let factory = factory();
        factory.invalidate("nope");
    }
}
