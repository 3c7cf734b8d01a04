//! Typed clients binding named endpoints to path templates.
//!
//! A [`TypedClientSpec`] declares a fixed set of endpoints, each a method
//! plus a validated path template. Templates are parsed at registration time,
//! so malformed bindings fail before any request is dispatched. Calls through
//! a [`TypedClient`] render the template, resolve it against the client's
//! base URL, and go through the client's full handler and policy chain.
//!
//! # Example
//!
//! ```ignore
//! use clientele::{Binding, Method, TypedClientSpec};
//!
//! let spec = TypedClientSpec::new()
//!     .endpoint("get_item", Binding::new(Method::Get, "/items/{id}")?)?
//!     .endpoint("create_item", Binding::new(Method::Post, "/items")?)?;
//!
//! let registry = RegistryBuilder::new()
//!     .register_typed("inventory", config, spec)?
//!     .build();
//!
//! let client = ClientFactory::new(registry).typed_client("inventory")?;
//! let item: Item = client.call("get_item", &[("id", "42")]).await?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use clientele_core::PathTemplate;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::factory::Client;
use crate::{Error, Method, Response, Result};

/// One endpoint: a method, a path template, and its success criteria.
#[derive(Debug, Clone)]
pub struct Binding {
    method: Method,
    template: PathTemplate,
    extra_success: Vec<u16>,
}

impl Binding {
    /// Bind a method to a path template such as `/items/{id}`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] if the template is malformed.
    pub fn new(method: Method, template: &str) -> Result<Self> {
        Ok(Self {
            method,
            template: PathTemplate::parse(template)?,
            extra_success: Vec::new(),
        })
    }

    /// Treat an additional status code as success (e.g. 404 for lookups
    /// where absence is a valid answer).
    #[must_use]
    pub fn treat_as_success(mut self, status: u16) -> Self {
        self.extra_success.push(status);
        self
    }

    /// Template parameter names, in order of appearance.
    #[must_use]
    pub fn params(&self) -> &[String] {
        self.template.params()
    }

    fn accepts(&self, status: u16) -> bool {
        (200..300).contains(&status) || self.extra_success.contains(&status)
    }
}

/// Declarative endpoint set for a typed client.
#[derive(Debug, Clone, Default)]
pub struct TypedClientSpec {
    endpoints: HashMap<String, Binding>,
}

impl TypedClientSpec {
    /// Create an empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] if the endpoint name is already
    /// bound.
    pub fn endpoint(mut self, name: impl Into<String>, binding: Binding) -> Result<Self> {
        let name = name.into();
        if self.endpoints.contains_key(&name) {
            return Err(Error::invalid_request(format!(
                "endpoint '{name}' is already bound"
            )));
        }
        self.endpoints.insert(name, binding);
        Ok(self)
    }

    fn binding(&self, name: &str) -> Result<&Binding> {
        self.endpoints
            .get(name)
            .ok_or_else(|| Error::invalid_request(format!("unknown endpoint '{name}'")))
    }

    /// Endpoint names, in no particular order.
    pub fn endpoints(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

/// Strongly-typed facade over a composed client.
///
/// Cheap to clone; clones share the underlying client and endpoint spec.
#[derive(Clone)]
pub struct TypedClient {
    inner: Client,
    spec: Arc<TypedClientSpec>,
}

impl std::fmt::Debug for TypedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut endpoints: Vec<&str> = self.spec.endpoints().collect();
        endpoints.sort_unstable();
        f.debug_struct("TypedClient")
            .field("client", &self.inner.name())
            .field("endpoints", &endpoints)
            .finish()
    }
}

impl TypedClient {
    pub(crate) fn new(inner: Client, spec: Arc<TypedClientSpec>) -> Self {
        Self { inner, spec }
    }

    /// The underlying named client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.inner
    }

    /// Invoke an endpoint and return the raw response.
    ///
    /// Non-success statuses outside the binding's accepted set surface as
    /// [`Error::Http`], carrying the response body for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown endpoints, template parameter mismatches,
    /// transport failures, or rejected statuses.
    pub async fn send(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        body: Option<Bytes>,
    ) -> Result<Response<Bytes>> {
        let binding = self.spec.binding(endpoint)?;
        let path = binding.template.render(params)?;

        let mut builder = self.inner.request(binding.method, &path)?;
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = self.inner.execute(builder.build()).await?;
        if binding.accepts(response.status()) {
            Ok(response)
        } else {
            let status = response.status();
            Err(Error::http_with_body(
                status,
                format!("endpoint '{endpoint}' returned status {status}"),
                response.into_body(),
            ))
        }
    }

    /// Invoke an endpoint and deserialize the JSON response.
    ///
    /// # Errors
    ///
    /// As [`TypedClient::send`], plus [`Error::JsonDeserialization`] when the
    /// body does not match `R`.
    pub async fn call<R: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<R> {
        self.send(endpoint, params, None).await?.json()
    }

    /// Invoke an endpoint with a JSON body and deserialize the JSON response.
    ///
    /// # Errors
    ///
    /// As [`TypedClient::call`], plus serialization errors for `body`.
    pub async fn call_with_body<T, R>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        body: &T,
    ) -> Result<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned,
    {
        let binding = self.spec.binding(endpoint)?;
        let path = binding.template.render(params)?;

        let request = self
            .inner
            .request(binding.method, &path)?
            .json(body)?
            .build();

        let response = self.inner.execute(request).await?;
        if binding.accepts(response.status()) {
            response.json()
        } else {
            let status = response.status();
            Err(Error::http_with_body(
                status,
                format!("endpoint '{endpoint}' returned status {status}"),
                response.into_body(),
            ))
        }
    }
}
