//! HTTP client registry with named clients, typed clients, composable
//! middleware, and fault-tolerance policies.
//!
//! Client configurations are declared once in a registry, then a factory
//! composes them on demand: a policy wrapper around default headers, an
//! ordered handler chain, and a pooled transport that the factory recycles
//! on a configurable lifetime.
//!
//! # Example
//!
//! ```ignore
//! use clientele::prelude::*;
//! use clientele::policy::PolicySpec;
//!
//! let config = ClientConfig::builder("https://api.github.com".parse()?)
//!     .default_header("Accept", "application/vnd.github.v3+json")
//!     .default_header("User-Agent", "clientele-demo")
//!     .policy(PolicySpec::retry(3))
//!     .build();
//!
//! let registry = RegistryBuilder::new()
//!     .register("github", config)?
//!     .build();
//! let factory = ClientFactory::new(registry);
//!
//! let github = factory.client("github")?;
//! let response = github.get("/users/octocat").await?;
//! ```

mod config;
mod connector;
mod factory;
pub mod middleware;
pub mod policy;
pub mod prelude;
mod registry;
mod transport;
mod typed;

pub use config::{
    ClientConfig, ClientConfigBuilder, DEFAULT_HANDLER_LIFETIME, DEFAULT_POOL_IDLE_PER_HOST,
    DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_REQUEST_TIMEOUT,
};
pub use factory::{Client, ClientFactory};
pub use registry::{ClientRegistry, RegistryBuilder};
pub use transport::{BoxedService, HyperTransport, ServiceFuture};
pub use typed::{Binding, TypedClient, TypedClientSpec};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use clientele_core::{
    Error, HeaderList, HttpClient, HttpClientExt, Method, PathTemplate, Request, RequestBuilder,
    Response, Result, from_json, to_json,
};

// Re-export http types for status codes and headers
pub use clientele_core::{StatusCode, header};

pub use url;
