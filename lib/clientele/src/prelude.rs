//! Prelude module for convenient imports.
//!
//! Re-exports the most commonly used types for easy glob importing:
//!
//! ```ignore
//! use clientele::prelude::*;
//! ```

pub use crate::{
    Binding, Client, ClientConfig, ClientFactory, ClientRegistry, Error, HeaderList, HttpClient,
    HttpClientExt, Method, Request, RequestBuilder, RegistryBuilder, Response, Result, StatusCode,
    TypedClient, TypedClientSpec, from_json, header, to_json,
};
pub use serde::{Deserialize, Serialize};
