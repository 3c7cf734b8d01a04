//! Composable middleware handlers.
//!
//! Handlers are tower layers over the boxed request/response service. They
//! attach to a [`crate::ClientConfig`] in an ordered chain: the first handler
//! registered is the outermost, seeing the request first and the response
//! last. Handlers compose freely with custom layers implementing
//! [`tower::Layer`] over [`crate::BoxedService`].

mod headers;
mod logging;

pub use headers::{SetDefaultHeaders, SetDefaultHeadersLayer};
pub use logging::{Logging, LoggingLayer};
