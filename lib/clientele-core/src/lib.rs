//! Core types and traits for the clientele HTTP client registry.
//!
//! This crate provides the foundational types used by clientele:
//! - [`Method`] - HTTP method enum
//! - [`HeaderList`] - insertion-ordered header collection
//! - [`Request`] and [`RequestBuilder`] - HTTP request types
//! - [`Response`] - HTTP response type
//! - [`Error`] and [`Result`] - Error handling
//! - [`HttpClient`] - Core client trait for HTTP execution
//! - [`PathTemplate`] - validated path templates for typed-client bindings
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)

mod body;
mod client;
mod error;
mod headers;
mod method;
mod path_template;
pub mod prelude;
mod request;
mod response;

pub use body::{from_json, to_json};
pub use client::{HttpClient, HttpClientExt};
pub use error::{Error, Result};
pub use headers::HeaderList;
pub use method::Method;
pub use path_template::PathTemplate;
pub use request::{Request, RequestBuilder};
pub use response::Response;

// Re-export http crate types for status codes and headers
pub use http::{StatusCode, header};
