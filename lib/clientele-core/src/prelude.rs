//! Convenience re-exports for common usage.

pub use crate::{
    Error, HeaderList, HttpClient, HttpClientExt, Method, PathTemplate, Request, RequestBuilder,
    Response, Result, from_json, to_json,
};
