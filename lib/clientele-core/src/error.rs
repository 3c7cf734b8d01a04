//! Error types for clientele.

use derive_more::{Display, Error, From};

/// Main error type for clientele operations.
///
/// Every failure surfaces as a distinct variant so callers can branch on the
/// failure kind (an open circuit is not the same as a 404).
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// No client configuration registered under the requested name.
    #[display("no client registered under name '{name}'")]
    #[from(skip)]
    ConfigurationMissing {
        /// The unregistered name.
        name: String,
    },

    /// A configuration with this name was already registered.
    #[display("a client named '{name}' is already registered")]
    #[from(skip)]
    DuplicateName {
        /// The duplicated name.
        name: String,
    },

    /// HTTP-level errors (non-success status codes).
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<bytes::Bytes>,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// Request timeout.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// The circuit breaker is open and rejected the call without dispatch.
    #[display("circuit breaker is open")]
    #[from(skip)]
    CircuitOpen,

    /// The caller's cancellation signal fired before the call completed.
    #[display("request cancelled")]
    #[from(skip)]
    Cancelled,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// Invalid path template in a typed-client binding.
    #[display("invalid path template '{template}': {message}")]
    #[from(skip)]
    InvalidTemplate {
        /// The offending template.
        template: String,
        /// What went wrong.
        message: String,
    },
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration-missing error for the given name.
    #[must_use]
    pub fn configuration_missing(name: impl Into<String>) -> Self {
        Self::ConfigurationMissing { name: name.into() }
    }

    /// Create a duplicate-name error for the given name.
    #[must_use]
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Create an HTTP error with body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: bytes::Bytes) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body),
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-template error.
    #[must_use]
    pub fn invalid_template(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTemplate {
            template: template.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` if the circuit breaker rejected the call.
    #[must_use]
    pub const fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen)
    }

    /// Returns `true` if the call was cancelled.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the HTTP status code if this is an HTTP error.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns `true` if this failure is a retry candidate.
    ///
    /// Transient failures are connection-level errors and 5xx responses.
    /// Everything else (including timeouts, open circuits, and cancellation)
    /// propagates to the caller unmodified.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.is_connection() || self.is_server_error()
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&bytes::Bytes> {
        match self {
            Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Try to decode the HTTP error body as JSON.
    ///
    /// Returns `Some(Ok(value))` if the error has a body and it deserializes
    /// successfully, `Some(Err(error))` if the body exists but deserialization
    /// fails, or `None` if there is no body or this is not an HTTP error.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::configuration_missing("github");
        assert_eq!(err.to_string(), "no client registered under name 'github'");

        let err = Error::duplicate_name("github");
        assert_eq!(
            err.to_string(),
            "a client named 'github' is already registered"
        );

        let err = Error::http(404, "Not Found");
        assert_eq!(err.to_string(), "HTTP error 404: Not Found");

        let err = Error::CircuitOpen;
        assert_eq!(err.to_string(), "circuit breaker is open");

        let err = Error::Cancelled;
        assert_eq!(err.to_string(), "request cancelled");

        let err = Error::invalid_template("/items/{", "unterminated placeholder");
        assert_eq!(
            err.to_string(),
            "invalid path template '/items/{': unterminated placeholder"
        );
    }

    #[test]
    fn error_status() {
        let err = Error::http(404, "Not Found");
        assert_eq!(err.status(), Some(404));
        assert!(err.is_client_error());
        assert!(!err.is_server_error());

        let err = Error::http(503, "Service Unavailable");
        assert!(err.is_server_error());

        assert_eq!(Error::Timeout.status(), None);
    }

    #[test]
    fn transient_classification() {
        assert!(Error::connection("refused").is_transient());
        assert!(Error::http(500, "boom").is_transient());
        assert!(!Error::http(404, "Not Found").is_transient());
        assert!(!Error::Timeout.is_transient());
        assert!(!Error::CircuitOpen.is_transient());
        assert!(!Error::Cancelled.is_transient());
    }

    #[test]
    fn error_kind_predicates() {
        assert!(Error::Timeout.is_timeout());
        assert!(Error::CircuitOpen.is_circuit_open());
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::connection("down").is_connection());
        assert!(!Error::CircuitOpen.is_connection());
    }

    #[test]
    fn error_decode_body() {
        #[derive(Debug, PartialEq, serde::Deserialize)]
        struct ApiError {
            error: String,
        }

        let body = bytes::Bytes::from(r#"{"error": "not found"}"#);
        let err = Error::http_with_body(404, "Not Found", body);

        let decoded = err.decode_body::<ApiError>().expect("has body");
        assert_eq!(
            decoded.expect("decodes"),
            ApiError {
                error: "not found".to_string()
            }
        );

        assert!(
            Error::http(404, "Not Found")
                .decode_body::<ApiError>()
                .is_none()
        );
        assert!(Error::Timeout.decode_body::<ApiError>().is_none());
    }
}
