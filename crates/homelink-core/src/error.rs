//! Error types for homelink
//!
//! This module defines all error types used throughout the crate, together
//! with the classification the host uses to decide how loudly to react.

use thiserror::Error;

/// Result type alias for homelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for homelink
#[derive(Error, Debug)]
pub enum Error {
    /// The device or cloud API could not be reached
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Bad credentials or an expired/revoked token
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A single poll failed; the next tick may succeed
    #[error("Transient fetch error: {0}")]
    TransientFetch(String),

    /// The remote answered but the payload was not what we expected
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Config entry store errors
    #[error("Entry store error: {0}")]
    EntryStore(String),

    /// HTTP errors that do not fit a more specific class
    #[error("HTTP error: {0}")]
    Http(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Integration-specific error
    #[error("Integration error ({integration}): {message}")]
    Integration {
        /// Integration domain
        integration: String,
        /// Error message
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`]
///
/// Adapters and lifecycle hooks react to the class, not to the concrete
/// variant: auth problems are surfaced to the user, transient ones are
/// retried on the next tick, malformed payloads degrade single fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Cannot reach the device or API
    Connect,
    /// Credentials or token rejected
    Auth,
    /// One failed poll
    Transient,
    /// Unexpected payload shape
    Malformed,
    /// Invalid configuration
    Config,
    /// Anything else
    Internal,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorClass::Connect => "connect",
            ErrorClass::Auth => "auth",
            ErrorClass::Transient => "transient",
            ErrorClass::Malformed => "malformed",
            ErrorClass::Config => "config",
            ErrorClass::Internal => "internal",
        };
        f.write_str(label)
    }
}

impl Error {
    /// Create a connection error
    pub fn connect(msg: impl Into<String>) -> Self {
        Self::Connect(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a transient fetch error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::TransientFetch(msg.into())
    }

    /// Create a malformed snapshot error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedSnapshot(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an entry store error
    pub fn entry_store(msg: impl Into<String>) -> Self {
        Self::EntryStore(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an integration-specific error
    pub fn integration(integration: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Integration {
            integration: integration.into(),
            message: message.into(),
        }
    }

    /// Map a non-success HTTP status from a vendor API to an error
    ///
    /// - 401/403 → [`Error::Authentication`]
    /// - 404 → [`Error::NotFound`]
    /// - 429 → [`Error::RateLimited`]
    /// - 5xx → [`Error::TransientFetch`]
    /// - anything else → [`Error::Integration`]
    pub fn from_status(integration: &str, status: u16, body: &str) -> Self {
        match status {
            401 | 403 => Self::auth(format!(
                "{} rejected the credentials (status {})",
                integration, status
            )),
            404 => Self::not_found(format!("{} resource not found (status 404)", integration)),
            429 => Self::rate_limited(format!(
                "{} rate limit exceeded, retry later (status 429)",
                integration
            )),
            500..=599 => Self::transient(format!(
                "{} server error (status {}): {}",
                integration, status, body
            )),
            _ => Self::integration(
                integration,
                format!("unexpected status {}: {}", status, body),
            ),
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Connect(_) | Error::Io(_) => ErrorClass::Connect,
            Error::Authentication(_) => ErrorClass::Auth,
            Error::TransientFetch(_) | Error::RateLimited(_) | Error::Http(_) => {
                ErrorClass::Transient
            }
            Error::MalformedSnapshot(_) | Error::Json(_) => ErrorClass::Malformed,
            Error::Config(_) | Error::InvalidInput(_) => ErrorClass::Config,
            Error::EntryStore(_)
            | Error::NotFound(_)
            | Error::Integration { .. }
            | Error::Other(_) => ErrorClass::Internal,
        }
    }

    /// Whether retrying on the next tick may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient | ErrorClass::Connect)
    }

    /// Whether the credentials or token were rejected
    pub fn is_auth(&self) -> bool {
        self.class() == ErrorClass::Auth
    }

    /// Base error code shown by the config flow form
    pub fn flow_error_code(&self) -> &'static str {
        match self.class() {
            ErrorClass::Connect | ErrorClass::Transient => "cannot_connect",
            ErrorClass::Auth => "invalid_auth",
            _ => "unknown",
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(Error::from_status("asuswrt", 401, "").is_auth());
        assert!(Error::from_status("asuswrt", 403, "").is_auth());
        assert_eq!(
            Error::from_status("fitbark", 404, "").class(),
            ErrorClass::Internal
        );
        assert!(Error::from_status("fitbark", 429, "").is_transient());
        assert!(Error::from_status("fitbark", 503, "busy").is_transient());
        assert!(matches!(
            Error::from_status("fitbark", 418, "teapot"),
            Error::Integration { .. }
        ));
    }

    #[test]
    fn test_flow_error_codes() {
        assert_eq!(Error::connect("down").flow_error_code(), "cannot_connect");
        assert_eq!(Error::transient("timeout").flow_error_code(), "cannot_connect");
        assert_eq!(Error::auth("bad password").flow_error_code(), "invalid_auth");
        assert_eq!(Error::Other("boom".into()).flow_error_code(), "unknown");
    }

    #[test]
    fn test_io_is_connect_class() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert_eq!(err.class(), ErrorClass::Connect);
        assert!(err.is_transient());
    }
}
