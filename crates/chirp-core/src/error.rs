//! Error types for chirp.
//!
//! This module provides a unified error type with explicit variants for
//! configuration, transport, HTTP, decoding and input validation errors.
//! Retry decisions never wrap these: once a retry ceiling is reached the
//! original variant is returned unchanged so callers can match on it.

use std::fmt;
use thiserror::Error;

/// The unified error type for chirp operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing credentials or an endpoint used with the wrong auth mode.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Network transport errors (connection reset, timeout, content decoding).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Non-success HTTP responses that were not absorbed by retries.
    #[error("{0}")]
    Http(#[from] HttpError),

    /// A response body that was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Input validation errors (bad ids, usernames, unsupported shapes).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

impl Error {
    /// Returns the HTTP status if this is an HTTP error.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http(e) => Some(e.status),
            _ => None,
        }
    }

    /// True for a 404 response.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Http(e) if e.is_not_found())
    }
}

/// Configuration errors. Always raised before any network call.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required credential was not supplied.
    #[error("missing credential: {name}")]
    MissingCredential { name: &'static str },

    /// The endpoint needs a different auth mode than the client was built with.
    #[error("{endpoint} requires {required} authentication")]
    WrongAuthMode {
        endpoint: &'static str,
        required: &'static str,
    },

    /// A configured base URL is unusable.
    #[error("invalid API URL '{value}': {reason}")]
    InvalidUrl { value: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("HTTP client setup failed: {message}")]
    HttpClient { message: String },
}

/// Transport-level errors.
///
/// `Connection`, `Timeout` and `Decode` are transient: the transport is
/// rebuilt and the call retried. `Other` is surfaced immediately.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established or was reset.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Connect or read timed out.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// The body could not be decoded (truncated gzip, broken chunking).
    #[error("content decoding failed: {message}")]
    Decode { message: String },

    /// Any other transport failure.
    #[error("HTTP transport error: {message}")]
    Other { message: String },
}

/// Retryable transport error classes. Each has its own retry counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorClass {
    Connection,
    Timeout,
    Decode,
}

impl TransportError {
    /// The retry class of this error, or `None` if it must not be retried.
    pub fn retry_class(&self) -> Option<TransportErrorClass> {
        match self {
            TransportError::Connection { .. } => Some(TransportErrorClass::Connection),
            TransportError::Timeout { .. } => Some(TransportErrorClass::Timeout),
            TransportError::Decode { .. } => Some(TransportErrorClass::Decode),
            TransportError::Other { .. } => None,
        }
    }
}

/// Appended to 401 errors.
const UNAUTHORIZED_HINT: &str =
    "check that the credentials are valid and the account is not locked or suspended";

/// An HTTP error response from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// HTTP status code.
    pub status: u16,
    /// The requested URL (without query string).
    pub url: String,
    /// Short error title from the response body, if any.
    pub title: Option<String>,
    /// Error detail from the response body, if any.
    pub detail: Option<String>,
    /// Reset time (epoch seconds) from the rate-limit headers, if present.
    pub rate_limit_reset: Option<i64>,
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {} for {}", self.status, self.url)?;
        if let Some(ref title) = self.title {
            write!(f, " [{}]", title)?;
        }
        if let Some(ref detail) = self.detail {
            write!(f, ": {}", detail)?;
        }
        if self.status == 401 {
            write!(f, " ({})", UNAUTHORIZED_HINT)?;
        }
        Ok(())
    }
}

impl std::error::Error for HttpError {}

impl HttpError {
    /// Create a new HTTP error with no body details.
    pub fn new(status: u16, url: impl Into<String>) -> Self {
        Self {
            status,
            url: url.into(),
            title: None,
            detail: None,
            rate_limit_reset: None,
        }
    }

    /// Attach a title and detail parsed from the response body.
    pub fn with_body(mut self, title: Option<String>, detail: Option<String>) -> Self {
        self.title = title;
        self.detail = detail;
        self
    }

    /// Attach the rate-limit reset time.
    pub fn with_reset(mut self, reset: Option<i64>) -> Self {
        self.rate_limit_reset = reset;
        self
    }

    /// 401: invalid credentials or a locked account.
    pub fn is_auth_error(&self) -> bool {
        self.status == 401
    }

    /// 420 (legacy "enhance your calm") or 429.
    pub fn is_rate_limited(&self) -> bool {
        self.status == 420 || self.status == 429
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidInputError {
    /// Invalid tweet or user id.
    #[error("invalid id '{value}': {reason}")]
    Id { value: String, reason: String },

    /// Invalid username.
    #[error("invalid username '{value}': {reason}")]
    Username { value: String, reason: String },

    /// A value passed to the flattener that is neither a page, a record,
    /// nor a list of one of those.
    #[error("cannot flatten {found}")]
    Shape { found: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}
