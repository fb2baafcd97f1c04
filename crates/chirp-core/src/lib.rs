//! chirp-core - transport-agnostic types for the chirp API client.
//!
//! Credentials, configuration, the error taxonomy, the retry engine and the
//! response flattener live here. Nothing in this crate touches the network;
//! HTTP goes through the [`HttpReply`] and [`Clock`] abstractions.

pub mod config;
pub mod credentials;
pub mod error;
pub mod flatten;
pub mod page;
pub mod rate_limit;
pub mod retry;
pub mod tokens;
pub mod traits;
pub mod types;

pub use config::{ClientConfig, RetryPolicy, TimeoutConfig};
pub use credentials::{AppAuth, AuthMode, Credentials};
pub use error::{
    ConfigError, Error, HttpError, InvalidInputError, TransportError, TransportErrorClass,
};
pub use flatten::{Flattenable, flatten, flatten_page};
pub use page::{METADATA_KEY, Metadata, PageStream, RecordStream};
pub use rate_limit::{RateLimit, RateLimitState};
pub use retry::Retrier;
pub use tokens::BearerToken;
pub use traits::{Clock, HttpReply, ManualClock, SystemClock};
pub use types::{ApiUrl, Id, UserRef};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;
