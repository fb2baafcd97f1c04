//! API credentials.
//!
//! A client runs in exactly one auth mode, fixed at construction:
//! user context (OAuth 1.0a, four secrets) or app context (OAuth 2.0 bearer
//! token, given directly or exchanged from a consumer key/secret pair).

use std::fmt;

use crate::error::{ConfigError, Error};
use crate::tokens::BearerToken;

/// Environment variable names read by [`Credentials::from_env`].
pub const CONSUMER_KEY_VAR: &str = "CONSUMER_KEY";
pub const CONSUMER_SECRET_VAR: &str = "CONSUMER_SECRET";
pub const ACCESS_TOKEN_VAR: &str = "ACCESS_TOKEN";
pub const ACCESS_TOKEN_SECRET_VAR: &str = "ACCESS_TOKEN_SECRET";
pub const BEARER_TOKEN_VAR: &str = "BEARER_TOKEN";

/// The auth mode a client runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// OAuth 1.0a on behalf of a user.
    User,
    /// OAuth 2.0 bearer token on behalf of the app.
    App,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::User => write!(f, "user-context"),
            AuthMode::App => write!(f, "app-context"),
        }
    }
}

/// App-context credentials.
#[derive(Clone)]
pub enum AppAuth {
    /// A ready bearer token.
    Bearer(BearerToken),
    /// A consumer key and secret to exchange for a bearer token.
    ConsumerPair {
        consumer_key: String,
        consumer_secret: String,
    },
}

/// Credentials for one client instance.
///
/// # Security
///
/// Secrets are never exposed in Debug output.
///
/// # Example
///
/// ```
/// use chirp_core::{AuthMode, Credentials};
///
/// let creds = Credentials::bearer("AAAA...");
/// assert_eq!(creds.mode(), AuthMode::App);
/// ```
#[derive(Clone)]
pub enum Credentials {
    /// OAuth 1.0a user context.
    UserContext {
        consumer_key: String,
        consumer_secret: String,
        access_token: String,
        access_token_secret: String,
    },
    /// OAuth 2.0 app context.
    AppContext(AppAuth),
}

impl Credentials {
    /// User-context credentials from the four OAuth 1.0a secrets.
    pub fn user(
        consumer_key: impl Into<String>,
        consumer_secret: impl Into<String>,
        access_token: impl Into<String>,
        access_token_secret: impl Into<String>,
    ) -> Self {
        Credentials::UserContext {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
            access_token: access_token.into(),
            access_token_secret: access_token_secret.into(),
        }
    }

    /// App-context credentials from a bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Credentials::AppContext(AppAuth::Bearer(BearerToken::new(token)))
    }

    /// App-context credentials from a consumer key/secret pair.
    pub fn app(consumer_key: impl Into<String>, consumer_secret: impl Into<String>) -> Self {
        Credentials::AppContext(AppAuth::ConsumerPair {
            consumer_key: consumer_key.into(),
            consumer_secret: consumer_secret.into(),
        })
    }

    /// Read credentials from the environment.
    ///
    /// With `mode == AuthMode::App`, `BEARER_TOKEN` wins; otherwise
    /// `CONSUMER_KEY` and `CONSUMER_SECRET` are exchanged for one. With
    /// `AuthMode::User` all four user-context variables are required.
    pub fn from_env(mode: AuthMode) -> Result<Self, Error> {
        Self::from_lookup(mode, |name| std::env::var(name).ok())
    }

    /// Like [`Credentials::from_env`] but with a custom lookup function.
    pub fn from_lookup<F>(mode: AuthMode, lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingCredential { name })
        };

        match mode {
            AuthMode::App => {
                if let Ok(token) = require(BEARER_TOKEN_VAR) {
                    return Ok(Credentials::bearer(token));
                }
                Ok(Credentials::app(
                    require(CONSUMER_KEY_VAR)?,
                    require(CONSUMER_SECRET_VAR)?,
                ))
            }
            AuthMode::User => Ok(Credentials::user(
                require(CONSUMER_KEY_VAR)?,
                require(CONSUMER_SECRET_VAR)?,
                require(ACCESS_TOKEN_VAR)?,
                require(ACCESS_TOKEN_SECRET_VAR)?,
            )),
        }
    }

    /// The auth mode of these credentials.
    pub fn mode(&self) -> AuthMode {
        match self {
            Credentials::UserContext { .. } => AuthMode::User,
            Credentials::AppContext(_) => AuthMode::App,
        }
    }

    /// Fail fast if these credentials cannot call `endpoint`.
    pub fn require(&self, required: AuthMode, endpoint: &'static str) -> Result<(), Error> {
        if self.mode() == required {
            Ok(())
        } else {
            Err(ConfigError::WrongAuthMode {
                endpoint,
                required: match required {
                    AuthMode::User => "user-context",
                    AuthMode::App => "app-context",
                },
            }
            .into())
        }
    }
}

// Intentionally hide secrets in Debug output
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::UserContext { consumer_key, .. } => f
                .debug_struct("UserContext")
                .field("consumer_key", consumer_key)
                .field("consumer_secret", &"[REDACTED]")
                .field("access_token", &"[REDACTED]")
                .field("access_token_secret", &"[REDACTED]")
                .finish(),
            Credentials::AppContext(AppAuth::Bearer(token)) => {
                f.debug_tuple("AppContext").field(token).finish()
            }
            Credentials::AppContext(AppAuth::ConsumerPair { consumer_key, .. }) => f
                .debug_struct("AppContext")
                .field("consumer_key", consumer_key)
                .field("consumer_secret", &"[REDACTED]")
                .finish(),
        }
    }
}
