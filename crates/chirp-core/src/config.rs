//! Client configuration.
//!
//! Everything here deserializes with serde and has sensible defaults, so a
//! caller can build a config from any serde source or start from
//! [`ClientConfig::default`] and override single fields.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::ApiUrl;

/// Configuration for one client instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL for REST requests (default: https://api.twitter.com).
    #[serde(default = "default_api_url")]
    pub api_url: ApiUrl,

    /// Base URL for v1.1 streaming requests (default: https://stream.twitter.com).
    #[serde(default = "default_stream_url")]
    pub stream_url: ApiUrl,

    /// Attach a `__chirp` metadata object to every yielded page or record.
    #[serde(default)]
    pub metadata: bool,

    /// Retry ceilings and backoff parameters.
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Connect and read timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

fn default_api_url() -> ApiUrl {
    ApiUrl::new("https://api.twitter.com").expect("default API URL is valid")
}

fn default_stream_url() -> ApiUrl {
    ApiUrl::new("https://stream.twitter.com").expect("default stream URL is valid")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            stream_url: default_stream_url(),
            metadata: false,
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Point both REST and streaming requests at one base URL (mock servers).
    pub fn with_base_url(mut self, url: ApiUrl) -> Self {
        self.api_url = url.clone();
        self.stream_url = url;
        self
    }

    /// Enable or disable metadata injection.
    pub fn with_metadata(mut self, metadata: bool) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Retry ceilings and backoff parameters.
///
/// The >=500 backoff is quadratic: `unit * n^2`, capped at
/// `max_backoff_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive >=500 responses tolerated before giving up.
    #[serde(default = "default_http_errors")]
    pub http_errors: u32,

    /// Attempts per transport error class before giving up (`None` = unlimited).
    #[serde(default)]
    pub connection_errors: Option<u32>,

    /// Seconds added to the reset time when rate limited.
    #[serde(default = "default_rate_limit_pad_secs")]
    pub rate_limit_pad_secs: u64,

    /// Minimum seconds to sleep when rate limited.
    #[serde(default = "default_rate_limit_floor_secs")]
    pub rate_limit_floor_secs: u64,

    /// Backoff unit for >=500 responses.
    #[serde(default = "default_server_error_backoff_secs")]
    pub server_error_backoff_secs: u64,

    /// Upper bound for any single >=500 backoff.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
}

fn default_http_errors() -> u32 {
    30
}

fn default_rate_limit_pad_secs() -> u64 {
    10
}

fn default_rate_limit_floor_secs() -> u64 {
    10
}

fn default_server_error_backoff_secs() -> u64 {
    1
}

fn default_max_backoff_secs() -> u64 {
    320
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            http_errors: default_http_errors(),
            connection_errors: None,
            rate_limit_pad_secs: default_rate_limit_pad_secs(),
            rate_limit_floor_secs: default_rate_limit_floor_secs(),
            server_error_backoff_secs: default_server_error_backoff_secs(),
            max_backoff_secs: default_max_backoff_secs(),
        }
    }
}

/// Long stream backoff step (420/429).
const STREAM_RATE_LIMIT_STEP_SECS: u64 = 60;
/// Long stream backoff cap: sixteen minutes.
const STREAM_RATE_LIMIT_CAP_SECS: u64 = 16 * 60;
/// Short backoff step (transport errors, other stream errors).
const SHORT_BACKOFF_STEP_SECS: u64 = 5;
/// Short backoff cap.
const SHORT_BACKOFF_CAP_SECS: u64 = 320;

impl RetryPolicy {
    /// Set the transport error ceiling.
    pub fn with_connection_errors(mut self, max: u32) -> Self {
        self.connection_errors = Some(max);
        self
    }

    /// Set the >=500 ceiling.
    pub fn with_http_errors(mut self, max: u32) -> Self {
        self.http_errors = max;
        self
    }

    /// How long to sleep after a 429 whose reset header is `reset` (epoch
    /// seconds), given the current time `now`.
    ///
    /// `max(reset - now + pad, floor)`; a missing header sleeps `floor + pad`.
    pub fn rate_limit_wait(&self, reset: Option<i64>, now: i64) -> Duration {
        let pad = self.rate_limit_pad_secs as i64;
        let floor = self.rate_limit_floor_secs as i64;
        let secs = match reset {
            Some(reset) => (reset - now + pad).max(floor),
            None => floor + pad,
        };
        Duration::from_secs(secs as u64)
    }

    /// Backoff before retry number `errors` (1-based) after a >=500 response.
    pub fn server_error_backoff(&self, errors: u32) -> Duration {
        let n = u64::from(errors);
        let secs = self
            .server_error_backoff_secs
            .saturating_mul(n.saturating_mul(n))
            .min(self.max_backoff_secs);
        Duration::from_secs(secs)
    }

    /// Backoff before reconnecting a stream after `errors` consecutive errors.
    ///
    /// 420/429 use a long linear backoff (one minute per error, capped at
    /// sixteen minutes); everything else uses a short one.
    pub fn stream_backoff(&self, status: Option<u16>, errors: u32) -> Duration {
        let n = u64::from(errors.max(1));
        let secs = match status {
            Some(420) | Some(429) => {
                (STREAM_RATE_LIMIT_STEP_SECS * n).min(STREAM_RATE_LIMIT_CAP_SECS)
            }
            _ => return self.transport_backoff(errors),
        };
        Duration::from_secs(secs)
    }

    /// Backoff before reconnecting after the `errors`-th (1-based) transport
    /// failure of one class: five seconds per error, capped.
    pub fn transport_backoff(&self, errors: u32) -> Duration {
        let n = u64::from(errors.max(1));
        Duration::from_secs((SHORT_BACKOFF_STEP_SECS * n).min(SHORT_BACKOFF_CAP_SECS))
    }
}

/// Connect and read timeouts.
///
/// The read timeout is materially longer than the connect timeout: the API is
/// slow to send the first byte of large pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    #[serde(default = "default_read_secs")]
    pub read_secs: u64,

    /// Read timeout for streaming connections; covers the keep-alive interval.
    #[serde(default = "default_stream_read_secs")]
    pub stream_read_secs: u64,
}

fn default_connect_secs() -> u64 {
    10
}

fn default_read_secs() -> u64 {
    30
}

fn default_stream_read_secs() -> u64 {
    90
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            read_secs: default_read_secs(),
            stream_read_secs: default_stream_read_secs(),
        }
    }
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn read(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    pub fn stream_read(&self) -> Duration {
        Duration::from_secs(self.stream_read_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_wait_pads_reset() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_wait(Some(1_005), 1_000), Duration::from_secs(15));
    }

    #[test]
    fn rate_limit_wait_never_below_floor() {
        let policy = RetryPolicy::default();
        // reset already passed
        assert_eq!(policy.rate_limit_wait(Some(900), 1_000), Duration::from_secs(10));
        assert_eq!(policy.rate_limit_wait(None, 1_000), Duration::from_secs(20));
    }

    #[test]
    fn server_error_backoff_is_quadratic_and_capped() {
        let policy = RetryPolicy::default();
        let waits: Vec<u64> = (1..=4)
            .map(|n| policy.server_error_backoff(n).as_secs())
            .collect();
        assert_eq!(waits, vec![1, 4, 9, 16]);
        assert_eq!(policy.server_error_backoff(100).as_secs(), 320);
    }

    #[test]
    fn stream_backoff_distinguishes_rate_limits() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.stream_backoff(Some(420), 2), Duration::from_secs(120));
        assert_eq!(policy.stream_backoff(Some(429), 50), Duration::from_secs(960));
        assert_eq!(policy.stream_backoff(Some(503), 2), Duration::from_secs(10));
        assert_eq!(policy.stream_backoff(None, 1), Duration::from_secs(5));
    }

    #[test]
    fn transport_backoff_grows_linearly_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.transport_backoff(1), Duration::from_secs(5));
        assert_eq!(policy.transport_backoff(3), Duration::from_secs(15));
        assert_eq!(policy.transport_backoff(100), Duration::from_secs(320));
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"metadata": true, "retry": {"connection_errors": 3}}"#,
        )
        .unwrap();
        assert!(config.metadata);
        assert_eq!(config.retry.connection_errors, Some(3));
        assert_eq!(config.retry.http_errors, 30);
        assert_eq!(config.api_url.as_str(), "https://api.twitter.com/");
        assert_eq!(config.timeouts.read_secs, 30);
    }

    #[test]
    fn config_rejects_plain_http_base() {
        let result: Result<ClientConfig, _> =
            serde_json::from_str(r#"{"api_url": "http://api.twitter.com"}"#);
        assert!(result.is_err());
    }
}
