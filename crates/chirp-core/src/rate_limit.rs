//! Rate-limit state parsed from response headers.

use std::sync::Mutex;

use serde::Serialize;

pub const LIMIT_HEADER: &str = "x-rate-limit-limit";
pub const REMAINING_HEADER: &str = "x-rate-limit-remaining";
pub const RESET_HEADER: &str = "x-rate-limit-reset";

/// Rate-limit information from one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    /// Maximum number of requests allowed in the window.
    pub limit: Option<u32>,
    /// Remaining requests in the current window.
    pub remaining: Option<u32>,
    /// Unix timestamp (seconds) when the window resets.
    pub reset: Option<i64>,
}

impl RateLimit {
    /// Parse rate-limit headers through a header lookup function.
    pub fn from_headers<F>(header: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            limit: header(LIMIT_HEADER).and_then(|v| v.trim().parse().ok()),
            remaining: header(REMAINING_HEADER).and_then(|v| v.trim().parse().ok()),
            reset: header(RESET_HEADER).and_then(|v| v.trim().parse().ok()),
        }
    }

    /// True if no header was present.
    pub fn is_empty(&self) -> bool {
        self.limit.is_none() && self.remaining.is_none() && self.reset.is_none()
    }

    /// Check if the window is used up (remaining == 0).
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    /// Seconds until reset, if the reset lies in the future.
    pub fn seconds_until_reset(&self, now: i64) -> Option<i64> {
        self.reset.filter(|reset| *reset > now).map(|reset| reset - now)
    }
}

/// The latest rate-limit information seen by one client.
///
/// Updated after every response; consulted before each call.
#[derive(Debug, Default)]
pub struct RateLimitState {
    latest: Mutex<Option<RateLimit>>,
}

impl RateLimitState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the headers of a response. Responses without rate-limit
    /// headers leave the state untouched.
    pub fn update(&self, limit: RateLimit) {
        if limit.is_empty() {
            return;
        }
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *latest = Some(limit);
    }

    /// The most recent rate-limit information, if any.
    pub fn current(&self) -> Option<RateLimit> {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            pairs
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn parses_all_headers() {
        let limit = RateLimit::from_headers(headers(&[
            (LIMIT_HEADER, "450"),
            (REMAINING_HEADER, "0"),
            (RESET_HEADER, "1700000900"),
        ]));
        assert_eq!(limit.limit, Some(450));
        assert!(limit.is_exhausted());
        assert_eq!(limit.seconds_until_reset(1_700_000_000), Some(900));
        assert_eq!(limit.seconds_until_reset(1_700_001_000), None);
    }

    #[test]
    fn ignores_garbage_values() {
        let limit = RateLimit::from_headers(headers(&[(REMAINING_HEADER, "many")]));
        assert!(limit.is_empty());
    }

    #[test]
    fn state_keeps_last_non_empty_value() {
        let state = RateLimitState::new();
        assert_eq!(state.current(), None);

        let first = RateLimit {
            limit: Some(180),
            remaining: Some(179),
            reset: Some(10),
        };
        state.update(first);
        state.update(RateLimit::default());
        assert_eq!(state.current(), Some(first));
    }
}
