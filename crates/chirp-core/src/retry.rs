//! The retry engine.
//!
//! [`Retrier::run`] wraps a request-issuing closure with two layers:
//!
//! - the outer layer retries transport failures (connection reset, timeout,
//!   content decoding), backing off and rebuilding the transport through a
//!   reconnect hook before each retry, with a separate counter per error
//!   class;
//! - the inner layer absorbs 429 responses by sleeping until the advertised
//!   reset, and retries >=500 responses with quadratic backoff up to a
//!   ceiling.
//!
//! Anything else is returned to the caller unchanged.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::Result;
use crate::config::RetryPolicy;
use crate::error::{Error, TransportError, TransportErrorClass};
use crate::rate_limit::RateLimitState;
use crate::traits::{Clock, HttpReply};

/// Applies a [`RetryPolicy`] to individual requests.
#[derive(Debug, Clone, Copy)]
pub struct Retrier<'a> {
    policy: &'a RetryPolicy,
    clock: &'a dyn Clock,
    rate_limit: Option<&'a RateLimitState>,
}

/// Per-class transport failure counts for one call.
#[derive(Debug, Default)]
struct TransportCounters {
    connection: u32,
    timeout: u32,
    decode: u32,
}

impl TransportCounters {
    fn bump(&mut self, class: TransportErrorClass) -> u32 {
        let counter = match class {
            TransportErrorClass::Connection => &mut self.connection,
            TransportErrorClass::Timeout => &mut self.timeout,
            TransportErrorClass::Decode => &mut self.decode,
        };
        *counter += 1;
        *counter
    }
}

impl<'a> Retrier<'a> {
    pub fn new(policy: &'a RetryPolicy, clock: &'a dyn Clock) -> Self {
        Self {
            policy,
            clock,
            rate_limit: None,
        }
    }

    /// Record rate-limit headers into `state` and wait for an exhausted
    /// window to reset before issuing the next call.
    pub fn with_rate_limit_state(mut self, state: &'a RateLimitState) -> Self {
        self.rate_limit = Some(state);
        self
    }

    /// Issue `call` until it yields a 2xx reply or a non-retryable outcome.
    ///
    /// After every retryable transport error the retrier sleeps a linear
    /// backoff and awaits `reconnect` before issuing the call again. A
    /// reconnect that itself fails with a retryable transport error is counted
    /// against the same per-class ceiling.
    pub async fn run<R, F, Fut, C, CFut>(&self, mut call: F, mut reconnect: C) -> Result<R>
    where
        R: HttpReply,
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<R, TransportError>>,
        C: FnMut() -> CFut,
        CFut: Future<Output = Result<()>>,
    {
        let mut transport_errors = TransportCounters::default();
        let mut server_errors: u32 = 0;
        let mut needs_reconnect = false;

        loop {
            if needs_reconnect {
                match reconnect().await {
                    Ok(()) => needs_reconnect = false,
                    Err(Error::Transport(err)) => {
                        self.transport_failure(&mut transport_errors, err).await?;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            self.wait_for_quota().await;

            let reply = match call().await {
                Ok(reply) => reply,
                Err(err) => {
                    self.transport_failure(&mut transport_errors, err).await?;
                    needs_reconnect = true;
                    continue;
                }
            };

            if let Some(state) = self.rate_limit {
                state.update(reply.rate_limit());
            }

            let status = reply.status();
            match status {
                200..=299 => {
                    if server_errors > 0 {
                        debug!(server_errors, "Recovered after server errors");
                    }
                    return Ok(reply);
                }
                429 => {
                    let now = self.clock.now().timestamp();
                    let wait = self.policy.rate_limit_wait(reply.rate_limit_reset(), now);
                    info!(
                        url = %reply.url(),
                        wait_secs = wait.as_secs(),
                        "Rate limited, sleeping until reset"
                    );
                    drop(reply);
                    self.clock.sleep(wait).await;
                }
                401 => {
                    let error = reply.into_http_error().await;
                    warn!(status, url = %error.url, "Unauthorized; credentials invalid or account locked");
                    return Err(Error::Http(error));
                }
                s if s >= 500 => {
                    server_errors += 1;
                    if server_errors > self.policy.http_errors {
                        let error = reply.into_http_error().await;
                        warn!(status, errors = server_errors, "Too many server errors, giving up");
                        return Err(Error::Http(error));
                    }
                    let wait = self.policy.server_error_backoff(server_errors);
                    warn!(
                        status,
                        url = %reply.url(),
                        errors = server_errors,
                        wait_secs = wait.as_secs(),
                        "Server error, backing off"
                    );
                    drop(reply);
                    self.clock.sleep(wait).await;
                }
                _ => {
                    let error = reply.into_http_error().await;
                    debug!(status, url = %error.url, "Request failed");
                    return Err(Error::Http(error));
                }
            }
        }
    }

    /// Count a transport failure against its class and back off, or give up
    /// with the error once the class reaches its ceiling.
    async fn transport_failure(
        &self,
        counters: &mut TransportCounters,
        err: TransportError,
    ) -> Result<()> {
        let Some(class) = err.retry_class() else {
            return Err(err.into());
        };
        let count = counters.bump(class);
        if self.policy.connection_errors.is_some_and(|max| count >= max) {
            warn!(error = %err, attempts = count, "Giving up after transport errors");
            return Err(err.into());
        }
        let wait = self.policy.transport_backoff(count);
        warn!(
            error = %err,
            attempt = count,
            ?class,
            wait_secs = wait.as_secs(),
            "Transport error, reconnecting"
        );
        self.clock.sleep(wait).await;
        Ok(())
    }

    /// Sleep until reset when the last response said the window is used up.
    async fn wait_for_quota(&self) {
        let Some(limit) = self.rate_limit.and_then(RateLimitState::current) else {
            return;
        };
        if !limit.is_exhausted() {
            return;
        }
        let now = self.clock.now().timestamp();
        if let Some(secs) = limit.seconds_until_reset(now) {
            let wait = Duration::from_secs(secs as u64 + self.policy.rate_limit_pad_secs);
            info!(wait_secs = wait.as_secs(), "Rate limit exhausted, waiting for reset");
            self.clock.sleep(wait).await;
        }
    }
}
