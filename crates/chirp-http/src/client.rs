//! The API client.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, info, instrument};

use chirp_core::{
    AuthMode, ClientConfig, Clock, Credentials, Metadata, RateLimit, RateLimitState, Result,
    Retrier, SystemClock,
};

use crate::transport::{ApiRequest, Reply, Transport};

/// A client for the v1.1 and v2 APIs.
///
/// Cheap to clone; clones share the transport and the rate-limit state.
/// Independent clients share nothing.
///
/// # Example
///
/// ```no_run
/// use chirp_http::Client;
/// use chirp_core::{ClientConfig, Credentials};
/// use futures_util::StreamExt;
///
/// # async fn example() -> chirp_core::Result<()> {
/// let client = Client::new(Credentials::bearer("AAAA..."), ClientConfig::default()).await?;
/// let mut pages = client.search_recent("rustlang", Default::default())?;
/// while let Some(page) = pages.next().await {
///     println!("{}", page?["meta"]["result_count"]);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    credentials: Credentials,
    config: ClientConfig,
    transport: RwLock<Arc<Transport>>,
    rate_limit: RateLimitState,
    clock: Arc<dyn Clock>,
}

impl Client {
    /// Build a client and its transport.
    ///
    /// App-context consumer pairs are exchanged for a bearer token here.
    pub async fn new(credentials: Credentials, config: ClientConfig) -> Result<Self> {
        Self::with_clock(credentials, config, Arc::new(SystemClock)).await
    }

    /// Build a client whose sleeps and timestamps go through `clock`.
    pub async fn with_clock(
        credentials: Credentials,
        config: ClientConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let transport = Transport::connect(&credentials, &config).await?;
        info!(mode = %credentials.mode(), api = %config.api_url, "Client ready");
        Ok(Self {
            inner: Arc::new(ClientInner {
                credentials,
                config,
                transport: RwLock::new(Arc::new(transport)),
                rate_limit: RateLimitState::new(),
                clock,
            }),
        })
    }

    /// The auth mode this client was built with.
    pub fn auth_mode(&self) -> AuthMode {
        self.inner.credentials.mode()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The most recent rate-limit headers seen by this client.
    pub fn rate_limit(&self) -> Option<RateLimit> {
        self.inner.rate_limit.current()
    }

    /// Drop the current transport and build a new one with the same auth.
    ///
    /// An app-context bearer token obtained at construction is reused.
    #[instrument(skip(self))]
    pub async fn reconnect(&self) -> Result<()> {
        let transport = self.transport().rebuild(&self.inner.config)?;
        let mut current = self
            .inner
            .transport
            .write()
            .unwrap_or_else(|e| e.into_inner());
        *current = Arc::new(transport);
        info!("Transport rebuilt");
        Ok(())
    }

    pub(crate) fn transport(&self) -> Arc<Transport> {
        self.inner
            .transport
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    pub(crate) fn timestamp(&self) -> i64 {
        self.inner.clock.now().timestamp()
    }

    /// Fail fast if this client cannot call `endpoint`.
    pub(crate) fn require(&self, mode: AuthMode, endpoint: &'static str) -> Result<()> {
        self.inner.credentials.require(mode, endpoint)
    }

    /// Metadata for an object retrieved from `url`, if enabled.
    pub(crate) fn metadata(&self, url: &str) -> Option<Metadata> {
        self.inner
            .config
            .metadata
            .then(|| Metadata::new(url, self.inner.clock.now()))
    }

    /// Issue `request` through the retry engine.
    pub(crate) async fn send(&self, request: &ApiRequest) -> Result<Reply> {
        Retrier::new(&self.inner.config.retry, self.clock())
            .with_rate_limit_state(&self.inner.rate_limit)
            .run(
                || {
                    let transport = self.transport();
                    let timestamp = self.timestamp();
                    async move { transport.execute(request, timestamp).await }
                },
                || self.reconnect(),
            )
            .await
    }

    /// Issue `request` and decode the JSON body.
    ///
    /// Metadata, when enabled, is attached to the returned object.
    pub(crate) async fn get_json(&self, request: &ApiRequest) -> Result<Value> {
        let reply = self.send(request).await?;
        let mut value = reply.json()?;
        if let Some(metadata) = self.metadata(request.url()) {
            metadata.attach(&mut value);
        }
        debug!(url = request.url(), "Response decoded");
        Ok(value)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("credentials", &self.inner.credentials)
            .field("api_url", &self.inner.config.api_url)
            .field("rate_limit", &self.inner.rate_limit.current())
            .finish()
    }
}
