//! chirp-http - reqwest-backed client for the Twitter v1.1 and v2 APIs.
//!
//! [`Client`] owns the transport and hands out lazy streams of pages or
//! records. Paging, rate-limit waits, transport retries and stream
//! reconnects all happen behind those streams.

mod client;
mod error;
mod oauth;
mod paging;
mod stream;
mod transport;

pub mod endpoints;

pub use client::Client;
pub use endpoints::{
    FilterParams, Granularity, SearchOptions, SearchParams, StreamRule, TimelineOptions,
    TimelineParams,
};
pub use paging::BATCH_SIZE;
pub use transport::{ApiRequest, Reply};

pub use tokio_util::sync::CancellationToken;
