//! Endpoint methods on [`Client`](crate::Client).
//!
//! Each method checks its input, fixes the parameters for its endpoint and
//! hands off to a pagination driver. Nothing here retries or flattens.

pub mod v1;
pub mod v2;

pub use v1::{FilterParams, SearchOptions, TimelineOptions};
pub use v2::{Granularity, SearchParams, StreamRule, TimelineParams};
