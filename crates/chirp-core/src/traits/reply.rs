//! HTTP reply trait.

use async_trait::async_trait;

use crate::error::HttpError;
use crate::rate_limit::{RESET_HEADER, RateLimit};

/// The parts of an HTTP response the retry engine looks at.
///
/// Implemented by the transport's response wrapper; tests implement it for
/// canned replies.
#[async_trait]
pub trait HttpReply: Send + Sized {
    /// HTTP status code.
    fn status(&self) -> u16;

    /// A header value by lower-case name.
    fn header(&self, name: &str) -> Option<String>;

    /// The requested URL.
    fn url(&self) -> String;

    /// Consume the reply into an [`HttpError`], reading the body for details.
    async fn into_http_error(self) -> HttpError;

    /// Rate-limit headers of this reply.
    fn rate_limit(&self) -> RateLimit {
        RateLimit::from_headers(|name| self.header(name))
    }

    /// The reset header as epoch seconds.
    fn rate_limit_reset(&self) -> Option<i64> {
        self.header(RESET_HEADER).and_then(|v| v.trim().parse().ok())
    }
}
