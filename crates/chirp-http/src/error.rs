//! Mapping reqwest failures onto the transport error taxonomy.

use chirp_core::TransportError;

/// Classify a reqwest error.
///
/// Timeouts, connection failures and body decoding failures are the
/// transient classes the retry engine rebuilds the transport for.
pub(crate) fn classify(err: reqwest::Error) -> TransportError {
    let message = err.to_string();
    if err.is_timeout() {
        TransportError::Timeout { message }
    } else if err.is_connect() || err.is_request() {
        TransportError::Connection { message }
    } else if err.is_decode() || err.is_body() {
        TransportError::Decode { message }
    } else {
        TransportError::Other { message }
    }
}
