//! The streaming driver.
//!
//! A streaming endpoint keeps one chunked response open and sends one JSON
//! object per line, with blank lines as keep-alives. The driver reconnects
//! when the connection drops and backs off on errors. It runs until the
//! cancellation token fires, the stream is dropped, or an error ceiling is
//! reached.

use std::time::Duration;

use async_stream::stream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use chirp_core::{Error, HttpError, RecordStream, TransportError};

use crate::client::Client;
use crate::paging::boxed;
use crate::transport::{ApiRequest, http_error};

/// Rate limits and server errors pass; any other status ends the stream.
fn is_retryable(error: &HttpError) -> bool {
    error.is_rate_limited() || error.is_server_error()
}

/// What ended one connection.
enum Disconnect {
    Cancelled,
    /// The body ended or broke; `errored` counts it against the ceiling.
    Dropped { errored: bool, reason: String },
}

/// Stream `request` line by line until `cancel` fires.
///
/// Cancellation is checked while waiting for the next chunk and after every
/// yielded line. On cancellation the response is dropped, which closes the
/// connection, and the stream ends without an error.
pub(crate) fn lines(client: Client, request: ApiRequest, cancel: CancellationToken) -> RecordStream {
    boxed(stream! {
        let policy = client.config().retry.clone();
        let mut errors: u32 = 0;
        let mut needs_reconnect = false;

        'connect: loop {
            if cancel.is_cancelled() {
                break;
            }

            // Rebuilding reuses the transport's auth and does no network I/O.
            if needs_reconnect {
                if let Err(e) = client.reconnect().await {
                    yield Err(e);
                    break;
                }
                needs_reconnect = false;
            }

            let transport = client.transport();
            let timestamp = client.timestamp();
            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = transport.open_stream(&request, timestamp) => Some(result),
            };
            let Some(opened) = opened else {
                break;
            };

            let response = match opened {
                Ok(response) => response,
                Err(err) => {
                    errors += 1;
                    if err.retry_class().is_none() || ceiling_reached(policy.connection_errors, errors) {
                        yield Err(Error::Transport(err));
                        break;
                    }
                    warn!(error = %err, errors, "Stream connection failed, reconnecting");
                    if sleep_or_cancel(&client, &cancel, policy.stream_backoff(None, errors)).await {
                        break;
                    }
                    needs_reconnect = true;
                    continue;
                }
            };

            let status = response.status().as_u16();
            if !response.status().is_success() {
                let url = response.url().as_str().to_string();
                let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
                let error = http_error(status, url, &body);
                errors += 1;

                if !is_retryable(&error) || errors > policy.http_errors {
                    warn!(status, errors, "Stream request failed");
                    yield Err(Error::Http(error));
                    break;
                }
                let wait = policy.stream_backoff(Some(status), errors);
                warn!(status, errors, wait_secs = wait.as_secs(), "Stream error, backing off");
                if sleep_or_cancel(&client, &cancel, wait).await {
                    break;
                }
                continue;
            }

            info!(url = request.url(), "Stream connected");
            let metadata = client.metadata(request.url());
            let mut body = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();
            let mut received = false;

            let disconnect = loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    chunk = body.next() => Some(chunk),
                };
                let Some(chunk) = next else {
                    break Disconnect::Cancelled;
                };

                let bytes = match chunk {
                    Some(Ok(bytes)) => bytes,
                    Some(Err(e)) => {
                        break Disconnect::Dropped {
                            errored: true,
                            reason: e.to_string(),
                        };
                    }
                    None => {
                        break Disconnect::Dropped {
                            errored: !received,
                            reason: "end of stream".to_string(),
                        };
                    }
                };

                buffer.extend_from_slice(&bytes);
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let Some(mut record) = parse_line(&line) else {
                        continue;
                    };
                    received = true;
                    errors = 0;
                    if let Some(metadata) = &metadata {
                        metadata.attach(&mut record);
                    }
                    yield Ok(record);
                    if cancel.is_cancelled() {
                        break 'connect;
                    }
                }
            };

            // Closes the connection before any reconnect or return.
            drop(body);

            match disconnect {
                Disconnect::Cancelled => break,
                Disconnect::Dropped { errored, reason } => {
                    if !errored {
                        let wait = policy.stream_backoff(None, 1);
                        info!(%reason, wait_secs = wait.as_secs(), "Stream closed, reconnecting");
                        if sleep_or_cancel(&client, &cancel, wait).await {
                            break;
                        }
                        continue;
                    }
                    errors += 1;
                    if ceiling_reached(policy.connection_errors, errors) {
                        yield Err(Error::Transport(TransportError::Connection { message: reason }));
                        break;
                    }
                    warn!(%reason, errors, "Stream dropped, reconnecting");
                    if sleep_or_cancel(&client, &cancel, policy.stream_backoff(None, errors)).await {
                        break;
                    }
                    needs_reconnect = true;
                }
            }
        }

        debug!(url = request.url(), "Stream finished");
    })
}

fn ceiling_reached(ceiling: Option<u32>, errors: u32) -> bool {
    ceiling.is_some_and(|max| errors >= max)
}

/// Parse one line. Blank lines are keep-alives; malformed lines are
/// logged and skipped.
fn parse_line(line: &[u8]) -> Option<Value> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        trace!("Keep-alive");
        return None;
    }
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, line = %text, "Skipping malformed stream line");
            None
        }
    }
}

/// Sleep through the client's clock. Returns true if cancelled first.
async fn sleep_or_cancel(client: &Client, cancel: &CancellationToken, wait: Duration) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => true,
        _ = client.clock().sleep(wait) => false,
    }
}
