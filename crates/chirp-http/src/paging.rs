//! Pagination drivers.
//!
//! Each driver turns a request template into a lazy stream. Nothing is sent
//! until the stream is polled, and every request goes through the client's
//! retry engine. Dropping a stream early leaves no connection open.

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::{debug, info};

use chirp_core::page::{next_cursor, next_token, record_id};
use chirp_core::{PageStream, RecordStream, Result};

use crate::client::Client;
use crate::transport::ApiRequest;

/// Ids per lookup request.
pub const BATCH_SIZE: usize = 100;

/// Box a driver stream.
pub(crate) fn boxed<S>(stream: S) -> RecordStream
where
    S: Stream<Item = Result<Value>> + Send + 'static,
{
    Box::pin(stream)
}

/// Where the records of a v1.1 page live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RecordsAt {
    /// The page is a bare list of records.
    Root,
    /// The records are the list under this key.
    Key(&'static str),
}

impl RecordsAt {
    fn take(self, page: Value) -> Vec<Value> {
        let list = match self {
            RecordsAt::Root => page,
            RecordsAt::Key(key) => match page {
                Value::Object(mut object) => object.remove(key).unwrap_or(Value::Null),
                _ => Value::Null,
            },
        };
        match list {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }
}

/// Backward paging by id.
///
/// The first request carries no `max_id` (unless the template sets one);
/// each following request asks for `max_id = min(previous ids) - 1`. An
/// empty page ends the stream. `since_id` on the template is passed through
/// unchanged.
pub(crate) fn max_id(
    client: Client,
    request: ApiRequest,
    records_at: RecordsAt,
    max_pages: Option<usize>,
) -> RecordStream {
    boxed(try_stream! {
        let mut request = request;
        let mut pages = 0;

        loop {
            let page = client.get_json(&request).await?;
            let records = records_at.take(page);
            if records.is_empty() {
                debug!(url = request.url(), pages, "Empty page, paging done");
                break;
            }

            let lowest = records.iter().filter_map(record_id).min();
            let metadata = client.metadata(request.url());
            for mut record in records {
                if let Some(metadata) = &metadata {
                    metadata.attach(&mut record);
                }
                yield record;
            }

            pages += 1;
            if max_pages.is_some_and(|max| pages >= max) {
                break;
            }
            match lowest {
                Some(lowest) if lowest > 0 => {
                    request = request.with_query("max_id", lowest - 1);
                }
                _ => break,
            }
        }
    })
}

/// Forward paging with a signed cursor.
///
/// Starts at `-1`; ends, without another request, when `next_cursor` is
/// `0`. With `allow_404`, a 404 ends the stream as if it were empty.
pub(crate) fn cursor(
    client: Client,
    request: ApiRequest,
    key: &'static str,
    allow_404: bool,
) -> RecordStream {
    boxed(try_stream! {
        let mut cursor: i64 = -1;

        loop {
            let page_request = request.clone().with_query("cursor", cursor);
            let page = match client.get_json(&page_request).await {
                Ok(page) => page,
                Err(e) if allow_404 && e.is_not_found() => {
                    info!(url = request.url(), "Not found, treating as empty");
                    break;
                }
                Err(e) => Err(e)?,
            };

            cursor = next_cursor(&page);
            let metadata = client.metadata(request.url());
            for mut item in RecordsAt::Key(key).take(page) {
                if let Some(metadata) = &metadata {
                    metadata.attach(&mut item);
                }
                yield item;
            }

            if cursor == 0 {
                break;
            }
        }
    })
}

/// v2 token paging.
///
/// The token from `meta.next_token` is sent back under `param`. The stream
/// ends only when `meta` has no `next_token`; an empty token is still sent.
/// Pages without `data` are skipped, but their token is followed.
pub(crate) fn token(
    client: Client,
    request: ApiRequest,
    param: &'static str,
    max_pages: Option<usize>,
) -> PageStream {
    boxed(try_stream! {
        let mut request = request;
        let mut pages = 0;

        loop {
            let page = client.get_json(&request).await?;
            let next = next_token(&page);

            if page.get("data").is_some() {
                yield page;
                pages += 1;
            } else {
                info!(url = request.url(), "Page without data, skipping");
            }

            let Some(next) = next else {
                debug!(url = request.url(), pages, "No next token, paging done");
                break;
            };
            if max_pages.is_some_and(|max| pages >= max) {
                break;
            }
            request = request.with_query(param, next);
        }
    })
}

/// Split `ids` into lookup batches lazily.
fn batches<T>(mut ids: T) -> impl Iterator<Item = Vec<String>> + Send
where
    T: Iterator<Item = String> + Send,
{
    std::iter::from_fn(move || {
        let batch: Vec<String> = ids.by_ref().take(BATCH_SIZE).collect();
        (!batch.is_empty()).then_some(batch)
    })
}

/// Batched lookup yielding one page per batch.
pub(crate) fn batched_pages<I, F>(client: Client, ids: I, build: F) -> PageStream
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
    F: Fn(&[String]) -> ApiRequest + Send + 'static,
{
    let batches = batches(ids.into_iter());
    boxed(try_stream! {
        for batch in batches {
            let request = build(&batch);
            debug!(url = request.url(), ids = batch.len(), "Looking up batch");
            yield client.get_json(&request).await?;
        }
    })
}

/// Batched lookup yielding records.
///
/// With `sort_by_id` each batch is re-sorted by ascending numeric id before
/// it is yielded; API order is otherwise kept. With `allow_404` a batch that
/// matches nothing is skipped.
pub(crate) fn batched_records<I, F>(
    client: Client,
    ids: I,
    build: F,
    sort_by_id: bool,
    allow_404: bool,
) -> RecordStream
where
    I: IntoIterator<Item = String>,
    I::IntoIter: Send + 'static,
    F: Fn(&[String]) -> ApiRequest + Send + 'static,
{
    let batches = batches(ids.into_iter());
    boxed(try_stream! {
        for batch in batches {
            let request = build(&batch);
            debug!(url = request.url(), ids = batch.len(), "Looking up batch");
            let page = match client.get_json(&request).await {
                Ok(page) => page,
                Err(e) if allow_404 && e.is_not_found() => {
                    info!(url = request.url(), "No matches in batch");
                    continue;
                }
                Err(e) => Err(e)?,
            };

            let mut records = RecordsAt::Root.take(page);
            if sort_by_id {
                records.sort_by_key(|record| record_id(record).unwrap_or(u64::MAX));
            }
            let metadata = client.metadata(request.url());
            for mut record in records {
                if let Some(metadata) = &metadata {
                    metadata.attach(&mut record);
                }
                yield record;
            }
        }
    })
}

/// Run `inner` after an async setup step, forwarding its items.
pub(crate) fn chain_after<F, Fut>(setup: F) -> PageStream
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<PageStream>> + Send,
{
    boxed(try_stream! {
        let mut inner = setup().await?;
        while let Some(item) = inner.next().await {
            yield item?;
        }
    })
}
