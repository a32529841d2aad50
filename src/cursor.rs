//! Paginated results as async streams.
//!
//! The server returns large results one page at a time:
//!
//! ```json
//! {"data": [...], "next_page": {"next_query": {...}}}
//! ```
//!
//! When `next_page` is present, its `next_query` is sent verbatim as the body
//! of the next request to the same endpoint. When it is absent the result is
//! complete.
//!
//! [`Cursor`] turns that into a [`Stream`] of items. Pages are fetched lazily
//! and strictly one at a time: page N+1 is only requested once every item of
//! page N has been handed to the consumer, so memory use is bounded by one
//! page no matter how large the result is.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_stream::stream;
use futures::{Stream, StreamExt};
use reqwest::Method;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::transport::Transport;

/// One decoded page.
#[derive(Debug)]
pub struct Page<T> {
    /// Items in server order.
    pub items: Vec<T>,
    /// Body of the request for the following page, if any.
    pub next: Option<Value>,
}

#[derive(Deserialize)]
struct PageBody<T> {
    data: Vec<T>,
    next_page: Option<NextPage>,
}

#[derive(Deserialize)]
struct NextPage {
    next_query: Value,
}

/// Issues one request per page against a fixed endpoint.
#[derive(Clone)]
pub struct PageFetcher {
    transport: Arc<dyn Transport>,
    method: Method,
    path: String,
}

impl PageFetcher {
    /// Create a fetcher for `method path`.
    pub fn new(transport: Arc<dyn Transport>, method: Method, path: impl Into<String>) -> Self {
        Self {
            transport,
            method,
            path: path.into(),
        }
    }

    /// Fetch and decode a single page.
    pub async fn fetch<T: DeserializeOwned>(&self, query: &Value) -> Result<Page<T>> {
        let body = serde_json::to_string(query)?;
        let response = self
            .transport
            .request(self.method.clone(), &self.path, Some(body))
            .await?
            .expect_status(200)?;

        let page: PageBody<T> = serde_json::from_str(&response.body).map_err(|e| Error::Parse {
            message: format!("Invalid page from {}: {}", self.path, e),
        })?;

        tracing::debug!(
            path = %self.path,
            items = page.data.len(),
            more = page.next_page.is_some(),
            "fetched page"
        );

        Ok(Page {
            items: page.data,
            next: page.next_page.map(|n| n.next_query),
        })
    }
}

/// A lazily fetched, paginated result.
///
/// Consume it either as a stream (one item at a time, pages fetched on
/// demand) or all at once with [`Cursor::collect_all`]. Both produce the same
/// items in the same order.
///
/// After the stream ends, or after it yields an error, it only ever returns
/// `None`. Items already yielded before an error are not retracted. Dropping
/// the cursor stops any further fetching.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut rows = client.read(&selection, start, end, &Pipeline::new())?;
/// while let Some(row) = rows.next().await {
///     let row = row?;
///     println!("{}: {:?}", row.timestamp(), row.value("thermostat.1", "temp"));
/// }
/// ```
pub struct Cursor<T> {
    inner: Pin<Box<dyn Stream<Item = Result<T>> + Send>>,
    exhausted: bool,
}

impl<T> Cursor<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Start a cursor. Nothing is fetched until the first poll.
    pub fn new(fetcher: PageFetcher, query: Value) -> Self {
        let s = stream! {
            let mut next = Some(query);
            let mut pages = 0usize;

            while let Some(body) = next.take() {
                match fetcher.fetch::<T>(&body).await {
                    Ok(page) => {
                        pages += 1;
                        next = page.next;
                        for item in page.items {
                            yield Ok(item);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(pages, error = %e, "cursor aborted");
                        yield Err(e);
                        break;
                    }
                }
            }
        };

        Self {
            inner: Box::pin(s),
            exhausted: false,
        }
    }

    /// Drain every page into a `Vec`.
    ///
    /// **Warning**: This loads the whole result into memory. For large
    /// results, consume the cursor as a stream instead.
    pub async fn collect_all(mut self) -> Result<Vec<T>> {
        let mut results = Vec::new();

        while let Some(item) = self.next().await {
            results.push(item?);
        }

        Ok(results)
    }
}

impl<T> Cursor<T> {
    /// True once the cursor has ended or failed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<T> Stream for Cursor<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.exhausted {
            return Poll::Ready(None);
        }

        let polled = this.inner.poll_next_unpin(cx);
        if matches!(polled, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            this.exhausted = true;
        }
        polled
    }
}

impl<T> std::fmt::Debug for Cursor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("exhausted", &self.exhausted)
            .finish_non_exhaustive()
    }
}
