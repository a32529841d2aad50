//! # tempo-stream
//!
//! Async client for a hosted sensor time-series store: device provisioning,
//! bulk ingestion and time-range queries over HTTP/JSON.
//!
//! ## Reads as streams
//!
//! Range reads are paginated by the server. [`Client::read`] returns a
//! [`Cursor`] that fetches one page at a time, only when the previous one
//! has been consumed:
//!
//! ```ignore
//! use futures::StreamExt;
//! use tempo_stream::{Client, Fold, Pipeline, Selection};
//!
//! let pipeline = Pipeline::new()
//!     .rollup(Fold::Sum, "1day", start)
//!     .aggregate(Fold::Mean);
//!
//! let mut rows = client.read(&Selection::device_key("thermostat.1"), start, end, &pipeline)?;
//! while let Some(row) = rows.next().await {
//!     let row = row?;
//!     println!("{} {:?}", row.timestamp(), row.value("thermostat.1", "mean"));
//! }
//! ```
//!
//! Or collect everything at once with [`Cursor::collect_all`]; both modes see
//! the same rows in the same order.
//!
//! ## Bulk writes
//!
//! ```ignore
//! use tempo_stream::{BulkWrite, DataPoint};
//!
//! let mut write = BulkWrite::new();
//! write.push("thermostat.1", "temp", DataPoint::new(now, 21.5));
//! write.push("thermostat.2", "temp", DataPoint::new(now, 19.0));
//!
//! let status = client.write_bulk(write).await?;
//! if status.is_partial_success() {
//!     for (device, message) in status.failures() {
//!         eprintln!("{}: {}", device, message);
//!     }
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded memory**: at most one page of rows is held at a time
//! - **Typed queries**: selections and pipelines are enums and builders, not
//!   loose JSON
//! - **Partial writes**: a 207 response becomes a [`WriteStatus`], not an error
//! - **Pluggable transport**: anything implementing [`Transport`] can carry
//!   the requests

pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod row;
pub mod selection;
pub mod transport;
pub mod types;
pub mod write;

// Re-export main types at crate root
pub use client::Client;
pub use config::Config;
pub use cursor::{Cursor, Page, PageFetcher};
pub use error::{Error, Result};
pub use pipeline::{Fold, Function, Interpolation, Pipeline};
pub use query::SingleFunction;
pub use row::Row;
pub use selection::{Selection, Selector};
pub use transport::{HttpTransport, Response, Transport};
pub use types::{DataPoint, DeleteSummary, Device, Sensor};
pub use write::{BulkWrite, DeviceStatus, WriteOutcome, WriteStatus};
