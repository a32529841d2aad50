//! Client for the time-series HTTP API.
//!
//! This module provides the main `Client` type: device management, bulk
//! writes, paginated range reads and single-value lookups.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::Config;
use crate::cursor::{Cursor, PageFetcher};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::query::{DeviceQuery, ReadQuery, SingleFunction, SingleQuery, TimeRange};
use crate::row::Row;
use crate::selection::Selection;
use crate::transport::{HttpTransport, Response, Transport};
use crate::types::{DataPoint, DeleteSummary, Device};
use crate::write::{BulkWrite, WriteStatus};

/// Time-series API client.
///
/// Reads return a [`Cursor`], which can be consumed as a stream (constant
/// memory, pages fetched on demand) or collected into a `Vec`.
///
/// # Example
///
/// ```ignore
/// use futures::StreamExt;
/// use tempo_stream::{Client, Config, Fold, Pipeline, Selection};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = Client::new(&Config::new("https://backend.example.com", "key", "secret"))?;
///
///     let pipeline = Pipeline::new().rollup(Fold::Mean, "PT1H", start);
///     let mut rows = client.read(&Selection::device_key("thermostat.1"), start, end, &pipeline)?;
///
///     while let Some(row) = rows.next().await {
///         let row = row?;
///         println!("{}: {:?}", row.timestamp(), row.value("thermostat.1", "temp"));
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
}

impl Client {
    /// Create a client talking HTTP to the server in `config`.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::with_transport(HttpTransport::new(config)?))
    }

    /// Create a client from `TEMPO_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(&Config::from_env()?)
    }

    /// Create a client over a custom transport.
    pub fn with_transport(transport: impl Transport + 'static) -> Self {
        Self {
            transport: Arc::new(transport),
        }
    }

    /// Create a client over a shared transport.
    pub fn from_shared(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    async fn send(&self, method: Method, path: &str, body: Option<String>) -> Result<Response> {
        self.transport.request(method, path, body).await
    }

    async fn send_json<B: Serialize>(&self, method: Method, path: &str, body: &B) -> Result<Response> {
        let body = serde_json::to_string(body)?;
        self.send(method, path, Some(body)).await
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    /// Create a device with its sensors.
    pub async fn create_device(&self, device: &Device) -> Result<Device> {
        device.validate()?;
        let response = self
            .send_json(Method::POST, "/v2/devices", device)
            .await?
            .expect_status(200)?;
        decode(&response)
    }

    /// Get a device by key. Returns `None` if it does not exist.
    pub async fn get_device(&self, key: &str) -> Result<Option<Device>> {
        let response = self.send(Method::GET, &device_path(key)?, None).await?;
        match response.status {
            200 => decode(&response).map(Some),
            404 => Ok(None),
            _ => Err(response.into_error()),
        }
    }

    /// Replace a device's name, attributes and sensors.
    pub async fn update_device(&self, device: &Device) -> Result<Device> {
        device.validate()?;
        let response = self
            .send_json(Method::PUT, &device_path(&device.key)?, device)
            .await?
            .expect_status(200)?;
        decode(&response)
    }

    /// Delete a device and all its data. Returns `false` if it did not exist.
    pub async fn delete_device(&self, key: &str) -> Result<bool> {
        let response = self.send(Method::DELETE, &device_path(key)?, None).await?;
        match response.status {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(response.into_error()),
        }
    }

    /// Delete every device matching `selection`. Matching nothing is not an
    /// error; the summary then reports zero deletions.
    pub async fn delete_devices(&self, selection: &Selection) -> Result<DeleteSummary> {
        let response = self
            .send_json(Method::DELETE, "/v2/devices", &DeviceQuery::new(selection))
            .await?
            .expect_status(200)?;
        let summary: DeleteSummary = decode(&response)?;
        tracing::debug!(deleted = summary.deleted, "deleted devices");
        Ok(summary)
    }

    /// List devices matching `selection`, page by page.
    pub fn list_devices(&self, selection: &Selection) -> Result<Cursor<Device>> {
        let query = serde_json::to_value(DeviceQuery::new(selection))?;
        Ok(Cursor::new(self.fetcher(Method::GET, "/v2/devices"), query))
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Submit a bulk write.
    ///
    /// The write is consumed: once submitted it cannot be changed or sent
    /// again. A per-device partial failure is reported through the returned
    /// [`WriteStatus`], not as an error.
    pub async fn write_bulk(&self, write: BulkWrite) -> Result<WriteStatus> {
        let points = write.len();
        let response = self.send_json(Method::POST, "/v2/write", &write).await?;
        let status = WriteStatus::from_response(response, write.devices())?;

        if status.is_success() {
            tracing::debug!(points, "bulk write committed");
        } else {
            tracing::warn!(
                points,
                failed = status.failures().count(),
                outcome = ?status.outcome(),
                "bulk write not fully committed"
            );
        }
        Ok(status)
    }

    /// Write one sample for several sensors of a device.
    pub async fn write_device<K>(
        &self,
        device: &str,
        timestamp: DateTime<Utc>,
        values: impl IntoIterator<Item = (K, f64)>,
    ) -> Result<WriteStatus>
    where
        K: Into<String>,
    {
        let mut write = BulkWrite::new();
        for (sensor, value) in values {
            write.push(device, sensor, DataPoint::new(timestamp, value));
        }
        self.write_bulk(write).await
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Read rows in `[start, end)` for the selected sensors, with an optional
    /// server-side pipeline.
    ///
    /// With an empty pipeline, rows carry raw values keyed by sensor. With
    /// an aggregation, they are keyed by the fold name (e.g. `"mean"`).
    pub fn read(
        &self,
        selection: &Selection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pipeline: &Pipeline,
    ) -> Result<Cursor<Row>> {
        let query = serde_json::to_value(ReadQuery::new(selection, start, end, pipeline))?;
        Ok(Cursor::new(self.fetcher(Method::GET, "/v2/read"), query))
    }

    /// Read and collect every row in `[start, end)`.
    ///
    /// **Warning**: This loads all rows into memory. For large ranges, use
    /// [`Client::read`] and consume the cursor as a stream.
    pub async fn read_all(
        &self,
        selection: &Selection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        pipeline: &Pipeline,
    ) -> Result<Vec<Row>> {
        self.read(selection, start, end, pipeline)?.collect_all().await
    }

    /// Look up one value per selected sensor.
    pub fn single(
        &self,
        selection: &Selection,
        function: SingleFunction,
        pipeline: &Pipeline,
    ) -> Result<Cursor<Row>> {
        let query = serde_json::to_value(SingleQuery::new(selection, function, pipeline))?;
        Ok(Cursor::new(self.fetcher(Method::GET, "/v2/single"), query))
    }

    /// Most recent value per selected sensor.
    pub fn latest(&self, selection: &Selection, pipeline: &Pipeline) -> Result<Cursor<Row>> {
        self.single(selection, SingleFunction::Latest, pipeline)
    }

    /// Delete one sensor's points in `[start, end)`.
    pub async fn delete_datapoints(
        &self,
        device: &str,
        sensor: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<DeleteSummary> {
        let path = resource_path(&["v2", "devices", device, "sensors", sensor, "datapoints"])?;
        let response = self
            .send_json(Method::DELETE, &path, &TimeRange { start, stop: end })
            .await?
            .expect_status(200)?;
        decode(&response)
    }

    fn fetcher(&self, method: Method, path: &str) -> PageFetcher {
        PageFetcher::new(self.transport.clone(), method, path)
    }
}

fn decode<T: DeserializeOwned>(response: &Response) -> Result<T> {
    serde_json::from_str(&response.body).map_err(|e| Error::Parse {
        message: format!("Invalid response body: {}", e),
    })
}

fn device_path(key: &str) -> Result<String> {
    resource_path(&["v2", "devices", key])
}

/// Join path segments, percent-encoding each one.
///
/// Empty, `.` and `..` segments are rejected: URL normalization would drop
/// them and turn a single-resource path into a collection path.
fn resource_path(segments: &[&str]) -> Result<String> {
    if let Some(bad) = segments.iter().find(|s| matches!(**s, "" | "." | "..")) {
        return Err(Error::InvalidKey(bad.to_string()));
    }
    let mut url = Url::parse("http://localhost/").map_err(|e| Error::Config(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| Error::Config("base URL cannot hold a path".to_string()))?
        .clear()
        .extend(segments);
    Ok(url.path().to_string())
}
