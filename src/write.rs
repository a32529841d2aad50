//! Bulk writes and their per-device outcome.
//!
//! The server commits a bulk write device by device. A `200` means every
//! device was written; a `207 Multi-Status` carries a map of device key to
//! `{"success": bool, "message": string}` describing which ones failed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::Response;
use crate::types::DataPoint;

/// Accumulates `(device, sensor, point)` triples for a single write call.
///
/// Points are kept in insertion order per sensor and are never
/// deduplicated. The accumulator is consumed by
/// [`Client::write_bulk`](crate::Client::write_bulk), so it cannot be
/// changed or resubmitted once the request has started.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BulkWrite {
    points: BTreeMap<String, BTreeMap<String, Vec<DataPoint>>>,
}

impl BulkWrite {
    /// Create an empty write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a point for a device's sensor.
    pub fn push(&mut self, device: impl Into<String>, sensor: impl Into<String>, point: DataPoint) {
        self.points
            .entry(device.into())
            .or_default()
            .entry(sensor.into())
            .or_default()
            .push(point);
    }

    /// Builder-style [`BulkWrite::push`].
    pub fn with(mut self, device: impl Into<String>, sensor: impl Into<String>, point: DataPoint) -> Self {
        self.push(device, sensor, point);
        self
    }

    /// Total number of points.
    pub fn len(&self) -> usize {
        self.points
            .values()
            .flat_map(BTreeMap::values)
            .map(Vec::len)
            .sum()
    }

    /// True if nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keys of the devices touched by this write.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.points.keys().map(String::as_str)
    }

    /// Points queued for one device's sensor.
    pub fn points(&self, device: &str, sensor: &str) -> &[DataPoint] {
        self.points
            .get(device)
            .and_then(|sensors| sensors.get(sensor))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Overall classification of a bulk write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every device was written.
    Success,
    /// Some devices were written and some failed.
    PartialSuccess,
    /// No device was written.
    Failure,
}

/// Outcome for one device, as reported in a 207 response.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct DeviceStatus {
    /// Whether the device's points were committed.
    pub success: bool,
    /// Server message, usually empty on success.
    #[serde(default)]
    pub message: String,
}

/// Result of a bulk write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteStatus {
    outcome: WriteOutcome,
    devices: BTreeMap<String, DeviceStatus>,
}

impl WriteStatus {
    /// A write where every device succeeded.
    pub fn success() -> Self {
        Self {
            outcome: WriteOutcome::Success,
            devices: BTreeMap::new(),
        }
    }

    /// Interpret a write response.
    ///
    /// `written` are the keys of the devices the write touched; devices that
    /// the 207 map does not mention count as successful.
    pub fn from_response<'a>(
        response: Response,
        written: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        match response.status {
            200 => Ok(Self::success()),
            207 => {
                let devices: BTreeMap<String, DeviceStatus> = serde_json::from_str(&response.body)
                    .map_err(|e| Error::parse(format!("invalid multi-status body: {}", e)))?;
                Ok(Self::from_device_map(devices, written))
            }
            _ => Err(response.into_error()),
        }
    }

    fn from_device_map<'a>(
        devices: BTreeMap<String, DeviceStatus>,
        written: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let failed = devices.values().filter(|s| !s.success).count();
        let any_succeeded = devices.values().any(|s| s.success)
            || written
                .into_iter()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .any(|key| !devices.contains_key(key));

        let outcome = match (failed, any_succeeded) {
            (0, _) => WriteOutcome::Success,
            (_, true) => WriteOutcome::PartialSuccess,
            (_, false) => WriteOutcome::Failure,
        };

        Self { outcome, devices }
    }

    /// Overall outcome.
    pub fn outcome(&self) -> WriteOutcome {
        self.outcome
    }

    /// True if every device was written.
    pub fn is_success(&self) -> bool {
        self.outcome == WriteOutcome::Success
    }

    /// True if at least one device was written and at least one failed.
    pub fn is_partial_success(&self) -> bool {
        self.outcome == WriteOutcome::PartialSuccess
    }

    /// True if no device was written.
    pub fn is_failure(&self) -> bool {
        self.outcome == WriteOutcome::Failure
    }

    /// Failed devices with the server's message, sorted by device key.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.devices
            .iter()
            .filter(|(_, s)| !s.success)
            .map(|(key, s)| (key.as_str(), s.message.as_str()))
    }

    /// Per-device status as reported by the server. Empty on a plain 200.
    pub fn device(&self, key: &str) -> Option<&DeviceStatus> {
        self.devices.get(key)
    }
}
