//! Rows returned by range and single-value reads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Values for one device, keyed by sensor key or pipeline function name.
pub type DeviceValues = BTreeMap<String, f64>;

/// One timestamp's worth of values across the selected devices and sensors.
///
/// Result grids may be sparse: a device can lack a value at a given
/// timestamp, in which case [`Row::value`] returns `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    #[serde(rename = "t")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "data", default)]
    values: BTreeMap<String, DeviceValues>,
}

impl Row {
    /// Create an empty row.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    /// Set a value, builder style.
    pub fn with_value(mut self, device: impl Into<String>, key: impl Into<String>, value: f64) -> Self {
        self.values
            .entry(device.into())
            .or_default()
            .insert(key.into(), value);
        self
    }

    /// Timestamp of the row.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Look up a value by device key and sensor key (or function name for
    /// aggregated reads).
    pub fn value(&self, device: &str, key: &str) -> Option<f64> {
        self.values.get(device).and_then(|d| d.get(key)).copied()
    }

    /// All values for one device.
    pub fn device(&self, device: &str) -> Option<&DeviceValues> {
        self.values.get(device)
    }

    /// Device keys present in this row, sorted.
    pub fn devices(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Every `(device, key, value)` in the row, sorted by device then key.
    pub fn values(&self) -> impl Iterator<Item = (&str, &str, f64)> {
        self.values.iter().flat_map(|(device, values)| {
            values
                .iter()
                .map(move |(key, v)| (device.as_str(), key.as_str(), *v))
        })
    }

    /// True if the row carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.values().all(BTreeMap::is_empty)
    }
}
