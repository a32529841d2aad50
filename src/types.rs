//! Core domain types: devices, sensors and data points.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single (timestamp, value) observation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// When the value was observed.
    #[serde(rename = "t")]
    pub timestamp: DateTime<Utc>,
    /// The observed value.
    #[serde(rename = "v")]
    pub value: f64,
}

impl DataPoint {
    /// Create a new data point.
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// A named data source under a [`Device`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    /// Key, unique within the owning device.
    pub key: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form string attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Sensor {
    /// Create a sensor with an empty name and no attributes.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A device, identified by a globally unique key, owning its sensors.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Globally unique key.
    pub key: String,
    /// Human readable name.
    #[serde(default)]
    pub name: String,
    /// Free-form string attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Sensors, in declaration order.
    #[serde(default)]
    sensors: Vec<Sensor>,
}

impl Device {
    /// Create a device with no sensors.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    /// Set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add a sensor, builder style.
    pub fn with_sensor(mut self, sensor: Sensor) -> Result<Self> {
        self.add_sensor(sensor)?;
        Ok(self)
    }

    /// Add a sensor. Fails if a sensor with the same key already exists.
    pub fn add_sensor(&mut self, sensor: Sensor) -> Result<()> {
        if self.sensor(&sensor.key).is_some() {
            return Err(Error::DuplicateSensor {
                device: self.key.clone(),
                sensor: sensor.key,
            });
        }
        self.sensors.push(sensor);
        Ok(())
    }

    /// Remove a sensor by key, returning it if present.
    pub fn remove_sensor(&mut self, key: &str) -> Option<Sensor> {
        let index = self.sensors.iter().position(|s| s.key == key)?;
        Some(self.sensors.remove(index))
    }

    /// Get a sensor by key.
    pub fn sensor(&self, key: &str) -> Option<&Sensor> {
        self.sensors.iter().find(|s| s.key == key)
    }

    /// All sensors, in declaration order.
    pub fn sensors(&self) -> &[Sensor] {
        &self.sensors
    }

    /// Check the sensor-key uniqueness invariant.
    ///
    /// Devices built through [`Device::add_sensor`] always pass; devices
    /// decoded from JSON may not.
    pub fn validate(&self) -> Result<()> {
        for (i, sensor) in self.sensors.iter().enumerate() {
            if self.sensors[..i].iter().any(|s| s.key == sensor.key) {
                return Err(Error::DuplicateSensor {
                    device: self.key.clone(),
                    sensor: sensor.key.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Result of a bulk deletion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSummary {
    /// Number of deleted devices or data points.
    pub deleted: u64,
}
