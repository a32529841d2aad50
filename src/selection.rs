//! Device and sensor selections.
//!
//! A [`Selection`] says which devices and sensors an operation applies to.
//! On the wire it is a nested JSON predicate:
//!
//! ```json
//! {"devices": {"key": "thermostat.1"}, "sensors": {"attributes": {"unit": "C"}}}
//! ```
//!
//! Shapes the builder does not know about can be passed through with
//! [`Selector::Raw`]; the server decides what they mean.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value, json};

/// A predicate over devices or sensors.
#[derive(Clone, Debug, PartialEq)]
pub enum Selector {
    /// Matches everything.
    All,
    /// Exact key match.
    Key(String),
    /// Every listed attribute must be present with the given value.
    Attributes(BTreeMap<String, String>),
    /// The attribute must be present, with any value.
    AttributeKey(String),
    /// All sub-selectors must match.
    And(Vec<Selector>),
    /// At least one sub-selector must match.
    Or(Vec<Selector>),
    /// Arbitrary predicate, sent verbatim.
    Raw(Value),
}

impl Selector {
    /// Exact key match.
    pub fn key(key: impl Into<String>) -> Self {
        Selector::Key(key.into())
    }

    /// Match on a set of attributes.
    pub fn attributes<K, V>(attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Selector::Attributes(
            attributes
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Match on a single attribute.
    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::attributes([(name.into(), value.into())])
    }

    /// Match devices or sensors that carry an attribute.
    pub fn attribute_key(name: impl Into<String>) -> Self {
        Selector::AttributeKey(name.into())
    }

    /// Combine with another selector; both must match.
    ///
    /// Nested `and`s are flattened.
    pub fn and(self, other: Selector) -> Self {
        match self {
            Selector::And(mut items) => {
                items.push(other);
                Selector::And(items)
            }
            first => Selector::And(vec![first, other]),
        }
    }

    /// Combine with another selector; either may match.
    ///
    /// Nested `or`s are flattened.
    pub fn or(self, other: Selector) -> Self {
        match self {
            Selector::Or(mut items) => {
                items.push(other);
                Selector::Or(items)
            }
            first => Selector::Or(vec![first, other]),
        }
    }

    /// Wire representation.
    pub fn to_json(&self) -> Value {
        match self {
            Selector::All => Value::String("all".to_string()),
            Selector::Key(key) => json!({ "key": key }),
            Selector::Attributes(attrs) => json!({ "attributes": attrs }),
            Selector::AttributeKey(name) => json!({ "attribute_key": name }),
            Selector::And(items) => {
                json!({ "and": items.iter().map(Selector::to_json).collect::<Vec<_>>() })
            }
            Selector::Or(items) => {
                json!({ "or": items.iter().map(Selector::to_json).collect::<Vec<_>>() })
            }
            Selector::Raw(value) => value.clone(),
        }
    }

    /// Decode a wire predicate. Shapes that are not recognized become
    /// [`Selector::Raw`].
    pub fn from_json(value: Value) -> Self {
        if value.as_str() == Some("all") {
            return Selector::All;
        }

        let Some(obj) = value.as_object().filter(|o| o.len() == 1) else {
            return Selector::Raw(value);
        };

        let decoded = obj.iter().next().and_then(|(name, inner)| match (name.as_str(), inner) {
            ("key", Value::String(key)) => Some(Selector::Key(key.clone())),
            ("attribute_key", Value::String(key)) => Some(Selector::AttributeKey(key.clone())),
            ("attributes", Value::Object(attrs)) => string_map(attrs).map(Selector::Attributes),
            ("and", Value::Array(items)) => {
                Some(Selector::And(items.iter().cloned().map(Selector::from_json).collect()))
            }
            ("or", Value::Array(items)) => {
                Some(Selector::Or(items.iter().cloned().map(Selector::from_json).collect()))
            }
            _ => None,
        });

        decoded.unwrap_or(Selector::Raw(value))
    }
}

fn string_map(obj: &Map<String, Value>) -> Option<BTreeMap<String, String>> {
    obj.iter()
        .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect()
}

impl Serialize for Selector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Selector::from_json)
    }
}

/// Which devices and sensors a query applies to.
///
/// An absent side is left out of the predicate, which the server reads as
/// "no restriction".
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Selection {
    /// Device predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Selector>,
    /// Sensor predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Selector>,
}

impl Selection {
    /// An unrestricted selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the devices.
    pub fn devices(mut self, selector: Selector) -> Self {
        self.devices = Some(selector);
        self
    }

    /// Restrict the sensors.
    pub fn sensors(mut self, selector: Selector) -> Self {
        self.sensors = Some(selector);
        self
    }

    /// Shorthand for a single device by key.
    pub fn device_key(key: impl Into<String>) -> Self {
        Self::new().devices(Selector::key(key))
    }

    /// Build from arbitrary wire JSON.
    ///
    /// Fails if `value` is not shaped like a selection or carries a side
    /// other than `devices`/`sensors`.
    pub fn from_json(value: Value) -> crate::Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| crate::Error::parse(format!("invalid selection: {}", e)))
    }
}

/// Which entity a search returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SearchTarget {
    Devices,
    Sensors,
}

/// `{"select": ..., "filters": ...}` envelope shared by reads, listings
/// and deletions.
#[derive(Debug, Serialize)]
pub(crate) struct Search<'a> {
    pub select: SearchTarget,
    pub filters: &'a Selection,
}

impl<'a> Search<'a> {
    pub fn new(select: SearchTarget, filters: &'a Selection) -> Self {
        Self { select, filters }
    }
}
