//! Server-side processing pipelines.
//!
//! A [`Pipeline`] is an ordered list of functions the server applies to a
//! read result. Order matters: each step consumes the output of the one
//! before it, so a day-sum rollup followed by a mean aggregation is not the
//! same query as the reverse.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::Error;

/// Fold functions accepted by rollups and aggregations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fold {
    /// Sum of values.
    Sum,
    /// Arithmetic mean.
    Mean,
    /// Minimum value.
    Min,
    /// Maximum value.
    Max,
    /// Number of values.
    Count,
    /// Standard deviation.
    Stddev,
    /// First value in the window.
    First,
    /// Last value in the window.
    Last,
    /// Max minus min.
    Range,
}

impl FromStr for Fold {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            "count" => Ok(Self::Count),
            "stddev" => Ok(Self::Stddev),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "range" => Ok(Self::Range),
            _ => Err(Error::parse(format!("unknown fold function '{}'", input))),
        }
    }
}

impl std::fmt::Display for Fold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Fold::Sum => "sum",
            Fold::Mean => "mean",
            Fold::Min => "min",
            Fold::Max => "max",
            Fold::Count => "count",
            Fold::Stddev => "stddev",
            Fold::First => "first",
            Fold::Last => "last",
            Fold::Range => "range",
        };
        write!(f, "{}", s)
    }
}

/// Interpolation methods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    /// Straight line between neighbours.
    Linear,
    /// Hold the previous value.
    ZeroOrderHold,
}

impl std::fmt::Display for Interpolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Interpolation::Linear => write!(f, "linear"),
            Interpolation::ZeroOrderHold => write!(f, "zoh"),
        }
    }
}

/// One pipeline step: a named function and its arguments.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Function {
    /// Function name, as the server knows it.
    pub name: String,
    /// Positional arguments.
    pub arguments: Vec<Value>,
}

/// Ordered sequence of server-side functions.
///
/// # Example
///
/// ```ignore
/// use tempo_stream::{Fold, Pipeline};
///
/// let pipeline = Pipeline::new()
///     .rollup(Fold::Sum, "1day", start)
///     .aggregate(Fold::Mean);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Pipeline {
    functions: Vec<Function>,
}

impl Pipeline {
    /// An empty pipeline. Reads return raw per-sensor values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an arbitrary named function.
    pub fn function(mut self, name: impl Into<String>, arguments: Vec<Value>) -> Self {
        self.functions.push(Function {
            name: name.into(),
            arguments,
        });
        self
    }

    /// Fold each sensor's values into windows of `period`, aligned on `start`.
    ///
    /// `period` is passed to the server as-is (e.g. "1day", "PT1H").
    pub fn rollup(self, fold: Fold, period: impl Into<String>, start: DateTime<Utc>) -> Self {
        self.function(
            "rollup",
            vec![
                Value::String(fold.to_string()),
                Value::String(period.into()),
                Value::String(timestamp(start)),
            ],
        )
    }

    /// Fold values across sensors at each timestamp. The result is keyed by
    /// the fold's name (e.g. `"mean"`).
    pub fn aggregate(self, fold: Fold) -> Self {
        self.function("aggregation", vec![Value::String(fold.to_string())])
    }

    /// Resample onto a regular grid of `period` between `start` and `end`.
    pub fn interpolate(
        self,
        method: Interpolation,
        period: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        self.function(
            "interpolate",
            vec![
                Value::String(method.to_string()),
                Value::String(period.into()),
                Value::String(timestamp(start)),
                Value::String(timestamp(end)),
            ],
        )
    }

    /// Steps in application order.
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// True if the pipeline has no steps.
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// `None` for an empty pipeline, so request bodies can leave the field
    /// out entirely.
    pub(crate) fn as_fold(&self) -> Option<&Self> {
        if self.is_empty() { None } else { Some(self) }
    }
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true)
}
