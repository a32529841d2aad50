//! Request bodies for reads, single-value lookups and deletions.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::Pipeline;
use crate::selection::{Search, SearchTarget, Selection};

/// Which value a single-value query picks for each selected sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "function", rename_all = "lowercase")]
pub enum SingleFunction {
    /// Most recent value.
    Latest,
    /// Oldest value.
    Earliest,
    /// Value at exactly `timestamp`.
    Exact {
        /// Instant to look up.
        timestamp: DateTime<Utc>,
    },
    /// Last value strictly before `timestamp`.
    Before {
        /// Upper bound.
        timestamp: DateTime<Utc>,
    },
    /// First value strictly after `timestamp`.
    After {
        /// Lower bound.
        timestamp: DateTime<Utc>,
    },
    /// Value closest to `timestamp`, either side.
    Nearest {
        /// Instant to look near.
        timestamp: DateTime<Utc>,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct TimeRange {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
}

/// Body of a range read.
#[derive(Debug, Serialize)]
pub(crate) struct ReadQuery<'a> {
    search: Search<'a>,
    read: TimeRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    fold: Option<&'a Pipeline>,
}

impl<'a> ReadQuery<'a> {
    pub fn new(
        selection: &'a Selection,
        start: DateTime<Utc>,
        stop: DateTime<Utc>,
        pipeline: &'a Pipeline,
    ) -> Self {
        Self {
            search: Search::new(SearchTarget::Sensors, selection),
            read: TimeRange { start, stop },
            fold: pipeline.as_fold(),
        }
    }
}

/// Body of a single-value read.
#[derive(Debug, Serialize)]
pub(crate) struct SingleQuery<'a> {
    search: Search<'a>,
    single: SingleFunction,
    #[serde(skip_serializing_if = "Option::is_none")]
    fold: Option<&'a Pipeline>,
}

impl<'a> SingleQuery<'a> {
    pub fn new(selection: &'a Selection, single: SingleFunction, pipeline: &'a Pipeline) -> Self {
        Self {
            search: Search::new(SearchTarget::Sensors, selection),
            single,
            fold: pipeline.as_fold(),
        }
    }
}

/// Body of a device listing or bulk device deletion.
#[derive(Debug, Serialize)]
pub(crate) struct DeviceQuery<'a> {
    search: Search<'a>,
}

impl<'a> DeviceQuery<'a> {
    pub fn new(selection: &'a Selection) -> Self {
        Self {
            search: Search::new(SearchTarget::Devices, selection),
        }
    }
}
