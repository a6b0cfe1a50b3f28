//! Shared data types for collection and reconstruction.
//!
//! Raw `ObservationPoint`s come from source adapters and are transient;
//! `DailySeriesPoint` sequences are rebuilt from persisted history on every
//! processing run.

use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use crate::calendar;

/// Stable, externally assigned code of a station, dam or facility.
pub type EntityId = String;

/// Fixed out-of-range marker for "no data" in emitted rows.
pub const SENTINEL: f64 = -9999.0;

// ---------------------------------------------------------------------------
// Raw observations
// ---------------------------------------------------------------------------

/// When a raw reading was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObservationTime {
    /// Sub-daily reading with the provider's hour tag in `0..=24`.
    Hourly { date: NaiveDate, hour: u8 },
    /// Date-only reading (daily products).
    Daily(NaiveDate),
}

impl ObservationTime {
    pub fn date(&self) -> NaiveDate {
        match *self {
            ObservationTime::Hourly { date, .. } => date,
            ObservationTime::Daily(date) => date,
        }
    }

    /// The provider hour tag, if this is an hourly reading.
    pub fn source_hour(&self) -> Option<u8> {
        match *self {
            ObservationTime::Hourly { hour, .. } => Some(hour),
            ObservationTime::Daily(_) => None,
        }
    }

    /// Calendar date the reading counts towards.
    ///
    /// Hour 24 belongs to the next day and hour 0 is a placeholder that
    /// never counts (`None`). Date-only readings count on their own date.
    pub fn effective_date(&self) -> Option<NaiveDate> {
        match *self {
            ObservationTime::Hourly { hour: 0, .. } => None,
            ObservationTime::Hourly { date, hour: 24 } => date.succ_opt(),
            ObservationTime::Hourly { date, .. } => Some(date),
            ObservationTime::Daily(date) => Some(date),
        }
    }

    /// Timestamp used when this reading becomes a collection cursor.
    pub fn as_timestamp(&self) -> NaiveDateTime {
        match *self {
            ObservationTime::Hourly { date, hour } => calendar::hour_timestamp(date, hour),
            ObservationTime::Daily(date) => calendar::hour_timestamp(date, 0),
        }
    }
}

impl fmt::Display for ObservationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObservationTime::Hourly { date, hour } => write!(f, "{}{:02}", date.format("%Y%m%d"), hour),
            ObservationTime::Daily(date) => write!(f, "{}", date.format("%Y%m%d")),
        }
    }
}

/// A raw reading as returned by a source adapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationPoint {
    pub entity_id: EntityId,
    pub time: ObservationTime,
    pub value: Option<f64>,
}

impl ObservationPoint {
    pub fn hourly(entity_id: &str, date: NaiveDate, hour: u8, value: Option<f64>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            time: ObservationTime::Hourly { date, hour },
            value,
        }
    }

    pub fn daily(entity_id: &str, date: NaiveDate, value: Option<f64>) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            time: ObservationTime::Daily(date),
            value,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconstructed series
// ---------------------------------------------------------------------------

/// One day of a reconstructed series. Never dated Feb 29.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DailySeriesPoint {
    pub date: NaiveDate,
    pub value: Option<f64>,
    /// Set when the value was synthesized by the gap interpolator.
    pub interpolated: bool,
}

impl DailySeriesPoint {
    pub fn observed(date: NaiveDate, value: Option<f64>) -> Self {
        Self { date, value, interpolated: false }
    }
}

/// Persisted/emitted row shape: `(year, month, day, JD, value)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub ordinal_day: u32,
    /// `None` is written as NULL in the database and as the sentinel in CSV.
    pub value: Option<f64>,
}

// ---------------------------------------------------------------------------
// Regions and spatial weights
// ---------------------------------------------------------------------------

/// A region (`sgg_cd`) and the entity codes feeding it.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMembers {
    pub region: String,
    pub members: Vec<EntityId>,
}

impl RegionMembers {
    /// Builds a region from the `_`-joined code list used by `drought_code.obs_cd`.
    pub fn from_joined(region: &str, joined: &str) -> Self {
        Self {
            region: region.to_string(),
            members: joined
                .split('_')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

/// Thiessen weight of one station within a region.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightEntry {
    pub station: EntityId,
    pub weight: f64,
    /// The weight is zero before this date (station not yet commissioned).
    pub effective_from: Option<NaiveDate>,
}

impl WeightEntry {
    pub fn new(station: &str, weight: f64) -> Self {
        Self { station: station.to_string(), weight, effective_from: None }
    }

    pub fn effective_on(&self, date: NaiveDate) -> f64 {
        match self.effective_from {
            Some(from) if date < from => 0.0,
            _ => self.weight,
        }
    }
}

/// Ordered weighting table of one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionWeights {
    pub region: String,
    pub entries: Vec<WeightEntry>,
}

impl RegionWeights {
    /// Equal unit weights, used when member series are summed.
    pub fn unit(members: &RegionMembers) -> Self {
        Self {
            region: members.region.clone(),
            entries: members.members.iter().map(|m| WeightEntry::new(m, 1.0)).collect(),
        }
    }

    pub fn stations(&self) -> Vec<EntityId> {
        self.entries.iter().map(|e| e.station.clone()).collect()
    }
}

// ---------------------------------------------------------------------------
// Collection scheduling
// ---------------------------------------------------------------------------

/// Granularity of a source, used to advance the collection cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepUnit {
    Hourly,
    Daily,
}

impl StepUnit {
    pub fn duration(&self) -> Duration {
        match self {
            StepUnit::Hourly => Duration::hours(1),
            StepUnit::Daily => Duration::days(1),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline state and run reporting
// ---------------------------------------------------------------------------

/// Where an entity's pipeline currently is. `Failed` is reachable from
/// every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Planning,
    Fetching,
    Persisting,
    Loading,
    Collapsing,
    Interpolating,
    Aggregating,
    Emitting,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Planning => "planning",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Persisting => "persisting",
            PipelineStage::Loading => "loading",
            PipelineStage::Collapsing => "collapsing",
            PipelineStage::Interpolating => "interpolating",
            PipelineStage::Aggregating => "aggregating",
            PipelineStage::Emitting => "emitting",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Per-entity failure record in a run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityFailure {
    pub key: String,
    pub stage: PipelineStage,
    pub message: String,
}

/// Outcome of one pipeline run across all of its entities.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub pipeline: String,
    pub succeeded: Vec<String>,
    pub up_to_date: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<EntityFailure>,
    pub rows_written: u64,
    /// Set when the run stopped before visiting every entity.
    pub aborted: Option<String>,
}

impl RunSummary {
    pub fn new(pipeline: &str) -> Self {
        Self { pipeline: pipeline.to_string(), ..Default::default() }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.aborted.is_none()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} succeeded, {} up to date, {} skipped, {} failed, {} rows written",
            self.pipeline,
            self.succeeded.len(),
            self.up_to_date.len(),
            self.skipped.len(),
            self.failed.len(),
            self.rows_written
        )?;
        if let Some(reason) = &self.aborted {
            write!(f, " (aborted: {})", reason)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
