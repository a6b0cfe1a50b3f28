//! Reconstruction engine: raw readings in, gap-free daily series out.
//!
//! ```text
//! readings ──► collapse ──► spine merge ──► interpolate ──► areal ──► emit
//! ```
//!
//! The submodules hold the individual rules. This module holds the helpers
//! that glue them together for a pipeline: choosing the date span of a
//! series, laying a sparse map onto the spine and trimming raw readings to a
//! region's observation window.

pub mod areal;
pub mod collapse;
pub mod interpolate;

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::calendar;
use crate::error::{PipelineError, Result};
use crate::model::{DailySeriesPoint, ObservationPoint};

// ---------------------------------------------------------------------------
// Span selection
// ---------------------------------------------------------------------------

/// Where a reconstructed series starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpanStart {
    /// First data date, but never before Jan 1 of the start year.
    #[default]
    DataClamped,
    /// Always Jan 1 of the start year.
    Fixed,
}

/// Where a reconstructed series ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SpanEnd {
    /// Last data date of this region (never after today), or today with no data.
    #[default]
    Data,
    /// Latest data date across every region of the series.
    Master,
}

/// Inputs to span selection for one region.
#[derive(Debug, Clone, Copy)]
pub struct SpanInputs {
    pub start_year: i32,
    /// First and last effective dates of this region's collapsed data.
    pub data_range: Option<(NaiveDate, NaiveDate)>,
    /// Latest data date across the whole series, for `SpanEnd::Master`.
    pub master_end: Option<NaiveDate>,
    pub today: NaiveDate,
}

/// Picks the inclusive date range to reconstruct.
///
/// Returns `Ok(None)` when the region has nothing to reconstruct
/// (no data under `DataClamped`, or no master end date under `Master`).
pub fn select_span(start: SpanStart, end: SpanEnd, inputs: &SpanInputs) -> Result<Option<(NaiveDate, NaiveDate)>> {
    let year_start = calendar::year_start(inputs.start_year)
        .ok_or_else(|| PipelineError::Reconstruction(format!("invalid start year {}", inputs.start_year)))?;

    let first = match (start, inputs.data_range) {
        (SpanStart::Fixed, _) => year_start,
        (SpanStart::DataClamped, Some((first, _))) => first.max(year_start),
        (SpanStart::DataClamped, None) => return Ok(None),
    };

    let last = match end {
        SpanEnd::Data => inputs
            .data_range
            .map(|(_, last)| last.min(inputs.today))
            .unwrap_or(inputs.today),
        SpanEnd::Master => match inputs.master_end {
            Some(master) => master,
            None => return Ok(None),
        },
    };

    if first > last {
        return Err(PipelineError::Reconstruction(format!(
            "empty date range {} .. {}",
            first, last
        )));
    }
    Ok(Some((first, last)))
}

// ---------------------------------------------------------------------------
// Spine merge
// ---------------------------------------------------------------------------

/// Lays a sparse `date -> value` map onto the daily spine `start..=end`.
///
/// Dates outside the span and Feb 29 entries are dropped.
pub fn merge_onto_spine(sparse: &BTreeMap<NaiveDate, f64>, start: NaiveDate, end: NaiveDate) -> Vec<DailySeriesPoint> {
    calendar::daily_spine(start, end)
        .into_iter()
        .map(|date| DailySeriesPoint::observed(date, sparse.get(&date).copied()))
        .collect()
}

/// First and last dates of a sparse map, ignoring Feb 29.
pub fn data_range(sparse: &BTreeMap<NaiveDate, f64>) -> Option<(NaiveDate, NaiveDate)> {
    let mut dates = sparse.keys().copied().filter(|d| !calendar::is_leap_day(*d));
    let first = dates.next()?;
    let last = dates.last().unwrap_or(first);
    Some((first, last))
}

// ---------------------------------------------------------------------------
// Observation windows
// ---------------------------------------------------------------------------

/// Date window a region's raw observations are trusted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationWindow {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ObservationWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// Drops readings whose effective date falls outside `window`.
pub fn apply_window(readings: Vec<ObservationPoint>, window: Option<&ObservationWindow>) -> Vec<ObservationPoint> {
    match window {
        None => readings,
        Some(window) => readings
            .into_iter()
            .filter(|r| r.time.effective_date().is_some_and(|d| window.contains(d)))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
