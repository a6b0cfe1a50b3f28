//! Incremental fetch planner.
//!
//! Pure scheduling: given an entity's cursor and "now", decide the window
//! still to be collected. No I/O happens here.

use chrono::{Duration, NaiveDateTime};

use crate::calendar;
use crate::model::StepUnit;

/// What the collector should do for one entity this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPlan {
    /// Fetch `[from, to)`.
    Fetch { from: NaiveDateTime, to: NaiveDateTime },
    /// The cursor has already caught up with `now`.
    UpToDate,
}

/// Plans the next fetch window.
///
/// `next_start` is one step past the cursor, or `now - default_lookback`
/// when the entity has never been collected.
pub fn plan(
    cursor: Option<NaiveDateTime>,
    step: StepUnit,
    now: NaiveDateTime,
    default_lookback: Duration,
) -> FetchPlan {
    let from = match cursor {
        Some(cursor) => calendar::advance(cursor, step),
        None => now - default_lookback,
    };

    if from >= now {
        FetchPlan::UpToDate
    } else {
        FetchPlan::Fetch { from, to: now }
    }
}
