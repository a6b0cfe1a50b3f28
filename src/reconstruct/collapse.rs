//! Daily collapse rule: many raw readings in, at most one value per day out.
//!
//! Readings are grouped by effective date (hour 24 counts towards the next
//! day, hour 0 is dropped as a placeholder). Within a day the latest hour
//! with a usable value wins; date-only readings rank after every hourly one
//! and keep their input order.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::model::{ObservationPoint, SENTINEL};

/// Which raw values count as "no measurement".
#[derive(Debug, Clone, PartialEq)]
pub struct ValuePolicy {
    /// Treat an exact zero as missing. Off for fields where zero is real
    /// (rainfall, ordinal-day-like fields).
    pub zero_is_sentinel: bool,
    /// Provider markers for missing values (e.g. -9999, or -9 for KMA rainfall).
    pub missing_markers: Vec<f64>,
}

impl Default for ValuePolicy {
    fn default() -> Self {
        Self {
            zero_is_sentinel: true,
            missing_markers: vec![SENTINEL],
        }
    }
}

impl ValuePolicy {
    pub fn zero_is_valid() -> Self {
        Self { zero_is_sentinel: false, ..Self::default() }
    }

    /// True when `value` is present, finite and not a missing marker.
    pub fn is_valid(&self, value: Option<f64>) -> bool {
        match value {
            None => false,
            Some(v) if !v.is_finite() => false,
            Some(v) if self.zero_is_sentinel && v == 0.0 => false,
            Some(v) => !self.missing_markers.iter().any(|m| *m == v),
        }
    }
}

/// Collapses raw readings of one entity (or a pooled set of entities) into a
/// sparse `date -> value` map.
pub fn collapse_daily(readings: &[ObservationPoint], policy: &ValuePolicy) -> BTreeMap<NaiveDate, f64> {
    // (rank, input index, value); rank orders hourly readings by hour desc
    // ahead of date-only readings.
    let mut groups: BTreeMap<NaiveDate, Vec<(i16, usize, Option<f64>)>> = BTreeMap::new();

    for (index, reading) in readings.iter().enumerate() {
        let Some(date) = reading.time.effective_date() else {
            continue;
        };
        let rank = match reading.time.source_hour() {
            Some(hour) => -i16::from(hour),
            None => 1,
        };
        groups.entry(date).or_default().push((rank, index, reading.value));
    }

    let mut collapsed = BTreeMap::new();
    for (date, mut candidates) in groups {
        candidates.sort_by_key(|(rank, index, _)| (*rank, *index));
        if let Some(value) = candidates
            .into_iter()
            .map(|(_, _, value)| value)
            .find(|value| policy.is_valid(*value))
            .flatten()
        {
            collapsed.insert(date, value);
        }
    }
    collapsed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
