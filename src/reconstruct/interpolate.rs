//! Gap interpolator: bounded nearest-neighbour averaging.
//!
//! For every missing day, scan outward day by day (up to the gap window) for
//! the first valid value on each side. With both sides found the gap becomes
//! their plain mean. With only one side, or none, the gap stays missing;
//! there is no one-sided fill and no distance weighting.
//!
//! Anchors are always taken from the input series, never from values filled
//! earlier in the same pass.

use chrono::NaiveDate;

use crate::model::DailySeriesPoint;
use crate::reconstruct::collapse::ValuePolicy;

/// Default search radius in days.
pub const DEFAULT_GAP_WINDOW_DAYS: i64 = 31;

/// Counters describing what one interpolation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterpolationStats {
    pub gaps: usize,
    pub filled: usize,
    /// Gaps left open because only one side had a neighbour in the window.
    pub one_sided: usize,
    /// Gaps left open because neither side had a neighbour in the window.
    pub isolated: usize,
}

#[derive(Debug, Clone)]
pub struct GapInterpolator {
    window_days: i64,
    policy: ValuePolicy,
}

impl GapInterpolator {
    pub fn new(window_days: i64, policy: ValuePolicy) -> Self {
        Self { window_days, policy }
    }

    /// Fills gaps in a date-ascending series.
    pub fn fill(&self, series: &[DailySeriesPoint]) -> (Vec<DailySeriesPoint>, InterpolationStats) {
        let mut stats = InterpolationStats::default();
        let mut output = series.to_vec();

        for (i, point) in series.iter().enumerate() {
            if self.policy.is_valid(point.value) {
                continue;
            }
            stats.gaps += 1;

            let before = self.scan(series[..i].iter().rev(), point.date);
            let after = self.scan(series[i + 1..].iter(), point.date);

            match (before, after) {
                (Some(b), Some(a)) => {
                    output[i].value = Some((b + a) / 2.0);
                    output[i].interpolated = true;
                    stats.filled += 1;
                }
                (Some(_), None) | (None, Some(_)) => stats.one_sided += 1,
                (None, None) => stats.isolated += 1,
            }
        }

        (output, stats)
    }

    /// First valid value walking outward from `origin`, within the window.
    fn scan<'a>(
        &self,
        candidates: impl Iterator<Item = &'a DailySeriesPoint>,
        origin: NaiveDate,
    ) -> Option<f64> {
        for candidate in candidates {
            if (candidate.date - origin).num_days().abs() > self.window_days {
                return None;
            }
            if self.policy.is_valid(candidate.value) {
                return candidate.value;
            }
        }
        None
    }
}

impl Default for GapInterpolator {
    fn default() -> Self {
        Self::new(DEFAULT_GAP_WINDOW_DAYS, ValuePolicy::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
