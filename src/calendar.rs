//! Leap-day-free calendar helpers.
//!
//! Every reconstructed series is laid out on a 365-day calendar: February 29
//! is dropped and the ordinal day ("JD") of every later date in a leap year
//! is shifted down by one, so Dec 31 is always day 365. This keeps year-over-
//! year alignment stable for the downstream drought-index scripts.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

use crate::model::StepUnit;

// ---------------------------------------------------------------------------
// Ordinal days and the daily spine
// ---------------------------------------------------------------------------

/// True for February 29.
pub fn is_leap_day(date: NaiveDate) -> bool {
    date.month() == 2 && date.day() == 29
}

/// Day-of-year with February 29 removed (Jan 1 = 1, Dec 31 = 365).
///
/// Callers must not pass Feb 29 itself; the spine never contains it.
pub fn ordinal_day(date: NaiveDate) -> u32 {
    debug_assert!(!is_leap_day(date), "Feb 29 has no leap-free ordinal day");
    let day_of_year = date.ordinal();
    if date.leap_year() && date.month() > 2 {
        day_of_year - 1
    } else {
        day_of_year
    }
}

/// Every calendar date from `start` to `end` inclusive, skipping Feb 29.
///
/// Returns an empty vector when `start > end`.
pub fn daily_spine(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = start;
    while current <= end {
        if !is_leap_day(current) {
            dates.push(current);
        }
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    dates
}

/// Jan 1 of `year`, used as the fixed start of long-run series.
pub fn year_start(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 1, 1)
}

// ---------------------------------------------------------------------------
// Provider timestamp formats
// ---------------------------------------------------------------------------

/// Parses an 8-character `yyyyMMdd` string.
pub fn parse_yyyymmdd(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

/// Parses a 10-character `yyyyMMddHH` string into `(date, hour)`.
///
/// Hour 24 is accepted as-is (providers use it for end-of-day readings), so
/// this cannot go through chrono's time parser.
pub fn parse_yyyymmddhh(s: &str) -> Option<(NaiveDate, u8)> {
    let s = s.trim();
    if s.len() != 10 || !s.is_char_boundary(8) {
        return None;
    }
    let date = parse_yyyymmdd(&s[..8])?;
    let hour: u8 = s[8..].parse().ok()?;
    if hour > 24 {
        return None;
    }
    Some((date, hour))
}

/// Formats a date as `yyyyMMdd`, the format the provider APIs expect.
pub fn format_yyyymmdd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

// ---------------------------------------------------------------------------
// Step arithmetic
// ---------------------------------------------------------------------------

/// Advances a cursor by one collection step.
pub fn advance(cursor: NaiveDateTime, step: StepUnit) -> NaiveDateTime {
    cursor + step.duration()
}

/// Converts a `(date, hour)` pair with hour in `0..=24` to a timestamp.
/// Hour 24 becomes midnight of the following day.
pub fn hour_timestamp(date: NaiveDate, hour: u8) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight + Duration::hours(i64::from(hour)))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_ordinal_day_matches_day_of_year_in_common_years() {
        for date in daily_spine(d(2019, 1, 1), d(2019, 12, 31)) {
            assert_eq!(ordinal_day(date), date.ordinal(), "mismatch on {}", date);
        }
    }

    #[test]
    fn test_ordinal_day_shifts_after_february_in_leap_years() {
        assert_eq!(ordinal_day(d(2020, 1, 1)), 1);
        assert_eq!(ordinal_day(d(2020, 2, 28)), 59);
        assert_eq!(ordinal_day(d(2020, 3, 1)), 60, "Mar 1 follows Feb 28 directly");
        assert_eq!(ordinal_day(d(2020, 12, 31)), 365);
        for date in daily_spine(d(2020, 3, 1), d(2020, 12, 31)) {
            assert_eq!(ordinal_day(date), date.ordinal() - 1);
        }
    }

    #[test]
    fn test_ordinal_day_always_in_range() {
        for date in daily_spine(d(1999, 1, 1), d(2005, 12, 31)) {
            let jd = ordinal_day(date);
            assert!((1..=365).contains(&jd), "{} produced JD {}", date, jd);
        }
    }

    #[test]
    fn test_leap_year_spine_has_365_days_and_no_feb_29() {
        let spine = daily_spine(d(2020, 1, 1), d(2020, 12, 31));
        assert_eq!(spine.len(), 365);
        assert!(!spine.iter().any(|date| is_leap_day(*date)));
    }

    #[test]
    fn test_spine_is_contiguous_and_inclusive() {
        let spine = daily_spine(d(2021, 12, 30), d(2022, 1, 2));
        assert_eq!(spine, vec![d(2021, 12, 30), d(2021, 12, 31), d(2022, 1, 1), d(2022, 1, 2)]);
    }

    #[test]
    fn test_spine_empty_when_start_after_end() {
        assert!(daily_spine(d(2022, 1, 2), d(2022, 1, 1)).is_empty());
    }

    #[test]
    fn test_spine_starting_on_leap_day_skips_it() {
        let spine = daily_spine(d(2024, 2, 29), d(2024, 3, 1));
        assert_eq!(spine, vec![d(2024, 3, 1)]);
    }

    #[test]
    fn test_parse_provider_formats() {
        assert_eq!(parse_yyyymmdd("20230415"), Some(d(2023, 4, 15)));
        assert_eq!(parse_yyyymmdd("2023041"), None);
        assert_eq!(parse_yyyymmdd("20231341"), None);
        assert_eq!(parse_yyyymmddhh("2023041524"), Some((d(2023, 4, 15), 24)));
        assert_eq!(parse_yyyymmddhh("2023041500"), Some((d(2023, 4, 15), 0)));
        assert_eq!(parse_yyyymmddhh("2023041525"), None);
        assert_eq!(parse_yyyymmddhh("20230415"), None);
    }

    #[test]
    fn test_hour_24_rolls_to_next_midnight() {
        let ts = hour_timestamp(d(2023, 12, 31), 24);
        assert_eq!(ts, d(2024, 1, 1).and_hms_opt(0, 0, 0).unwrap());
    }

    #[test]
    fn test_advance_by_step() {
        let base = d(2023, 5, 1).and_hms_opt(23, 0, 0).unwrap();
        assert_eq!(advance(base, StepUnit::Hourly), d(2023, 5, 2).and_hms_opt(0, 0, 0).unwrap());
        assert_eq!(advance(base, StepUnit::Daily), d(2023, 5, 2).and_hms_opt(23, 0, 0).unwrap());
    }
}
