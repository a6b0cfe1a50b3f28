//! Areal aggregation: weighted sum of station series into one region series.
//!
//! `region(d) = Σ weight_effective(station, d) * station(d)`, with a missing
//! station value counting as zero. What happens on a day where every
//! contributing station is missing is an explicit policy.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::model::{DailySeriesPoint, EntityId, RegionWeights};

/// Output for a day on which no contributing station has a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AllAbsentPolicy {
    /// Emit the plain sum, i.e. 0.0.
    #[default]
    Zero,
    /// Mark the region value absent.
    Absent,
}

/// One aggregated day plus the per-station inputs that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct ArealDay {
    pub point: DailySeriesPoint,
    /// Station values in weighting-table order, missing as 0.0.
    pub station_values: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ArealAggregator {
    weights: RegionWeights,
    all_absent: AllAbsentPolicy,
}

impl ArealAggregator {
    /// Validates the weighting table: non-empty, finite non-negative weights,
    /// no station listed twice.
    pub fn new(weights: RegionWeights, all_absent: AllAbsentPolicy) -> Result<Self> {
        if weights.entries.is_empty() {
            return Err(PipelineError::Reconstruction(format!(
                "region {} has an empty weighting table",
                weights.region
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &weights.entries {
            if !entry.weight.is_finite() || entry.weight < 0.0 {
                return Err(PipelineError::Reconstruction(format!(
                    "region {}: station {} has invalid weight {}",
                    weights.region, entry.station, entry.weight
                )));
            }
            if !seen.insert(entry.station.as_str()) {
                return Err(PipelineError::Reconstruction(format!(
                    "region {}: station {} listed twice",
                    weights.region, entry.station
                )));
            }
        }
        Ok(Self { weights, all_absent })
    }

    pub fn weights(&self) -> &RegionWeights {
        &self.weights
    }

    /// Aggregates station series over `spine`.
    ///
    /// Stations with no series at all contribute zero on every day.
    pub fn aggregate(
        &self,
        spine: &[NaiveDate],
        stations: &HashMap<EntityId, Vec<DailySeriesPoint>>,
    ) -> Vec<ArealDay> {
        let lookups: Vec<HashMap<NaiveDate, f64>> = self
            .weights
            .entries
            .iter()
            .map(|entry| {
                stations
                    .get(&entry.station)
                    .map(|series| {
                        series
                            .iter()
                            .filter_map(|p| p.value.map(|v| (p.date, v)))
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect();

        spine
            .iter()
            .map(|&date| {
                let mut total = 0.0;
                let mut any_present = false;
                let mut station_values = Vec::with_capacity(lookups.len());

                for (entry, lookup) in self.weights.entries.iter().zip(&lookups) {
                    let value = lookup.get(&date).copied();
                    if value.is_some() && entry.effective_on(date) > 0.0 {
                        any_present = true;
                    }
                    let value = value.unwrap_or(0.0);
                    total += entry.effective_on(date) * value;
                    station_values.push(value);
                }

                let value = match (any_present, self.all_absent) {
                    (false, AllAbsentPolicy::Absent) => None,
                    _ => Some(total),
                };
                ArealDay {
                    point: DailySeriesPoint { date, value, interpolated: false },
                    station_values,
                }
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::WeightEntry;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn single_day(date: NaiveDate, value: Option<f64>) -> Vec<DailySeriesPoint> {
        vec![DailySeriesPoint::observed(date, value)]
    }

    fn region(b_effective: Option<NaiveDate>) -> RegionWeights {
        RegionWeights {
            region: "47170".to_string(),
            entries: vec![
                WeightEntry::new("A", 0.6),
                WeightEntry { station: "B".to_string(), weight: 0.4, effective_from: b_effective },
            ],
        }
    }

    #[test]
    fn test_weighted_sum() {
        let date = d(2012, 5, 1);
        let stations = HashMap::from([
            ("A".to_string(), single_day(date, Some(10.0))),
            ("B".to_string(), single_day(date, Some(5.0))),
        ]);
        let agg = ArealAggregator::new(region(None), AllAbsentPolicy::Zero).unwrap();
        let out = agg.aggregate(&[date], &stations);
        assert!((out[0].point.value.unwrap() - 8.0).abs() < 1e-9);
        assert_eq!(out[0].station_values, vec![10.0, 5.0]);
    }

    #[test]
    fn test_station_weight_zero_before_effective_date() {
        let date = d(2011, 3, 15);
        let stations = HashMap::from([
            ("A".to_string(), single_day(date, Some(10.0))),
            ("B".to_string(), single_day(date, Some(5.0))),
        ]);
        let agg = ArealAggregator::new(region(Some(d(2011, 4, 1))), AllAbsentPolicy::Zero).unwrap();
        let out = agg.aggregate(&[date], &stations);
        assert!((out[0].point.value.unwrap() - 6.0).abs() < 1e-9, "only A contributes");

        let later = d(2011, 4, 1);
        let stations = HashMap::from([
            ("A".to_string(), single_day(later, Some(10.0))),
            ("B".to_string(), single_day(later, Some(5.0))),
        ]);
        let out = agg.aggregate(&[later], &stations);
        assert!((out[0].point.value.unwrap() - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_missing_station_value_counts_as_zero() {
        let date = d(2012, 5, 1);
        let stations = HashMap::from([("A".to_string(), single_day(date, Some(10.0)))]);
        let agg = ArealAggregator::new(region(None), AllAbsentPolicy::Absent).unwrap();
        let out = agg.aggregate(&[date], &stations);
        assert!((out[0].point.value.unwrap() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_all_absent_policy_zero_emits_zero() {
        let date = d(2012, 5, 1);
        let agg = ArealAggregator::new(region(None), AllAbsentPolicy::Zero).unwrap();
        let out = agg.aggregate(&[date], &HashMap::new());
        assert_eq!(out[0].point.value, Some(0.0));
    }

    #[test]
    fn test_all_absent_policy_absent_marks_missing() {
        let date = d(2012, 5, 1);
        let stations = HashMap::from([
            ("A".to_string(), single_day(date, None)),
            ("B".to_string(), single_day(date, None)),
        ]);
        let agg = ArealAggregator::new(region(None), AllAbsentPolicy::Absent).unwrap();
        let out = agg.aggregate(&[date], &stations);
        assert_eq!(out[0].point.value, None);
    }

    #[test]
    fn test_only_uncommissioned_station_present_counts_as_absent() {
        let date = d(2010, 1, 1);
        let stations = HashMap::from([("B".to_string(), single_day(date, Some(5.0)))]);
        let agg = ArealAggregator::new(region(Some(d(2011, 4, 1))), AllAbsentPolicy::Absent).unwrap();
        let out = agg.aggregate(&[date], &stations);
        assert_eq!(out[0].point.value, None);
    }

    #[test]
    fn test_malformed_tables_rejected() {
        let empty = RegionWeights { region: "x".to_string(), entries: vec![] };
        assert!(ArealAggregator::new(empty, AllAbsentPolicy::Zero).is_err());

        let negative = RegionWeights { region: "x".to_string(), entries: vec![WeightEntry::new("A", -0.1)] };
        assert!(ArealAggregator::new(negative, AllAbsentPolicy::Zero).is_err());

        let duplicate = RegionWeights {
            region: "x".to_string(),
            entries: vec![WeightEntry::new("A", 0.5), WeightEntry::new("A", 0.5)],
        };
        assert!(ArealAggregator::new(duplicate, AllAbsentPolicy::Zero).is_err());
    }
}
