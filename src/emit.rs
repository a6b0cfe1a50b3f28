//! Series emitter: reconstructed days to `yyyy,mm,dd,JD,value` rows.
//!
//! Whether a still-missing day becomes a sentinel row or disappears from
//! the output is chosen per series, never hard-coded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use csv::{StringRecord, Terminator, WriterBuilder};
use serde::Deserialize;

use crate::calendar;
use crate::error::{PipelineError, Result};
use crate::model::{DailySeriesPoint, SENTINEL, SeriesRow};
use crate::reconstruct::collapse::ValuePolicy;

/// What to do with a day that has no usable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmitPolicy {
    /// Drop the row entirely.
    #[default]
    OmitMissing,
    /// Keep the row; CSV shows the sentinel, the database stores NULL.
    Sentinel,
}

/// CSV shape of one series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesFormat {
    pub policy: EmitPolicy,
    /// Decimal places of the value column.
    pub precision: usize,
    /// Name of the value column.
    pub header: String,
    pub sentinel: f64,
}

impl SeriesFormat {
    pub fn new(policy: EmitPolicy, precision: usize, header: &str) -> Self {
        Self { policy, precision, header: header.to_string(), sentinel: SENTINEL }
    }
}

/// Per-station values appended to each CSV line (areal rainfall).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StationColumns {
    pub headers: Vec<String>,
    pub by_date: BTreeMap<NaiveDate, Vec<f64>>,
}

/// `<station>_<weight>` column header, weight to 4 decimals.
pub fn station_header(station: &str, weight: f64) -> String {
    format!("{}_{:.4}", station, weight)
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

/// Converts a reconstructed series to rows under `policy`.
///
/// Values the field's `ValuePolicy` rejects (e.g. a zero that survived
/// interpolation for a field where zero means missing) count as missing.
pub fn to_rows(series: &[DailySeriesPoint], policy: EmitPolicy, values: &ValuePolicy) -> Vec<SeriesRow> {
    series
        .iter()
        .filter(|p| !calendar::is_leap_day(p.date))
        .filter_map(|p| {
            let value = p.value.filter(|_| values.is_valid(p.value));
            if value.is_none() && policy == EmitPolicy::OmitMissing {
                return None;
            }
            Some(SeriesRow {
                year: p.date.year(),
                month: p.date.month(),
                day: p.date.day(),
                ordinal_day: calendar::ordinal_day(p.date),
                value,
            })
        })
        .collect()
}

fn format_value(value: Option<f64>, format: &SeriesFormat) -> String {
    match value {
        Some(v) => format!("{:.*}", format.precision, v),
        None => format!("{}", format.sentinel),
    }
}

/// Fields of one CSV record without station columns.
pub fn format_record(row: &SeriesRow, format: &SeriesFormat) -> StringRecord {
    StringRecord::from(vec![
        row.year.to_string(),
        format!("{:02}", row.month),
        format!("{:02}", row.day),
        row.ordinal_day.to_string(),
        format_value(row.value, format),
    ])
}

/// Header record plus one record per row.
pub fn render_csv(rows: &[SeriesRow], format: &SeriesFormat, stations: Option<&StationColumns>) -> Vec<StringRecord> {
    let mut header = StringRecord::from(vec!["yyyy", "mm", "dd", "JD", format.header.as_str()]);
    if let Some(stations) = stations {
        for column in &stations.headers {
            header.push_field(column);
        }
    }

    let mut records = Vec::with_capacity(rows.len() + 1);
    records.push(header);

    for row in rows {
        let mut record = format_record(row, format);
        if let Some(stations) = stations {
            let values = NaiveDate::from_ymd_opt(row.year, row.month, row.day)
                .and_then(|date| stations.by_date.get(&date));
            for i in 0..stations.headers.len() {
                let v = values.and_then(|vs| vs.get(i)).copied().unwrap_or(0.0);
                record.push_field(&format!("{:.1}", v));
            }
        }
        records.push(record);
    }
    records
}

/// Writes `<dir>/<key>.csv`, creating `dir` if needed.
pub fn write_csv(dir: &Path, key: &str, records: &[StringRecord]) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|source| PipelineError::Io {
        path: dir.display().to_string(),
        source,
    })?;

    let path = dir.join(format!("{}.csv", key));
    let csv_error = |source: csv::Error| PipelineError::Csv {
        path: path.display().to_string(),
        source,
    };

    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_path(&path)
        .map_err(csv_error)?;
    for record in records {
        writer.write_record(record).map_err(csv_error)?;
    }
    writer.flush().map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(path)
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

    fn joined(record: &StringRecord) -> String {
        record.iter().collect::<Vec<_>>().join(",")
    }

    fn sample() -> Vec<DailySeriesPoint> {
        vec![
            DailySeriesPoint::observed(d(2020, 3, 1), Some(45.678)),
            DailySeriesPoint::observed(d(2020, 3, 2), None),
            DailySeriesPoint { date: d(2020, 3, 3), value: Some(50.0), interpolated: true },
        ]
    }

    #[test]
    fn test_omit_policy_drops_missing_days() {
        let rows = to_rows(&sample(), EmitPolicy::OmitMissing, &ValuePolicy::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].ordinal_day, 60, "Mar 1 of a leap year is JD 60");
        assert_eq!(rows[1].value, Some(50.0));
    }

    #[test]
    fn test_sentinel_policy_keeps_missing_days() {
        let rows = to_rows(&sample(), EmitPolicy::Sentinel, &ValuePolicy::default());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].value, None);

        let format = SeriesFormat::new(EmitPolicy::Sentinel, 2, "Flow_Rate");
        assert_eq!(joined(&format_record(&rows[1], &format)), "2020,03,02,61,-9999");
    }

    #[test]
    fn test_zero_counts_as_missing_when_field_says_so() {
        let series = vec![DailySeriesPoint::observed(d(2021, 1, 5), Some(0.0))];
        assert!(to_rows(&series, EmitPolicy::OmitMissing, &ValuePolicy::default()).is_empty());

        let kept = to_rows(&series, EmitPolicy::OmitMissing, &ValuePolicy::zero_is_valid());
        assert_eq!(kept[0].value, Some(0.0));
    }

    #[test]
    fn test_precision_is_per_series() {
        let rows = to_rows(&sample(), EmitPolicy::OmitMissing, &ValuePolicy::default());
        let two = SeriesFormat::new(EmitPolicy::OmitMissing, 2, "RSRT");
        let four = SeriesFormat::new(EmitPolicy::OmitMissing, 4, "RSRT");
        assert_eq!(joined(&format_record(&rows[0], &two)), "2020,03,01,60,45.68");
        assert_eq!(joined(&format_record(&rows[0], &four)), "2020,03,01,60,45.6780");
    }

    #[test]
    fn test_render_csv_with_station_columns() {
        let series = vec![DailySeriesPoint::observed(d(2012, 7, 1), Some(8.0))];
        let rows = to_rows(&series, EmitPolicy::Sentinel, &ValuePolicy::zero_is_valid());
        let stations = StationColumns {
            headers: vec![station_header("108", 0.6), station_header("174", 0.4)],
            by_date: BTreeMap::from([(d(2012, 7, 1), vec![10.0, 5.0])]),
        };
        let format = SeriesFormat::new(EmitPolicy::Sentinel, 2, "AreaRainfall");
        let records = render_csv(&rows, &format, Some(&stations));

        assert_eq!(joined(&records[0]), "yyyy,mm,dd,JD,AreaRainfall,108_0.6000,174_0.4000");
        assert_eq!(joined(&records[1]), "2012,07,01,182,8.00,10.0,5.0");
    }

    #[test]
    fn test_write_csv_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("Dam");
        let records = vec![
            StringRecord::from(vec!["yyyy", "mm", "dd", "JD", "RSRT"]),
            StringRecord::from(vec!["2020", "01", "01", "1", "12.00"]),
        ];
        let path = write_csv(&dir, "47170", &records).unwrap();

        assert_eq!(path, dir.join("47170.csv"));
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "yyyy,mm,dd,JD,RSRT\n2020,01,01,1,12.00\n");
    }
}
