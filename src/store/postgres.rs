//! PostgreSQL gateway.
//!
//! Raw readings live in `drought_raw.observations` (date-only readings are
//! stored with `obs_hour = -1`). Region definitions come from
//! `drought.drought_code` and `drought.station_weights`. Reconstructed
//! series go to tables shaped `(sgg_cd, yyyy, mm, dd, jd, data)`.

use chrono::{NaiveDate, NaiveDateTime};
use postgres::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::db::{self, DbConfigError};
use crate::error::Result;
use crate::model::{
    EntityId, ObservationPoint, ObservationTime, RegionMembers, RegionWeights, SeriesRow, WeightEntry,
};
use crate::store::{CursorStore, HistorySource, RawSink, RegionSource, SeriesSink, validate_table_name};

/// Schemas every run needs.
pub const REQUIRED_SCHEMAS: &[&str] = &["drought_raw", "drought"];

/// Tables every run reads, before any series table.
pub const REQUIRED_TABLES: &[&str] = &[
    "drought_raw.observations",
    "drought.drought_code",
    "drought.station_weights",
];

const DATE_ONLY_HOUR: i16 = -1;

pub struct PostgresStore {
    client: Client,
}

impl PostgresStore {
    /// Connects via `DATABASE_URL` and checks the drought schemas, the shared
    /// tables and `series_table` when the run persists one.
    pub fn connect(series_table: Option<&str>) -> std::result::Result<Self, DbConfigError> {
        let mut tables = REQUIRED_TABLES.to_vec();
        tables.extend(series_table);
        let client = db::connect_and_verify(REQUIRED_SCHEMAS, &tables)?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn to_hour_column(time: &ObservationTime) -> i16 {
    match time.source_hour() {
        Some(hour) => i16::from(hour),
        None => DATE_ONLY_HOUR,
    }
}

fn from_columns(date: NaiveDate, hour: i16) -> ObservationTime {
    match u8::try_from(hour) {
        Ok(hour) => ObservationTime::Hourly { date, hour },
        Err(_) => ObservationTime::Daily(date),
    }
}

fn to_numeric(value: Option<f64>) -> Option<Decimal> {
    value.and_then(|v| Decimal::try_from(v).ok())
}

impl CursorStore for PostgresStore {
    fn last_cursor(&mut self, source: &str, entity: &str) -> Result<Option<NaiveDateTime>> {
        let row = self.client.query_opt(
            "SELECT obs_date, obs_hour
             FROM drought_raw.observations
             WHERE source = $1 AND entity_id = $2
             ORDER BY obs_date DESC, obs_hour DESC
             LIMIT 1",
            &[&source, &entity],
        )?;

        Ok(row.map(|row| {
            let date: NaiveDate = row.get(0);
            let hour: i16 = row.get(1);
            from_columns(date, hour).as_timestamp()
        }))
    }
}

impl RawSink for PostgresStore {
    fn upsert_raw(&mut self, source: &str, readings: &[ObservationPoint]) -> Result<u64> {
        if readings.is_empty() {
            return Ok(0);
        }

        let mut transaction = self.client.transaction()?;
        let stmt = transaction.prepare(
            "INSERT INTO drought_raw.observations
             (source, entity_id, obs_date, obs_hour, value)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (source, entity_id, obs_date, obs_hour)
             DO UPDATE SET value = EXCLUDED.value, collected_at = NOW()",
        )?;

        let mut touched = 0;
        for reading in readings {
            touched += transaction.execute(
                &stmt,
                &[
                    &source,
                    &reading.entity_id,
                    &reading.time.date(),
                    &to_hour_column(&reading.time),
                    &to_numeric(reading.value),
                ],
            )?;
        }

        transaction.commit()?;
        Ok(touched)
    }
}

impl HistorySource for PostgresStore {
    fn load_history(&mut self, source: &str, entities: &[EntityId]) -> Result<Vec<ObservationPoint>> {
        let rows = self.client.query(
            "SELECT entity_id, obs_date, obs_hour, value
             FROM drought_raw.observations
             WHERE source = $1 AND entity_id = ANY($2)
             ORDER BY obs_date, obs_hour, entity_id",
            &[&source, &entities],
        )?;

        Ok(rows
            .iter()
            .map(|row| {
                let value: Option<Decimal> = row.get(3);
                ObservationPoint {
                    entity_id: row.get(0),
                    time: from_columns(row.get(1), row.get(2)),
                    value: value.and_then(|v| v.to_f64()),
                }
            })
            .collect())
    }

    fn latest_date(&mut self, source: &str) -> Result<Option<NaiveDate>> {
        let row = self.client.query_one(
            "SELECT MAX(CASE WHEN obs_hour = 24 THEN obs_date + 1 ELSE obs_date END)
             FROM drought_raw.observations
             WHERE source = $1 AND obs_hour <> 0 AND value IS NOT NULL",
            &[&source],
        )?;
        Ok(row.get(0))
    }
}

impl RegionSource for PostgresStore {
    fn regions(&mut self, sort: &str) -> Result<Vec<RegionMembers>> {
        let rows = self.client.query(
            "SELECT sgg_cd, obs_cd
             FROM drought.drought_code
             WHERE sort = $1
             ORDER BY sgg_cd",
            &[&sort],
        )?;

        Ok(rows
            .iter()
            .map(|row| {
                let region: String = row.get(0);
                let joined: String = row.get(1);
                RegionMembers::from_joined(&region, &joined)
            })
            .collect())
    }

    fn weights(&mut self, region: &str) -> Result<Option<RegionWeights>> {
        let rows = self.client.query(
            "SELECT station, ratio, effective_from
             FROM drought.station_weights
             WHERE sgg_cd = $1
             ORDER BY station",
            &[&region],
        )?;

        if rows.is_empty() {
            return Ok(None);
        }

        let entries = rows
            .iter()
            .map(|row| {
                let ratio: Decimal = row.get(1);
                WeightEntry {
                    station: row.get(0),
                    weight: ratio.to_f64().unwrap_or(0.0),
                    effective_from: row.get(2),
                }
            })
            .collect();

        Ok(Some(RegionWeights { region: region.to_string(), entries }))
    }
}

impl SeriesSink for PostgresStore {
    fn replace_range(&mut self, table: &str, key: &str, rows: &[SeriesRow]) -> Result<u64> {
        validate_table_name(table)?;

        let mut transaction = self.client.transaction()?;
        transaction.execute(&format!("DELETE FROM {} WHERE sgg_cd = $1", table), &[&key])?;

        let stmt = transaction.prepare(&format!(
            "INSERT INTO {} (sgg_cd, yyyy, mm, dd, jd, data) VALUES ($1, $2, $3, $4, $5, $6)",
            table
        ))?;

        let mut inserted = 0;
        for row in rows {
            inserted += transaction.execute(
                &stmt,
                &[
                    &key,
                    &row.year,
                    &(row.month as i32),
                    &(row.day as i32),
                    &(row.ordinal_day as i32),
                    &to_numeric(row.value),
                ],
            )?;
        }

        transaction.commit()?;
        Ok(inserted)
    }
}
