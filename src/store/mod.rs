//! Strategy traits the orchestrators are composed from.
//!
//! The collector needs a `SourceAdapter`, a `CursorStore` and a `RawSink`;
//! the processor needs a `HistorySource`, a `RegionSource` and a
//! `SeriesSink`. `postgres::PostgresStore` implements all store traits
//! against the database, `memory::MemoryStore` in memory.

pub mod memory;
pub mod postgres;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{PipelineError, Result};
use crate::model::{EntityId, ObservationPoint, RegionMembers, RegionWeights, SeriesRow, StepUnit};

/// A provider of raw readings for a set of entities.
pub trait SourceAdapter {
    /// Tag under which readings from this adapter are persisted.
    fn source(&self) -> &str;

    fn step(&self) -> StepUnit;

    /// Readings for `entity` with timestamps in `[from, to)`.
    fn fetch(&self, entity: &str, from: NaiveDateTime, to: NaiveDateTime) -> Result<Vec<ObservationPoint>>;
}

/// Per-entity collection cursor.
pub trait CursorStore {
    /// Timestamp of the latest persisted reading, if any.
    fn last_cursor(&mut self, source: &str, entity: &str) -> Result<Option<NaiveDateTime>>;
}

/// Destination of fetched raw readings.
pub trait RawSink {
    /// Inserts or updates readings; returns the number of rows touched.
    fn upsert_raw(&mut self, source: &str, readings: &[ObservationPoint]) -> Result<u64>;
}

/// Persisted raw history, read back for reconstruction.
pub trait HistorySource {
    /// Every stored reading of `entities` under `source`, in time order.
    fn load_history(&mut self, source: &str, entities: &[EntityId]) -> Result<Vec<ObservationPoint>>;

    /// Latest reading date across every entity of `source`.
    fn latest_date(&mut self, source: &str) -> Result<Option<NaiveDate>>;
}

/// Region definitions and spatial weights.
pub trait RegionSource {
    /// Regions of one drought-code sort (e.g. `Dam`, `FR`), ordered by code.
    fn regions(&mut self, sort: &str) -> Result<Vec<RegionMembers>>;

    /// Thiessen weighting table of `region`, if one is stored.
    fn weights(&mut self, region: &str) -> Result<Option<RegionWeights>>;
}

/// Destination of reconstructed series.
pub trait SeriesSink {
    /// Atomically replaces every row of `key` in `table` with `rows`.
    /// Returns the number of rows inserted.
    fn replace_range(&mut self, table: &str, key: &str, rows: &[SeriesRow]) -> Result<u64>;
}

/// Everything the collector needs from storage.
pub trait CollectionStore: CursorStore + RawSink {}
impl<T: CursorStore + RawSink> CollectionStore for T {}

/// Everything the processor needs from storage.
pub trait ReconstructionStore: HistorySource + RegionSource + SeriesSink {}
impl<T: HistorySource + RegionSource + SeriesSink> ReconstructionStore for T {}

/// Rejects table names that could not be a plain `schema.table` identifier.
pub fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table.split('.').count() <= 2
        && table.split('.').all(|part| {
            !part.is_empty()
                && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                && !part.starts_with(|c: char| c.is_ascii_digit())
        });
    if valid {
        Ok(())
    } else {
        Err(PipelineError::Config(format!("invalid table name '{}'", table)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_validation() {
        assert!(validate_table_name("drought.tb_actualdrought_dam").is_ok());
        assert!(validate_table_name("series_rows").is_ok());
        assert!(validate_table_name("drought.x; DROP TABLE y").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("drought.").is_err());
        assert!(validate_table_name("1table").is_err());
    }
}
