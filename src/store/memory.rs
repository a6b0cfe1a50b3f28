//! In-memory store for tests, and the write-absorbing wrapper behind
//! `--dry-run`.
//!
//! Mirrors the PostgreSQL semantics that matter to the orchestrators:
//! raw readings are keyed by `(source, entity, time)` so re-inserting a
//! window overwrites instead of duplicating, and `replace_range` swaps the
//! whole row set of a key at once.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{PipelineError, Result};
use crate::model::{EntityId, ObservationPoint, ObservationTime, RegionMembers, RegionWeights, SeriesRow};
use crate::store::{CursorStore, HistorySource, RawSink, RegionSource, SeriesSink, validate_table_name};

type RawKey = (String, EntityId, ObservationTime);

#[derive(Debug, Default)]
pub struct MemoryStore {
    raw: BTreeMap<RawKey, Option<f64>>,
    regions: Vec<(String, RegionMembers)>,
    weights: HashMap<String, RegionWeights>,
    series: BTreeMap<(String, String), Vec<SeriesRow>>,
    failing_keys: HashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_region(&mut self, sort: &str, region: RegionMembers) {
        self.regions.push((sort.to_string(), region));
    }

    pub fn set_weights(&mut self, weights: RegionWeights) {
        self.weights.insert(weights.region.clone(), weights);
    }

    /// Makes every `replace_range` for `key` fail.
    pub fn fail_replace_for(&mut self, key: &str) {
        self.failing_keys.insert(key.to_string());
    }

    /// Rows currently stored for `key` in `table`.
    pub fn series(&self, table: &str, key: &str) -> Option<&[SeriesRow]> {
        self.series
            .get(&(table.to_string(), key.to_string()))
            .map(Vec::as_slice)
    }

    /// Number of raw readings stored under `source`.
    pub fn raw_count(&self, source: &str) -> usize {
        self.raw.keys().filter(|(s, _, _)| s == source).count()
    }
}

impl CursorStore for MemoryStore {
    fn last_cursor(&mut self, source: &str, entity: &str) -> Result<Option<NaiveDateTime>> {
        Ok(self
            .raw
            .keys()
            .filter(|(s, e, _)| s == source && e == entity)
            .map(|(_, _, time)| time.as_timestamp())
            .max())
    }
}

impl RawSink for MemoryStore {
    fn upsert_raw(&mut self, source: &str, readings: &[ObservationPoint]) -> Result<u64> {
        for reading in readings {
            self.raw.insert(
                (source.to_string(), reading.entity_id.clone(), reading.time),
                reading.value,
            );
        }
        Ok(readings.len() as u64)
    }
}

impl HistorySource for MemoryStore {
    fn load_history(&mut self, source: &str, entities: &[EntityId]) -> Result<Vec<ObservationPoint>> {
        let mut history: Vec<ObservationPoint> = self
            .raw
            .iter()
            .filter(|((s, e, _), _)| s == source && entities.contains(e))
            .map(|((_, entity, time), value)| ObservationPoint {
                entity_id: entity.clone(),
                time: *time,
                value: *value,
            })
            .collect();
        history.sort_by_key(|p| (p.time.as_timestamp(), p.entity_id.clone()));
        Ok(history)
    }

    fn latest_date(&mut self, source: &str) -> Result<Option<NaiveDate>> {
        Ok(self
            .raw
            .iter()
            .filter(|((s, _, _), value)| s == source && value.is_some())
            .filter_map(|((_, _, time), _)| time.effective_date())
            .max())
    }
}

impl RegionSource for MemoryStore {
    fn regions(&mut self, sort: &str) -> Result<Vec<RegionMembers>> {
        let mut regions: Vec<RegionMembers> = self
            .regions
            .iter()
            .filter(|(s, _)| s == sort)
            .map(|(_, region)| region.clone())
            .collect();
        regions.sort_by(|a, b| a.region.cmp(&b.region));
        Ok(regions)
    }

    fn weights(&mut self, region: &str) -> Result<Option<RegionWeights>> {
        Ok(self.weights.get(region).cloned())
    }
}

impl SeriesSink for MemoryStore {
    fn replace_range(&mut self, table: &str, key: &str, rows: &[SeriesRow]) -> Result<u64> {
        validate_table_name(table)?;
        if self.failing_keys.contains(key) {
            return Err(PipelineError::PersistenceMessage(format!(
                "replace of {} in {} rejected",
                key, table
            )));
        }
        self.series
            .insert((table.to_string(), key.to_string()), rows.to_vec());
        Ok(rows.len() as u64)
    }
}

// ---------------------------------------------------------------------------
// Dry runs
// ---------------------------------------------------------------------------

/// Reads cursors, history and regions from `reader`, but sends every write
/// to an in-memory sink. Used by `--dry-run`.
pub struct DryRunStore<R> {
    pub reader: R,
    pub sink: MemoryStore,
}

impl<R> DryRunStore<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, sink: MemoryStore::new() }
    }
}

impl<R: CursorStore> CursorStore for DryRunStore<R> {
    fn last_cursor(&mut self, source: &str, entity: &str) -> Result<Option<NaiveDateTime>> {
        self.reader.last_cursor(source, entity)
    }
}

impl<R> RawSink for DryRunStore<R> {
    fn upsert_raw(&mut self, source: &str, readings: &[ObservationPoint]) -> Result<u64> {
        self.sink.upsert_raw(source, readings)
    }
}

impl<R: HistorySource> HistorySource for DryRunStore<R> {
    fn load_history(&mut self, source: &str, entities: &[EntityId]) -> Result<Vec<ObservationPoint>> {
        self.reader.load_history(source, entities)
    }

    fn latest_date(&mut self, source: &str) -> Result<Option<NaiveDate>> {
        self.reader.latest_date(source)
    }
}

impl<R: RegionSource> RegionSource for DryRunStore<R> {
    fn regions(&mut self, sort: &str) -> Result<Vec<RegionMembers>> {
        self.reader.regions(sort)
    }

    fn weights(&mut self, region: &str) -> Result<Option<RegionWeights>> {
        self.reader.weights(region)
    }
}

impl<R> SeriesSink for DryRunStore<R> {
    fn replace_range(&mut self, table: &str, key: &str, rows: &[SeriesRow]) -> Result<u64> {
        self.sink.replace_range(table, key, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn row(day: u32, value: f64) -> SeriesRow {
        SeriesRow { year: 2023, month: 1, day, ordinal_day: day, value: Some(value) }
    }

    #[test]
    fn test_replace_range_is_idempotent() {
        let mut store = MemoryStore::new();
        let rows = vec![row(1, 1.0), row(2, 2.0)];
        store.replace_range("drought.tb_actualdrought_dam", "47170", &rows).unwrap();
        store.replace_range("drought.tb_actualdrought_dam", "47170", &rows).unwrap();
        assert_eq!(store.series("drought.tb_actualdrought_dam", "47170").unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_overwrites_same_reading() {
        let mut store = MemoryStore::new();
        let date = d(2023, 5, 1);
        store.upsert_raw("wamis_dam", &[ObservationPoint::hourly("1012110", date, 7, Some(40.0))]).unwrap();
        store.upsert_raw("wamis_dam", &[ObservationPoint::hourly("1012110", date, 7, Some(41.0))]).unwrap();

        assert_eq!(store.raw_count("wamis_dam"), 1);
        let history = store.load_history("wamis_dam", &["1012110".to_string()]).unwrap();
        assert_eq!(history[0].value, Some(41.0));
    }

    #[test]
    fn test_cursor_is_latest_reading() {
        let mut store = MemoryStore::new();
        let date = d(2023, 5, 1);
        store
            .upsert_raw(
                "wamis_dam",
                &[
                    ObservationPoint::hourly("1012110", date, 7, Some(40.0)),
                    ObservationPoint::hourly("1012110", date, 24, Some(40.5)),
                    ObservationPoint::hourly("other", date, 23, Some(1.0)),
                ],
            )
            .unwrap();
        assert_eq!(
            store.last_cursor("wamis_dam", "1012110").unwrap(),
            Some(d(2023, 5, 2).and_hms_opt(0, 0, 0).unwrap())
        );
        assert_eq!(store.last_cursor("wamis_dam", "missing").unwrap(), None);
    }

    #[test]
    fn test_dry_run_reads_through_and_keeps_writes_in_memory() {
        let mut backing = MemoryStore::new();
        backing.add_region("Dam", RegionMembers::from_joined("47170", "1012110"));
        backing
            .upsert_raw("wamis_dam", &[ObservationPoint::hourly("1012110", d(2023, 5, 1), 7, Some(40.0))])
            .unwrap();

        let mut dry = DryRunStore::new(backing);
        assert_eq!(dry.regions("Dam").unwrap().len(), 1);
        assert!(dry.last_cursor("wamis_dam", "1012110").unwrap().is_some());

        dry.upsert_raw("wamis_dam", &[ObservationPoint::hourly("1012110", d(2023, 5, 1), 8, Some(41.0))])
            .unwrap();
        dry.replace_range("drought.tb_actualdrought_dam", "47170", &[row(1, 1.0)]).unwrap();

        assert_eq!(dry.reader.raw_count("wamis_dam"), 1, "reader is never written");
        assert_eq!(dry.sink.raw_count("wamis_dam"), 1);
        assert!(dry.reader.series("drought.tb_actualdrought_dam", "47170").is_none());
        assert!(dry.sink.series("drought.tb_actualdrought_dam", "47170").is_some());
    }

    #[test]
    fn test_injected_failure() {
        let mut store = MemoryStore::new();
        store.fail_replace_for("42230");
        let err = store.replace_range("drought.tb_actualdrought_dam", "42230", &[row(1, 1.0)]).unwrap_err();
        assert!(!err.is_adapter_failure());
    }
}
