//! Reconstruction orchestrator.
//!
//! Rebuilds one configured series for every region of its drought-code
//! sort, from the full persisted raw history:
//!
//! ```text
//! Loading ─► Collapsing ─► Interpolating ─► (Aggregating) ─► Emitting ─► Persisting ─► Done
//! ```
//!
//! Any stage can end in `Failed`; the region is recorded in the summary and
//! the next region is processed. Failing to list the regions at all aborts
//! this series only.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use chrono::NaiveDate;
use log::{Log, debug, error, info, warn};

use crate::config::{CombineMode, ReconstructionConfig, SeriesConfig};
use crate::emit::{self, EmitPolicy, StationColumns};
use crate::error::{PipelineError, Result};
use crate::logging::{DB, PROC, SYS};
use crate::model::{DailySeriesPoint, EntityFailure, PipelineStage, RegionMembers, RegionWeights, RunSummary};
use crate::reconstruct::areal::ArealAggregator;
use crate::reconstruct::collapse::{ValuePolicy, collapse_daily};
use crate::reconstruct::interpolate::GapInterpolator;
use crate::reconstruct::{self, ObservationWindow, SpanEnd, SpanInputs};
use crate::store::ReconstructionStore;

/// What happened to one region.
#[derive(Debug)]
enum RegionOutcome {
    Skipped(String),
    Written { rows: u64, csv: PathBuf },
}

/// A reconstructed region series plus optional per-station CSV columns.
struct Reconstructed {
    series: Vec<DailySeriesPoint>,
    stations: Option<StationColumns>,
}

type StageResult<T> = std::result::Result<T, (PipelineStage, PipelineError)>;

fn at<T>(stage: PipelineStage, result: Result<T>) -> StageResult<T> {
    result.map_err(|err| (stage, err))
}

pub struct Processor<'a> {
    series: SeriesConfig,
    settings: ReconstructionConfig,
    windows: HashMap<String, ObservationWindow>,
    overrides: HashMap<String, NaiveDate>,
    logger: &'a dyn Log,
}

impl<'a> Processor<'a> {
    pub fn new(
        series: SeriesConfig,
        settings: ReconstructionConfig,
        windows: HashMap<String, ObservationWindow>,
        overrides: HashMap<String, NaiveDate>,
        logger: &'a dyn Log,
    ) -> Self {
        Self { series, settings, windows, overrides, logger }
    }

    fn value_policy(&self) -> ValuePolicy {
        self.series.value_policy()
    }

    fn interpolator(&self) -> GapInterpolator {
        GapInterpolator::new(self.settings.gap_window_days, self.value_policy())
    }

    /// Reconstructs every region of the series.
    pub fn run<S: ReconstructionStore + ?Sized>(&self, store: &mut S, today: NaiveDate) -> RunSummary {
        let mut summary = RunSummary::new(&self.series.name);
        info!(logger: self.logger, target: SYS, "🔧 Reconstructing {} ({:?})", self.series.name, self.series.kind);

        let regions = match store.regions(&self.series.region_sort) {
            Ok(regions) => regions,
            Err(err) => {
                error!(logger: self.logger, target: DB, "cannot list {} regions: {}", self.series.region_sort, err);
                summary.aborted = Some(err.to_string());
                return summary;
            }
        };

        let master_end = match self.series.span_end {
            SpanEnd::Master => match store.latest_date(&self.series.source) {
                Ok(date) => date,
                Err(err) => {
                    error!(logger: self.logger, target: DB, "cannot read latest {} date: {}", self.series.source, err);
                    summary.aborted = Some(err.to_string());
                    return summary;
                }
            },
            SpanEnd::Data => None,
        };

        for region in &regions {
            match self.process_region(store, region, master_end, today) {
                Ok(RegionOutcome::Skipped(reason)) => {
                    warn!(logger: self.logger, target: PROC, "[{}] skipped: {}", region.region, reason);
                    summary.skipped.push(region.region.clone());
                }
                Ok(RegionOutcome::Written { rows, csv }) => {
                    info!(logger: self.logger, target: PROC, "[{}] ✓ {} rows, CSV {}", region.region, rows, csv.display());
                    summary.rows_written += rows;
                    summary.succeeded.push(region.region.clone());
                }
                Err((stage, err)) => {
                    error!(logger: self.logger, target: PROC, "[{}] failed while {}: {}", region.region, stage, err);
                    summary.failed.push(EntityFailure {
                        key: region.region.clone(),
                        stage,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(logger: self.logger, target: SYS, "{}", summary);
        summary
    }

    fn process_region<S: ReconstructionStore + ?Sized>(
        &self,
        store: &mut S,
        region: &RegionMembers,
        master_end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> StageResult<RegionOutcome> {
        if region.members.is_empty() {
            return Err((
                PipelineStage::Loading,
                PipelineError::Reconstruction(format!("region {} lists no entities", region.region)),
            ));
        }

        let reconstructed = match self.series.combine {
            CombineMode::Pooled => self.reconstruct_pooled(store, region, master_end, today)?,
            CombineMode::Weighted => self.reconstruct_weighted(store, region, master_end, today)?,
        };
        let Some(reconstructed) = reconstructed else {
            return Ok(RegionOutcome::Skipped("no observations in range".to_string()));
        };

        let rows = emit::to_rows(&reconstructed.series, self.series.emit, &self.value_policy());
        if rows.is_empty() && self.series.emit == EmitPolicy::OmitMissing {
            return Ok(RegionOutcome::Skipped("no valid values to emit".to_string()));
        }

        let format = self.series.format(self.settings.sentinel);
        let records = emit::render_csv(&rows, &format, reconstructed.stations.as_ref());
        let dir = self.series.output_dir(std::path::Path::new(&self.settings.output_root));
        let csv = at(PipelineStage::Emitting, emit::write_csv(&dir, &region.region, &records))?;

        let written = match &self.series.persist_table {
            Some(table) => at(PipelineStage::Persisting, store.replace_range(table, &region.region, &rows))?,
            None => rows.len() as u64,
        };
        Ok(RegionOutcome::Written { rows: written, csv })
    }

    /// Raw readings of `entities`, trimmed to the region's observation window.
    fn load<S: ReconstructionStore + ?Sized>(
        &self,
        store: &mut S,
        region: &str,
        entities: &[String],
    ) -> StageResult<Vec<crate::model::ObservationPoint>> {
        let history = at(PipelineStage::Loading, store.load_history(&self.series.source, entities))?;
        let total = history.len();
        let kept = reconstruct::apply_window(history, self.windows.get(region));
        if kept.len() != total {
            debug!(
                logger: self.logger, target: PROC,
                "[{}] observation window dropped {} of {} readings", region, total - kept.len(), total
            );
        }
        Ok(kept)
    }

    fn span(
        &self,
        data_range: Option<(NaiveDate, NaiveDate)>,
        master_end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> StageResult<Option<(NaiveDate, NaiveDate)>> {
        let inputs = SpanInputs { start_year: self.settings.start_year, data_range, master_end, today };
        at(
            PipelineStage::Collapsing,
            reconstruct::select_span(self.series.span_start, self.series.span_end, &inputs),
        )
    }

    fn fill(&self, region: &str, series: Vec<DailySeriesPoint>) -> Vec<DailySeriesPoint> {
        if !self.series.interpolate {
            return series;
        }
        let (filled, stats) = self.interpolator().fill(&series);
        debug!(
            logger: self.logger, target: PROC,
            "[{}] {} gaps, {} filled, {} one-sided, {} isolated",
            region, stats.gaps, stats.filled, stats.one_sided, stats.isolated
        );
        filled
    }

    /// All member readings collapsed together as one entity.
    fn reconstruct_pooled<S: ReconstructionStore + ?Sized>(
        &self,
        store: &mut S,
        region: &RegionMembers,
        master_end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> StageResult<Option<Reconstructed>> {
        let mut readings = self.load(store, &region.region, &region.members)?;
        // Same-hour ties go to the member listed first in the region code.
        readings.sort_by_key(|p| {
            region
                .members
                .iter()
                .position(|m| *m == p.entity_id)
                .unwrap_or(usize::MAX)
        });
        let sparse = collapse_daily(&readings, &self.value_policy());

        let Some((start, end)) = self.span(reconstruct::data_range(&sparse), master_end, today)? else {
            return Ok(None);
        };
        let series = reconstruct::merge_onto_spine(&sparse, start, end);
        Ok(Some(Reconstructed { series: self.fill(&region.region, series), stations: None }))
    }

    /// Weighting table for the region, with commissioning overrides applied.
    fn weights_for<S: ReconstructionStore + ?Sized>(
        &self,
        store: &mut S,
        region: &RegionMembers,
    ) -> StageResult<RegionWeights> {
        let mut weights = at(PipelineStage::Loading, store.weights(&region.region))?
            .unwrap_or_else(|| RegionWeights::unit(region));

        for entry in &mut weights.entries {
            if let Some(&from) = self.overrides.get(&entry.station) {
                entry.effective_from = Some(entry.effective_from.map_or(from, |existing| existing.max(from)));
            }
        }
        Ok(weights)
    }

    /// Each station reconstructed on its own, then the weighted sum.
    fn reconstruct_weighted<S: ReconstructionStore + ?Sized>(
        &self,
        store: &mut S,
        region: &RegionMembers,
        master_end: Option<NaiveDate>,
        today: NaiveDate,
    ) -> StageResult<Option<Reconstructed>> {
        let weights = self.weights_for(store, region)?;
        let aggregator = at(
            PipelineStage::Aggregating,
            ArealAggregator::new(weights, self.series.all_absent),
        )?;
        let stations = aggregator.weights().stations();
        let readings = self.load(store, &region.region, &stations)?;

        let mut per_station: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for reading in readings {
            per_station.entry(reading.entity_id.clone()).or_default().push(reading);
        }

        let policy = self.value_policy();
        let sparse: HashMap<String, BTreeMap<NaiveDate, f64>> = per_station
            .iter()
            .map(|(station, readings)| (station.clone(), collapse_daily(readings, &policy)))
            .collect();

        let data_range = sparse
            .values()
            .filter_map(reconstruct::data_range)
            .reduce(|(a_first, a_last), (b_first, b_last)| (a_first.min(b_first), a_last.max(b_last)));

        let Some((start, end)) = self.span(data_range, master_end, today)? else {
            return Ok(None);
        };

        let station_series: HashMap<String, Vec<DailySeriesPoint>> = sparse
            .iter()
            .map(|(station, map)| {
                let key = format!("{}/{}", region.region, station);
                (station.clone(), self.fill(&key, reconstruct::merge_onto_spine(map, start, end)))
            })
            .collect();

        let spine = crate::calendar::daily_spine(start, end);
        let days = aggregator.aggregate(&spine, &station_series);

        let stations = self.series.station_columns.then(|| StationColumns {
            headers: aggregator
                .weights()
                .entries
                .iter()
                .map(|e| emit::station_header(&e.station, e.weight))
                .collect(),
            by_date: days.iter().map(|day| (day.point.date, day.station_values.clone())).collect(),
        });

        Ok(Some(Reconstructed {
            series: days.into_iter().map(|day| day.point).collect(),
            stations,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SeriesKind;
    use crate::model::ObservationPoint;
    use crate::reconstruct::areal::AllAbsentPolicy;
    use crate::reconstruct::SpanStart;
    use crate::store::RawSink;
    use crate::store::memory::MemoryStore;
    use log::LevelFilter;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(root: &std::path::Path) -> (SeriesConfig, ReconstructionConfig) {
        let series = SeriesConfig {
            name: "dam".to_string(),
            kind: SeriesKind::Dam,
            source: "wamis_dam".to_string(),
            region_sort: "Dam".to_string(),
            combine: CombineMode::Pooled,
            interpolate: true,
            zero_is_sentinel: true,
            input_missing: vec![-9999.0],
            span_start: SpanStart::DataClamped,
            span_end: SpanEnd::Data,
            emit: EmitPolicy::OmitMissing,
            precision: 2,
            header: "RSRT".to_string(),
            persist_table: Some("drought.tb_actualdrought_dam".to_string()),
            all_absent: AllAbsentPolicy::Zero,
            station_columns: false,
            csv_dir: None,
        };
        let settings = ReconstructionConfig {
            output_root: root.display().to_string(),
            ..ReconstructionConfig::default()
        };
        (series, settings)
    }

    fn quiet() -> crate::logging::ServiceLogger {
        crate::logging::ServiceLogger::new(LevelFilter::Off, None, false).unwrap()
    }

    #[test]
    fn test_pooled_region_fills_gap_and_writes_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = quiet();
        let (config, settings) = series(tmp.path());

        let mut store = MemoryStore::new();
        store.add_region("Dam", RegionMembers::from_joined("47170", "1012110_1001110"));
        store
            .upsert_raw(
                "wamis_dam",
                &[
                    ObservationPoint::hourly("1012110", d(2023, 1, 1), 12, Some(40.0)),
                    ObservationPoint::hourly("1001110", d(2023, 1, 3), 12, Some(60.0)),
                ],
            )
            .unwrap();

        let processor = Processor::new(config, settings, HashMap::new(), HashMap::new(), &logger);
        let summary = processor.run(&mut store, d(2024, 1, 1));

        assert_eq!(summary.succeeded, vec!["47170"]);
        let rows = store.series("drought.tb_actualdrought_dam", "47170").unwrap();
        let values: Vec<_> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![Some(40.0), Some(50.0), Some(60.0)]);

        let csv = std::fs::read_to_string(tmp.path().join("Dam").join("47170.csv")).unwrap();
        assert!(csv.starts_with("yyyy,mm,dd,JD,RSRT\n2023,01,01,1,40.00\n2023,01,02,2,50.00\n"));
    }

    #[test]
    fn test_pooled_same_hour_prefers_first_listed_member() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = quiet();
        let (config, settings) = series(tmp.path());

        let mut store = MemoryStore::new();
        store.add_region("Dam", RegionMembers::from_joined("47170", "1012110_1001110"));
        store
            .upsert_raw(
                "wamis_dam",
                &[
                    ObservationPoint::hourly("1001110", d(2023, 1, 1), 12, Some(60.0)),
                    ObservationPoint::hourly("1012110", d(2023, 1, 1), 12, Some(40.0)),
                ],
            )
            .unwrap();

        let processor = Processor::new(config, settings, HashMap::new(), HashMap::new(), &logger);
        let summary = processor.run(&mut store, d(2024, 1, 1));

        assert_eq!(summary.succeeded, vec!["47170"]);
        let rows = store.series("drought.tb_actualdrought_dam", "47170").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, Some(40.0), "1012110 is listed first in the region code");
    }

    #[test]
    fn test_region_without_data_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = quiet();
        let (config, settings) = series(tmp.path());
        let mut store = MemoryStore::new();
        store.add_region("Dam", RegionMembers::from_joined("48000", "9999999"));

        let processor = Processor::new(config, settings, HashMap::new(), HashMap::new(), &logger);
        let summary = processor.run(&mut store, d(2024, 1, 1));
        assert_eq!(summary.skipped, vec!["48000"]);
        assert!(summary.is_clean());
    }

    #[test]
    fn test_weighted_region_applies_commissioning_override() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = quiet();
        let (mut config, settings) = series(tmp.path());
        config.combine = CombineMode::Weighted;
        config.source = "kma_asos".to_string();
        config.region_sort = "Rainfall".to_string();
        config.zero_is_sentinel = false;
        config.interpolate = false;
        config.emit = EmitPolicy::Sentinel;
        config.persist_table = None;
        config.station_columns = true;
        config.header = "AreaRainfall".to_string();

        let mut store = MemoryStore::new();
        store.add_region("Rainfall", RegionMembers::from_joined("47170", "108_174"));
        store.set_weights(RegionWeights {
            region: "47170".to_string(),
            entries: vec![
                crate::model::WeightEntry::new("108", 0.6),
                crate::model::WeightEntry::new("174", 0.4),
            ],
        });
        store
            .upsert_raw(
                "kma_asos",
                &[
                    ObservationPoint::daily("108", d(2011, 3, 31), Some(10.0)),
                    ObservationPoint::daily("174", d(2011, 3, 31), Some(5.0)),
                    ObservationPoint::daily("108", d(2011, 4, 1), Some(10.0)),
                    ObservationPoint::daily("174", d(2011, 4, 1), Some(5.0)),
                ],
            )
            .unwrap();

        let overrides = HashMap::from([("174".to_string(), d(2011, 4, 1))]);
        let processor = Processor::new(config, settings, HashMap::new(), overrides, &logger);
        let summary = processor.run(&mut store, d(2024, 1, 1));
        assert_eq!(summary.succeeded, vec!["47170"]);

        let csv = std::fs::read_to_string(tmp.path().join("Rainfall").join("47170.csv")).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines[0], "yyyy,mm,dd,JD,AreaRainfall,108_0.6000,174_0.4000");
        assert_eq!(lines[1], "2011,03,31,90,6.00,10.0,5.0", "174 does not count before 2011-04-01");
        assert_eq!(lines[2], "2011,04,01,91,8.00,10.0,5.0");
    }

    #[test]
    fn test_persistence_failure_is_isolated_per_region() {
        let tmp = tempfile::tempdir().unwrap();
        let logger = quiet();
        let (config, settings) = series(tmp.path());

        let mut store = MemoryStore::new();
        store.add_region("Dam", RegionMembers::from_joined("42230", "A"));
        store.add_region("Dam", RegionMembers::from_joined("47170", "B"));
        store
            .upsert_raw(
                "wamis_dam",
                &[
                    ObservationPoint::hourly("A", d(2023, 1, 1), 12, Some(40.0)),
                    ObservationPoint::hourly("B", d(2023, 1, 1), 12, Some(41.0)),
                ],
            )
            .unwrap();
        store.fail_replace_for("42230");

        let processor = Processor::new(config, settings, HashMap::new(), HashMap::new(), &logger);
        let summary = processor.run(&mut store, d(2024, 1, 1));

        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].key, "42230");
        assert_eq!(summary.failed[0].stage, PipelineStage::Persisting);
        assert_eq!(summary.succeeded, vec!["47170"]);
    }
}
