/// Service configuration loader - parses drought.toml
///
/// Keeps entity lists, per-series reconstruction policy and the known
/// station/region data quirks out of the code, so a new dam or a changed
/// output precision needs no recompile.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;

use crate::emit::{EmitPolicy, SeriesFormat};
use crate::error::{PipelineError, Result};
use crate::model::{SENTINEL, StepUnit};
use crate::reconstruct::areal::AllAbsentPolicy;
use crate::reconstruct::collapse::ValuePolicy;
use crate::reconstruct::interpolate::DEFAULT_GAP_WINDOW_DAYS;
use crate::reconstruct::{ObservationWindow, SpanEnd, SpanStart};
use crate::store::validate_table_name;

pub const DEFAULT_CONFIG_PATH: &str = "drought.toml";

// ---------------------------------------------------------------------------
// Top-level tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub reconstruction: ReconstructionConfig,
    pub collection: CollectionConfig,
    pub logging: LoggingConfig,
    pub wamis: WamisConfig,
    #[serde(rename = "collector")]
    pub collectors: Vec<CollectorConfig>,
    pub series: Vec<SeriesConfig>,
    #[serde(rename = "weight_override")]
    pub weight_overrides: Vec<WeightOverride>,
    #[serde(rename = "observation_window")]
    pub observation_windows: Vec<ObservationWindowConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub gap_window_days: i64,
    pub start_year: i32,
    pub sentinel: f64,
    pub output_root: String,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            gap_window_days: DEFAULT_GAP_WINDOW_DAYS,
            start_year: 1991,
            sentinel: SENTINEL,
            output_root: "OutputData".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Pause between two entities of one collector (upstream rate limit).
    pub inter_entity_delay_ms: u64,
    /// Independent pipelines run on at most this many threads.
    pub max_parallel_pipelines: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self { inter_entity_delay_ms: 1000, max_parallel_pipelines: 2 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None, timestamps: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WamisConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

impl Default for WamisConfig {
    fn default() -> Self {
        Self { base_url: crate::ingest::wamis::WAMIS_API_BASE.to_string(), api_key: None }
    }
}

impl WamisConfig {
    /// Key from the config file, else `WAMIS_API_KEY` from the environment / `.env`.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        dotenv::dotenv().ok();
        env::var("WAMIS_API_KEY").map_err(|_| {
            PipelineError::Config(
                "WAMIS API key not set: add [wamis] api_key to drought.toml or WAMIS_API_KEY to .env".to_string(),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Collectors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    WamisDam,
    WamisFlow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectorConfig {
    pub name: String,
    pub source: SourceKind,
    pub step: StepUnit,
    pub default_lookback_days: i64,
    pub entities: Vec<String>,
}

// ---------------------------------------------------------------------------
// Reconstructed series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesKind {
    Dam,
    Ar,
    Flow,
    Agag,
    Rainfall,
}

impl SeriesKind {
    /// Output sub-directory used when a series sets no `csv_dir`.
    pub fn default_dir(&self) -> &'static str {
        match self {
            SeriesKind::Dam => "Dam",
            SeriesKind::Ar => "AR",
            SeriesKind::Flow => "FR",
            SeriesKind::Agag => "AgAg",
            SeriesKind::Rainfall => "Rainfall",
        }
    }
}

/// How the member entities of a region become one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    /// Collapse all member readings together as if from one entity.
    #[default]
    Pooled,
    /// Reconstruct each member separately, then take the weighted sum
    /// (stored Thiessen weights, else weight 1.0 per member).
    Weighted,
}

fn default_true() -> bool {
    true
}

fn default_precision() -> usize {
    2
}

fn default_missing_markers() -> Vec<f64> {
    vec![SENTINEL]
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeriesConfig {
    pub name: String,
    pub kind: SeriesKind,
    /// Raw source tag the history is read from.
    pub source: String,
    /// `drought_code.sort` listing the regions of this series.
    pub region_sort: String,
    #[serde(default)]
    pub combine: CombineMode,
    #[serde(default = "default_true")]
    pub interpolate: bool,
    #[serde(default = "default_true")]
    pub zero_is_sentinel: bool,
    #[serde(default = "default_missing_markers")]
    pub input_missing: Vec<f64>,
    #[serde(default)]
    pub span_start: SpanStart,
    #[serde(default)]
    pub span_end: SpanEnd,
    #[serde(default)]
    pub emit: EmitPolicy,
    #[serde(default = "default_precision")]
    pub precision: usize,
    pub header: String,
    pub persist_table: Option<String>,
    #[serde(default)]
    pub all_absent: AllAbsentPolicy,
    #[serde(default)]
    pub station_columns: bool,
    pub csv_dir: Option<String>,
}

impl SeriesConfig {
    pub fn value_policy(&self) -> ValuePolicy {
        ValuePolicy {
            zero_is_sentinel: self.zero_is_sentinel,
            missing_markers: self.input_missing.clone(),
        }
    }

    pub fn format(&self, sentinel: f64) -> SeriesFormat {
        SeriesFormat {
            policy: self.emit,
            precision: self.precision,
            header: self.header.clone(),
            sentinel,
        }
    }

    pub fn output_dir(&self, root: &Path) -> PathBuf {
        root.join(self.csv_dir.as_deref().unwrap_or(self.kind.default_dir()))
    }
}

// ---------------------------------------------------------------------------
// Data quirks
// ---------------------------------------------------------------------------

/// Station whose weight is zero before a commissioning date, in every region.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightOverride {
    pub station: String,
    pub effective_from: NaiveDate,
}

/// Raw observations of `region` in `series` are only trusted inside `[from, to]`.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservationWindowConfig {
    pub series: String,
    pub region: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

impl ServiceConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: ServiceConfig =
            toml::from_str(contents).map_err(|e| PipelineError::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks cross-field rules serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.reconstruction.gap_window_days < 1 {
            return Err(PipelineError::Config("gap_window_days must be at least 1".to_string()));
        }
        if self.collection.max_parallel_pipelines == 0 {
            return Err(PipelineError::Config("max_parallel_pipelines must be at least 1".to_string()));
        }

        let mut names = std::collections::HashSet::new();
        for series in &self.series {
            if !names.insert(series.name.as_str()) {
                return Err(PipelineError::Config(format!("series '{}' defined twice", series.name)));
            }
            if series.precision != 2 && series.precision != 4 {
                return Err(PipelineError::Config(format!(
                    "series '{}': precision must be 2 or 4, got {}",
                    series.name, series.precision
                )));
            }
            if let Some(table) = &series.persist_table {
                validate_table_name(table)?;
            }
        }

        for window in &self.observation_windows {
            if !names.contains(window.series.as_str()) {
                return Err(PipelineError::Config(format!(
                    "observation_window refers to unknown series '{}'",
                    window.series
                )));
            }
            if let (Some(from), Some(to)) = (window.from, window.to) {
                if from > to {
                    return Err(PipelineError::Config(format!(
                        "observation_window for {} / {} ends before it starts",
                        window.series, window.region
                    )));
                }
            }
        }

        let mut collectors = std::collections::HashSet::new();
        for collector in &self.collectors {
            if !collectors.insert(collector.name.as_str()) {
                return Err(PipelineError::Config(format!("collector '{}' defined twice", collector.name)));
            }
            if collector.default_lookback_days < 1 {
                return Err(PipelineError::Config(format!(
                    "collector '{}': default_lookback_days must be at least 1",
                    collector.name
                )));
            }
        }
        Ok(())
    }

    /// Observation windows of one series, keyed by region.
    pub fn windows_for(&self, series: &str) -> HashMap<String, ObservationWindow> {
        self.observation_windows
            .iter()
            .filter(|w| w.series == series)
            .map(|w| (w.region.clone(), ObservationWindow { from: w.from, to: w.to }))
            .collect()
    }

    /// Commissioning dates keyed by station.
    pub fn weight_overrides(&self) -> HashMap<String, NaiveDate> {
        self.weight_overrides
            .iter()
            .map(|o| (o.station.clone(), o.effective_from))
            .collect()
    }
}

/// Loads the service configuration from `path`.
///
/// # File Location
/// Defaults to `drought.toml` in the current working directory (project
/// root when running via `cargo run`).
pub fn load_config(path: &Path) -> Result<ServiceConfig> {
    let contents = fs::read_to_string(path).map_err(|source| PipelineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    ServiceConfig::from_toml_str(&contents).map_err(|e| match e {
        PipelineError::Config(message) => PipelineError::Config(format!("{}: {}", path.display(), message)),
        other => other,
    })
}
