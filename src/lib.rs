//! drought_service: daily drought-indicator series from sparse hydrological data.
//!
//! # Module structure
//!
//! ```text
//! drought_service
//! ├── calendar    — leap-day-free ordinal days (JD), daily spine, provider date formats
//! ├── model       — shared data types (ObservationPoint, DailySeriesPoint, RunSummary, …)
//! ├── error       — PipelineError taxonomy
//! ├── config      — service configuration loader (drought.toml)
//! ├── logging     — log::Log implementation injected into the orchestrators
//! ├── db          — PostgreSQL connection + schema validation
//! ├── planner     — incremental fetch planning from a collection cursor
//! ├── reconstruct
//! │   ├── collapse    — many raw readings → one value per day
//! │   ├── interpolate — bounded nearest-neighbour gap filling
//! │   └── areal       — Thiessen-weighted regional aggregation
//! ├── emit        — yyyy,mm,dd,JD,value rows and CSV files
//! ├── store       — SourceAdapter / cursor / history / sink traits
//! │   ├── postgres — PostgreSQL gateway
//! │   └── memory   — in-memory gateway (dry runs, tests)
//! ├── ingest
//! │   ├── wamis   — WAMIS dam-hourly and flow-daily adapters
//! │   └── fixtures (test only) — representative API response payloads
//! ├── collector   — collection orchestrator
//! └── processor   — reconstruction orchestrator
//! ```

pub mod calendar;
pub mod collector;
pub mod config;
pub mod db;
pub mod emit;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod planner;
pub mod processor;
pub mod reconstruct;
pub mod store;
