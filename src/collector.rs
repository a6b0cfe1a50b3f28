//! Collection orchestrator.
//!
//! For each configured entity, in order:
//!
//! ```text
//! Planning ──► Fetching ──► Persisting ──► Done
//!     │            │             │
//!     └────────────┴─────────────┴──► Failed
//! ```
//!
//! A failing entity is recorded in the run summary and the run moves on.
//! Entities are visited one at a time with a fixed pause between network
//! calls.

use std::thread;
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDateTime};
use log::{Log, error, info, warn};

use crate::error::PipelineError;
use crate::logging::{DB, SYS, WAMIS};
use crate::model::{EntityFailure, EntityId, PipelineStage, RunSummary};
use crate::planner::{self, FetchPlan};
use crate::store::{CollectionStore, SourceAdapter};

/// What happened to one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EntityOutcome {
    UpToDate,
    Collected { rows: u64 },
}

pub struct Collector<'a> {
    name: String,
    entities: Vec<EntityId>,
    default_lookback: Duration,
    delay: StdDuration,
    logger: &'a dyn Log,
}

impl<'a> Collector<'a> {
    pub fn new(
        name: &str,
        entities: Vec<EntityId>,
        default_lookback: Duration,
        delay: StdDuration,
        logger: &'a dyn Log,
    ) -> Self {
        Self { name: name.to_string(), entities, default_lookback, delay, logger }
    }

    /// Collects every entity once. Never returns early on an entity failure.
    pub fn run<A, S>(&self, adapter: &A, store: &mut S, now: NaiveDateTime) -> RunSummary
    where
        A: SourceAdapter + ?Sized,
        S: CollectionStore + ?Sized,
    {
        let mut summary = RunSummary::new(&self.name);
        info!(logger: self.logger, target: SYS, "📥 Collecting {} ({} entities)", self.name, self.entities.len());

        let mut fetched_previous = false;
        for entity in &self.entities {
            if fetched_previous && !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            fetched_previous = false;

            match self.collect_one(adapter, store, entity, now, &mut fetched_previous) {
                Ok(EntityOutcome::UpToDate) => {
                    info!(logger: self.logger, target: WAMIS, "[{}] up to date", entity);
                    summary.up_to_date.push(entity.clone());
                }
                Ok(EntityOutcome::Collected { rows }) => {
                    info!(logger: self.logger, target: DB, "[{}] ✓ stored {} readings", entity, rows);
                    summary.rows_written += rows;
                    summary.succeeded.push(entity.clone());
                }
                Err((stage, err)) if err.is_adapter_failure() => {
                    warn!(logger: self.logger, target: WAMIS, "[{}] skipped while {}: {}", entity, stage, err);
                    summary.skipped.push(entity.clone());
                }
                Err((stage, err)) => {
                    error!(logger: self.logger, target: DB, "[{}] failed while {}: {}", entity, stage, err);
                    summary.failed.push(EntityFailure {
                        key: entity.clone(),
                        stage,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(logger: self.logger, target: SYS, "{}", summary);
        summary
    }

    fn collect_one<A, S>(
        &self,
        adapter: &A,
        store: &mut S,
        entity: &str,
        now: NaiveDateTime,
        fetched: &mut bool,
    ) -> Result<EntityOutcome, (PipelineStage, PipelineError)>
    where
        A: SourceAdapter + ?Sized,
        S: CollectionStore + ?Sized,
    {
        let mut stage = PipelineStage::Planning;
        let fail = |stage: PipelineStage| move |err: PipelineError| (stage, err);

        let cursor = store.last_cursor(adapter.source(), entity).map_err(fail(stage))?;
        let (from, to) = match planner::plan(cursor, adapter.step(), now, self.default_lookback) {
            FetchPlan::UpToDate => return Ok(EntityOutcome::UpToDate),
            FetchPlan::Fetch { from, to } => (from, to),
        };

        stage = PipelineStage::Fetching;
        info!(logger: self.logger, target: WAMIS, "[{}] fetching {} .. {}", entity, from, to);
        *fetched = true;
        let readings = adapter.fetch(entity, from, to).map_err(fail(stage))?;
        if readings.is_empty() {
            warn!(logger: self.logger, target: WAMIS, "[{}] no readings returned", entity);
            return Ok(EntityOutcome::Collected { rows: 0 });
        }

        stage = PipelineStage::Persisting;
        let rows = store.upsert_raw(adapter.source(), &readings).map_err(fail(stage))?;
        Ok(EntityOutcome::Collected { rows })
    }
}
