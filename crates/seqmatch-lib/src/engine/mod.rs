//! Run orchestration
//!
//! [`PairFinder`] drives the whole pipeline: validate the configuration,
//! sort and deduplicate the bag, pad it to the common height, resolve tau,
//! cut the diagonal job plan, and execute it under the worker budget.

pub mod config;
pub mod plan;
mod runtime;

pub use config::{MatchConfiguration, TauMode};
pub use plan::{build_plan, MatchPlan};
pub use runtime::RunTotals;

use crate::lookup::LookupError;
use crate::preprocess::{pad, sort_and_merge};
use crate::record::SeqBag;
use crate::sink::PairSink;
use crate::trie::TrieError;
use thiserror::Error;
use tracing::info;

/// Error type for a pair-discovery run
#[derive(Error, Debug)]
pub enum MatchError {
    /// The bag contained no records
    #[error("empty input: no sequences to match")]
    EmptyInput,
    /// The configuration failed validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be created
    #[error("failed to spawn worker thread")]
    WorkerSpawn(#[source] std::io::Error),
    /// A trie slot was not parked when the scheduler dispatched to it
    #[error("scheduler state corrupted: busy trie dispatched")]
    SchedulerState,
    /// Trie insertion or search failed
    #[error(transparent)]
    Trie(#[from] TrieError),
    /// Lookup insertion failed
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Summary of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct MatchStats {
    /// Unique sequences after deduplication.
    pub unique: usize,
    /// Common padded length H.
    pub height: usize,
    /// Median unpadded length M.
    pub median: usize,
    /// Effective edit-distance threshold.
    pub tau: usize,
    /// Number of partitions (tries).
    pub partitions: usize,
    /// Total jobs executed.
    pub jobs: usize,
    /// Queries that went through the trie.
    pub searches_run: u64,
    /// Queries skipped by the prefilter.
    pub searches_skipped: u64,
    /// Searches that overflowed the hit tower.
    pub incomplete_searches: u64,
}

/// The pair-discovery engine.
pub struct PairFinder {
    config: MatchConfiguration,
}

impl PairFinder {
    /// Create an engine with the given configuration.
    pub fn new(config: MatchConfiguration) -> Result<Self, MatchError> {
        config.validate().map_err(MatchError::InvalidConfig)?;
        Ok(Self { config })
    }

    /// Discover every pair of distinct sequences within tau and emit them
    /// to the sink. Consumes the bag.
    pub fn find_pairs<S: PairSink + ?Sized>(
        &self,
        bag: SeqBag,
        sink: &S,
    ) -> Result<MatchStats, MatchError> {
        if bag.is_empty() {
            return Err(MatchError::EmptyInput);
        }
        if self.config.verbose {
            self.config.print();
        }

        info!("sorting {} records", bag.len());
        let mut bag = sort_and_merge(bag, self.config.threads);
        let unique = bag.len();
        info!("{} unique sequences", unique);

        let padding = pad(&mut bag);
        let tau = self.config.resolve_tau(padding.median);
        if self.config.verbose && matches!(self.config.tau, TauMode::Auto) {
            info!("setting dist to {}", tau);
        }
        info!(
            "height {}, median length {}, tau {}",
            padding.height, padding.median, tau
        );

        let plan = build_plan(
            &bag,
            tau,
            padding.height,
            padding.median,
            self.config.threads,
        );
        let partitions = plan.num_tries();
        let jobs = plan.num_jobs();
        info!("{} partitions, {} jobs", partitions, jobs);

        let totals = runtime::run_plan(
            plan,
            &bag,
            sink,
            self.config.verbose,
            self.config.hit_capacity,
        )?;

        Ok(MatchStats {
            unique,
            height: padding.height,
            median: padding.median,
            tau,
            partitions,
            jobs,
            searches_run: totals.searches_run,
            searches_skipped: totals.searches_skipped,
            incomplete_searches: totals.incomplete_searches,
        })
    }
}
