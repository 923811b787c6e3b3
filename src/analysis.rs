//! End-to-end analysis run: extract → cap → oracle lookups → reconcile → statistics.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

use crate::cancel::CancelSignal;
use crate::config::AnalyzerConfig;
use crate::extractor::{ExtractedSlots, LogExtractor};
use crate::oracle::{
    failure_tally, fetch_block_times, BlockTimeOracle, LookupFailure, LookupObserver,
};
use crate::reconcile::{reconcile, ParseFailure, ReconciledPair};
use crate::stats::{summarize, StatisticsSummary};

/// Run settings echoed into the result for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunEcho {
    pub oracle: String,
    pub max_slots: usize,
    pub request_delay_ms: u64,
    pub sample_count: usize,
}

/// Everything a finished (or interrupted) run produced.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub run: RunEcho,
    /// Distinct slots in the log before the cap.
    pub slots_found: usize,
    /// Slots handed to the oracle after the cap.
    pub slots_checked: usize,
    /// Slots for which a request was actually issued.
    pub attempted: usize,
    pub block_times_retrieved: usize,
    /// In first-sighting order.
    pub pairs: Vec<ReconciledPair>,
    pub oracle_failures: Vec<LookupFailure>,
    pub parse_failures: Vec<ParseFailure>,
    pub interrupted: bool,
    pub statistics: Option<StatisticsSummary>,
}

impl AnalysisResult {
    /// Oracle failures per error kind, sorted by kind.
    pub fn failure_tally(&self) -> Vec<(&'static str, usize)> {
        failure_tally(&self.oracle_failures)
    }

    pub fn sample(&self) -> &[ReconciledPair] {
        let n = self.run.sample_count.min(self.pairs.len());
        &self.pairs[..n]
    }
}

/// A run that has nothing to measure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoDataError {
    /// The log contained no well-formed slot records.
    NoObservations,
    /// Every lookup failed.
    NoBlockTimes { attempted: usize },
}

impl std::fmt::Display for NoDataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoObservations => write!(f, "No block slots found in log file"),
            Self::NoBlockTimes { attempted } => write!(
                f,
                "Could not retrieve any block times ({} slots attempted)",
                attempted
            ),
        }
    }
}

impl std::error::Error for NoDataError {}

/// Wiring for one run. The oracle and observer are injected.
pub struct Analyzer<'a> {
    config: &'a AnalyzerConfig,
    oracle: &'a dyn BlockTimeOracle,
    observer: &'a dyn LookupObserver,
    cancel: CancelSignal,
}

impl<'a> Analyzer<'a> {
    pub fn new(
        config: &'a AnalyzerConfig,
        oracle: &'a dyn BlockTimeOracle,
        observer: &'a dyn LookupObserver,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            config,
            oracle,
            observer,
            cancel,
        }
    }

    /// Extract observations from `path` and analyze them.
    ///
    /// [`NoDataError`] is returned inside the `anyhow::Error`; callers can
    /// `downcast_ref` it to tell "nothing to measure" from a failure.
    pub async fn run_file(&self, path: &Path) -> Result<AnalysisResult> {
        let extractor = LogExtractor::new(self.config.lookahead_lines);
        let observations = extractor
            .extract_file(path)
            .with_context(|| format!("extraction failed for {}", path.display()))?;
        info!(
            path = %path.display(),
            slots = observations.len(),
            "Extracted unique block slots"
        );
        Ok(self.run(observations).await?)
    }

    /// Analyze already-extracted observations.
    pub async fn run(&self, mut observations: ExtractedSlots) -> Result<AnalysisResult, NoDataError> {
        let slots_found = observations.len();
        if slots_found == 0 {
            return Err(NoDataError::NoObservations);
        }

        observations.truncate(self.config.max_slots);
        let slots = observations.slots();
        if slots.len() < slots_found {
            info!(
                found = slots_found,
                checking = slots.len(),
                "Limiting lookups to the first {} slots",
                slots.len()
            );
        }

        info!(
            oracle = %self.oracle.describe(),
            delay_ms = self.config.request_delay_ms,
            "Fetching block times for {} slots",
            slots.len()
        );
        let lookups = fetch_block_times(
            self.oracle,
            &slots,
            &self.config.lookup_policy(),
            &self.cancel,
            self.observer,
        )
        .await;

        if lookups.records.is_empty() && !lookups.interrupted {
            return Err(NoDataError::NoBlockTimes {
                attempted: lookups.attempted,
            });
        }

        let reconciliation = reconcile(&observations, &lookups);
        for failure in &reconciliation.parse_failures {
            warn!(slot = failure.slot, error = %failure.error, "Unparseable local timestamp");
        }
        let statistics = summarize(&reconciliation.pairs);

        Ok(AnalysisResult {
            run: RunEcho {
                oracle: self.oracle.describe(),
                max_slots: self.config.max_slots,
                request_delay_ms: self.config.request_delay_ms,
                sample_count: self.config.sample_count,
            },
            slots_found,
            slots_checked: slots.len(),
            attempted: lookups.attempted,
            block_times_retrieved: lookups.records.len(),
            pairs: reconciliation.pairs,
            oracle_failures: lookups.failures,
            parse_failures: reconciliation.parse_failures,
            interrupted: lookups.interrupted,
            statistics,
        })
    }
}
