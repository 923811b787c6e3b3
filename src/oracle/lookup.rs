//! Sequential, rate-limited block-time lookups.
//!
//! Lookups are issued one at a time with a fixed pause between consecutive
//! requests, whatever their outcome. The oracle rejects callers that go
//! faster. Cancellation is honored between requests: an in-flight request
//! always runs to completion (or its timeout), and whatever has been gathered
//! so far is returned.

use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

use super::{BlockTimeOracle, OracleError, OracleRecord};
use crate::cancel::CancelSignal;
use crate::timestamp::format_utc_secs;

/// Opt-in re-issue of transient failures. `max_retries == 0` disables it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(2_000),
        }
    }
}

/// Pacing and retry behavior of the lookup loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LookupPolicy {
    /// Minimum pause between the end of one request and the start of the next.
    pub request_delay: Duration,
    pub retry: RetryPolicy,
}

impl Default for LookupPolicy {
    fn default() -> Self {
        Self {
            request_delay: Duration::from_millis(1_000),
            retry: RetryPolicy::default(),
        }
    }
}

/// Position of a lookup within the run (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupProgress {
    pub index: usize,
    pub total: usize,
}

/// Progress port for the lookup loop.
///
/// The loop itself never touches global logging state; the binary injects a
/// [`TracingObserver`], tests may inject anything.
pub trait LookupObserver: Send + Sync {
    fn on_result(
        &self,
        progress: LookupProgress,
        slot: u64,
        outcome: &Result<OracleRecord, OracleError>,
    );

    fn on_retry(&self, _slot: u64, _attempt: u32, _error: &OracleError) {}

    fn on_interrupted(&self, _completed: usize, _total: usize) {}
}

/// Reports lookup progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl LookupObserver for TracingObserver {
    fn on_result(
        &self,
        progress: LookupProgress,
        slot: u64,
        outcome: &Result<OracleRecord, OracleError>,
    ) {
        match outcome {
            Ok(record) => info!(
                "[{}/{}] slot {} OK - {} UTC",
                progress.index,
                progress.total,
                slot,
                format_utc_secs(record.block_time_secs)
            ),
            Err(e) => warn!(
                "[{}/{}] slot {} FAILED - {}",
                progress.index, progress.total, slot, e
            ),
        }
    }

    fn on_retry(&self, slot: u64, attempt: u32, error: &OracleError) {
        warn!(slot, attempt, error = %error, "Retrying block time lookup");
    }

    fn on_interrupted(&self, completed: usize, total: usize) {
        warn!(completed, total, "Lookup loop interrupted");
    }
}

/// A slot whose lookup ended in a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFailure {
    pub slot: u64,
    pub error: OracleError,
    pub attempts: u32,
}

/// Everything the lookup loop gathered.
#[derive(Debug, Clone, Default, Serialize)]
pub struct OracleLookups {
    pub records: HashMap<u64, OracleRecord>,
    /// Failures in lookup order.
    pub failures: Vec<LookupFailure>,
    /// Distinct slots for which at least one request was issued.
    pub attempted: usize,
    /// Whether cancellation cut the loop short.
    pub interrupted: bool,
}

impl OracleLookups {
    pub fn record(&self, slot: u64) -> Option<&OracleRecord> {
        self.records.get(&slot)
    }
}

/// Failure count per error kind, sorted by kind.
pub fn failure_tally(failures: &[LookupFailure]) -> Vec<(&'static str, usize)> {
    let mut tally: HashMap<&'static str, usize> = HashMap::new();
    for failure in failures {
        *tally.entry(failure.error.kind()).or_default() += 1;
    }
    let mut tally: Vec<_> = tally.into_iter().collect();
    tally.sort();
    tally
}

/// Look up every slot in order, one request at a time.
pub async fn fetch_block_times(
    oracle: &dyn BlockTimeOracle,
    slots: &[u64],
    policy: &LookupPolicy,
    cancel: &CancelSignal,
    observer: &dyn LookupObserver,
) -> OracleLookups {
    let total = slots.len();
    let mut lookups = OracleLookups::default();
    let mut issued_any = false;

    'slots: for (idx, &slot) in slots.iter().enumerate() {
        let progress = LookupProgress {
            index: idx + 1,
            total,
        };
        let mut attempts = 0u32;

        loop {
            if issued_any && !pause(policy.request_delay, cancel).await {
                lookups.interrupted = true;
                break 'slots;
            }
            if cancel.is_cancelled() {
                lookups.interrupted = true;
                break 'slots;
            }

            if attempts == 0 {
                lookups.attempted += 1;
            }
            issued_any = true;
            attempts += 1;

            match oracle.block_time(slot).await {
                Ok(record) => {
                    observer.on_result(progress, slot, &Ok(record));
                    lookups.records.insert(slot, record);
                    break;
                }
                Err(error) if error.is_transient() && attempts <= policy.retry.max_retries => {
                    observer.on_retry(slot, attempts, &error);
                    if !pause(policy.retry.backoff, cancel).await {
                        observer.on_result(progress, slot, &Err(error.clone()));
                        lookups.failures.push(LookupFailure {
                            slot,
                            error,
                            attempts,
                        });
                        lookups.interrupted = true;
                        break 'slots;
                    }
                }
                Err(error) => {
                    observer.on_result(progress, slot, &Err(error.clone()));
                    lookups.failures.push(LookupFailure {
                        slot,
                        error,
                        attempts,
                    });
                    break;
                }
            }
        }
    }

    if lookups.interrupted {
        observer.on_interrupted(lookups.attempted, total);
    }
    lookups
}

/// Sleep for `delay` unless cancelled first. Returns `false` on cancellation.
async fn pause(delay: Duration, cancel: &CancelSignal) -> bool {
    if delay.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => !cancel.is_cancelled(),
        _ = cancel.cancelled() => false,
    }
}
