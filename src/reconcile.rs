//! Pairing of first observations with oracle block times.

use serde::Serialize;

use crate::extractor::ExtractedSlots;
use crate::oracle::OracleLookups;
use crate::timestamp::{floor_secs, RawTimestamp, TimestampParseError, NS_PER_MS};

/// Latency of one slot: local arrival minus ledger production time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciledPair {
    pub slot: u64,
    pub local_time_ns: i64,
    pub production_time_ns: u64,
    /// Signed. Negative means local arrival predates the reported production time.
    pub latency_ns: i64,
    /// Both timestamps floored to whole seconds are equal.
    pub same_second: bool,
}

impl ReconciledPair {
    /// `None` when the latency does not fit in `i64` nanoseconds.
    pub fn new(slot: u64, local_time_ns: i64, production_time_ns: u64) -> Option<Self> {
        let production = i64::try_from(production_time_ns).ok()?;
        Some(Self {
            slot,
            local_time_ns,
            production_time_ns,
            latency_ns: local_time_ns.checked_sub(production)?,
            same_second: floor_secs(local_time_ns) == floor_secs(production),
        })
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ns as f64 / NS_PER_MS as f64
    }
}

/// A slot with an oracle record whose local timestamp could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParseFailure {
    pub slot: u64,
    pub timestamp: RawTimestamp,
    pub error: TimestampParseError,
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    /// In first-sighting order.
    pub pairs: Vec<ReconciledPair>,
    pub parse_failures: Vec<ParseFailure>,
}

/// Pair every observation that has an oracle record.
///
/// Observations without a record are left out of the population; their
/// failure reason already lives in `lookups.failures`.
pub fn reconcile(observations: &ExtractedSlots, lookups: &OracleLookups) -> Reconciliation {
    let mut out = Reconciliation::default();

    for obs in observations {
        let Some(record) = lookups.record(obs.slot) else {
            continue;
        };

        let resolved = obs.timestamp.to_epoch_nanos().and_then(|local_ns| {
            ReconciledPair::new(obs.slot, local_ns, record.production_time_ns).ok_or_else(|| {
                TimestampParseError {
                    raw: obs.timestamp.to_string(),
                    reason: "latency out of range".to_string(),
                }
            })
        });

        match resolved {
            Ok(pair) => out.pairs.push(pair),
            Err(error) => out.parse_failures.push(ParseFailure {
                slot: obs.slot,
                timestamp: obs.timestamp.clone(),
                error,
            }),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::Observation;
    use crate::oracle::OracleRecord;

    fn observations(entries: Vec<(u64, RawTimestamp)>) -> ExtractedSlots {
        let mut slots = ExtractedSlots::new();
        for (i, (slot, timestamp)) in entries.into_iter().enumerate() {
            slots.insert_first(Observation {
                slot,
                timestamp,
                line: i + 1,
            });
        }
        slots
    }

    fn lookups(records: Vec<(u64, i64)>) -> OracleLookups {
        let mut lookups = OracleLookups::default();
        for (slot, secs) in records {
            lookups
                .records
                .insert(slot, OracleRecord::from_block_time(slot, secs).unwrap());
        }
        lookups
    }

    #[test]
    fn test_negative_latency_is_preserved() {
        let pair = ReconciledPair::new(1, 900, 1_000).unwrap();
        assert_eq!(pair.latency_ns, -100);
        assert!(pair.same_second);
    }

    #[test]
    fn test_same_second_boundary() {
        // Production at T.999, local at T+1.001: different whole seconds.
        let t = 1_700_000_000i64;
        let pair = ReconciledPair::new(1, (t + 1) * 1_000_000_000 + 1_000_000, (t as u64) * 1_000_000_000 + 999_000_000).unwrap();
        assert!(!pair.same_second);
        assert_eq!(pair.latency_ns, 2_000_000);

        // Both inside [T, T+1).
        let pair = ReconciledPair::new(1, t * 1_000_000_000 + 900_000_000, (t as u64) * 1_000_000_000).unwrap();
        assert!(pair.same_second);
    }

    #[test]
    fn test_only_slots_with_records_are_paired() {
        let obs = observations(vec![
            (100, RawTimestamp::Nanos(5_000_000_000)),
            (101, RawTimestamp::Nanos(10_000_000_000)),
            (102, RawTimestamp::Nanos(11_000_000_000)),
        ]);
        let result = reconcile(&obs, &lookups(vec![(101, 9), (100, 4)]));

        assert_eq!(
            result.pairs.iter().map(|p| p.slot).collect::<Vec<_>>(),
            vec![100, 101]
        );
        assert!(result
            .pairs
            .iter()
            .all(|p| p.latency_ns == 1_000_000_000 && !p.same_second));
        assert_eq!(result.pairs[0].latency_ms(), 1000.0);
    }

    #[test]
    fn test_iso_timestamp_resolution() {
        let obs = observations(vec![(
            7,
            RawTimestamp::Iso("1970-01-01T00:00:04.250000".to_string()),
        )]);
        let result = reconcile(&obs, &lookups(vec![(7, 4)]));
        assert_eq!(result.pairs[0].latency_ns, 250_000_000);
        assert!(result.pairs[0].same_second);
    }

    #[test]
    fn test_unparseable_timestamp_is_excluded_not_fatal() {
        let obs = observations(vec![
            (1, RawTimestamp::Iso("not a time".to_string())),
            (2, RawTimestamp::Nanos(3_000_000_000)),
        ]);
        let result = reconcile(&obs, &lookups(vec![(1, 1), (2, 2)]));

        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].slot, 2);
        assert_eq!(result.parse_failures.len(), 1);
        assert_eq!(result.parse_failures[0].slot, 1);
    }

    #[test]
    fn test_latency_overflow_is_excluded_not_fatal() {
        // Parses fine, but is far enough before the epoch that the delta leaves i64.
        let obs = observations(vec![
            (1, RawTimestamp::Iso("1700-01-01T00:00:00".to_string())),
            (2, RawTimestamp::Nanos(1_736_517_791_500_000_000)),
        ]);
        let result = reconcile(&obs, &lookups(vec![(1, 1_736_517_791), (2, 1_736_517_791)]));

        assert_eq!(result.pairs.len(), 1);
        assert_eq!(result.pairs[0].slot, 2);
        assert_eq!(result.parse_failures.len(), 1);
        assert_eq!(result.parse_failures[0].slot, 1);
        assert_eq!(result.parse_failures[0].error.reason, "latency out of range");
    }

    #[test]
    fn test_pair_rejects_out_of_range_inputs() {
        assert!(ReconciledPair::new(1, i64::MIN, 1_000_000_000).is_none());
        assert!(ReconciledPair::new(1, 0, u64::MAX).is_none());
    }
}
