//! Latency statistics over reconciled slots.
//!
//! Percentiles use the nearest-rank method with zero-based floor indexing
//! (`sorted[floor(q * n)]`, clamped to `n - 1`), no interpolation. Bucket
//! edges and cumulative thresholds are fixed, not derived from the data.

use serde::Serialize;

use crate::reconcile::ReconciledPair;
use crate::timestamp::NS_PER_MS;

/// Upper edges (exclusive, milliseconds) of every distribution bucket but the last.
const BUCKET_UPPER_MS: [f64; 4] = [500.0, 1_000.0, 2_000.0, 5_000.0];

const BUCKET_LABELS: [&str; 5] = [
    "< 500ms (sub-second)",
    "500-1000ms",
    "1-2 seconds",
    "2-5 seconds",
    "> 5 seconds",
];

/// Cumulative "received within" thresholds, compared on integer nanoseconds.
const WITHIN_THRESHOLDS_MS: [i64; 4] = [100, 500, 1_000, 2_000];

/// One row of the latency distribution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketCount {
    pub label: &'static str,
    /// Inclusive lower edge; `None` for the first bucket, which also holds negative latencies.
    pub lower_ms: Option<f64>,
    /// Exclusive upper edge; `None` for the unbounded last bucket.
    pub upper_ms: Option<f64>,
    pub count: usize,
    pub pct: f64,
}

/// Slots received strictly within a latency threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdCount {
    pub threshold_ms: i64,
    pub count: usize,
    pub pct: f64,
}

/// Summary of a non-empty latency population.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSummary {
    pub total: usize,
    pub same_second_count: usize,
    pub different_second_count: usize,
    pub same_second_pct: f64,
    pub negative_latency_count: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub distribution: Vec<BucketCount>,
    pub within: Vec<ThresholdCount>,
}

/// Summarize reconciled pairs. Returns `None` for an empty population.
pub fn summarize(pairs: &[ReconciledPair]) -> Option<StatisticsSummary> {
    let total = pairs.len();
    if total == 0 {
        return None;
    }

    let same_second_count = pairs.iter().filter(|p| p.same_second).count();
    let negative_latency_count = pairs.iter().filter(|p| p.latency_ns < 0).count();

    let mut latencies_ms: Vec<f64> = pairs.iter().map(ReconciledPair::latency_ms).collect();
    let mean_ms = latencies_ms.iter().sum::<f64>() / total as f64;
    latencies_ms.sort_by(f64::total_cmp);

    let mut bucket_counts = [0usize; BUCKET_LABELS.len()];
    for &ms in &latencies_ms {
        bucket_counts[bucket_index(ms)] += 1;
    }
    let distribution = bucket_counts
        .iter()
        .enumerate()
        .map(|(i, &count)| BucketCount {
            label: BUCKET_LABELS[i],
            lower_ms: i.checked_sub(1).map(|prev| BUCKET_UPPER_MS[prev]),
            upper_ms: BUCKET_UPPER_MS.get(i).copied(),
            count,
            pct: pct(count, total),
        })
        .collect();

    let within = WITHIN_THRESHOLDS_MS
        .iter()
        .map(|&threshold_ms| {
            let threshold_ns = threshold_ms * NS_PER_MS;
            let count = pairs.iter().filter(|p| p.latency_ns < threshold_ns).count();
            ThresholdCount {
                threshold_ms,
                count,
                pct: pct(count, total),
            }
        })
        .collect();

    Some(StatisticsSummary {
        total,
        same_second_count,
        different_second_count: total - same_second_count,
        same_second_pct: pct(same_second_count, total),
        negative_latency_count,
        min_ms: latencies_ms[0],
        max_ms: latencies_ms[total - 1],
        mean_ms,
        median_ms: nearest_rank(&latencies_ms, 0.50)?,
        p95_ms: nearest_rank(&latencies_ms, 0.95)?,
        p99_ms: nearest_rank(&latencies_ms, 0.99)?,
        distribution,
        within,
    })
}

/// Nearest-rank value of an ascending sample: `sorted[floor(q * n)]`, clamped to the last index.
pub fn nearest_rank(sorted: &[f64], q: f64) -> Option<f64> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let idx = ((q * n as f64).floor() as usize).min(n - 1);
    Some(sorted[idx])
}

/// Index of the distribution bucket holding `ms`.
fn bucket_index(ms: f64) -> usize {
    BUCKET_UPPER_MS.partition_point(|&upper| upper <= ms)
}

fn pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}
