//! Human-readable and JSON renderings of an [`AnalysisResult`].

use serde_json::{json, Value};

use crate::analysis::AnalysisResult;
use crate::reconcile::ReconciledPair;
use crate::stats::StatisticsSummary;
use crate::timestamp::{format_utc_micros, format_utc_secs, NS_PER_SEC};

const RULE: &str = "══════════════════════════════════════════════════════════════════════";
const THIN_RULE: &str = "──────────────────────────────────────────────────────────────────────";

/// How much of the result the text report shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Counts, statistics, distribution and failure tally.
    #[default]
    Summary,
    /// Summary plus sample comparisons and per-slot failure reasons.
    Full,
}

/// Render the text report, one entry per output line.
pub fn render_text(result: &AnalysisResult, verbosity: Verbosity) -> Vec<String> {
    let mut out = Vec::new();

    out.push(RULE.to_string());
    out.push("  SLOT LATENCY ANALYSIS".to_string());
    out.push(RULE.to_string());
    if result.interrupted {
        out.push(format!(
            "  PARTIAL: interrupted after {} of {} lookups",
            result.attempted, result.slots_checked
        ));
        out.push(THIN_RULE.to_string());
    }
    out.push(format!("  Oracle:                 {}", result.run.oracle));
    out.push(format!("  Unique slots in log:    {}", result.slots_found));
    if result.slots_checked < result.slots_found {
        out.push(format!(
            "  Slots checked:          {} (limit {})",
            result.slots_checked, result.run.max_slots
        ));
    } else {
        out.push(format!("  Slots checked:          {}", result.slots_checked));
    }
    out.push(format!("  Lookups attempted:      {}", result.attempted));
    out.push(format!(
        "  Block times retrieved:  {}",
        result.block_times_retrieved
    ));
    if !result.parse_failures.is_empty() {
        out.push(format!(
            "  Unparseable timestamps: {}",
            result.parse_failures.len()
        ));
    }

    if verbosity == Verbosity::Full && !result.pairs.is_empty() {
        out.push(String::new());
        out.push(format!(
            "  SAMPLE COMPARISONS (first {})",
            result.sample().len()
        ));
        out.push(THIN_RULE.to_string());
        for pair in result.sample() {
            push_sample(&mut out, pair);
        }
    }

    match &result.statistics {
        Some(stats) => push_statistics(&mut out, stats),
        None => {
            out.push(String::new());
            out.push("  No reconciled slots: statistics unavailable".to_string());
        }
    }

    let tally = result.failure_tally();
    if !tally.is_empty() {
        out.push(String::new());
        out.push(format!(
            "  ORACLE FAILURES ({})",
            result.oracle_failures.len()
        ));
        out.push(THIN_RULE.to_string());
        for (kind, count) in &tally {
            out.push(format!("    {:<18} {:>6}", kind, count));
        }
        if verbosity == Verbosity::Full {
            for failure in &result.oracle_failures {
                out.push(format!(
                    "    slot {:<12} {} (attempts: {})",
                    failure.slot, failure.error, failure.attempts
                ));
            }
        }
    }

    if verbosity == Verbosity::Full && !result.parse_failures.is_empty() {
        out.push(String::new());
        out.push("  TIMESTAMP FAILURES".to_string());
        out.push(THIN_RULE.to_string());
        for failure in &result.parse_failures {
            out.push(format!("    slot {:<12} {}", failure.slot, failure.error));
        }
    }

    out.push(RULE.to_string());
    out
}

fn push_sample(out: &mut Vec<String>, pair: &ReconciledPair) {
    let production_secs = (pair.production_time_ns / NS_PER_SEC as u64) as i64;
    out.push(format!("  Slot {}", pair.slot));
    out.push(format!(
        "    Block time:    {} UTC",
        format_utc_secs(production_secs)
    ));
    out.push(format!(
        "    Received:      {} UTC",
        format_utc_micros(pair.local_time_ns)
    ));
    out.push(format!(
        "    Latency:       {:.2} ms  [{}]",
        pair.latency_ms(),
        if pair.same_second {
            "SAME SECOND"
        } else {
            "DIFFERENT"
        }
    ));
}

fn push_statistics(out: &mut Vec<String>, stats: &StatisticsSummary) {
    out.push(String::new());
    out.push("  TIMING".to_string());
    out.push(THIN_RULE.to_string());
    out.push(format!("    Total analyzed:     {:>8}", stats.total));
    out.push(format!(
        "    Same second:        {:>8}  ({:.2}%)",
        stats.same_second_count, stats.same_second_pct
    ));
    out.push(format!(
        "    Different second:   {:>8}  ({:.2}%)",
        stats.different_second_count,
        100.0 - stats.same_second_pct
    ));
    if stats.negative_latency_count > 0 {
        out.push(format!(
            "    Negative latency:   {:>8}  (local clock ahead of ledger)",
            stats.negative_latency_count
        ));
    }

    out.push(String::new());
    out.push("  LATENCY (ms)".to_string());
    out.push(THIN_RULE.to_string());
    out.push(format!("    Min:     {:>12.2}", stats.min_ms));
    out.push(format!("    Max:     {:>12.2}", stats.max_ms));
    out.push(format!("    Mean:    {:>12.2}", stats.mean_ms));
    out.push(format!("    Median:  {:>12.2}", stats.median_ms));
    out.push(format!("    P95:     {:>12.2}", stats.p95_ms));
    out.push(format!("    P99:     {:>12.2}", stats.p99_ms));

    out.push(String::new());
    out.push("  DISTRIBUTION".to_string());
    out.push(THIN_RULE.to_string());
    for bucket in &stats.distribution {
        out.push(format!(
            "    {:<22} {:>6}  ({:>6.2}%)",
            bucket.label, bucket.count, bucket.pct
        ));
    }

    out.push(String::new());
    out.push("  CUMULATIVE".to_string());
    out.push(THIN_RULE.to_string());
    for within in &stats.within {
        out.push(format!(
            "    within {:<15} {:>6}  ({:>6.2}%)",
            threshold_label(within.threshold_ms),
            within.count,
            within.pct
        ));
    }
}

fn threshold_label(ms: i64) -> String {
    if ms >= 1_000 && ms % 1_000 == 0 {
        let secs = ms / 1_000;
        format!("{} second{}", secs, if secs == 1 { "" } else { "s" })
    } else {
        format!("{}ms", ms)
    }
}

/// Render the machine-readable report.
pub fn render_json(result: &AnalysisResult) -> Value {
    let tally: serde_json::Map<String, Value> = result
        .failure_tally()
        .into_iter()
        .map(|(kind, count)| (kind.to_string(), json!(count)))
        .collect();

    json!({
        "run": result.run,
        "partial": result.interrupted,
        "slots_found": result.slots_found,
        "slots_checked": result.slots_checked,
        "attempted": result.attempted,
        "block_times_retrieved": result.block_times_retrieved,
        "statistics": result.statistics,
        "failure_tally": tally,
        "oracle_failures": result.oracle_failures,
        "parse_failures": result.parse_failures,
        "pairs": result.pairs,
    })
}
