//! Slot observation extraction from streaming-client logs.
//!
//! The streaming client prints one block per received message:
//!
//! ```text
//! ================================================================
//! Block Slot: 312345678
//! Received Timestamp: 2025-01-10T14:03:11.482113
//! Received Timestamp (ns): 1736517791482113000
//! ================================================================
//! ```
//!
//! Only the first well-formed sighting of each slot is kept. Later sightings
//! are re-notifications of the same block and would bias latency toward zero.

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;
use tracing::debug;

use crate::timestamp::RawTimestamp;

/// Maximum number of lines searched after a header for its timestamps.
pub const MAX_LOOKAHEAD_LINES: usize = 4;

fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // `Some(..)` is how the Rust client debug-prints an optional slot.
    RE.get_or_init(|| {
        Regex::new(r"Block Slot:\s*(?:Some\()?(\d+)").expect("static header pattern")
    })
}

fn iso_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Received Timestamp:\s*(\S.*?)\s*$").expect("static iso pattern"))
}

fn nanos_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"Received Timestamp \(ns\):\s*(\d+)").expect("static nanos pattern")
    })
}

/// First sighting of a slot in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub slot: u64,
    pub timestamp: RawTimestamp,
    /// 1-based line number of the header that produced this observation.
    pub line: usize,
}

/// Observations keyed by slot, in first-sighting order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedSlots {
    observations: Vec<Observation>,
    #[serde(skip)]
    seen: HashSet<u64>,
}

impl ExtractedSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the slot already has an observation. Returns whether it was stored.
    pub fn insert_first(&mut self, observation: Observation) -> bool {
        if !self.seen.insert(observation.slot) {
            return false;
        }
        self.observations.push(observation);
        true
    }

    pub fn contains(&self, slot: u64) -> bool {
        self.seen.contains(&slot)
    }

    pub fn get(&self, slot: u64) -> Option<&Observation> {
        if !self.contains(slot) {
            return None;
        }
        self.observations.iter().find(|o| o.slot == slot)
    }

    /// Keep only the first `cap` slots in sighting order.
    pub fn truncate(&mut self, cap: usize) {
        if self.observations.len() <= cap {
            return;
        }
        for dropped in self.observations.drain(cap..) {
            self.seen.remove(&dropped.slot);
        }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    /// Slots in sighting order.
    pub fn slots(&self) -> Vec<u64> {
        self.observations.iter().map(|o| o.slot).collect()
    }
}

impl<'a> IntoIterator for &'a ExtractedSlots {
    type Item = &'a Observation;
    type IntoIter = std::slice::Iter<'a, Observation>;

    fn into_iter(self) -> Self::IntoIter {
        self.observations.iter()
    }
}

/// Line-oriented scanner for `Block Slot:` records.
#[derive(Debug, Clone, Copy)]
pub struct LogExtractor {
    lookahead: usize,
}

impl Default for LogExtractor {
    fn default() -> Self {
        Self {
            lookahead: MAX_LOOKAHEAD_LINES,
        }
    }
}

impl LogExtractor {
    /// `lookahead` is clamped to `1..=MAX_LOOKAHEAD_LINES`.
    pub fn new(lookahead: usize) -> Self {
        Self {
            lookahead: lookahead.clamp(1, MAX_LOOKAHEAD_LINES),
        }
    }

    pub fn lookahead(&self) -> usize {
        self.lookahead
    }

    /// Read a log file fully and extract its observations.
    pub fn extract_file(&self, path: &Path) -> Result<ExtractedSlots> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read log file {}", path.display()))?;
        // Partially corrupted logs are expected; invalid UTF-8 must not abort the scan.
        let content = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = content.lines().collect();
        Ok(self.extract(&lines))
    }

    /// Extract the first well-formed observation of every slot.
    pub fn extract<S: AsRef<str>>(&self, lines: &[S]) -> ExtractedSlots {
        let mut slots = ExtractedSlots::new();
        let mut skipped = 0usize;

        for (idx, line) in lines.iter().enumerate() {
            let Some(slot) = parse_header(line.as_ref()) else {
                continue;
            };
            if slots.contains(slot) {
                continue;
            }

            match self.scan_window(&lines[idx + 1..]) {
                Some(timestamp) => {
                    slots.insert_first(Observation {
                        slot,
                        timestamp,
                        line: idx + 1,
                    });
                }
                None => {
                    skipped += 1;
                    debug!(slot, line = idx + 1, "Header without timestamp in window, skipping");
                }
            }
        }

        debug!(
            observations = slots.len(),
            skipped,
            lines = lines.len(),
            "Log extraction complete"
        );
        slots
    }

    /// Look for timestamps in the lines following a header.
    /// The nanosecond form wins over the ISO form when both are present.
    fn scan_window<S: AsRef<str>>(&self, following: &[S]) -> Option<RawTimestamp> {
        let mut iso: Option<String> = None;
        let mut nanos: Option<u64> = None;

        for line in following.iter().take(self.lookahead) {
            let line = line.as_ref();
            if parse_header(line).is_some() {
                break;
            }
            if nanos.is_none() {
                if let Some(ns) = parse_nanos(line) {
                    nanos = Some(ns);
                    continue;
                }
            }
            if iso.is_none() {
                iso = parse_iso(line);
            }
        }

        nanos
            .map(RawTimestamp::Nanos)
            .or_else(|| iso.map(RawTimestamp::Iso))
    }
}

fn parse_header(line: &str) -> Option<u64> {
    header_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn parse_iso(line: &str) -> Option<String> {
    iso_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_nanos(line: &str) -> Option<u64> {
    nanos_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}
