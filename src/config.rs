//! Analyzer configuration.
//!
//! Layered in order: built-in defaults, optional TOML file, environment
//! (a `.env` file is honored), then command-line overrides applied by the
//! binary.
//!
//! ```toml
//! rpc_endpoint = "https://api.mainnet-beta.solana.com"
//! request_delay_ms = 1000
//! request_timeout_secs = 10
//! max_slots = 500
//! lookahead_lines = 4
//! sample_count = 10
//!
//! [retry]
//! max_retries = 0
//! backoff_ms = 2000
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::extractor::MAX_LOOKAHEAD_LINES;
use crate::oracle::{LookupPolicy, RetryPolicy, DEFAULT_RPC_ENDPOINT};

pub const ENV_RPC_URL: &str = "SLOT_LATENCY_RPC_URL";
pub const ENV_DELAY_MS: &str = "SLOT_LATENCY_DELAY_MS";
pub const ENV_TIMEOUT_SECS: &str = "SLOT_LATENCY_TIMEOUT_SECS";
pub const ENV_MAX_SLOTS: &str = "SLOT_LATENCY_MAX_SLOTS";
pub const ENV_LOOKAHEAD: &str = "SLOT_LATENCY_LOOKAHEAD";
pub const ENV_RETRIES: &str = "SLOT_LATENCY_RETRIES";

/// Retry settings as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Extra attempts for transport/HTTP failures. 0 keeps lookups single-shot.
    pub max_retries: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 2_000,
        }
    }
}

/// Everything a run needs besides the log path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// JSON-RPC endpoint answering `getBlockTime`.
    pub rpc_endpoint: String,
    /// Pause between consecutive oracle requests (milliseconds).
    pub request_delay_ms: u64,
    /// Ceiling on a single oracle request (seconds).
    pub request_timeout_secs: u64,
    /// Maximum distinct slots checked per run, in first-sighting order.
    pub max_slots: usize,
    /// Lines searched after a `Block Slot:` header for its timestamps.
    pub lookahead_lines: usize,
    /// Sample comparisons printed in the full report.
    pub sample_count: usize,
    pub retry: RetryConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            request_delay_ms: 1_000,
            request_timeout_secs: 10,
            max_slots: 500,
            lookahead_lines: MAX_LOOKAHEAD_LINES,
            sample_count: 10,
            retry: RetryConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("invalid analyzer configuration")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("in {}", path.display()))
    }

    /// Overlay `SLOT_LATENCY_*` variables from the process environment.
    pub fn apply_env(self) -> Result<Self> {
        dotenv::dotenv().ok();
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay variables from an arbitrary lookup (the environment, in practice).
    pub fn apply_vars<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_RPC_URL).filter(|v| !v.trim().is_empty()) {
            self.rpc_endpoint = url.trim().to_string();
        }
        if let Some(v) = parse_var(&lookup, ENV_DELAY_MS)? {
            self.request_delay_ms = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_TIMEOUT_SECS)? {
            self.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_SLOTS)? {
            self.max_slots = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_LOOKAHEAD)? {
            self.lookahead_lines = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_RETRIES)? {
            self.retry.max_retries = v;
        }
        Ok(self)
    }

    /// Reject settings the run cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.rpc_endpoint.trim().is_empty() {
            bail!("rpc_endpoint must not be empty");
        }
        if !(self.rpc_endpoint.starts_with("http://") || self.rpc_endpoint.starts_with("https://")) {
            bail!("rpc_endpoint must be an http(s) URL, got {}", self.rpc_endpoint);
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be at least 1");
        }
        if self.max_slots == 0 {
            bail!("max_slots must be at least 1");
        }
        if !(1..=MAX_LOOKAHEAD_LINES).contains(&self.lookahead_lines) {
            bail!(
                "lookahead_lines must be between 1 and {}, got {}",
                MAX_LOOKAHEAD_LINES,
                self.lookahead_lines
            );
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn lookup_policy(&self) -> LookupPolicy {
        LookupPolicy {
            request_delay: self.request_delay(),
            retry: RetryPolicy {
                max_retries: self.retry.max_retries,
                backoff: Duration::from_millis(self.retry.backoff_ms),
            },
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}={:?}: {}", key, raw, e)),
        _ => Ok(None),
    }
}
