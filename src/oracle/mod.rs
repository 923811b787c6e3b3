//! Block-time oracle: the ledger's own record of when each slot was produced.
//!
//! The oracle answers one slot per request with a whole-second Unix epoch.
//! Every failure shape (transport, HTTP status, JSON-RPC error, missing
//! result) is classified into [`OracleError`] and is terminal for that slot.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::timestamp::NS_PER_SEC;

pub mod lookup;
pub mod rpc;

pub use lookup::*;
pub use rpc::*;

/// Successful oracle answer for one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleRecord {
    pub slot: u64,
    /// Raw oracle answer (Unix seconds).
    pub block_time_secs: i64,
    /// `block_time_secs * 10^9`.
    pub production_time_ns: u64,
}

impl OracleRecord {
    /// Build from a whole-second block time. Negative or overflowing values are rejected.
    pub fn from_block_time(slot: u64, block_time_secs: i64) -> Result<Self, OracleError> {
        let production_time_ns = u64::try_from(block_time_secs)
            .ok()
            .and_then(|secs| secs.checked_mul(NS_PER_SEC as u64))
            .filter(|ns| *ns <= i64::MAX as u64)
            .ok_or_else(|| {
                OracleError::Protocol(format!("block time out of range: {}", block_time_secs))
            })?;

        Ok(Self {
            slot,
            block_time_secs,
            production_time_ns,
        })
    }
}

/// Classified oracle failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum OracleError {
    /// Connection failure, timeout, or unreadable body.
    #[serde(rename = "transport_error")]
    Transport(String),
    /// Non-200 HTTP status.
    #[serde(rename = "http_error")]
    Http(u16),
    /// JSON-RPC error object or undecodable payload.
    #[serde(rename = "protocol_error")]
    Protocol(String),
    /// No block time for this slot (not yet available, skipped, or invalid).
    #[serde(rename = "not_found")]
    NotFound,
}

impl OracleError {
    /// Short stable label for tallies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport_error",
            Self::Http(_) => "http_error",
            Self::Protocol(_) => "protocol_error",
            Self::NotFound => "not_found",
        }
    }

    /// Whether the opt-in retry policy may re-issue the request.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Http(_))
    }
}

impl std::fmt::Display for OracleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
            Self::Http(status) => write!(f, "HTTP {}", status),
            Self::Protocol(msg) => write!(f, "RPC error: {}", msg),
            Self::NotFound => write!(f, "no block time available"),
        }
    }
}

impl std::error::Error for OracleError {}

/// Source of authoritative block production times.
#[async_trait]
pub trait BlockTimeOracle: Send + Sync {
    /// Look up a single slot. Implementations must not retry internally.
    async fn block_time(&self, slot: u64) -> Result<OracleRecord, OracleError>;

    /// Endpoint description for reports and logs.
    fn describe(&self) -> String;
}
