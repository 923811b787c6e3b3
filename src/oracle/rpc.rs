//! JSON-RPC `getBlockTime` client.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::{BlockTimeOracle, OracleError, OracleRecord};

/// Public mainnet endpoint used when nothing else is configured.
pub const DEFAULT_RPC_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";

/// HTTP JSON-RPC block-time oracle.
///
/// One `reqwest::Client` (and its connection pool) is built per oracle and
/// reused for every lookup of the run.
pub struct RpcBlockTimeOracle {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl RpcBlockTimeOracle {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn transport_error(&self, e: &reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Transport(format!("request timed out after {:?}", self.timeout))
        } else if e.is_connect() {
            OracleError::Transport(format!("connection failed: {}", e))
        } else {
            OracleError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl BlockTimeOracle for RpcBlockTimeOracle {
    async fn block_time(&self, slot: u64) -> Result<OracleRecord, OracleError> {
        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getBlockTime",
            "params": [slot]
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            debug!(slot, status = status.as_u16(), "getBlockTime returned non-200");
            return Err(OracleError::Http(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(&e))?;

        parse_block_time_response(slot, &body)
    }

    fn describe(&self) -> String {
        self.endpoint.clone()
    }
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

/// Classify a 200 response body from `getBlockTime`.
///
/// A positive integer result is a block time; `null`, absent or `0` means the
/// ledger has no time for the slot; an `error` object is a protocol failure.
pub fn parse_block_time_response(slot: u64, body: &[u8]) -> Result<OracleRecord, OracleError> {
    let response: JsonRpcResponse = serde_json::from_slice(body)
        .map_err(|e| OracleError::Protocol(format!("invalid JSON-RPC response: {}", e)))?;

    match response.result {
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(0) => Err(OracleError::NotFound),
            Some(secs) => OracleRecord::from_block_time(slot, secs),
            None => Err(OracleError::Protocol(format!("non-integer block time: {}", n))),
        },
        Some(serde_json::Value::Null) | None => match response.error {
            Some(err) => {
                let message = err.message.unwrap_or_else(|| "Unknown error".to_string());
                Err(OracleError::Protocol(match err.code {
                    Some(code) => format!("{} (code {})", message, code),
                    None => message,
                }))
            }
            None => Err(OracleError::NotFound),
        },
        Some(other) => Err(OracleError::Protocol(format!(
            "unexpected result type: {}",
            other
        ))),
    }
}
