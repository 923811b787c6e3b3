//! Slot latency attribution.
//!
//! Correlates the first local sighting of each slot in a streaming-client log
//! with the ledger's own block time and reports how late the notification
//! arrived. Stages are plain functions over owned data; only the binary
//! installs logging and signal handling.

pub mod analysis;
pub mod cancel;
pub mod config;
pub mod extractor;
pub mod oracle;
pub mod reconcile;
pub mod report;
pub mod stats;
pub mod timestamp;

pub use analysis::{AnalysisResult, Analyzer, NoDataError};
pub use cancel::CancelSignal;
pub use config::AnalyzerConfig;
pub use extractor::{ExtractedSlots, LogExtractor, Observation};
pub use oracle::{BlockTimeOracle, OracleError, OracleRecord, RpcBlockTimeOracle};
pub use report::Verbosity;
pub use timestamp::RawTimestamp;
