//! Slot latency analyzer CLI
//!
//! Reads a streaming-client log, looks up the ledger block time of every
//! distinct slot (rate-limited, sequential) and prints latency statistics.
//!
//! # Usage
//!
//! ```bash
//! slot-latency corecast_session.log
//! slot-latency --verbose --max-slots 100 --delay-ms 500 corecast_session.log
//! slot-latency --config analyzer.toml --json corecast_session.log > report.json
//! ```
//!
//! Logs go to stderr (`RUST_LOG` overrides the default filter); the report
//! goes to stdout.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Nothing to measure (no slots in the log, or no block times retrieved)
//! - 2: Usage or configuration error
//! - 3: Runtime error (I/O, HTTP client, etc.)
//! - 130: Interrupted; the partial report was still printed

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use slot_latency::oracle::TracingObserver;
use slot_latency::report::{render_json, render_text};
use slot_latency::{
    AnalysisResult, Analyzer, AnalyzerConfig, CancelSignal, NoDataError, RpcBlockTimeOracle,
    Verbosity,
};

const EXIT_NO_DATA: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_RUNTIME: u8 = 3;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "slot-latency")]
#[command(about = "Measure notification latency of streamed slots against ledger block times")]
struct Args {
    /// Streaming-client log file to analyze
    log_file: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint answering getBlockTime
    #[arg(long)]
    rpc_url: Option<String>,

    /// Pause between oracle requests (ms)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Per-request timeout (seconds)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Maximum distinct slots to look up
    #[arg(long)]
    max_slots: Option<usize>,

    /// Lines searched after each slot header (1-4)
    #[arg(long)]
    lookahead: Option<usize>,

    /// Retries for transport/HTTP failures (0 disables)
    #[arg(long)]
    retries: Option<u32>,

    /// Sample comparisons shown with --verbose
    #[arg(long)]
    samples: Option<usize>,

    /// Full report: sample comparisons and per-slot failure reasons
    #[arg(short, long)]
    verbose: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

impl Args {
    /// Defaults, then the config file, then the environment, then flags.
    fn resolve_config(&self) -> Result<AnalyzerConfig> {
        let mut config = match &self.config {
            Some(path) => AnalyzerConfig::from_file(path)?,
            None => AnalyzerConfig::default(),
        }
        .apply_env()?;

        if let Some(url) = &self.rpc_url {
            config.rpc_endpoint = url.clone();
        }
        if let Some(v) = self.delay_ms {
            config.request_delay_ms = v;
        }
        if let Some(v) = self.timeout_secs {
            config.request_timeout_secs = v;
        }
        if let Some(v) = self.max_slots {
            config.max_slots = v;
        }
        if let Some(v) = self.lookahead {
            config.lookahead_lines = v;
        }
        if let Some(v) = self.retries {
            config.retry.max_retries = v;
        }
        if let Some(v) = self.samples {
            config.sample_count = v;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("slot_latency=info".parse().expect("static directive")),
        )
        .init();

    let args = Args::parse();

    let config = match args.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match run(&args, &config).await {
        Ok(result) => {
            if result.interrupted {
                ExitCode::from(EXIT_INTERRUPTED)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => match e.downcast_ref::<NoDataError>() {
            Some(no_data) => {
                eprintln!("{}", no_data);
                ExitCode::from(EXIT_NO_DATA)
            }
            None => {
                eprintln!("Error: {:#}", e);
                ExitCode::from(EXIT_RUNTIME)
            }
        },
    }
}

async fn run(args: &Args, config: &AnalyzerConfig) -> Result<AnalysisResult> {
    info!(
        log = %args.log_file.display(),
        endpoint = %config.rpc_endpoint,
        max_slots = config.max_slots,
        "Starting slot latency analysis"
    );

    let oracle = RpcBlockTimeOracle::new(config.rpc_endpoint.clone(), config.request_timeout())?;
    let cancel = CancelSignal::new();
    let listener = cancel.spawn_signal_listener();

    let analyzer = Analyzer::new(config, &oracle, &TracingObserver, cancel);
    let outcome = analyzer.run_file(&args.log_file).await;
    listener.abort();
    let result = outcome?;

    if args.json {
        let json = serde_json::to_string_pretty(&render_json(&result))
            .context("failed to serialize report")?;
        println!("{}", json);
    } else {
        let verbosity = if args.verbose {
            Verbosity::Full
        } else {
            Verbosity::Summary
        };
        for line in render_text(&result, verbosity) {
            println!("{}", line);
        }
    }

    Ok(result)
}
