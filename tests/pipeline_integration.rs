//! Full run: log file on disk, JSON-RPC oracle over HTTP, report rendering.

use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, routing::post, Json, Router};
use serde_json::{json, Value};

use slot_latency::oracle::TracingObserver;
use slot_latency::report::{render_json, render_text};
use slot_latency::{
    Analyzer, AnalyzerConfig, CancelSignal, NoDataError, RpcBlockTimeOracle, Verbosity,
};

const SESSION_LOG: &str = "\
Connecting to CoreCast endpoint...
================================================================
Block Slot: 100
Received Timestamp: 1970-01-01T00:00:05.000000
Received Timestamp (ns): 5000000000
================================================================
Block Slot: 101
Received Timestamp: 1970-01-01T00:00:10.000000
================================================================
Block Slot: 100
Received Timestamp (ns): 9999000000000
================================================================
Block Slot: 103
heartbeat
================================================================
Block Slot: Some(102)
Received Timestamp: 1970-01-01T00:00:20.250000
================================================================
Block Slot: 103
Received Timestamp (ns): 30100000000
";

async fn spawn_rpc(block_times: HashMap<u64, i64>) -> String {
    let app = Router::new()
        .route(
            "/",
            post(
                |State(times): State<Arc<HashMap<u64, i64>>>, Json(body): Json<Value>| async move {
                    let slot = body["params"][0].as_u64().unwrap_or_default();
                    Json(json!({
                        "jsonrpc": "2.0",
                        "result": times.get(&slot),
                        "id": 1
                    }))
                },
            ),
        )
        .with_state(Arc::new(block_times));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn write_log(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn config(endpoint: String) -> AnalyzerConfig {
    AnalyzerConfig {
        rpc_endpoint: endpoint,
        request_delay_ms: 0,
        request_timeout_secs: 2,
        ..AnalyzerConfig::default()
    }
}

#[tokio::test]
async fn test_session_log_end_to_end() {
    let url = spawn_rpc(HashMap::from([(100, 4), (101, 9), (103, 30)])).await;
    let log = write_log(SESSION_LOG);
    let config = config(url);
    let oracle = RpcBlockTimeOracle::new(config.rpc_endpoint.clone(), config.request_timeout()).unwrap();

    let analyzer = Analyzer::new(&config, &oracle, &TracingObserver, CancelSignal::new());
    let result = analyzer.run_file(log.path()).await.unwrap();

    assert_eq!(result.slots_found, 4);
    assert_eq!(result.attempted, 4);
    assert_eq!(result.block_times_retrieved, 3);
    assert!(!result.interrupted);

    // First sighting wins; slot 103's first header had no timestamp.
    let slots: Vec<u64> = result.pairs.iter().map(|p| p.slot).collect();
    assert_eq!(slots, vec![100, 101, 103]);
    assert_eq!(result.pairs[0].latency_ns, 1_000_000_000);
    assert_eq!(result.pairs[1].latency_ns, 1_000_000_000);
    assert_eq!(result.pairs[2].latency_ns, 100_000_000);
    assert!(result.pairs[2].same_second);

    assert_eq!(result.failure_tally(), vec![("not_found", 1)]);
    assert_eq!(result.oracle_failures[0].slot, 102);

    let stats = result.statistics.as_ref().unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.same_second_count, 1);
    assert_eq!(stats.distribution[0].count, 1);
    assert_eq!(stats.distribution[1].count, 0);
    assert_eq!(stats.distribution[2].count, 2);
    assert_eq!(stats.median_ms, 1000.0);

    let text = render_text(&result, Verbosity::Full).join("\n");
    assert!(text.contains("Slot 100"));
    assert!(text.contains("slot 102"));

    let value = render_json(&result);
    assert_eq!(value["statistics"]["total"], json!(3));
    assert_eq!(value["failure_tally"]["not_found"], json!(1));
}

#[tokio::test]
async fn test_cap_applies_in_first_sighting_order() {
    let url = spawn_rpc(HashMap::from([(100, 4), (101, 9), (103, 30)])).await;
    let log = write_log(SESSION_LOG);
    let config = AnalyzerConfig {
        max_slots: 2,
        ..config(url)
    };
    let oracle = RpcBlockTimeOracle::new(config.rpc_endpoint.clone(), config.request_timeout()).unwrap();

    let result = Analyzer::new(&config, &oracle, &TracingObserver, CancelSignal::new())
        .run_file(log.path())
        .await
        .unwrap();

    assert_eq!(result.slots_found, 4);
    assert_eq!(result.slots_checked, 2);
    assert!(result.oracle_failures.is_empty());
    assert_eq!(result.pairs.len(), 2);
}

#[tokio::test]
async fn test_log_without_slots_is_no_data() {
    let url = spawn_rpc(HashMap::new()).await;
    let log = write_log("Connecting...\nstream closed\n");
    let config = config(url);
    let oracle = RpcBlockTimeOracle::new(config.rpc_endpoint.clone(), config.request_timeout()).unwrap();

    let err = Analyzer::new(&config, &oracle, &TracingObserver, CancelSignal::new())
        .run_file(log.path())
        .await
        .unwrap_err();
    assert_eq!(err.downcast_ref::<NoDataError>(), Some(&NoDataError::NoObservations));
}

#[tokio::test]
async fn test_no_block_times_is_no_data() {
    let url = spawn_rpc(HashMap::new()).await;
    let log = write_log(SESSION_LOG);
    let config = config(url);
    let oracle = RpcBlockTimeOracle::new(config.rpc_endpoint.clone(), config.request_timeout()).unwrap();

    let err = Analyzer::new(&config, &oracle, &TracingObserver, CancelSignal::new())
        .run_file(log.path())
        .await
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<NoDataError>(),
        Some(&NoDataError::NoBlockTimes { attempted: 4 })
    );
}

#[tokio::test]
async fn test_missing_log_is_runtime_error() {
    let config = config("http://127.0.0.1:9".to_string());
    let oracle = RpcBlockTimeOracle::new(config.rpc_endpoint.clone(), Duration::from_secs(1)).unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = Analyzer::new(&config, &oracle, &TracingObserver, CancelSignal::new())
        .run_file(&dir.path().join("missing.log"))
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<NoDataError>().is_none());
    assert!(format!("{:#}", err).contains("failed to read log file"));
}
