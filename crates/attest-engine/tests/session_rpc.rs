use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf,
    WriteHalf};
use tokio::task::JoinHandle;

use attest_core::assertions::Registry;
use attest_core::pipeline::Pipeline;
use attest_engine::server;
use attest_engine::session::{EngineLimits, Session};

struct TestClient {
    writer: WriteHalf<DuplexStream>,
    reader: BufReader<ReadHalf<DuplexStream>>,
    server: JoinHandle<anyhow::Result<()>>,
}

impl TestClient {
    fn start(limits: EngineLimits) -> Self {
        let session = Arc::new(Session::new(
            Pipeline::new(Registry::with_builtins()),
            None,
            false,
            limits,
        ));
        let (client_side, server_side) = duplex(4 * 1024 * 1024);
        let (server_read, server_write) = tokio::io::split(server_side);
        let server = tokio::spawn(server::run(session, server_read, server_write));
        let (client_read, client_write) = tokio::io::split(client_side);
        Self {
            writer: client_write,
            reader: BufReader::new(client_read),
            server,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
    }

    async fn send(&mut self, id: i64, method: &str, params: Value) {
        let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.send_raw(&request.to_string()).await;
    }

    async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let read = self.reader.read_line(&mut line).await.unwrap();
        assert!(read > 0, "server closed the stream unexpectedly");
        serde_json::from_str(&line).unwrap()
    }

    async fn call(&mut self, id: i64, method: &str, params: Value) -> Value {
        self.send(id, method, params).await;
        self.recv().await
    }

    async fn call_raw(&mut self, line: String) -> Value {
        self.send_raw(&line).await;
        self.recv().await
    }

    async fn initialize(&mut self, id: i64) -> Value {
        self.call(
            id,
            "initialize",
            json!({
                "sdk_name": "attest-test",
                "sdk_version": "0.0.1",
                "protocol_version": "1.0",
                "required_capabilities": ["constraint", "content", "trace_tree"]
            }),
        )
        .await
    }
}

fn parent_child_trace() -> Value {
    json!({
        "schema_version": 1,
        "trace_id": "t-root",
        "agent_id": "planner",
        "output": {"message": "Refund RFD-999 approved"},
        "metadata": {"total_tokens": 300, "cost_usd": 0.03, "latency_ms": 100},
        "steps": [
            {
                "type": "agent_call",
                "name": "delegate",
                "sub_trace": {
                    "schema_version": 1,
                    "trace_id": "t-child",
                    "agent_id": "worker",
                    "parent_trace_id": "t-root",
                    "metadata": {"total_tokens": 500, "cost_usd": 0.05, "latency_ms": 200}
                }
            }
        ]
    })
}

#[tokio::test]
async fn initialize_negotiates_capabilities() {
    let mut client = TestClient::start(EngineLimits::default());
    let response = client.initialize(1).await;

    let result = &response["result"];
    assert_eq!(result["compatible"], true);
    assert_eq!(result["protocol_version"], "1.0");
    assert_eq!(result["max_concurrent_requests"], 8);
    let capabilities = result["capabilities"].as_array().unwrap();
    assert!(capabilities.contains(&json!("plugin")));
    assert!(capabilities.contains(&json!("simulation")));
    // No embedder configured in this harness.
    assert!(!capabilities.contains(&json!("embedding")));
}

#[tokio::test]
async fn incompatible_initialize_gates_the_session_until_fixed() {
    let mut client = TestClient::start(EngineLimits::default());

    let response = client
        .call(1, "initialize", json!({"protocol_version": "9.9"}))
        .await;
    assert_eq!(response["result"]["compatible"], false);

    let response = client
        .call(
            2,
            "evaluate_batch",
            json!({"trace": parent_child_trace(), "assertions": []}),
        )
        .await;
    assert_eq!(response["error"]["code"], 3003);
    assert_eq!(response["error"]["data"]["error_type"], "SESSION_ERROR");
    assert_eq!(response["error"]["data"]["retryable"], false);

    let response = client.initialize(3).await;
    assert_eq!(response["result"]["compatible"], true);

    let response = client
        .call(
            4,
            "evaluate_batch",
            json!({"trace": parent_child_trace(), "assertions": []}),
        )
        .await;
    assert!(response["result"]["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn validate_trace_tree_reports_aggregates() {
    let mut client = TestClient::start(EngineLimits::default());
    client.initialize(1).await;

    let response = client
        .call(2, "validate_trace_tree", json!({"trace": parent_child_trace()}))
        .await;

    let result = &response["result"];
    assert_eq!(result["valid"], true);
    assert_eq!(result["depth"], 1);
    assert_eq!(result["agent_count"], 2);
    assert_eq!(result["agent_ids"], json!(["planner", "worker"]));
    assert_eq!(result["aggregate_tokens"], 800);
    assert!((result["aggregate_cost_usd"].as_f64().unwrap() - 0.08).abs() < 1e-9);
    assert_eq!(result["aggregate_latency_ms"], 300);
}

#[tokio::test]
async fn evaluate_batch_runs_constraint_and_content_assertions() {
    let mut client = TestClient::start(EngineLimits::default());
    client.initialize(1).await;

    let response = client
        .call(
            2,
            "evaluate_batch",
            json!({
                "trace": parent_child_trace(),
                "assertions": [
                    {
                        "assertion_id": "a-cost",
                        "type": "constraint",
                        "spec": {"field": "metadata.cost_usd", "operator": "lte", "value": 0.05}
                    },
                    {
                        "assertion_id": "a-refund",
                        "type": "content",
                        "spec": {"check": "contains", "value": "Refund"}
                    }
                ]
            }),
        )
        .await;

    let results = response["result"]["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["assertion_id"], "a-cost");
    assert_eq!(results[0]["status"], "pass");
    assert_eq!(results[0]["score"], 1.0);
    assert_eq!(results[1]["assertion_id"], "a-refund");
    assert_eq!(results[1]["status"], "pass");
}

#[tokio::test]
async fn invalid_trace_fails_the_batch_with_invalid_trace() {
    let mut client = TestClient::start(EngineLimits::default());
    client.initialize(1).await;

    let response = client
        .call(
            2,
            "evaluate_batch",
            json!({
                "trace": {"schema_version": 1, "trace_id": "", "agent_id": ""},
                "assertions": []
            }),
        )
        .await;
    assert_eq!(response["error"]["code"], 1001);
    assert_eq!(response["error"]["data"]["error_type"], "INVALID_TRACE");
}

#[tokio::test]
async fn oversize_frames_are_rejected() {
    let limits = EngineLimits {
        max_trace_size_bytes: 1024,
        ..Default::default()
    };
    let mut client = TestClient::start(limits);
    client.initialize(1).await;

    let huge = "x".repeat(2048);
    let request = json!({
        "jsonrpc": "2.0", "id": 2, "method": "evaluate_batch",
        "params": {"trace": {"schema_version": 1, "trace_id": huge, "agent_id": "a"}, "assertions": []}
    });
    let response = client.call_raw(request.to_string()).await;
    assert_eq!(response["error"]["code"], 1001);
}

#[tokio::test]
async fn unknown_methods_are_engine_errors() {
    let mut client = TestClient::start(EngineLimits::default());
    client.initialize(1).await;

    let response = client.call(2, "transmogrify", json!({})).await;
    assert_eq!(response["error"]["code"], 3001);
    assert_eq!(response["error"]["data"]["error_type"], "ENGINE_ERROR");
}

#[tokio::test]
async fn bom_and_whitespace_are_tolerated() {
    let mut client = TestClient::start(EngineLimits::default());
    let request = json!({
        "jsonrpc": "2.0", "id": 1, "method": "initialize",
        "params": {"protocol_version": "1.0"}
    });
    client
        .send_raw(&format!("\u{feff}  {}  ", request))
        .await;
    let response = client.recv().await;
    assert_eq!(response["result"]["compatible"], true);
}

#[tokio::test]
async fn plugin_results_resolve_in_flight_batches() {
    let mut client = TestClient::start(EngineLimits::default());
    client.initialize(1).await;

    client
        .send(
            2,
            "evaluate_batch",
            json!({
                "trace": parent_child_trace(),
                "assertions": [
                    {"assertion_id": "a-plugin", "type": "plugin", "spec": {"plugin_name": "sdk-check"}}
                ]
            }),
        )
        .await;

    client
        .send(
            3,
            "submit_plugin_result",
            json!({
                "trace_id": "t-root",
                "plugin_name": "sdk-check",
                "assertion_id": "a-plugin",
                "result": {"status": "pass", "score": 0.93, "explanation": "verified by sdk"}
            }),
        )
        .await;

    let mut by_id = std::collections::HashMap::new();
    for _ in 0..2 {
        let response = client.recv().await;
        by_id.insert(response["id"].as_i64().unwrap(), response);
    }

    assert_eq!(by_id[&3]["result"]["accepted"], true);
    let results = by_id[&2]["result"]["results"].as_array().unwrap().clone();
    assert_eq!(results[0]["status"], "pass");
    assert!((results[0]["score"].as_f64().unwrap() - 0.93).abs() < 1e-9);
    assert_eq!(results[0]["explanation"], "verified by sdk");
}

#[tokio::test]
async fn shutdown_reports_totals_and_ends_the_session() {
    let mut client = TestClient::start(EngineLimits::default());
    client.initialize(1).await;

    client
        .call(
            2,
            "evaluate_batch",
            json!({
                "trace": parent_child_trace(),
                "assertions": [
                    {
                        "assertion_id": "a-cost",
                        "type": "constraint",
                        "spec": {"field": "metadata.cost_usd", "operator": "lte", "value": 0.05}
                    }
                ]
            }),
        )
        .await;

    let response = client.call(3, "shutdown", json!({})).await;
    assert_eq!(response["result"]["sessions_completed"], 1);
    assert_eq!(response["result"]["assertions_evaluated"], 1);

    let outcome = (&mut client.server).await.unwrap();
    assert!(outcome.is_ok());
}
