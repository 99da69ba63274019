//! Whitelisting JSON-RPC proxy.
//!
//! Sits in front of a local chain instance during live-chain exploit
//! verification. Only `eth_`, `net_` and `web3_` methods pass; chain
//! cheat-code namespaces (anvil_*, evm_*, hardhat_*, debug_*, ...) are
//! rejected with a JSON-RPC method-not-allowed error and never reach the
//! upstream. Every call is appended to a JSONL audit trail; the two
//! transaction-emitting methods are additionally recorded for replay.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::recorder::{RecordedTransaction, RpcCall, TransactionRecorder};
use crate::error::{Error, Result};

/// Method prefixes forwarded to the upstream. Everything else is blocked.
pub const ALLOWED_PREFIXES: [&str; 3] = ["eth_", "net_", "web3_"];

/// Methods whose transactions are recorded for replay.
pub const TRANSACTION_METHODS: [&str; 2] = ["eth_sendRawTransaction", "eth_sendTransaction"];

const METHOD_NOT_ALLOWED_CODE: i64 = -32601;
const UPSTREAM_ERROR_CODE: i64 = -32603;

/// True when the method may be forwarded.
pub fn method_allowed(method: &str) -> bool {
    ALLOWED_PREFIXES.iter().any(|p| method.starts_with(p))
}

/// Gatekeeper configuration.
#[derive(Debug, Clone)]
pub struct GatekeeperConfig {
    /// Upstream chain RPC endpoint.
    pub upstream_url: String,
    /// JSONL audit-trail path; no audit file is written when absent.
    pub audit_log_path: Option<PathBuf>,
}

struct GatekeeperState {
    config: GatekeeperConfig,
    client: reqwest::Client,
    recorder: TransactionRecorder,
    blocked: AtomicU64,
    forwarded: AtomicU64,
    audit: Option<Mutex<std::fs::File>>,
}

impl GatekeeperState {
    fn audit_line(&self, call: &RpcCall) {
        let Some(ref audit) = self.audit else {
            return;
        };
        let Ok(line) = serde_json::to_string(call) else {
            return;
        };
        // The mutex is held for one line only.
        if let Ok(mut file) = audit.lock() {
            let _ = writeln!(file, "{line}");
        }
    }
}

/// The whitelisting proxy plus its recorded state.
#[derive(Clone)]
pub struct Gatekeeper {
    state: Arc<GatekeeperState>,
}

impl Gatekeeper {
    pub fn new(config: GatekeeperConfig) -> Result<Self> {
        let audit = match &config.audit_log_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                Some(Mutex::new(
                    std::fs::OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)?,
                ))
            }
            None => None,
        };
        Ok(Self {
            state: Arc::new(GatekeeperState {
                config,
                client: reqwest::Client::new(),
                recorder: TransactionRecorder::new(),
                blocked: AtomicU64::new(0),
                forwarded: AtomicU64::new(0),
                audit,
            }),
        })
    }

    /// Number of calls blocked by the allowlist.
    pub fn blocked_count(&self) -> u64 {
        self.state.blocked.load(Ordering::Relaxed)
    }

    /// Number of calls forwarded upstream.
    pub fn forwarded_count(&self) -> u64 {
        self.state.forwarded.load(Ordering::Relaxed)
    }

    /// Snapshot of transactions recorded so far, in arrival order.
    pub fn recorded_transactions(&self) -> Vec<RecordedTransaction> {
        self.state.recorder.transactions()
    }

    /// Process one request body the way the HTTP surface does (testable
    /// without a socket). Batch arrays preserve internal order.
    pub async fn process_body(&self, body: &[u8]) -> std::result::Result<Value, StatusCode> {
        let parsed: Value =
            serde_json::from_slice(body).map_err(|_| StatusCode::BAD_REQUEST)?;
        match parsed {
            Value::Array(calls) => {
                let mut responses = Vec::with_capacity(calls.len());
                for call in calls {
                    responses.push(process_single(&self.state, call).await);
                }
                Ok(Value::Array(responses))
            }
            call => Ok(process_single(&self.state, call).await),
        }
    }

    /// Axum router for the single POST endpoint.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(rpc_handler))
            .with_state(self.state.clone())
    }

    /// Serve until the token is cancelled; in-flight requests drain on
    /// shutdown. Returns the bound address and the server task handle.
    pub async fn serve(
        &self,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(Error::Io)?;
        let local_addr = listener.local_addr().map_err(Error::Io)?;
        let router = self.router();
        info!(%local_addr, upstream = %self.state.config.upstream_url, "gatekeeper listening");

        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await });
            if let Err(e) = server.await {
                warn!(error = %e, "gatekeeper server error");
            }
        });
        Ok((local_addr, handle))
    }
}

async fn rpc_handler(
    State(state): State<Arc<GatekeeperState>>,
    body: axum::body::Bytes,
) -> impl IntoResponse {
    let parsed: std::result::Result<Value, _> = serde_json::from_slice(&body);
    match parsed {
        Err(_) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "malformed JSON-RPC body"})),
        ),
        Ok(Value::Array(calls)) => {
            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                responses.push(process_single(&state, call).await);
            }
            (StatusCode::OK, Json(Value::Array(responses)))
        }
        Ok(call) => (StatusCode::OK, Json(process_single(&state, call).await)),
    }
}

fn error_response(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": code, "message": message}
    })
}

async fn process_single(state: &Arc<GatekeeperState>, call: Value) -> Value {
    let method = call
        .get("method")
        .and_then(|m| m.as_str())
        .unwrap_or_default()
        .to_string();
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let allowed = method_allowed(&method);

    state.audit_line(&RpcCall {
        timestamp: chrono::Utc::now(),
        method: method.clone(),
        allowed,
        id: Some(id.clone()),
    });

    if !allowed {
        state.blocked.fetch_add(1, Ordering::Relaxed);
        debug!(%method, "blocked by allowlist");
        return error_response(id, METHOD_NOT_ALLOWED_CODE, "Method not allowed".to_string());
    }

    let response = state
        .client
        .post(&state.config.upstream_url)
        .json(&call)
        .send()
        .await;
    let response = match response {
        Ok(r) => r,
        Err(e) => {
            return error_response(id, UPSTREAM_ERROR_CODE, format!("Upstream error: {e}"));
        }
    };
    let body: Value = match response.json().await {
        Ok(v) => v,
        Err(e) => {
            return error_response(id, UPSTREAM_ERROR_CODE, format!("Upstream error: {e}"));
        }
    };
    state.forwarded.fetch_add(1, Ordering::Relaxed);

    if TRANSACTION_METHODS.contains(&method.as_str()) {
        let tx_hash = body
            .get("result")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string());
        let params = call.get("params").cloned().unwrap_or(Value::Null);
        let sequence = state.recorder.record(&method, params.clone(), tx_hash.clone());
        state.audit_line(&RpcCall {
            timestamp: chrono::Utc::now(),
            method: format!("{method}#recorded-{sequence}"),
            allowed: true,
            id: Some(json!({"params": params, "tx_hash": tx_hash})),
        });
    }

    // Upstream response returned verbatim.
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn gatekeeper(upstream: &str) -> Gatekeeper {
        Gatekeeper::new(GatekeeperConfig {
            upstream_url: upstream.to_string(),
            audit_log_path: None,
        })
        .unwrap()
    }

    /// Minimal upstream double: answers every POST with a fixed result.
    async fn spawn_upstream(result: Value) -> (SocketAddr, CancellationToken) {
        async fn handler(
            State(result): State<Arc<Value>>,
            Json(call): Json<Value>,
        ) -> Json<Value> {
            Json(json!({
                "jsonrpc": "2.0",
                "id": call.get("id").cloned().unwrap_or(Value::Null),
                "result": (*result).clone(),
            }))
        }

        let router = Router::new()
            .route("/", post(handler))
            .with_state(Arc::new(result));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let shutdown = token.clone();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .unwrap();
        });
        (addr, token)
    }

    #[test]
    fn test_allowlist_prefixes() {
        assert!(method_allowed("eth_call"));
        assert!(method_allowed("eth_sendRawTransaction"));
        assert!(method_allowed("net_version"));
        assert!(method_allowed("web3_clientVersion"));

        assert!(!method_allowed("anvil_setBalance"));
        assert!(!method_allowed("debug_traceTransaction"));
        assert!(!method_allowed("evm_increaseTime"));
        assert!(!method_allowed("hardhat_setBalance"));
        assert!(!method_allowed("tenderly_simulate"));
        assert!(!method_allowed("custom_thing"));
        assert!(!method_allowed(""));
    }

    #[tokio::test]
    async fn test_cheat_code_blocked_without_upstream_contact() {
        // The upstream URL points nowhere; if the gatekeeper contacted it
        // the response would be an upstream error, not method-not-allowed.
        let gk = gatekeeper("http://127.0.0.1:1/unreachable");
        let body = br#"{"jsonrpc":"2.0","method":"anvil_setBalance","params":[],"id":1}"#;
        let response = gk.process_body(body).await.unwrap();

        assert_eq!(
            response,
            json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32601, "message": "Method not allowed"}
            })
        );
        assert_eq!(gk.blocked_count(), 1);
        assert_eq!(gk.forwarded_count(), 0);
    }

    #[tokio::test]
    async fn test_allowed_method_forwarded_verbatim() {
        let (addr, token) = spawn_upstream(json!("0x10")).await;
        let gk = gatekeeper(&format!("http://{addr}/"));

        let body = br#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":7}"#;
        let response = gk.process_body(body).await.unwrap();
        assert_eq!(response["result"], "0x10");
        assert_eq!(response["id"], 7);
        assert_eq!(gk.forwarded_count(), 1);
        token.cancel();
    }

    #[tokio::test]
    async fn test_upstream_failure_reported() {
        let gk = gatekeeper("http://127.0.0.1:1/unreachable");
        let body = br#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#;
        let response = gk.process_body(body).await.unwrap();
        assert_eq!(response["error"]["code"], -32603);
        let message = response["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Upstream error: "));
    }

    #[tokio::test]
    async fn test_transactions_recorded_with_hash() {
        let (addr, token) = spawn_upstream(json!("0xdeadbeef")).await;
        let gk = gatekeeper(&format!("http://{addr}/"));

        let body =
            br#"{"jsonrpc":"2.0","method":"eth_sendRawTransaction","params":["0x01"],"id":1}"#;
        gk.process_body(body).await.unwrap();
        let body =
            br#"{"jsonrpc":"2.0","method":"eth_sendTransaction","params":[{"to":"0x02"}],"id":2}"#;
        gk.process_body(body).await.unwrap();

        let txs = gk.recorded_transactions();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].sequence, 0);
        assert_eq!(txs[0].method, "eth_sendRawTransaction");
        assert_eq!(txs[0].tx_hash.as_deref(), Some("0xdeadbeef"));
        assert_eq!(txs[1].sequence, 1);
        token.cancel();
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let (addr, token) = spawn_upstream(json!("0x1")).await;
        let gk = gatekeeper(&format!("http://{addr}/"));

        let body = br#"[
            {"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1},
            {"jsonrpc":"2.0","method":"anvil_mine","params":[],"id":2},
            {"jsonrpc":"2.0","method":"net_version","params":[],"id":3}
        ]"#;
        let response = gk.process_body(body).await.unwrap();
        let responses = response.as_array().unwrap();
        assert_eq!(responses.len(), 3);
        assert_eq!(responses[0]["id"], 1);
        assert_eq!(responses[1]["id"], 2);
        assert_eq!(responses[1]["error"]["code"], -32601);
        assert_eq!(responses[2]["id"], 3);
        token.cancel();
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let gk = gatekeeper("http://127.0.0.1:1/");
        let status = gk.process_body(b"{not json").await.unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_http_surface_get_is_405() {
        let gk = gatekeeper("http://127.0.0.1:1/");
        let token = CancellationToken::new();
        let (addr, handle) = gk
            .serve("127.0.0.1:0".parse().unwrap(), token.clone())
            .await
            .unwrap();

        let client = reqwest::Client::new();
        let response = client.get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::METHOD_NOT_ALLOWED);

        let response = client
            .post(format!("http://{addr}/"))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        token.cancel();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_audit_trail_lines() {
        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("gatekeeper-audit-trail.jsonl");
        let gk = Gatekeeper::new(GatekeeperConfig {
            upstream_url: "http://127.0.0.1:1/".to_string(),
            audit_log_path: Some(audit_path.clone()),
        })
        .unwrap();

        let body = br#"{"jsonrpc":"2.0","method":"anvil_setBalance","params":[],"id":9}"#;
        gk.process_body(body).await.unwrap();

        let content = std::fs::read_to_string(&audit_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        let entry: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(entry["method"], "anvil_setBalance");
        assert_eq!(entry["allowed"], false);
        assert_eq!(entry["id"], 9);
    }
}
