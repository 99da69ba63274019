//! Transaction replay against a freshly-provisioned chain.
//!
//! Recorded transactions are applied strictly in ascending sequence order;
//! individual failures do not stop the replay, since a partial exploit
//! still moves funds.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::gatekeeper::RecordedTransaction;

/// Receipt polling defaults: 10 attempts at 500ms.
pub const RECEIPT_POLL_ATTEMPTS: usize = 10;
pub const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Replay configuration; the polling knobs exist for tests.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    pub receipt_poll_attempts: usize,
    pub receipt_poll_interval: Duration,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            receipt_poll_attempts: RECEIPT_POLL_ATTEMPTS,
            receipt_poll_interval: RECEIPT_POLL_INTERVAL,
        }
    }
}

/// Outcome of replaying one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayResult {
    pub sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Replays a recorded transaction list over JSON-RPC.
pub struct TransactionReplayer {
    client: reqwest::Client,
    config: ReplayConfig,
}

impl Default for TransactionReplayer {
    fn default() -> Self {
        Self::new(ReplayConfig::default())
    }
}

impl TransactionReplayer {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Replay every transaction in ascending sequence order. The input
    /// slice is not mutated; results come back ordered by sequence.
    #[instrument(skip(self, transactions), fields(count = transactions.len()))]
    pub async fn replay(
        &self,
        endpoint: &str,
        transactions: &[RecordedTransaction],
    ) -> Vec<ReplayResult> {
        let mut ordered: Vec<&RecordedTransaction> = transactions.iter().collect();
        ordered.sort_by_key(|t| t.sequence);

        let mut results = Vec::with_capacity(ordered.len());
        for tx in ordered {
            let result = self.replay_one(endpoint, tx).await;
            if !result.success {
                warn!(sequence = tx.sequence, error = ?result.error, "replayed transaction failed");
            }
            results.push(result);
        }
        results
    }

    async fn replay_one(&self, endpoint: &str, tx: &RecordedTransaction) -> ReplayResult {
        let response = match self
            .rpc(endpoint, &tx.method, tx.params.clone(), tx.sequence)
            .await
        {
            Ok(v) => v,
            Err(e) => {
                return ReplayResult {
                    sequence: tx.sequence,
                    tx_hash: None,
                    success: false,
                    error: Some(e),
                };
            }
        };

        if let Some(error) = response.get("error") {
            return ReplayResult {
                sequence: tx.sequence,
                tx_hash: None,
                success: false,
                error: Some(error.to_string()),
            };
        }

        let tx_hash = response
            .get("result")
            .and_then(|r| r.as_str())
            .map(|s| s.to_string());
        let Some(hash) = tx_hash.clone() else {
            return ReplayResult {
                sequence: tx.sequence,
                tx_hash: None,
                success: false,
                error: Some("no transaction hash in response".to_string()),
            };
        };

        match self.poll_receipt(endpoint, &hash).await {
            Ok(true) => ReplayResult {
                sequence: tx.sequence,
                tx_hash,
                success: true,
                error: None,
            },
            Ok(false) => ReplayResult {
                sequence: tx.sequence,
                tx_hash,
                success: false,
                error: Some("receipt status 0x0".to_string()),
            },
            Err(e) => ReplayResult {
                sequence: tx.sequence,
                tx_hash,
                success: false,
                error: Some(e),
            },
        }
    }

    /// Poll for the transaction receipt. Ok(true) on status 0x1, Ok(false)
    /// on status 0x0; Err when no receipt appears within the attempt
    /// budget or the RPC fails.
    async fn poll_receipt(&self, endpoint: &str, tx_hash: &str) -> Result<bool, String> {
        for attempt in 0..self.config.receipt_poll_attempts {
            let response = self
                .rpc(
                    endpoint,
                    "eth_getTransactionReceipt",
                    json!([tx_hash]),
                    u64::MAX,
                )
                .await?;
            let receipt = response.get("result").cloned().unwrap_or(Value::Null);
            if !receipt.is_null() {
                let status = receipt
                    .get("status")
                    .and_then(|s| s.as_str())
                    .unwrap_or("0x0");
                return Ok(status == "0x1");
            }
            debug!(attempt, tx_hash, "no receipt yet");
            tokio::time::sleep(self.config.receipt_poll_interval).await;
        }
        Err(format!(
            "no receipt after {} attempts",
            self.config.receipt_poll_attempts
        ))
    }

    pub(crate) async fn rpc(
        &self,
        endpoint: &str,
        method: &str,
        params: Value,
        id: u64,
    ) -> Result<Value, String> {
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        let response = self
            .client
            .post(endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("rpc transport error: {e}"))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| format!("rpc decode error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn tx(sequence: u64) -> RecordedTransaction {
        RecordedTransaction {
            sequence,
            method: "eth_sendRawTransaction".to_string(),
            params: json!([format!("0xsigned{sequence}")]),
            tx_hash: None,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Chain double: answers send methods with a hash, receipts with
    /// status 0x1, and counts calls in arrival order.
    async fn spawn_chain(
        fail_sequences: Vec<u64>,
    ) -> (String, Arc<std::sync::Mutex<Vec<String>>>, CancellationToken) {
        #[derive(Clone)]
        struct ChainState {
            calls: Arc<std::sync::Mutex<Vec<String>>>,
            fail: Arc<Vec<u64>>,
        }

        async fn handler(
            State(state): State<ChainState>,
            Json(call): Json<Value>,
        ) -> Json<Value> {
            let method = call["method"].as_str().unwrap_or_default().to_string();
            let id = call["id"].clone();
            if method == "eth_getTransactionReceipt" {
                let hash = call["params"][0].as_str().unwrap_or_default();
                let failed = state.fail.iter().any(|s| hash.ends_with(&s.to_string()));
                let status = if failed { "0x0" } else { "0x1" };
                return Json(json!({
                    "jsonrpc": "2.0", "id": id,
                    "result": {"status": status}
                }));
            }
            state.calls.lock().unwrap().push(
                call["params"][0]
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            );
            let seq = call["params"][0]
                .as_str()
                .and_then(|p| p.strip_prefix("0xsigned"))
                .unwrap_or("?");
            Json(json!({
                "jsonrpc": "2.0", "id": id,
                "result": format!("0xhash{seq}")
            }))
        }

        let state = ChainState {
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
            fail: Arc::new(fail_sequences),
        };
        let calls = state.calls.clone();
        let router = Router::new().route("/", post(handler)).with_state(state);
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
        (format!("http://{addr}/"), calls, token)
    }

    #[tokio::test]
    async fn test_scrambled_input_replays_in_sequence_order() {
        let (endpoint, calls, token) = spawn_chain(vec![]).await;
        let transactions = vec![tx(2), tx(0), tx(1)];

        let replayer = TransactionReplayer::default();
        let results = replayer.replay(&endpoint, &transactions).await;

        let sequences: Vec<u64> = results.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
        assert!(results.iter().all(|r| r.success));

        // The chain saw the sends in ascending order.
        let seen = calls.lock().unwrap().clone();
        assert_eq!(seen, vec!["0xsigned0", "0xsigned1", "0xsigned2"]);

        // The input array was not mutated.
        let input_sequences: Vec<u64> = transactions.iter().map(|t| t.sequence).collect();
        assert_eq!(input_sequences, vec![2, 0, 1]);
        token.cancel();
    }

    #[tokio::test]
    async fn test_individual_failure_does_not_stop_replay() {
        let (endpoint, _calls, token) = spawn_chain(vec![1]).await;
        let transactions = vec![tx(0), tx(1), tx(2)];

        let replayer = TransactionReplayer::default();
        let results = replayer.replay(&endpoint, &transactions).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].success);
        assert!(!results[1].success);
        assert_eq!(results[1].error.as_deref(), Some("receipt status 0x0"));
        assert!(results[2].success);
        token.cancel();
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_every_transaction() {
        let replayer = TransactionReplayer::new(ReplayConfig {
            receipt_poll_attempts: 1,
            receipt_poll_interval: Duration::from_millis(1),
        });
        let results = replayer
            .replay("http://127.0.0.1:1/", &[tx(0), tx(1)])
            .await;
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| !r.success));
    }
}
