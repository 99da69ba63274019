//! Transaction recording for replay.
//!
//! The gatekeeper appends every transaction-emitting call here with a
//! monotonically increasing sequence number; the recorded list later
//! drives replay against a fresh chain. The counter is assigned under a
//! mutex so concurrent requests get distinct, ordered sequence numbers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

/// Audit-log line for one JSON-RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcCall {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

/// One recorded transaction, replayable on a fresh chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedTransaction {
    pub sequence: u64,
    pub method: String,
    pub params: Value,
    /// Transaction hash from the upstream response, when it produced one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct RecorderInner {
    next_sequence: u64,
    transactions: Vec<RecordedTransaction>,
}

/// Ordered transaction log owned by a gatekeeper instance.
#[derive(Default)]
pub struct TransactionRecorder {
    inner: Mutex<RecorderInner>,
}

impl TransactionRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction, assigning the next sequence number.
    pub fn record(&self, method: &str, params: Value, tx_hash: Option<String>) -> u64 {
        let mut inner = self.inner.lock().expect("recorder mutex poisoned");
        let sequence = inner.next_sequence;
        inner.next_sequence += 1;
        inner.transactions.push(RecordedTransaction {
            sequence,
            method: method.to_string(),
            params,
            tx_hash,
            timestamp: Utc::now(),
        });
        sequence
    }

    /// Snapshot of recorded transactions in arrival order.
    pub fn transactions(&self) -> Vec<RecordedTransaction> {
        self.inner
            .lock()
            .expect("recorder mutex poisoned")
            .transactions
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("recorder mutex poisoned")
            .transactions
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
