//! RPC gatekeeper: whitelisting proxy and transaction recorder.

pub mod proxy;
pub mod recorder;

pub use proxy::{
    method_allowed, Gatekeeper, GatekeeperConfig, ALLOWED_PREFIXES, TRANSACTION_METHODS,
};
pub use recorder::{RecordedTransaction, RpcCall, TransactionRecorder};
