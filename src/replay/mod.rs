//! Transaction replay and balance-based exploit grading.

pub mod grader;
pub mod replayer;

pub use grader::{
    grade_balances, BalanceGrader, BalanceSnapshot, ExploitVerdict, LiveGrade,
};
pub use replayer::{
    ReplayConfig, ReplayResult, TransactionReplayer, RECEIPT_POLL_ATTEMPTS,
    RECEIPT_POLL_INTERVAL,
};
