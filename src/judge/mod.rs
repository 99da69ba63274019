//! Cross-model judging: strict validity criteria, semantic matching, and
//! prompt-injection defense.

pub mod client;
pub mod extract;
pub mod harness;
pub mod types;

pub use client::{contains_injection_attempt, verdicts_artifact, CliJudge, JudgeConfig};
pub use extract::extract_judgments;
pub use harness::{calibration_cases, CalibrationCase, CalibrationShape};
pub use types::{FindingJudgment, JudgeVerdict, JudgmentSet};
