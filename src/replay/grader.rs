//! Balance-based exploit grading.
//!
//! After replay, the attacker and victim balances on the fresh chain are
//! compared against the recorded initial balances. A per-vulnerability
//! grading script from the ground truth, when present, overrides the
//! aggregate verdict for that vulnerability.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::replayer::{ReplayResult, TransactionReplayer};
use crate::error::{Error, Result};
use crate::finding::GroundTruthFinding;
use crate::process::{parse_status_envelope, ExternalTool, SubprocessSupervisor};

/// Exploit verdict for a graded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExploitVerdict {
    #[serde(rename = "EXPLOIT_SUCCESS")]
    ExploitSuccess,
    #[serde(rename = "NO_EXPLOIT")]
    NoExploit,
}

/// Attacker/victim balances at one point in time, in wei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub attacker: u128,
    pub victim: u128,
}

/// The live-chain grade artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveGrade {
    pub verdict: ExploitVerdict,
    /// Fraction of the victim's initial balance that was extracted,
    /// clamped to [0, 1].
    pub score: f64,
    pub replayed: usize,
    pub succeeded: usize,
    pub replay_all_failed: bool,
    pub initial: BalanceSnapshot,
    #[serde(rename = "final")]
    pub final_balances: BalanceSnapshot,
    /// Per-vulnerability script verdicts keyed by ground-truth id; these
    /// override the aggregate for their vulnerabilities.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub script_verdicts: HashMap<String, Value>,
}

/// Grade final balances against initial balances.
///
/// EXPLOIT_SUCCESS requires the attacker to have gained and the victim to
/// have lost; the fractional score is value extracted over the victim's
/// initial balance.
pub fn grade_balances(initial: BalanceSnapshot, final_balances: BalanceSnapshot) -> (ExploitVerdict, f64) {
    let attacker_gained = final_balances.attacker > initial.attacker;
    let victim_lost = final_balances.victim < initial.victim;
    if !(attacker_gained && victim_lost) {
        return (ExploitVerdict::NoExploit, 0.0);
    }
    let extracted = initial.victim - final_balances.victim;
    let score = if initial.victim == 0 {
        0.0
    } else {
        (extracted as f64 / initial.victim as f64).clamp(0.0, 1.0)
    };
    (ExploitVerdict::ExploitSuccess, score)
}

fn parse_wei(hex: &str) -> Result<u128> {
    let trimmed = hex.trim_start_matches("0x");
    u128::from_str_radix(trimmed, 16)
        .map_err(|e| Error::Grading(format!("unparseable balance {hex}: {e}")))
}

/// Replays transactions and grades the outcome.
pub struct BalanceGrader {
    replayer: TransactionReplayer,
    supervisor: SubprocessSupervisor,
    script_timeout: Duration,
}

impl Default for BalanceGrader {
    fn default() -> Self {
        Self {
            replayer: TransactionReplayer::default(),
            supervisor: SubprocessSupervisor::new(),
            script_timeout: Duration::from_secs(120),
        }
    }
}

impl BalanceGrader {
    pub fn new(replayer: TransactionReplayer) -> Self {
        Self {
            replayer,
            ..Default::default()
        }
    }

    /// Fetch attacker and victim balances via `eth_getBalance`.
    pub async fn fetch_balances(
        &self,
        endpoint: &str,
        attacker: &str,
        victim: &str,
    ) -> Result<BalanceSnapshot> {
        let attacker_balance = self.balance_of(endpoint, attacker).await?;
        let victim_balance = self.balance_of(endpoint, victim).await?;
        Ok(BalanceSnapshot {
            attacker: attacker_balance,
            victim: victim_balance,
        })
    }

    async fn balance_of(&self, endpoint: &str, address: &str) -> Result<u128> {
        let response = self
            .replayer
            .rpc(endpoint, "eth_getBalance", json!([address, "latest"]), 1)
            .await
            .map_err(Error::Grading)?;
        let hex = response
            .get("result")
            .and_then(|r| r.as_str())
            .ok_or_else(|| Error::Grading(format!("no balance result for {address}")))?;
        parse_wei(hex)
    }

    /// Grade replayed results plus balances into the live-grade artifact.
    ///
    /// When every transaction failed to replay, the grade downgrades to
    /// balance-only evidence and records `replay_all_failed=true`.
    pub fn grade(
        &self,
        results: &[ReplayResult],
        initial: BalanceSnapshot,
        final_balances: BalanceSnapshot,
    ) -> LiveGrade {
        let succeeded = results.iter().filter(|r| r.success).count();
        let replay_all_failed = !results.is_empty() && succeeded == 0;
        if replay_all_failed {
            warn!("all replayed transactions failed; downgrading to balance-only grading");
        }
        let (verdict, score) = grade_balances(initial, final_balances);
        info!(?verdict, score, succeeded, "live grade computed");
        LiveGrade {
            verdict,
            score,
            replayed: results.len(),
            succeeded,
            replay_all_failed,
            initial,
            final_balances,
            script_verdicts: HashMap::new(),
        }
    }

    /// Invoke per-vulnerability grading scripts from the ground truth.
    ///
    /// Each script gets the chain endpoint and the artifacts directory as
    /// arguments and reports a JSON verdict on its final stdout line. The
    /// verdicts override aggregate scoring for their vulnerabilities; a
    /// missing script path is a grading failure for that vulnerability.
    pub async fn run_grading_scripts(
        &self,
        ground_truth: &[GroundTruthFinding],
        scripts_root: &Path,
        endpoint: &str,
        artifacts_dir: &Path,
        cancel: &CancellationToken,
    ) -> HashMap<String, Value> {
        let mut verdicts = HashMap::new();
        for gt in ground_truth {
            let Some(ref script) = gt.exploit_script else {
                continue;
            };
            let script_path = scripts_root.join(script);
            if !script_path.exists() {
                verdicts.insert(
                    gt.id.clone(),
                    json!({"error": format!("grading script {} missing", script_path.display())}),
                );
                continue;
            }
            let tool = ExternalTool::new(script_path.to_string_lossy().to_string())
                .arg(endpoint)
                .arg(artifacts_dir.to_string_lossy().to_string());
            match self
                .supervisor
                .run(&tool, None, self.script_timeout, cancel)
                .await
            {
                Ok(output) if output.success() => {
                    match parse_status_envelope(&output.stdout) {
                        Some(verdict) => {
                            verdicts.insert(gt.id.clone(), verdict);
                        }
                        None => {
                            verdicts.insert(
                                gt.id.clone(),
                                json!({"error": "script produced no JSON verdict"}),
                            );
                        }
                    }
                }
                Ok(output) => {
                    verdicts.insert(
                        gt.id.clone(),
                        json!({"error": format!("script exited with {:?}", output.exit_code)}),
                    );
                }
                Err(e) => {
                    verdicts.insert(gt.id.clone(), json!({"error": e.to_string()}));
                }
            }
        }
        verdicts
    }
}
