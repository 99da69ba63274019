//! Ground-truth matching for benchmark scoring.
//!
//! Three tiers, strict one-to-one: once a detected finding is consumed by a
//! ground-truth match it cannot match any other ground-truth row. This is
//! what keeps precision at or below 1.0.
//!
//! 1. Exact: same normalized file, within ±5 lines (inclusive), detected
//!    text mentions the ground-truth mechanism.
//! 2. Broad: same file, compatible mechanism, any line.
//! 3. Semantic (optional, on by default): a judge sees the ground-truth row
//!    and a report of all detected findings with consumed entries annotated
//!    unavailable; only verdicts naming an unconsumed index are accepted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::classify::text_mentions_mechanism;
use super::types::{Finding, GroundTruthFinding, MatchResult, MatchTier};
use crate::error::Result;

/// Inclusive line tolerance for the exact tier.
pub const EXACT_LINE_TOLERANCE: u32 = 5;

/// One detected finding as presented to the semantic judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub index: usize,
    pub identifier: String,
    pub file: String,
    pub line: u32,
    pub title: String,
    pub description: String,
    /// False when the entry was already consumed by an earlier match.
    pub available: bool,
}

/// Verdict returned by the semantic judge for one ground-truth row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticVerdict {
    #[serde(rename = "match")]
    pub matched: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_index: Option<usize>,
    #[serde(default)]
    pub reasoning: String,
}

/// Judge function for the semantic tier.
#[async_trait]
pub trait SemanticJudge: Send + Sync {
    async fn judge_match(
        &self,
        ground_truth: &GroundTruthFinding,
        report: &[ReportEntry],
    ) -> Result<SemanticVerdict>;
}

/// Detection scores for one run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DetectionScores {
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

impl DetectionScores {
    /// Compute scores from match counts. Zero denominators yield zero
    /// rates, never NaN.
    pub fn compute(true_positives: usize, total_detected: usize, total_ground_truth: usize) -> Self {
        let false_positives = total_detected.saturating_sub(true_positives);
        let false_negatives = total_ground_truth.saturating_sub(true_positives);
        let precision = if total_detected == 0 {
            0.0
        } else {
            true_positives as f64 / total_detected as f64
        };
        let recall = if total_ground_truth == 0 {
            0.0
        } else {
            true_positives as f64 / total_ground_truth as f64
        };
        let f1 = if precision + recall == 0.0 {
            0.0
        } else {
            2.0 * precision * recall / (precision + recall)
        };
        Self {
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
        }
    }
}

/// Outcome of matching a detected set against ground truth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub results: Vec<MatchResult>,
    pub scores: DetectionScores,
}

/// Internal matcher state tracking one-to-one consumption.
struct MatcherState<'a> {
    ground_truth: &'a [GroundTruthFinding],
    detected: &'a [Finding],
    consumed: Vec<bool>,
    results: Vec<Option<MatchResult>>,
}

impl<'a> MatcherState<'a> {
    fn new(ground_truth: &'a [GroundTruthFinding], detected: &'a [Finding]) -> Self {
        Self {
            ground_truth,
            detected,
            consumed: vec![false; detected.len()],
            results: vec![None; ground_truth.len()],
        }
    }

    fn exact_tier(&mut self) {
        for (gi, gt) in self.ground_truth.iter().enumerate() {
            if gt.line == 0 {
                continue;
            }
            let gt_file = super::types::normalize_path(&gt.file);
            let hit = self.detected.iter().enumerate().find(|(di, d)| {
                !self.consumed[*di]
                    && d.line > 0
                    && d.normalized_file() == gt_file
                    && d.line.abs_diff(gt.line) <= EXACT_LINE_TOLERANCE
                    && text_mentions_mechanism(&d.classification_text(), gt.mechanism)
            });
            if let Some((di, d)) = hit {
                self.consumed[di] = true;
                self.results[gi] = Some(MatchResult {
                    ground_truth_id: gt.id.clone(),
                    matched: true,
                    match_tier: MatchTier::Exact,
                    detected_identifier: Some(d.id.clone()),
                    judge_reasoning: None,
                });
            }
        }
    }

    fn broad_tier(&mut self) {
        for (gi, gt) in self.ground_truth.iter().enumerate() {
            if self.results[gi].is_some() {
                continue;
            }
            let gt_file = super::types::normalize_path(&gt.file);
            let hit = self.detected.iter().enumerate().find(|(di, d)| {
                !self.consumed[*di]
                    && d.normalized_file() == gt_file
                    && gt.mechanism.compatible_with(d.mechanism)
            });
            if let Some((di, d)) = hit {
                self.consumed[di] = true;
                self.results[gi] = Some(MatchResult {
                    ground_truth_id: gt.id.clone(),
                    matched: true,
                    match_tier: MatchTier::Broad,
                    detected_identifier: Some(d.id.clone()),
                    judge_reasoning: None,
                });
            }
        }
    }

    fn report(&self) -> Vec<ReportEntry> {
        self.detected
            .iter()
            .enumerate()
            .map(|(i, d)| ReportEntry {
                index: i,
                identifier: d.id.clone(),
                file: d.file.clone(),
                line: d.line,
                title: d.title.clone(),
                description: d.description.clone(),
                available: !self.consumed[i],
            })
            .collect()
    }

    fn finish(mut self) -> MatchOutcome {
        for (gi, gt) in self.ground_truth.iter().enumerate() {
            if self.results[gi].is_none() {
                self.results[gi] = Some(MatchResult::unmatched(gt.id.clone()));
            }
        }
        let results: Vec<MatchResult> = self.results.into_iter().flatten().collect();
        let true_positives = results.iter().filter(|r| r.matched).count();
        let scores =
            DetectionScores::compute(true_positives, self.detected.len(), self.ground_truth.len());
        MatchOutcome { results, scores }
    }
}

/// Heuristic matching: exact and broad tiers only.
pub fn match_findings_heuristic(
    ground_truth: &[GroundTruthFinding],
    detected: &[Finding],
) -> MatchOutcome {
    let mut state = MatcherState::new(ground_truth, detected);
    state.exact_tier();
    state.broad_tier();
    state.finish()
}

/// Full matching: heuristic tiers plus the semantic judge tier.
///
/// A judge failure on a specific row downgrades that row to unmatched with
/// `"Judge invocation failed"`; the heuristic tiers stand alone.
pub async fn match_findings(
    ground_truth: &[GroundTruthFinding],
    detected: &[Finding],
    judge: Option<&dyn SemanticJudge>,
) -> MatchOutcome {
    let mut state = MatcherState::new(ground_truth, detected);
    state.exact_tier();
    state.broad_tier();

    if let Some(judge) = judge {
        for gi in 0..ground_truth.len() {
            if state.results[gi].is_some() {
                continue;
            }
            let gt = &ground_truth[gi];
            let report = state.report();
            match judge.judge_match(gt, &report).await {
                Ok(verdict) if verdict.matched => {
                    let index = verdict.matched_index;
                    // Only unconsumed indices are accepted.
                    match index {
                        Some(i) if i < state.detected.len() && !state.consumed[i] => {
                            state.consumed[i] = true;
                            state.results[gi] = Some(MatchResult {
                                ground_truth_id: gt.id.clone(),
                                matched: true,
                                match_tier: MatchTier::Semantic,
                                detected_identifier: Some(state.detected[i].id.clone()),
                                judge_reasoning: Some(verdict.reasoning),
                            });
                        }
                        _ => {
                            debug!(
                                ground_truth = %gt.id,
                                "semantic verdict named a consumed or invalid index; ignored"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(ground_truth = %gt.id, error = %e, "judge invocation failed");
                    state.results[gi] = Some(MatchResult {
                        ground_truth_id: gt.id.clone(),
                        matched: false,
                        match_tier: MatchTier::None,
                        detected_identifier: None,
                        judge_reasoning: Some("Judge invocation failed".to_string()),
                    });
                }
            }
        }
    }

    state.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::finding::types::{Mechanism, Severity, Source};
    use pretty_assertions::assert_eq;

    fn gt(id: &str, file: &str, line: u32, mechanism: Mechanism) -> GroundTruthFinding {
        GroundTruthFinding {
            id: id.to_string(),
            severity: Severity::High,
            title: String::new(),
            file: file.to_string(),
            line,
            mechanism,
            description: String::new(),
            exploit_script: None,
            unseen_test_file: None,
        }
    }

    fn detected(id: &str, file: &str, line: u32, text: &str) -> Finding {
        Finding::new(
            id,
            Severity::High,
            text,
            file,
            line,
            Mechanism::Other,
            Source::Secondary,
        )
    }

    #[test]
    fn test_one_to_one_prevents_precision_above_one() {
        let ground_truth = vec![
            gt("GT-1", "src/Vault.sol", 42, Mechanism::Reentrancy),
            gt("GT-2", "src/Vault.sol", 100, Mechanism::Reentrancy),
        ];
        let found = vec![detected("D1", "src/Vault.sol", 43, "reentrancy in withdraw")];

        let outcome = match_findings_heuristic(&ground_truth, &found);

        let matched: Vec<_> = outcome.results.iter().filter(|r| r.matched).collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].ground_truth_id, "GT-1");
        assert_eq!(matched[0].match_tier, MatchTier::Exact);
        assert!((outcome.scores.precision - 1.0).abs() < 1e-9);
        assert!((outcome.scores.recall - 0.5).abs() < 1e-9);
        assert!((outcome.scores.f1 - 2.0 / 3.0).abs() < 1e-3);
    }

    #[test]
    fn test_exact_tolerance_inclusive_at_five() {
        let ground_truth = vec![gt("GT-1", "src/Vault.sol", 50, Mechanism::Reentrancy)];

        let hit = vec![detected("D1", "src/Vault.sol", 55, "reentrancy")];
        let outcome = match_findings_heuristic(&ground_truth, &hit);
        assert_eq!(outcome.results[0].match_tier, MatchTier::Exact);

        let miss = vec![detected("D1", "src/Vault.sol", 56, "reentrancy")];
        let outcome = match_findings_heuristic(&ground_truth, &miss);
        // 6 lines off: the exact tier does not fire, but the broad tier may
        // still match via the wildcard mechanism.
        assert_ne!(outcome.results[0].match_tier, MatchTier::Exact);
    }

    #[test]
    fn test_zero_lines_skip_exact_but_allow_broad() {
        let ground_truth = vec![gt("GT-1", "src/Vault.sol", 0, Mechanism::Reentrancy)];
        let found = vec![detected("D1", "src/Vault.sol", 0, "something in the vault")];

        let outcome = match_findings_heuristic(&ground_truth, &found);
        assert!(outcome.results[0].matched);
        assert_eq!(outcome.results[0].match_tier, MatchTier::Broad);
    }

    #[test]
    fn test_counts_partition() {
        let ground_truth = vec![
            gt("GT-1", "src/Vault.sol", 42, Mechanism::Reentrancy),
            gt("GT-2", "src/Pool.sol", 10, Mechanism::FlashLoan),
        ];
        let found = vec![
            detected("D1", "src/Vault.sol", 43, "reentrancy"),
            detected("D2", "src/Unrelated.sol", 1, "nothing"),
            detected("D3", "src/Other.sol", 2, "nothing"),
        ];
        let outcome = match_findings_heuristic(&ground_truth, &found);
        let s = outcome.scores;
        assert_eq!(s.true_positives + s.false_negatives, ground_truth.len());
        assert_eq!(s.true_positives + s.false_positives, found.len());
    }

    #[test]
    fn test_empty_inputs_zero_scores() {
        let outcome = match_findings_heuristic(&[], &[]);
        assert_eq!(outcome.scores.precision, 0.0);
        assert_eq!(outcome.scores.recall, 0.0);
        assert_eq!(outcome.scores.f1, 0.0);
        assert!(!outcome.scores.f1.is_nan());
    }

    struct FixedJudge {
        verdict: SemanticVerdict,
    }

    #[async_trait]
    impl SemanticJudge for FixedJudge {
        async fn judge_match(
            &self,
            _ground_truth: &GroundTruthFinding,
            _report: &[ReportEntry],
        ) -> crate::error::Result<SemanticVerdict> {
            Ok(self.verdict.clone())
        }
    }

    struct FailingJudge;

    #[async_trait]
    impl SemanticJudge for FailingJudge {
        async fn judge_match(
            &self,
            _ground_truth: &GroundTruthFinding,
            _report: &[ReportEntry],
        ) -> crate::error::Result<SemanticVerdict> {
            Err(Error::Judge("boom".to_string()))
        }
    }

    #[tokio::test]
    async fn test_semantic_tier_accepts_unconsumed_index() {
        let ground_truth = vec![gt("GT-1", "src/Vault.sol", 42, Mechanism::Reentrancy)];
        let found = vec![detected(
            "D1",
            "src/Renamed.sol",
            7,
            "withdraw can be re-entered",
        )];

        let judge = FixedJudge {
            verdict: SemanticVerdict {
                matched: true,
                matched_index: Some(0),
                reasoning: "same flaw, file was renamed".to_string(),
            },
        };
        let outcome = match_findings(&ground_truth, &found, Some(&judge)).await;
        assert!(outcome.results[0].matched);
        assert_eq!(outcome.results[0].match_tier, MatchTier::Semantic);
        assert_eq!(
            outcome.results[0].judge_reasoning.as_deref(),
            Some("same flaw, file was renamed")
        );
    }

    #[tokio::test]
    async fn test_semantic_tier_rejects_consumed_index() {
        let ground_truth = vec![
            gt("GT-1", "src/Vault.sol", 42, Mechanism::Reentrancy),
            gt("GT-2", "src/Vault.sol", 300, Mechanism::Reentrancy),
        ];
        let found = vec![detected("D1", "src/Vault.sol", 43, "reentrancy")];

        // The judge insists the single detected finding also matches GT-2;
        // it was already consumed by the exact tier, so the verdict is
        // discarded.
        let judge = FixedJudge {
            verdict: SemanticVerdict {
                matched: true,
                matched_index: Some(0),
                reasoning: "it matches".to_string(),
            },
        };
        let outcome = match_findings(&ground_truth, &found, Some(&judge)).await;
        assert_eq!(outcome.scores.true_positives, 1);
        assert!((outcome.scores.precision - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_judge_failure_downgrades_gracefully() {
        let ground_truth = vec![gt("GT-1", "src/Vault.sol", 42, Mechanism::Reentrancy)];
        let found: Vec<Finding> = Vec::new();

        let outcome = match_findings(&ground_truth, &found, Some(&FailingJudge)).await;
        assert!(!outcome.results[0].matched);
        assert_eq!(
            outcome.results[0].judge_reasoning.as_deref(),
            Some("Judge invocation failed")
        );
    }
}
