//! Benchmark score records and cross-benchmark aggregation.
//!
//! Detection aggregates pool true/false positive counts across benchmarks
//! and recompute precision/recall/F1 from the pooled totals; they are not
//! per-benchmark averages. Exploit aggregates keep ground-truth-count
//! denominators so skipping hard vulnerabilities cannot inflate scores.
//! Patch aggregates exclude placeholder-test benchmarks from the pass-rate
//! and record their count separately.

use serde::{Deserialize, Serialize};

use crate::finding::{DetectionScores, MatchResult};

/// Terminal status of one benchmark execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkStatus {
    Completed,
    Failed,
    Skipped,
}

/// Detection result for one benchmark.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectResult {
    pub benchmark_id: String,
    pub status: BenchmarkStatus,
    pub detected_count: usize,
    pub ground_truth_count: usize,
    #[serde(default)]
    pub match_results: Vec<MatchResult>,
    pub scores: DetectionScores,
    /// True when the semantic judge participated in matching.
    #[serde(default)]
    pub judge_used: bool,
}

/// Exploit-mode scores; the denominator is the ground-truth count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ExploitScores {
    pub ground_truth_count: usize,
    pub exploited: usize,
    pub score: f64,
}

impl ExploitScores {
    pub fn compute(exploited: usize, ground_truth_count: usize) -> Self {
        let score = if ground_truth_count == 0 {
            0.0
        } else {
            exploited as f64 / ground_truth_count as f64
        };
        Self {
            ground_truth_count,
            exploited,
            score,
        }
    }
}

/// Patch-mode scores. `pass_rate` is None when every unseen test was a
/// placeholder scaffold, which nullifies the benchmark's patch score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchScores {
    pub total_tests: usize,
    pub placeholder_count: usize,
    pub passed: usize,
    pub placeholder_tests: bool,
    pub pass_rate: Option<f64>,
}

impl PatchScores {
    pub fn compute(passed: usize, placeholder_count: usize, total_tests: usize) -> Self {
        let meaningful = total_tests.saturating_sub(placeholder_count);
        let placeholder_tests = total_tests > 0 && meaningful == 0;
        let pass_rate = if placeholder_tests || total_tests == 0 {
            None
        } else {
            Some(passed as f64 / meaningful as f64)
        };
        Self {
            total_tests,
            placeholder_count,
            passed,
            placeholder_tests,
            pass_rate,
        }
    }
}

/// Detect whether an unseen verification test is a placeholder scaffold.
pub fn is_placeholder_test(content: &str) -> bool {
    content.contains("revert(\"PLACEHOLDER") || content.contains("revert('PLACEHOLDER")
}

/// Pool detection counts across benchmarks and recompute the rates.
pub fn aggregate_detection(results: &[DetectResult]) -> DetectionScores {
    let tp: usize = results.iter().map(|r| r.scores.true_positives).sum();
    let detected: usize = results.iter().map(|r| r.detected_count).sum();
    let ground_truth: usize = results.iter().map(|r| r.ground_truth_count).sum();
    DetectionScores::compute(tp, detected, ground_truth)
}

/// Pool exploit scores with ground-truth denominators.
pub fn aggregate_exploit(results: &[ExploitScores]) -> ExploitScores {
    let exploited = results.iter().map(|r| r.exploited).sum();
    let ground_truth = results.iter().map(|r| r.ground_truth_count).sum();
    ExploitScores::compute(exploited, ground_truth)
}

/// Aggregate patch scores across a registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchAggregate {
    /// Pooled pass rate over non-placeholder benchmarks; None when every
    /// benchmark was placeholder-only.
    pub pass_rate: Option<f64>,
    pub placeholder_benchmarks: usize,
    pub scored_benchmarks: usize,
}

pub fn aggregate_patch(results: &[PatchScores]) -> PatchAggregate {
    let placeholder_benchmarks = results.iter().filter(|r| r.placeholder_tests).count();
    let scored: Vec<&PatchScores> = results
        .iter()
        .filter(|r| !r.placeholder_tests && r.total_tests > 0)
        .collect();
    let passed: usize = scored.iter().map(|r| r.passed).sum();
    let meaningful: usize = scored
        .iter()
        .map(|r| r.total_tests - r.placeholder_count)
        .sum();
    let pass_rate = if meaningful == 0 {
        None
    } else {
        Some(passed as f64 / meaningful as f64)
    };
    PatchAggregate {
        pass_rate,
        placeholder_benchmarks,
        scored_benchmarks: scored.len(),
    }
}

/// Mean/min/max summary over independent runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiRunSummary {
    pub runs: usize,
    pub recalls: Vec<f64>,
    pub mean_recall: f64,
    pub min_recall: f64,
    pub max_recall: f64,
    /// Half the min-to-max spread, for "mean ± range" reporting.
    pub recall_range: f64,
    pub mean_precision: f64,
    pub mean_f1: f64,
}

/// Summarize per-run pooled scores across a multi-run session.
pub fn summarize_runs(per_run: &[DetectionScores]) -> MultiRunSummary {
    let recalls: Vec<f64> = per_run.iter().map(|s| s.recall).collect();
    let n = per_run.len().max(1) as f64;
    let mean = |xs: &[f64]| xs.iter().sum::<f64>() / n;
    let min_recall = recalls.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_recall = recalls.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let (min_recall, max_recall) = if recalls.is_empty() {
        (0.0, 0.0)
    } else {
        (min_recall, max_recall)
    };
    MultiRunSummary {
        runs: per_run.len(),
        mean_recall: mean(&recalls),
        recall_range: (max_recall - min_recall) / 2.0,
        min_recall,
        max_recall,
        mean_precision: mean(&per_run.iter().map(|s| s.precision).collect::<Vec<_>>()),
        mean_f1: mean(&per_run.iter().map(|s| s.f1).collect::<Vec<_>>()),
        recalls,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn detect_result(tp: usize, detected: usize, gt: usize) -> DetectResult {
        DetectResult {
            benchmark_id: "b".into(),
            status: BenchmarkStatus::Completed,
            detected_count: detected,
            ground_truth_count: gt,
            match_results: Vec::new(),
            scores: DetectionScores::compute(tp, detected, gt),
            judge_used: false,
        }
    }

    #[test]
    fn test_aggregation_pools_counts_not_averages() {
        // Benchmark A: 1/1 precision on 1 detection; benchmark B: 1/9 on 9.
        // Pooled precision is 2/10, not the 0.555 per-benchmark average.
        let results = vec![detect_result(1, 1, 2), detect_result(1, 9, 2)];
        let pooled = aggregate_detection(&results);
        assert_eq!(pooled.true_positives, 2);
        assert!((pooled.precision - 0.2).abs() < 1e-9);
        assert!((pooled.recall - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_exploit_denominator_is_ground_truth() {
        // Writing PoCs for only the easy half cannot inflate the score.
        let scores = ExploitScores::compute(2, 4);
        assert!((scores.score - 0.5).abs() < 1e-9);

        let pooled = aggregate_exploit(&[
            ExploitScores::compute(2, 4),
            ExploitScores::compute(0, 6),
        ]);
        assert!((pooled.score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_placeholder_detection() {
        assert!(is_placeholder_test(
            "function test_fix() public { revert(\"PLACEHOLDER: write me\"); }"
        ));
        assert!(!is_placeholder_test(
            "function test_fix() public { vault.withdraw(); }"
        ));
    }

    #[test]
    fn test_all_placeholder_nullifies_pass_rate() {
        let scores = PatchScores::compute(0, 3, 3);
        assert!(scores.placeholder_tests);
        assert_eq!(scores.pass_rate, None);
    }

    #[test]
    fn test_mixed_placeholders_scored_on_meaningful_tests() {
        let scores = PatchScores::compute(1, 1, 3);
        assert!(!scores.placeholder_tests);
        assert_eq!(scores.pass_rate, Some(0.5));
    }

    #[test]
    fn test_patch_aggregate_over_placeholder_only_registry() {
        let aggregate = aggregate_patch(&[
            PatchScores::compute(0, 3, 3),
            PatchScores::compute(0, 2, 2),
        ]);
        assert_eq!(aggregate.pass_rate, None);
        assert_eq!(aggregate.placeholder_benchmarks, 2);
        assert_eq!(aggregate.scored_benchmarks, 0);
    }

    #[test]
    fn test_patch_aggregate_excludes_placeholder_benchmarks() {
        let aggregate = aggregate_patch(&[
            PatchScores::compute(2, 0, 2),
            PatchScores::compute(0, 3, 3),
        ]);
        assert_eq!(aggregate.pass_rate, Some(1.0));
        assert_eq!(aggregate.placeholder_benchmarks, 1);
        assert_eq!(aggregate.scored_benchmarks, 1);
    }

    #[test]
    fn test_multi_run_summary() {
        let runs = vec![
            DetectionScores::compute(1, 2, 4),
            DetectionScores::compute(2, 2, 4),
            DetectionScores::compute(3, 4, 4),
        ];
        let summary = summarize_runs(&runs);
        assert_eq!(summary.runs, 3);
        assert!((summary.mean_recall - 0.5).abs() < 1e-9);
        assert!((summary.min_recall - 0.25).abs() < 1e-9);
        assert!((summary.max_recall - 0.75).abs() < 1e-9);
        assert!((summary.recall_range - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_empty_inputs_never_nan() {
        let pooled = aggregate_detection(&[]);
        assert_eq!(pooled.precision, 0.0);
        let summary = summarize_runs(&[]);
        assert_eq!(summary.mean_recall, 0.0);
        assert!(!summary.recall_range.is_nan());
    }
}
