//! Bootstrap confidence intervals and run comparison.
//!
//! Resample-with-replacement over per-vulnerability scores; the CI bounds
//! are the ⌊α/2·N⌋ and ⌊(1−α/2)·N⌋ entries of the sorted resample means.
//! Overlapping intervals between two result sets mean the difference is
//! not statistically significant.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Default resample count.
pub const DEFAULT_RESAMPLES: usize = 10_000;
/// Default confidence level.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// A bootstrap confidence interval around a mean.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BootstrapCi {
    pub mean: f64,
    pub ci_low: f64,
    pub ci_high: f64,
    pub resamples: usize,
    pub confidence: f64,
}

/// Significance verdict when comparing two result sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Significance {
    NotSignificant,
    Improvement,
    Regression,
}

/// Comparison of candidate scores against a baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub baseline: BootstrapCi,
    pub candidate: BootstrapCi,
    pub significance: Significance,
}

impl Comparison {
    /// True when CI should fail the build.
    pub fn is_regression(&self) -> bool {
        self.significance == Significance::Regression
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// Compute a bootstrap CI with an explicit RNG (deterministic in tests).
pub fn bootstrap_ci_with_rng(
    scores: &[f64],
    resamples: usize,
    confidence: f64,
    rng: &mut impl Rng,
) -> BootstrapCi {
    let point_mean = mean(scores);
    if scores.is_empty() || resamples == 0 {
        return BootstrapCi {
            mean: point_mean,
            ci_low: point_mean,
            ci_high: point_mean,
            resamples,
            confidence,
        };
    }

    let mut means = Vec::with_capacity(resamples);
    for _ in 0..resamples {
        let mut sum = 0.0;
        for _ in 0..scores.len() {
            sum += scores[rng.random_range(0..scores.len())];
        }
        means.push(sum / scores.len() as f64);
    }
    means.sort_by(f64::total_cmp);

    let alpha = 1.0 - confidence;
    let low_idx = ((alpha / 2.0) * resamples as f64) as usize;
    let high_idx = (((1.0 - alpha / 2.0) * resamples as f64) as usize).min(resamples - 1);

    BootstrapCi {
        mean: point_mean,
        ci_low: means[low_idx],
        ci_high: means[high_idx],
        resamples,
        confidence,
    }
}

/// Bootstrap CI with the default resample budget and confidence.
pub fn bootstrap_ci(scores: &[f64]) -> BootstrapCi {
    bootstrap_ci_with_rng(
        scores,
        DEFAULT_RESAMPLES,
        DEFAULT_CONFIDENCE,
        &mut rand::rng(),
    )
}

/// Compare candidate scores against baseline scores.
///
/// Non-overlapping intervals report a significant improvement or
/// regression; anything overlapping is not significant.
pub fn compare_with_rng(
    baseline_scores: &[f64],
    candidate_scores: &[f64],
    resamples: usize,
    confidence: f64,
    rng: &mut impl Rng,
) -> Comparison {
    let baseline = bootstrap_ci_with_rng(baseline_scores, resamples, confidence, rng);
    let candidate = bootstrap_ci_with_rng(candidate_scores, resamples, confidence, rng);
    let significance = if candidate.ci_low > baseline.ci_high {
        Significance::Improvement
    } else if candidate.ci_high < baseline.ci_low {
        Significance::Regression
    } else {
        Significance::NotSignificant
    };
    Comparison {
        baseline,
        candidate,
        significance,
    }
}

/// Compare with the default budget.
pub fn compare(baseline_scores: &[f64], candidate_scores: &[f64]) -> Comparison {
    compare_with_rng(
        baseline_scores,
        candidate_scores,
        DEFAULT_RESAMPLES,
        DEFAULT_CONFIDENCE,
        &mut rand::rng(),
    )
}

/// Deterministic RNG for reproducible CI computation.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_uniform_ones_degenerate_interval() {
        let scores = vec![1.0, 1.0, 1.0, 1.0, 1.0];
        let ci = bootstrap_ci_with_rng(&scores, 1000, 0.95, &mut seeded_rng(7));
        assert_eq!(ci.mean, 1.0);
        assert_eq!(ci.ci_low, 1.0);
        assert_eq!(ci.ci_high, 1.0);
    }

    #[test]
    fn test_bounds_bracket_mean_and_stay_in_unit_interval() {
        let scores = vec![0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 1.0, 1.0];
        let ci = bootstrap_ci_with_rng(&scores, 2000, 0.95, &mut seeded_rng(11));
        assert!(ci.ci_low <= ci.mean);
        assert!(ci.mean <= ci.ci_high);
        assert!(ci.ci_low >= 0.0);
        assert!(ci.ci_high <= 1.0);
    }

    #[test]
    fn test_empty_scores_yield_zero_ci() {
        let ci = bootstrap_ci_with_rng(&[], 1000, 0.95, &mut seeded_rng(1));
        assert_eq!(ci.mean, 0.0);
        assert_eq!(ci.ci_low, 0.0);
        assert_eq!(ci.ci_high, 0.0);
    }

    #[test]
    fn test_clear_improvement_is_significant() {
        let baseline = vec![0.0; 20];
        let candidate = vec![1.0; 20];
        let cmp = compare_with_rng(&baseline, &candidate, 1000, 0.95, &mut seeded_rng(3));
        assert_eq!(cmp.significance, Significance::Improvement);
        assert!(!cmp.is_regression());
    }

    #[test]
    fn test_clear_regression_breaks_ci() {
        let baseline = vec![1.0; 20];
        let candidate = vec![0.0; 20];
        let cmp = compare_with_rng(&baseline, &candidate, 1000, 0.95, &mut seeded_rng(3));
        assert!(cmp.is_regression());
    }

    #[test]
    fn test_identical_sets_not_significant() {
        let scores: Vec<f64> = (0..20).map(|i| (i % 2) as f64).collect();
        let cmp = compare_with_rng(&scores, &scores, 1000, 0.95, &mut seeded_rng(5));
        assert_eq!(cmp.significance, Significance::NotSignificant);
    }

    #[test]
    fn test_deterministic_under_seed() {
        let scores = vec![0.2, 0.4, 0.9, 0.7];
        let a = bootstrap_ci_with_rng(&scores, 500, 0.95, &mut seeded_rng(42));
        let b = bootstrap_ci_with_rng(&scores, 500, 0.95, &mut seeded_rng(42));
        assert_eq!(a.ci_low, b.ci_low);
        assert_eq!(a.ci_high, b.ci_high);
    }
}
