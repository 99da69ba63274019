//! Coverage tracking and the another-pass gate.
//!
//! A finding covers an entrypoint or module when its normalized file
//! references it; the `Contract::function` form in a finding's `affected`
//! field is also recognized. Matching is case-insensitive over normalized
//! paths.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::extract::CoverageTargets;
use crate::finding::{normalize_path, Finding};

/// Default coverage-gate threshold, percent.
pub const DEFAULT_COVERAGE_THRESHOLD: f64 = 90.0;

/// Coverage snapshot for a detection pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub total_entrypoints: usize,
    pub covered_entrypoints: usize,
    pub entrypoint_coverage_pct: f64,
    pub total_modules: usize,
    pub covered_modules: usize,
    pub module_coverage_pct: f64,
    pub uncovered_entrypoints: Vec<String>,
    pub uncovered_modules: Vec<String>,
    /// True when either percentage is below the threshold.
    pub pass_required: bool,
    pub threshold_pct: f64,
}

/// Hints artifact consumed by the hinted re-detect phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageHints {
    pub uncovered_modules: Vec<String>,
    pub uncovered_entrypoints: Vec<String>,
}

impl CoverageReport {
    pub fn hints(&self) -> CoverageHints {
        CoverageHints {
            uncovered_modules: self.uncovered_modules.clone(),
            uncovered_entrypoints: self.uncovered_entrypoints.clone(),
        }
    }
}

fn percentage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        covered as f64 / total as f64 * 100.0
    }
}

/// Compute coverage of the targets by a set of findings.
pub fn check_coverage(
    targets: &CoverageTargets,
    findings: &[Finding],
    threshold_pct: f64,
) -> CoverageReport {
    let files: Vec<String> = findings.iter().map(|f| f.normalized_file()).collect();
    let affected: Vec<String> = findings
        .iter()
        .filter_map(|f| f.affected.as_ref())
        .map(|a| a.to_lowercase())
        .collect();

    let mut uncovered_entrypoints = Vec::new();
    let mut covered_entrypoints = 0usize;
    for ep in &targets.entrypoints {
        let ep_file = normalize_path(&ep.file);
        let by_file = files.iter().any(|f| *f == ep_file);
        let qualified = format!("{}::{}", ep.contract, ep.function).to_lowercase();
        let by_affected = affected.iter().any(|a| *a == qualified);
        if by_file || by_affected {
            covered_entrypoints += 1;
        } else {
            uncovered_entrypoints.push(ep.qualified());
        }
    }

    let mut uncovered_modules = Vec::new();
    let mut covered_modules = 0usize;
    for module in &targets.modules {
        let module_file = normalize_path(&module.file);
        let by_file = files.iter().any(|f| *f == module_file);
        let prefix = format!("{}::", module.name).to_lowercase();
        let by_affected = affected.iter().any(|a| a.starts_with(&prefix));
        if by_file || by_affected {
            covered_modules += 1;
        } else {
            uncovered_modules.push(module.name.clone());
        }
    }

    let entrypoint_coverage_pct = percentage(covered_entrypoints, targets.entrypoints.len());
    let module_coverage_pct = percentage(covered_modules, targets.modules.len());
    let pass_required =
        entrypoint_coverage_pct < threshold_pct || module_coverage_pct < threshold_pct;

    debug!(
        entrypoint_coverage_pct,
        module_coverage_pct, pass_required, "coverage checked"
    );

    CoverageReport {
        total_entrypoints: targets.entrypoints.len(),
        covered_entrypoints,
        entrypoint_coverage_pct,
        total_modules: targets.modules.len(),
        covered_modules,
        module_coverage_pct,
        uncovered_entrypoints,
        uncovered_modules,
        pass_required,
        threshold_pct,
    }
}
