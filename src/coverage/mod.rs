//! Coverage tracking: which public entrypoints and modules have findings.

pub mod extract;
pub mod tracker;

pub use extract::{extract_from_source, scan_repository, CoverageTargets, Entrypoint, ModuleDecl};
pub use tracker::{
    check_coverage, CoverageHints, CoverageReport, DEFAULT_COVERAGE_THRESHOLD,
};
