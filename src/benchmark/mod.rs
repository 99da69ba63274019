//! Benchmark harness: registry, runner, aggregation, bootstrap CIs.

pub mod bootstrap;
pub mod registry;
pub mod runner;
pub mod scoring;

pub use bootstrap::{
    bootstrap_ci, bootstrap_ci_with_rng, compare, compare_with_rng, seeded_rng, BootstrapCi,
    Comparison, Significance, DEFAULT_CONFIDENCE, DEFAULT_RESAMPLES,
};
pub use registry::{load_registry, BenchmarkEntry};
pub use runner::{
    BenchmarkMode, BenchmarkResult, BenchmarkRunConfig, BenchmarkRunner, RegistrySummary,
    RunRecord,
};
pub use scoring::{
    aggregate_detection, aggregate_exploit, aggregate_patch, is_placeholder_test,
    summarize_runs, BenchmarkStatus, DetectResult, ExploitScores, MultiRunSummary,
    PatchAggregate, PatchScores,
};
