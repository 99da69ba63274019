//! # redteam-core
//!
//! An orchestration library for multi-stage adversarial security audits of
//! smart-contract repositories.
//!
//! ## Core Components
//!
//! - **Finding**: the canonical vulnerability representation with merge,
//!   consolidation, classification, and ground-truth matching engines
//! - **Bundle**: per-stage input directories with blindness and isolation
//!   validation
//! - **Pipeline**: the five-phase detection state machine over supervised
//!   model subprocesses
//! - **Gatekeeper**: a whitelisting JSON-RPC proxy with transaction
//!   recording for live-chain exploit verification
//! - **Benchmark**: registry replay with pooled scoring and bootstrap
//!   confidence intervals
//!
//! ## Example
//!
//! ```rust,ignore
//! use redteam_core::{DetectPipeline, PipelineConfig, RunContext};
//!
//! let ctx = RunContext::new("/path/to/repo", None, PipelineConfig::from_env())?;
//! let summary = DetectPipeline::new().run(&ctx).await?;
//! println!("{} findings, {} dual-confirmed", summary.total_findings, summary.dual_confirmed);
//! ```

pub mod analyzers;
pub mod benchmark;
pub mod bundle;
pub mod coverage;
pub mod error;
pub mod finding;
pub mod gatekeeper;
pub mod hints;
pub mod judge;
pub mod pipeline;
pub mod process;
pub mod replay;

// Re-exports for convenience
pub use analyzers::{parse_analyzer_output, parse_semgrep, parse_slither};
pub use benchmark::{
    bootstrap_ci, compare, load_registry, BenchmarkEntry, BenchmarkMode, BenchmarkResult,
    BenchmarkRunConfig, BenchmarkRunner, BenchmarkStatus, BootstrapCi, Comparison, DetectResult,
    ExploitScores, MultiRunSummary, PatchScores, RegistrySummary, Significance,
};
pub use bundle::{
    BundleGenerator, BundleInputs, BundleManifest, BundleStage, Invariant, InvariantCategory,
    ModelParty, RegexSymbolExtractor, SymbolExtractor,
};
pub use coverage::{check_coverage, scan_repository, CoverageHints, CoverageReport};
pub use error::{Error, Result};
pub use finding::{
    classify_mechanism, consolidate_findings, match_findings, match_findings_heuristic,
    merge_findings, ConsolidatedFinding, DetectionScores, Finding, FindingCollection,
    GroundTruthFinding, MatchOutcome, MatchResult, MatchTier, Mechanism, MergeConfidence,
    MergedFinding, MergedSet, SchemaSeverity, SemanticJudge, SemanticVerdict, Severity, Source,
};
pub use gatekeeper::{
    method_allowed, Gatekeeper, GatekeeperConfig, RecordedTransaction, TransactionRecorder,
};
pub use hints::{generate_hints, Hint, HintLevel, HintSet};
pub use judge::{
    contains_injection_attempt, extract_judgments, CliJudge, FindingJudgment, JudgeConfig,
    JudgeVerdict,
};
pub use pipeline::{
    generate_run_id, ArtifactKind, DetectPipeline, PipelineConfig, PipelineSummary, RunContext,
    StageArtifactStore,
};
pub use process::{
    parse_status_envelope, parse_token_usage, ExecutionRecord, ExternalTool,
    SubprocessSupervisor, TokenUsage, ToolOutput,
};
pub use replay::{
    grade_balances, BalanceGrader, BalanceSnapshot, ExploitVerdict, LiveGrade, ReplayConfig,
    ReplayResult, TransactionReplayer,
};
