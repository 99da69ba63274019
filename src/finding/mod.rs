//! Finding model: types, classification, merge, consolidation, matching.

pub mod classify;
pub mod consolidate;
pub mod matcher;
pub mod merge;
mod proptest;
pub mod types;

pub use classify::{classify_mechanism, mechanism_keywords, text_mentions_mechanism};
pub use consolidate::{consolidate_findings, consolidated_to_findings};
pub use matcher::{
    match_findings, match_findings_heuristic, DetectionScores, MatchOutcome, ReportEntry,
    SemanticJudge, SemanticVerdict, EXACT_LINE_TOLERANCE,
};
pub use merge::{merge_findings, MergeConfidence, MergeMatchType, MergedFinding, MergedSet};
pub use types::{
    normalize_path, ConsolidatedFinding, Finding, FindingCollection, GroundTruthFinding,
    MatchResult, MatchTier, MatchedMetadata, Mechanism, SchemaSeverity, Severity, Source,
};
