//! Core finding types: severities, mechanisms, sources, and the canonical
//! in-memory representation of candidate vulnerabilities.
//!
//! Findings are immutable once created. Merge and consolidation produce new
//! records; they never mutate originals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Severity of a finding.
///
/// Ordering: critical > high > medium > low > info > unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
    Unknown,
}

impl Severity {
    /// Numeric rank for promotion. Higher wins.
    fn rank(self) -> u8 {
        match self {
            Self::Critical => 5,
            Self::High => 4,
            Self::Medium => 3,
            Self::Low => 2,
            Self::Info => 1,
            Self::Unknown => 0,
        }
    }

    /// Promote to the maximum of two severities. Ties return the first
    /// operand.
    pub fn promote(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }

    /// Parse a severity from free text, tolerating schema forms ("MED") and
    /// mixed case. Unrecognized values map to `Unknown`.
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" | "med" => Self::Medium,
            "low" => Self::Low,
            "info" | "informational" => Self::Info,
            _ => Self::Unknown,
        }
    }

    /// The external schema severity for this severity.
    pub fn schema(self) -> SchemaSeverity {
        match self {
            Self::Critical | Self::High => SchemaSeverity::High,
            Self::Medium => SchemaSeverity::Med,
            Self::Low | Self::Info | Self::Unknown => SchemaSeverity::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Critical => write!(f, "CRITICAL"),
            Self::High => write!(f, "HIGH"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::Low => write!(f, "LOW"),
            Self::Info => write!(f, "INFO"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Externally-persisted severity enum: HIGH / MED / LOW.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchemaSeverity {
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "MED")]
    Med,
    #[serde(rename = "LOW")]
    Low,
}

impl SchemaSeverity {
    /// Normalize free text to a schema severity. Idempotent: feeding the
    /// output string back yields the same value.
    pub fn normalize(text: &str) -> Self {
        Severity::parse(text).schema()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Med => "MED",
            Self::Low => "LOW",
        }
    }
}

impl From<SchemaSeverity> for Severity {
    fn from(s: SchemaSeverity) -> Self {
        match s {
            SchemaSeverity::High => Severity::High,
            SchemaSeverity::Med => Severity::Medium,
            SchemaSeverity::Low => Severity::Low,
        }
    }
}

impl std::fmt::Display for SchemaSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification tag for the underlying security flaw family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mechanism {
    Reentrancy,
    AccessControl,
    Arithmetic,
    OracleManipulation,
    FlashLoan,
    FrontRunning,
    DosGriefing,
    StateCorruption,
    UpgradeSafety,
    TokenHandling,
    CrossContract,
    Economic,
    LogicError,
    Initialization,
    Other,
}

impl Mechanism {
    /// `Other` is the wildcard tag: it is compatible with every mechanism
    /// and is upgraded to the specific one when merged.
    pub fn compatible_with(self, other: Self) -> bool {
        self == other || self == Self::Other || other == Self::Other
    }

    /// The specific mechanism resulting from merging two compatible tags.
    pub fn merged_with(self, other: Self) -> Self {
        if self == Self::Other {
            other
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reentrancy => "reentrancy",
            Self::AccessControl => "access-control",
            Self::Arithmetic => "arithmetic",
            Self::OracleManipulation => "oracle-manipulation",
            Self::FlashLoan => "flash-loan",
            Self::FrontRunning => "front-running",
            Self::DosGriefing => "dos-griefing",
            Self::StateCorruption => "state-corruption",
            Self::UpgradeSafety => "upgrade-safety",
            Self::TokenHandling => "token-handling",
            Self::CrossContract => "cross-contract",
            Self::Economic => "economic",
            Self::LogicError => "logic-error",
            Self::Initialization => "initialization",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Mechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which producer emitted a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    #[serde(rename = "primary")]
    Primary,
    #[serde(rename = "secondary")]
    Secondary,
    #[serde(rename = "static-analysis")]
    StaticAnalysis,
    #[serde(rename = "ground-truth")]
    GroundTruth,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Secondary => write!(f, "secondary"),
            Self::StaticAnalysis => write!(f, "static-analysis"),
            Self::GroundTruth => write!(f, "ground-truth"),
        }
    }
}

/// Normalize a path for keying: forward slashes, lowercase.
pub fn normalize_path(file: &str) -> String {
    file.replace('\\', "/").to_lowercase()
}

/// Metadata attached to consolidated records describing what was merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchedMetadata {
    /// Identifiers of the original findings that were merged.
    pub original_identifiers: Vec<String>,
    /// Every source that contributed.
    pub sources: Vec<Source>,
    /// True when more than one source contributed.
    pub multi_source: bool,
}

/// A candidate vulnerability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Identifier, unique within its source.
    pub id: String,
    pub severity: Severity,
    pub title: String,
    /// Path within the audited repository. Empty only for system-wide
    /// findings.
    pub file: String,
    /// Line number; 0 means unknown.
    #[serde(default)]
    pub line: u32,
    pub mechanism: Mechanism,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploit_scenario: Option<String>,
    /// Regression-test requirement recorded by exploration stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_test: Option<String>,
    /// `Contract::function` reference when the producer names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected: Option<String>,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchedMetadata>,
}

impl Finding {
    /// Create a finding with the required fields; optional fields start
    /// empty.
    pub fn new(
        id: impl Into<String>,
        severity: Severity,
        title: impl Into<String>,
        file: impl Into<String>,
        line: u32,
        mechanism: Mechanism,
        source: Source,
    ) -> Self {
        Self {
            id: id.into(),
            severity,
            title: title.into(),
            file: file.into(),
            line,
            mechanism,
            description: String::new(),
            root_cause: None,
            exploit_scenario: None,
            regression_test: None,
            affected: None,
            source,
            matched: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_root_cause(mut self, root_cause: impl Into<String>) -> Self {
        self.root_cause = Some(root_cause.into());
        self
    }

    pub fn with_exploit_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.exploit_scenario = Some(scenario.into());
        self
    }

    /// Normalized file path for keying.
    pub fn normalized_file(&self) -> String {
        normalize_path(&self.file)
    }

    /// Location key: `file:line`, or just the file when the line is
    /// unknown.
    pub fn location_key(&self) -> String {
        if self.line > 0 {
            format!("{}:{}", self.normalized_file(), self.line)
        } else {
            self.normalized_file()
        }
    }

    /// Broad key: the normalized file alone.
    pub fn broad_key(&self) -> String {
        self.normalized_file()
    }

    /// Concatenated free text used by the mechanism classifier and the
    /// keyword matcher.
    pub fn classification_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&self.title);
        text.push(' ');
        text.push_str(&self.description);
        if let Some(ref rc) = self.root_cause {
            text.push(' ');
            text.push_str(rc);
        }
        if let Some(ref es) = self.exploit_scenario {
            text.push(' ');
            text.push_str(es);
        }
        text.to_lowercase()
    }
}

/// A consolidated red-team issue with an assigned RT-identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedFinding {
    /// Sequential zero-padded identifier: RT-001, RT-002, ...
    pub rt_id: String,
    /// Maximum severity across merged originals.
    pub severity: Severity,
    /// External schema severity.
    pub schema_severity: SchemaSeverity,
    pub title: String,
    pub file: String,
    #[serde(default)]
    pub line: u32,
    pub mechanism: Mechanism,
    /// First non-empty contributor's description.
    #[serde(default)]
    pub description: String,
    /// First non-empty contributor's regression-test requirement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regression_test: Option<String>,
    #[serde(flatten)]
    pub matched: MatchedMetadata,
}

impl ConsolidatedFinding {
    /// Format the sequential RT identifier.
    pub fn format_rt_id(index: usize) -> String {
        format!("RT-{:03}", index + 1)
    }
}

/// A curated reference vulnerability used to score detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundTruthFinding {
    /// Unique identifier within the benchmark.
    pub id: String,
    pub severity: Severity,
    #[serde(default)]
    pub title: String,
    /// Required: the file the vulnerability lives in.
    pub file: String,
    #[serde(default)]
    pub line: u32,
    /// Required mechanism tag.
    pub mechanism: Mechanism,
    #[serde(default)]
    pub description: String,
    /// Relative path to a grader script, resolved at grading time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploit_script: Option<PathBuf>,
    /// Post-patch verification test, resolved at grading time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unseen_test_file: Option<PathBuf>,
}

impl GroundTruthFinding {
    /// Convert to a plain finding (used when seeding exploit/patch modes).
    pub fn to_finding(&self) -> Finding {
        Finding::new(
            self.id.clone(),
            self.severity,
            self.title.clone(),
            self.file.clone(),
            self.line,
            self.mechanism,
            Source::GroundTruth,
        )
        .with_description(self.description.clone())
    }
}

/// Which tier produced a ground-truth match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Broad,
    Semantic,
    None,
}

/// Outcome of matching one ground-truth finding against the detected set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Identifier of the ground-truth finding this result is for.
    pub ground_truth_id: String,
    pub matched: bool,
    pub match_tier: MatchTier,
    /// Identifier of the detected finding that was consumed, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_reasoning: Option<String>,
}

impl MatchResult {
    pub fn unmatched(ground_truth_id: impl Into<String>) -> Self {
        Self {
            ground_truth_id: ground_truth_id.into(),
            matched: false,
            match_tier: MatchTier::None,
            detected_identifier: None,
            judge_reasoning: None,
        }
    }
}

/// An ordered collection of findings with serialization helpers.
///
/// This is the canonical container handed between pipeline stages; the
/// merge, consolidation, and matching engines all operate over it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingCollection {
    pub findings: Vec<Finding>,
    /// When the collection was produced.
    #[serde(default = "Utc::now")]
    pub produced_at: DateTime<Utc>,
}

impl Default for FindingCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl FindingCollection {
    pub fn new(findings: Vec<Finding>) -> Self {
        Self {
            findings,
            produced_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn push(&mut self, finding: Finding) {
        self.findings.push(finding);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.findings.iter()
    }

    /// Findings at or above medium severity (hint-eligible set).
    pub fn actionable(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| {
            matches!(
                f.severity,
                Severity::Critical | Severity::High | Severity::Medium
            )
        })
    }

    /// Parse a collection from JSON. Accepts either the wrapped form or a
    /// bare array of findings (the form legacy producers emit).
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        if let Ok(collection) = serde_json::from_str::<FindingCollection>(json) {
            return Ok(collection);
        }
        let findings: Vec<Finding> = serde_json::from_str(json).map_err(|e| {
            crate::error::Error::Validation(format!("findings payload is not valid JSON: {e}"))
        })?;
        Ok(Self::new(findings))
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl FromIterator<Finding> for FindingCollection {
    fn from_iter<T: IntoIterator<Item = Finding>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
