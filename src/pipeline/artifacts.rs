//! Stage artifact store.
//!
//! The one authority for "what did stage N produce". Stages query by
//! artifact kind, never by hand-built path, so cross-stage dependencies
//! stay one-directional.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::bundle::BundleStage;
use crate::error::Result;

/// Every artifact the pipeline persists, keyed by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Canonical copy of the primary model's findings.
    PrimaryFindings,
    /// Canonical copy of the secondary model's findings.
    SecondaryFindings,
    /// Static-analysis pre-seed findings.
    StaticFindings,
    MergedFindings,
    ConsolidatedFindings,
    CoverageHints,
    /// Cross-party hint artifact.
    Hints { source: String, target: String },
    DetectCoverage,
    PipelineSummary,
    JudgeVerdicts { source: String },
    GatekeeperAuditTrail,
    ExploitProof,
    PatchVerify,
    PatchClosure,
    ExploitLiveGrade,
    ExploitForgeGrade,
    ExecutionLog,
    Bundle(BundleStage),
}

impl ArtifactKind {
    /// Relative path under the run root.
    pub fn rel_path(&self) -> PathBuf {
        match self {
            Self::PrimaryFindings => "findings-primary.json".into(),
            Self::SecondaryFindings => "findings-secondary.json".into(),
            Self::StaticFindings => "findings-static.json".into(),
            Self::MergedFindings => "merged-findings.json".into(),
            Self::ConsolidatedFindings => "consolidated-findings.json".into(),
            Self::CoverageHints => "coverage-hints.json".into(),
            Self::Hints { source, target } => {
                format!("hints-{source}-to-{target}.json").into()
            }
            Self::DetectCoverage => "detect-coverage.json".into(),
            Self::PipelineSummary => "detect-pipeline-summary.json".into(),
            Self::JudgeVerdicts { source } => format!("judge-verdicts-{source}.json").into(),
            Self::GatekeeperAuditTrail => "gatekeeper-audit-trail.jsonl".into(),
            Self::ExploitProof => "codex-exploit-proof.json".into(),
            Self::PatchVerify => "codex-patch-verify.json".into(),
            Self::PatchClosure => "patch-closure.json".into(),
            Self::ExploitLiveGrade => "exploit-live-grade.json".into(),
            Self::ExploitForgeGrade => "exploit-forge-grade.json".into(),
            Self::ExecutionLog => "execution-log.json".into(),
            Self::Bundle(stage) => stage.dir_name().into(),
        }
    }
}

/// Fallback artifact written when an external invocation fails, so
/// downstream stages can see the failure instead of an absent file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackArtifact {
    pub failed: bool,
    pub stage: String,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl FallbackArtifact {
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            failed: true,
            stage: stage.into(),
            reason: reason.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Filesystem-backed artifact store rooted at `.task/<runId>/`.
#[derive(Debug, Clone)]
pub struct StageArtifactStore {
    root: PathBuf,
}

impl StageArtifactStore {
    /// Open (and create) the store for a run.
    pub fn open(repo_root: &Path, run_id: &str) -> Result<Self> {
        let root = repo_root.join(".task").join(run_id);
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Open a store at an explicit root (tests, benchmark runner).
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, kind: &ArtifactKind) -> PathBuf {
        self.root.join(kind.rel_path())
    }

    pub fn exists(&self, kind: &ArtifactKind) -> bool {
        self.path(kind).exists()
    }

    pub fn write_json<T: Serialize>(&self, kind: &ArtifactKind, value: &T) -> Result<()> {
        let path = self.path(kind);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(value)?)?;
        Ok(())
    }

    pub fn read_json<T: DeserializeOwned>(&self, kind: &ArtifactKind) -> Result<T> {
        let path = self.path(kind);
        let content = std::fs::read_to_string(&path).map_err(|_| {
            crate::error::Error::precondition(format!(
                "required artifact {} is absent",
                path.display()
            ))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Append one JSON object as a line (audit-trail style artifacts).
    pub fn append_jsonl<T: Serialize>(&self, kind: &ArtifactKind, value: &T) -> Result<()> {
        let path = self.path(kind);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", serde_json::to_string(value)?)?;
        Ok(())
    }

    /// Write the fallback artifact for a failed stage at the stage's
    /// canonical output location.
    pub fn write_fallback(
        &self,
        kind: &ArtifactKind,
        stage: &str,
        reason: impl Into<String>,
    ) -> Result<()> {
        self.write_json(kind, &FallbackArtifact::new(stage, reason))
    }

    /// True when the artifact exists and records a failure.
    pub fn is_fallback(&self, kind: &ArtifactKind) -> bool {
        self.read_json::<FallbackArtifact>(kind)
            .map(|f| f.failed)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_artifact_paths() {
        assert_eq!(
            ArtifactKind::MergedFindings.rel_path(),
            PathBuf::from("merged-findings.json")
        );
        assert_eq!(
            ArtifactKind::Hints {
                source: "primary".into(),
                target: "secondary".into()
            }
            .rel_path(),
            PathBuf::from("hints-primary-to-secondary.json")
        );
        assert_eq!(
            ArtifactKind::JudgeVerdicts {
                source: "secondary".into()
            }
            .rel_path(),
            PathBuf::from("judge-verdicts-secondary.json")
        );
        assert_eq!(
            ArtifactKind::Bundle(BundleStage::DeepExploitSecondary).rel_path(),
            PathBuf::from("bundle-stage4b")
        );
    }

    #[test]
    fn test_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StageArtifactStore::open(dir.path(), "detect-1712").unwrap();
        assert!(store.root().ends_with(".task/detect-1712"));

        store
            .write_json(&ArtifactKind::DetectCoverage, &serde_json::json!({"pct": 75}))
            .unwrap();
        let value: serde_json::Value = store.read_json(&ArtifactKind::DetectCoverage).unwrap();
        assert_eq!(value["pct"], 75);
    }

    #[test]
    fn test_missing_artifact_is_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let store = StageArtifactStore::at(dir.path().join("run")).unwrap();
        let err = store
            .read_json::<serde_json::Value>(&ArtifactKind::MergedFindings)
            .unwrap_err();
        assert!(matches!(err, crate::error::Error::Precondition(_)));
    }

    #[test]
    fn test_jsonl_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let store = StageArtifactStore::at(dir.path().join("run")).unwrap();
        store
            .append_jsonl(&ArtifactKind::GatekeeperAuditTrail, &serde_json::json!({"n": 1}))
            .unwrap();
        store
            .append_jsonl(&ArtifactKind::GatekeeperAuditTrail, &serde_json::json!({"n": 2}))
            .unwrap();
        let content =
            std::fs::read_to_string(store.path(&ArtifactKind::GatekeeperAuditTrail)).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_fallback_detection() {
        let dir = tempfile::tempdir().unwrap();
        let store = StageArtifactStore::at(dir.path().join("run")).unwrap();
        store
            .write_fallback(
                &ArtifactKind::SecondaryFindings,
                "detect-secondary",
                "model CLI timed out",
            )
            .unwrap();
        assert!(store.is_fallback(&ArtifactKind::SecondaryFindings));
        assert!(!store.is_fallback(&ArtifactKind::PrimaryFindings));
    }
}
