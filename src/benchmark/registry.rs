//! Benchmark registry.
//!
//! A registry is a JSON file listing reference repositories with curated
//! ground-truth vulnerabilities. Entries are validated at load time;
//! invalid entries are precondition failures, not silent skips.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::finding::GroundTruthFinding;

/// One reference repository with known vulnerabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    /// Unique identifier within the registry.
    pub id: String,
    /// Repository root; `~` is expanded.
    pub repo: PathBuf,
    #[serde(default)]
    pub ground_truth: Vec<GroundTruthFinding>,
    /// Optional free-form notes for operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    benchmarks: Vec<BenchmarkEntry>,
}

/// Load and validate a registry file.
pub fn load_registry(path: &Path) -> Result<Vec<BenchmarkEntry>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::precondition(format!("registry {} unreadable: {e}", path.display()))
    })?;
    let registry: RegistryFile = serde_json::from_str(&content)
        .map_err(|e| Error::precondition(format!("registry {} invalid: {e}", path.display())))?;

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(registry.benchmarks.len());
    for mut entry in registry.benchmarks {
        if entry.id.trim().is_empty() {
            return Err(Error::precondition("registry entry with empty id"));
        }
        if !seen.insert(entry.id.clone()) {
            return Err(Error::precondition(format!(
                "duplicate registry id {}",
                entry.id
            )));
        }
        let expanded = shellexpand::tilde(&entry.repo.to_string_lossy().to_string()).to_string();
        entry.repo = PathBuf::from(expanded);

        for gt in &entry.ground_truth {
            if gt.file.trim().is_empty() {
                return Err(Error::precondition(format!(
                    "ground truth {} in {} has no file",
                    gt.id, entry.id
                )));
            }
        }
        let mut gt_ids = HashSet::new();
        for gt in &entry.ground_truth {
            if !gt_ids.insert(gt.id.clone()) {
                return Err(Error::precondition(format!(
                    "duplicate ground truth id {} in {}",
                    gt.id, entry.id
                )));
            }
        }
        entries.push(entry);
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const REGISTRY: &str = r#"{
        "benchmarks": [
            {
                "id": "vault-drain",
                "repo": "/tmp/benchmarks/vault",
                "ground_truth": [
                    {"id": "GT-1", "severity": "HIGH", "file": "src/Vault.sol",
                     "line": 42, "mechanism": "reentrancy"}
                ]
            },
            {"id": "oracle-skew", "repo": "~/benchmarks/oracle"}
        ]
    }"#;

    fn write_registry(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.json");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_valid_registry() {
        let (_dir, path) = write_registry(REGISTRY);
        let entries = load_registry(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "vault-drain");
        assert_eq!(entries[0].ground_truth.len(), 1);
        // Tilde expanded.
        assert!(!entries[1].repo.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let (_dir, path) = write_registry(
            r#"{"benchmarks": [{"id": "a", "repo": "/x"}, {"id": "a", "repo": "/y"}]}"#,
        );
        let err = load_registry(&path).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn test_ground_truth_without_file_rejected() {
        let (_dir, path) = write_registry(
            r#"{"benchmarks": [{"id": "a", "repo": "/x", "ground_truth": [
                {"id": "GT-1", "severity": "HIGH", "file": " ", "line": 1, "mechanism": "reentrancy"}
            ]}]}"#,
        );
        assert!(load_registry(&path).is_err());
    }

    #[test]
    fn test_missing_registry_is_precondition() {
        let err = load_registry(Path::new("/nonexistent/registry.json")).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }
}
