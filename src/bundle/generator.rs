//! Bundle assembly.
//!
//! Builds the per-stage input directory a reasoning model runs inside:
//! source and tests from the audited repository, generated summaries
//! (invariants, public API, static-analysis digest), and stage-specific
//! extras. Every bundle is validated against its stage's isolation
//! predicates before it is published; a violating bundle is left on disk
//! with `violated=true` in its manifest and the stage is aborted.

use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

use super::invariants::{extract_invariants, render_invariants};
use super::manifest::{BundleManifest, BundleStage};
use super::symbols::{render_public_api, FileSymbols, RegexSymbolExtractor, SymbolExtractor};
use super::validator::{validate_stage, walk_bundle};
use crate::error::{Error, Result};
use crate::finding::{Finding, Source};

/// Candidate locations of the repository's threat-model narrative.
const THREAT_MODEL_CANDIDATES: &[&str] = &[
    "docs/threat-model.md",
    "docs/threat_model.md",
    "threat-model.md",
    "audit/threat-model.md",
];

/// Inputs for one bundle build.
#[derive(Debug, Default)]
pub struct BundleInputs {
    /// Static-analysis findings to summarize for the model.
    pub static_findings: Vec<Finding>,
    /// Rendered hint artifact for hinted re-detect passes.
    pub hints_json: Option<String>,
    /// Named model outputs, visible only to dispute/final stages.
    pub model_outputs: Vec<(String, String)>,
    /// Named reviews, visible only to the final gate.
    pub reviews: Vec<(String, String)>,
}

/// Assembles and validates per-stage bundles.
pub struct BundleGenerator {
    repo_root: PathBuf,
    extractor: Box<dyn SymbolExtractor>,
}

impl BundleGenerator {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            extractor: Box::new(RegexSymbolExtractor::new()),
        }
    }

    pub fn with_extractor(mut self, extractor: Box<dyn SymbolExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Build the bundle for a stage at `out_dir`.
    ///
    /// On success the manifest (also written to disk) is returned. On an
    /// isolation violation the manifest is written with `violated=true`
    /// and a [`Error::BundleViolation`] is returned; the directory is kept
    /// for forensics.
    #[instrument(skip(self, inputs), fields(stage = %stage))]
    pub fn generate(
        &self,
        out_dir: &Path,
        stage: BundleStage,
        inputs: &BundleInputs,
    ) -> Result<BundleManifest> {
        if !self.repo_root.exists() {
            return Err(Error::precondition(format!(
                "repository root {} does not exist",
                self.repo_root.display()
            )));
        }
        std::fs::create_dir_all(out_dir)?;

        let copied = self.copy_sources(out_dir)?;
        self.write_invariants(out_dir)?;
        self.write_public_api(out_dir, &copied)?;
        self.write_static_summary(out_dir, &inputs.static_findings)?;

        if let Some(ref hints) = inputs.hints_json {
            std::fs::write(out_dir.join("hints.json"), hints)?;
        }

        if matches!(
            stage,
            BundleStage::DisputeResolution | BundleStage::FinalGate
        ) {
            let outputs_dir = out_dir.join("outputs");
            std::fs::create_dir_all(&outputs_dir)?;
            for (name, content) in &inputs.model_outputs {
                std::fs::write(outputs_dir.join(name), content)?;
            }
        }
        if stage == BundleStage::FinalGate {
            let reviews_dir = out_dir.join("reviews");
            std::fs::create_dir_all(&reviews_dir)?;
            for (name, content) in &inputs.reviews {
                std::fs::write(reviews_dir.join(name), content)?;
            }
        }

        let files: Vec<String> = walk_bundle(out_dir)
            .iter()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .collect();

        let violations = validate_stage(out_dir, stage);
        let mut manifest = BundleManifest::new(stage, files);
        if violations.is_empty() {
            manifest.write(out_dir)?;
            info!(files = manifest.files.len(), "bundle published");
            Ok(manifest)
        } else {
            manifest.violated = true;
            manifest.violations = violations.clone();
            manifest.write(out_dir)?;
            warn!(?violations, "bundle rejected");
            Err(Error::bundle_violation(stage.as_str(), violations))
        }
    }

    /// Copy Solidity sources and tests into the bundle, returning extracted
    /// symbols for the API summary.
    fn copy_sources(&self, out_dir: &Path) -> Result<Vec<FileSymbols>> {
        let mut symbols = Vec::new();
        for (root, dest) in [("src", "src"), ("test", "test"), ("tests", "test")] {
            let src_root = self.repo_root.join(root);
            if !src_root.exists() {
                continue;
            }
            for rel in walk_dir(&src_root) {
                if rel.extension().and_then(|e| e.to_str()) != Some("sol") {
                    continue;
                }
                let content = std::fs::read_to_string(src_root.join(&rel))?;
                let target = out_dir.join(dest).join(&rel);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&target, &content)?;
                if root == "src" {
                    let rel_name = format!("src/{}", rel.to_string_lossy().replace('\\', "/"));
                    symbols.push(self.extractor.extract(&rel_name, &content));
                }
            }
        }
        Ok(symbols)
    }

    fn write_invariants(&self, out_dir: &Path) -> Result<()> {
        let mut invariants = Vec::new();
        for candidate in THREAT_MODEL_CANDIDATES {
            let path = self.repo_root.join(candidate);
            if let Ok(content) = std::fs::read_to_string(&path) {
                invariants = extract_invariants(&content);
                break;
            }
        }
        std::fs::write(out_dir.join("invariants.md"), render_invariants(&invariants))?;
        Ok(())
    }

    fn write_public_api(&self, out_dir: &Path, symbols: &[FileSymbols]) -> Result<()> {
        std::fs::write(out_dir.join("public-api.md"), render_public_api(symbols))?;
        Ok(())
    }

    fn write_static_summary(&self, out_dir: &Path, findings: &[Finding]) -> Result<()> {
        let mut out = String::from("# Static Analysis Summary\n\n");
        let static_findings: Vec<&Finding> = findings
            .iter()
            .filter(|f| f.source == Source::StaticAnalysis)
            .collect();
        if static_findings.is_empty() {
            out.push_str("No static-analysis findings.\n");
        }
        for f in static_findings {
            out.push_str(&format!(
                "- [{}] {}:{} {} - {}\n",
                f.severity, f.file, f.line, f.title, f.description
            ));
        }
        std::fs::write(out_dir.join("static-analysis-summary.md"), out)?;
        Ok(())
    }
}

fn walk_dir(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(rel) = path.strip_prefix(root) {
                files.push(rel.to_path_buf());
            }
        }
    }
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::{Mechanism, Severity};
    use std::fs;

    fn seed_repo(dir: &Path) {
        fs::create_dir_all(dir.join("src")).unwrap();
        fs::create_dir_all(dir.join("test")).unwrap();
        fs::create_dir_all(dir.join("docs")).unwrap();
        fs::write(
            dir.join("src/Vault.sol"),
            "contract Vault { function deposit() external {} }",
        )
        .unwrap();
        fs::write(
            dir.join("test/Vault.t.sol"),
            "contract VaultTest { function test_deposit() external {} }",
        )
        .unwrap();
        fs::write(
            dir.join("docs/threat-model.md"),
            "## Trust Assumptions\nOwner trusted.\n\nIC-1: totalAssets() >= totalSupply()\n",
        )
        .unwrap();
    }

    #[test]
    fn test_generate_detect_bundle() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());
        let out = tempfile::tempdir().unwrap();
        let bundle_dir = out.path().join("bundle-detect-secondary");

        let generator = BundleGenerator::new(repo.path());
        let manifest = generator
            .generate(&bundle_dir, BundleStage::DetectSecondary, &BundleInputs::default())
            .unwrap();

        assert!(!manifest.violated);
        assert!(bundle_dir.join("src/Vault.sol").exists());
        assert!(bundle_dir.join("test/Vault.t.sol").exists());

        // The invariants artifact carries only numbered expressions, not
        // the threat-model prose.
        let invariants = fs::read_to_string(bundle_dir.join("invariants.md")).unwrap();
        assert!(invariants.contains("IC-1"));
        assert!(!invariants.contains("Trust Assumptions"));

        let api = fs::read_to_string(bundle_dir.join("public-api.md")).unwrap();
        assert!(api.contains("contract Vault"));
    }

    #[test]
    fn test_violating_bundle_kept_with_manifest() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());
        let out = tempfile::tempdir().unwrap();
        let bundle_dir = out.path().join("bundle-detect-secondary");

        // A primary output smuggled into the inputs trips isolation.
        let inputs = BundleInputs {
            hints_json: Some("{\"hints\": [], \"note\": \"see [ECON-2]\"}".to_string()),
            ..Default::default()
        };

        let generator = BundleGenerator::new(repo.path());
        let err = generator
            .generate(&bundle_dir, BundleStage::DetectSecondary, &inputs)
            .unwrap_err();
        assert!(matches!(err, Error::BundleViolation { .. }));

        // Kept on disk for forensics.
        let manifest = BundleManifest::load(&bundle_dir).unwrap();
        assert!(manifest.violated);
        assert!(!manifest.violations.is_empty());
    }

    #[test]
    fn test_static_summary_written() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());
        let out = tempfile::tempdir().unwrap();
        let bundle_dir = out.path().join("bundle-detect-primary");

        let finding = Finding::new(
            "SLITHER-1",
            Severity::High,
            "reentrancy-eth",
            "src/Vault.sol",
            3,
            Mechanism::Reentrancy,
            Source::StaticAnalysis,
        )
        .with_description("Reentrancy in Vault.deposit()");
        let inputs = BundleInputs {
            static_findings: vec![finding],
            ..Default::default()
        };

        BundleGenerator::new(repo.path())
            .generate(&bundle_dir, BundleStage::DetectPrimary, &inputs)
            .unwrap();

        let summary =
            fs::read_to_string(bundle_dir.join("static-analysis-summary.md")).unwrap();
        assert!(summary.contains("reentrancy-eth"));
        assert!(summary.contains("src/Vault.sol:3"));
    }

    #[test]
    fn test_dispute_bundle_carries_both_outputs() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());
        let out = tempfile::tempdir().unwrap();
        let bundle_dir = out.path().join("bundle-stage4c");

        let inputs = BundleInputs {
            model_outputs: vec![
                ("findings-primary.json".to_string(), "[]".to_string()),
                ("findings-secondary.json".to_string(), "[]".to_string()),
            ],
            ..Default::default()
        };

        let manifest = BundleGenerator::new(repo.path())
            .generate(&bundle_dir, BundleStage::DisputeResolution, &inputs)
            .unwrap();
        assert!(!manifest.violated);
        assert!(bundle_dir.join("outputs/findings-primary.json").exists());
        assert!(bundle_dir.join("outputs/findings-secondary.json").exists());
    }

    #[test]
    fn test_missing_repo_root_is_precondition() {
        let out = tempfile::tempdir().unwrap();
        let err = BundleGenerator::new("/nonexistent/repo-xyz")
            .generate(
                &out.path().join("b"),
                BundleStage::DetectPrimary,
                &BundleInputs::default(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }
}
