//! Isolation predicates for bundles.
//!
//! Two properties are enforced before a bundle is published:
//!
//! - **Blindness** (`no-spec-prose`): narrative specification prose must
//!   not reach a reviewer expected to reason from code alone.
//! - **Isolation** (`no-cross-model-output`): one model's output must be
//!   physically absent from the other model's inputs.

use regex::Regex;
use std::path::{Path, PathBuf};

use super::manifest::{BundleStage, MANIFEST_FILE};

/// Which detection model a bundle is being prepared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelParty {
    Primary,
    Secondary,
}

impl ModelParty {
    pub fn opposite(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }

    /// Known output filenames this party writes.
    pub fn output_filenames(self) -> &'static [&'static str] {
        match self {
            Self::Primary => &[
                "findings-primary.json",
                "primary-findings.json",
                "exploit-hunt.md",
                "attack-plan.md",
            ],
            Self::Secondary => &[
                "findings-secondary.json",
                "secondary-findings.json",
                "deep-exploit.md",
            ],
        }
    }

    /// Bracketed identifier patterns this party stamps into its findings.
    pub fn identifier_patterns(self) -> Vec<Regex> {
        let patterns: &[&str] = match self {
            Self::Primary => &[r"\[ECON-\d+\]", r"\[DOS-\d+\]"],
            Self::Secondary => &[r"\[VULN-\d+\]", r"\[FIND-\d+\]"],
        };
        patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
    }
}

/// Filenames recognized as narrative spec documents.
const SPEC_FILENAME_MARKERS: &[&str] = &["threat-model", "threat_model", "test-plan", "test_plan"];
const SPEC_FILENAME_STEMS: &[&str] = &["design", "threatmodel", "testplan"];

/// Directories exempt from the spec-prose scan.
const PROSE_EXEMPT_ROOTS: &[&str] = &["src", "test", "tests", "reviews"];

fn spec_heading_regex() -> Regex {
    Regex::new(
        r"(?mi)^#{1,6}\s*(trust assumptions|attack surface|attacker classes|assets at risk|motivation)\b",
    )
    .unwrap()
}

/// Recursively list files in a bundle as relative paths.
pub fn walk_bundle(bundle_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![bundle_dir.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(rel) = path.strip_prefix(bundle_dir) {
                files.push(rel.to_path_buf());
            }
        }
    }
    files.sort();
    files
}

fn first_component(path: &Path) -> String {
    path.components()
        .next()
        .map(|c| c.as_os_str().to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// The `no-spec-prose` predicate. Returns a violation message per offense.
///
/// Files under `src/`, `test/`, `tests/` and `reviews/` are exempt; the
/// manifest itself is always exempt.
pub fn check_no_spec_prose(bundle_dir: &Path) -> Vec<String> {
    let heading_re = spec_heading_regex();
    let mut violations = Vec::new();

    for rel in walk_bundle(bundle_dir) {
        if rel.as_os_str() == MANIFEST_FILE {
            continue;
        }
        if PROSE_EXEMPT_ROOTS.contains(&first_component(&rel).as_str()) {
            continue;
        }

        let name = rel
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let stem = rel
            .file_stem()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if SPEC_FILENAME_MARKERS.iter().any(|m| name.contains(m))
            || SPEC_FILENAME_STEMS.contains(&stem.as_str())
        {
            violations.push(format!("spec prose filename: {}", rel.display()));
            continue;
        }

        if let Ok(content) = std::fs::read_to_string(bundle_dir.join(&rel)) {
            if let Some(m) = heading_re.find(&content) {
                violations.push(format!(
                    "spec prose section \"{}\" in {}",
                    m.as_str().trim_start_matches('#').trim(),
                    rel.display()
                ));
            }
        }
    }

    violations
}

/// The `no-cross-model-output` predicate against a forbidden party.
///
/// Filenames are checked everywhere in the tree. Content is checked
/// everywhere when `strict` (deep-exploit isolation), otherwise only
/// outside the source/test roots.
pub fn check_no_cross_model_output(
    bundle_dir: &Path,
    forbidden: ModelParty,
    strict: bool,
) -> Vec<String> {
    let id_patterns = forbidden.identifier_patterns();
    let mut violations = Vec::new();

    for rel in walk_bundle(bundle_dir) {
        if rel.as_os_str() == MANIFEST_FILE {
            continue;
        }
        let name = rel
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if forbidden
            .output_filenames()
            .iter()
            .any(|f| name == *f)
        {
            violations.push(format!("cross-model output file: {}", rel.display()));
            continue;
        }

        let scan_content =
            strict || !PROSE_EXEMPT_ROOTS.contains(&first_component(&rel).as_str());
        if !scan_content {
            continue;
        }
        if let Ok(content) = std::fs::read_to_string(bundle_dir.join(&rel)) {
            if let Some(pattern) = id_patterns.iter().find(|p| p.is_match(&content)) {
                violations.push(format!(
                    "cross-model identifier {} in {}",
                    pattern.as_str(),
                    rel.display()
                ));
            }
        }
    }

    violations
}

/// Run every predicate a stage requires. Empty means the bundle may be
/// published.
pub fn validate_stage(bundle_dir: &Path, stage: BundleStage) -> Vec<String> {
    let mut violations = Vec::new();
    match stage {
        BundleStage::DetectPrimary => {
            violations.extend(check_no_spec_prose(bundle_dir));
            violations.extend(check_no_cross_model_output(
                bundle_dir,
                ModelParty::Secondary,
                false,
            ));
        }
        BundleStage::DetectSecondary => {
            violations.extend(check_no_spec_prose(bundle_dir));
            violations.extend(check_no_cross_model_output(
                bundle_dir,
                ModelParty::Primary,
                false,
            ));
        }
        BundleStage::DeepExploitSecondary => {
            violations.extend(check_no_spec_prose(bundle_dir));
            violations.extend(check_no_cross_model_output(
                bundle_dir,
                ModelParty::Primary,
                true,
            ));
        }
        BundleStage::DisputeResolution => {
            // Both models' outputs are visible here; blindness still holds.
            violations.extend(check_no_spec_prose(bundle_dir));
        }
        BundleStage::FinalGate => {}
    }
    violations
}
