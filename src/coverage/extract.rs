//! Entrypoint and module extraction from Solidity sources.
//!
//! Shallow regex-level, same discipline as the bundle symbol extractor:
//! lossy but deterministic.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;
use crate::finding::normalize_path;

/// One public entrypoint: `Contract.function`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrypoint {
    pub contract: String,
    pub function: String,
    pub file: String,
    pub line: u32,
}

impl Entrypoint {
    /// `Contract.function` display form.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.contract, self.function)
    }
}

/// A top-level declaration with its type tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDecl {
    pub name: String,
    /// contract | interface | library | abstract contract
    pub kind: String,
    pub file: String,
}

/// Everything coverage is measured against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageTargets {
    pub entrypoints: Vec<Entrypoint>,
    pub modules: Vec<ModuleDecl>,
}

/// Extract entrypoints and modules from one Solidity file.
pub fn extract_from_source(file: &str, source: &str) -> CoverageTargets {
    let decl_re =
        Regex::new(r"^\s*(abstract\s+contract|contract|interface|library)\s+([A-Za-z_]\w*)")
            .unwrap();
    let func_re = Regex::new(r"function\s+([A-Za-z_]\w*)\s*\([^)]*\)\s*([^;{]*)").unwrap();
    let visibility_re = Regex::new(r"\b(external|public)\b").unwrap();

    let mut targets = CoverageTargets::default();
    let mut current_contract = String::new();

    for (i, line) in source.lines().enumerate() {
        if let Some(caps) = decl_re.captures(line) {
            let kind = match caps.get(1).unwrap().as_str() {
                "interface" => "interface",
                "library" => "library",
                "contract" => "contract",
                _ => "abstract contract",
            };
            current_contract = caps.get(2).unwrap().as_str().to_string();
            targets.modules.push(ModuleDecl {
                name: current_contract.clone(),
                kind: kind.to_string(),
                file: file.to_string(),
            });
        }
        if let Some(caps) = func_re.captures(line) {
            let tail = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            if visibility_re.is_match(tail) && !current_contract.is_empty() {
                targets.entrypoints.push(Entrypoint {
                    contract: current_contract.clone(),
                    function: caps.get(1).unwrap().as_str().to_string(),
                    file: file.to_string(),
                    line: (i + 1) as u32,
                });
            }
        }
    }

    targets
}

/// Scan a repository's `src/` tree for coverage targets.
pub fn scan_repository(repo_root: &Path) -> Result<CoverageTargets> {
    let mut targets = CoverageTargets::default();
    let pattern = repo_root.join("src/**/*.sol");
    let pattern = pattern.to_string_lossy().to_string();

    let mut paths: Vec<_> = glob::glob(&pattern)
        .map_err(|e| crate::error::Error::Config(format!("bad glob pattern: {e}")))?
        .flatten()
        .collect();
    paths.sort();

    for path in paths {
        let content = std::fs::read_to_string(&path)?;
        let rel = path
            .strip_prefix(repo_root)
            .unwrap_or(&path)
            .to_string_lossy()
            .to_string();
        let extracted = extract_from_source(&normalize_path(&rel), &content);
        targets.entrypoints.extend(extracted.entrypoints);
        targets.modules.extend(extracted.modules);
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"
contract Vault {
    function deposit(uint256 amount) external {}
    function totalAssets() public view returns (uint256) { return 0; }
    function _internalOnly() internal {}
}

interface IVault {
    function deposit(uint256 amount) external;
}
"#;

    #[test]
    fn test_entrypoints_qualified_by_contract() {
        let targets = extract_from_source("src/vault.sol", SOURCE);
        let qualified: Vec<String> =
            targets.entrypoints.iter().map(|e| e.qualified()).collect();
        assert_eq!(
            qualified,
            vec!["Vault.deposit", "Vault.totalAssets", "IVault.deposit"]
        );
        assert_eq!(targets.entrypoints[0].line, 3);
    }

    #[test]
    fn test_modules_with_type_tags() {
        let targets = extract_from_source("src/vault.sol", SOURCE);
        assert_eq!(targets.modules.len(), 2);
        assert_eq!(targets.modules[0].name, "Vault");
        assert_eq!(targets.modules[0].kind, "contract");
        assert_eq!(targets.modules[1].kind, "interface");
    }

    #[test]
    fn test_internal_functions_skipped() {
        let targets = extract_from_source("src/vault.sol", SOURCE);
        assert!(targets
            .entrypoints
            .iter()
            .all(|e| e.function != "_internalOnly"));
    }

    #[test]
    fn test_scan_repository() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(repo.path().join("src/inner")).unwrap();
        std::fs::write(
            repo.path().join("src/A.sol"),
            "contract A { function f() external {} }",
        )
        .unwrap();
        std::fs::write(
            repo.path().join("src/inner/B.sol"),
            "library B { function g() public {} }",
        )
        .unwrap();

        let targets = scan_repository(repo.path()).unwrap();
        assert_eq!(targets.modules.len(), 2);
        assert_eq!(targets.entrypoints.len(), 2);
        assert_eq!(targets.entrypoints[0].file, "src/a.sol");
    }
}
