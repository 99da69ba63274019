//! Shallow public-API extraction from Solidity sources.
//!
//! Regex-level, lossy but deterministic. Internal and private functions are
//! omitted. The extractor sits behind a trait so a real parser can replace
//! it without touching callers.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Kind of a top-level Solidity declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeclarationKind {
    Contract,
    Interface,
    Library,
    AbstractContract,
}

impl DeclarationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Contract => "contract",
            Self::Interface => "interface",
            Self::Library => "library",
            Self::AbstractContract => "abstract contract",
        }
    }
}

/// A top-level declaration with its source line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub line: u32,
}

/// Extracted public surface of one Solidity file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSymbols {
    pub file: String,
    pub declarations: Vec<Declaration>,
    /// External and public function signatures, `name(params)` form.
    pub functions: Vec<String>,
    pub events: Vec<String>,
    pub errors: Vec<String>,
    /// Struct and enum definitions by name.
    pub types: Vec<String>,
}

/// Extracts public symbols from Solidity source text.
pub trait SymbolExtractor: Send + Sync {
    fn extract(&self, file: &str, source: &str) -> FileSymbols;
}

/// The default regex-level extractor.
#[derive(Debug, Default)]
pub struct RegexSymbolExtractor;

impl RegexSymbolExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl SymbolExtractor for RegexSymbolExtractor {
    fn extract(&self, file: &str, source: &str) -> FileSymbols {
        let decl_re =
            Regex::new(r"^\s*(abstract\s+contract|contract|interface|library)\s+([A-Za-z_]\w*)")
                .unwrap();
        let func_re =
            Regex::new(r"function\s+([A-Za-z_]\w*)\s*\(([^)]*)\)\s*([^;{]*)").unwrap();
        let event_re = Regex::new(r"\bevent\s+([A-Za-z_]\w*)\s*\(([^)]*)\)").unwrap();
        let error_re = Regex::new(r"\berror\s+([A-Za-z_]\w*)\s*\(([^)]*)\)").unwrap();
        let type_re = Regex::new(r"^\s*(struct|enum)\s+([A-Za-z_]\w*)").unwrap();
        let visibility_re = Regex::new(r"\b(external|public)\b").unwrap();

        let mut symbols = FileSymbols {
            file: file.to_string(),
            ..Default::default()
        };

        for (i, line) in source.lines().enumerate() {
            if let Some(caps) = decl_re.captures(line) {
                let kind = match caps.get(1).unwrap().as_str() {
                    "interface" => DeclarationKind::Interface,
                    "library" => DeclarationKind::Library,
                    "contract" => DeclarationKind::Contract,
                    _ => DeclarationKind::AbstractContract,
                };
                symbols.declarations.push(Declaration {
                    kind,
                    name: caps.get(2).unwrap().as_str().to_string(),
                    line: (i + 1) as u32,
                });
            }
            if let Some(caps) = type_re.captures(line) {
                symbols
                    .types
                    .push(caps.get(2).unwrap().as_str().to_string());
            }
        }

        for caps in func_re.captures_iter(source) {
            let tail = caps.get(3).map(|m| m.as_str()).unwrap_or("");
            if visibility_re.is_match(tail) {
                symbols.functions.push(format!(
                    "{}({})",
                    &caps[1],
                    normalize_params(&caps[2])
                ));
            }
        }
        for caps in event_re.captures_iter(source) {
            symbols
                .events
                .push(format!("{}({})", &caps[1], normalize_params(&caps[2])));
        }
        for caps in error_re.captures_iter(source) {
            symbols
                .errors
                .push(format!("{}({})", &caps[1], normalize_params(&caps[2])));
        }

        symbols
    }
}

fn normalize_params(params: &str) -> String {
    params
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render extracted symbols for a set of files as the bundle's
/// `public-api.md` content.
pub fn render_public_api(files: &[FileSymbols]) -> String {
    let mut out = String::from("# Public API\n");
    for symbols in files {
        if symbols.declarations.is_empty()
            && symbols.functions.is_empty()
            && symbols.events.is_empty()
        {
            continue;
        }
        out.push_str(&format!("\n## {}\n", symbols.file));
        for decl in &symbols.declarations {
            out.push_str(&format!("- {} {}\n", decl.kind.as_str(), decl.name));
        }
        if !symbols.functions.is_empty() {
            out.push_str("\nFunctions:\n");
            for f in &symbols.functions {
                out.push_str(&format!("- {f}\n"));
            }
        }
        if !symbols.events.is_empty() {
            out.push_str("\nEvents:\n");
            for e in &symbols.events {
                out.push_str(&format!("- {e}\n"));
            }
        }
        if !symbols.errors.is_empty() {
            out.push_str("\nErrors:\n");
            for e in &symbols.errors {
                out.push_str(&format!("- {e}\n"));
            }
        }
        if !symbols.types.is_empty() {
            out.push_str("\nTypes:\n");
            for t in &symbols.types {
                out.push_str(&format!("- {t}\n"));
            }
        }
    }
    out
}
