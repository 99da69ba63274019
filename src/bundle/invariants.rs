//! Invariant extraction from a narrative threat-model file.
//!
//! Five category prefixes are recognized, each numbered. Extraction picks
//! up `{prefix}-{n}: {expression}` occurrences both in prose and inside
//! fenced code blocks. The rendered output contains only the numbered
//! expressions and their categories, never the surrounding prose: the
//! result is safe to hand to a blind reviewer.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Invariant category, keyed by prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvariantCategory {
    /// IC: core accounting
    Core,
    /// IS: state consistency
    State,
    /// IA: access restrictions
    Access,
    /// IT: token conservation
    Token,
    /// IB: balance bounds
    Balance,
}

impl InvariantCategory {
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "IC" => Some(Self::Core),
            "IS" => Some(Self::State),
            "IA" => Some(Self::Access),
            "IT" => Some(Self::Token),
            "IB" => Some(Self::Balance),
            _ => None,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Core => "IC",
            Self::State => "IS",
            Self::Access => "IA",
            Self::Token => "IT",
            Self::Balance => "IB",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Core => "core accounting",
            Self::State => "state consistency",
            Self::Access => "access restrictions",
            Self::Token => "token conservation",
            Self::Balance => "balance bounds",
        }
    }
}

/// One extracted numbered invariant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invariant {
    pub category: InvariantCategory,
    pub number: u32,
    pub expression: String,
}

impl Invariant {
    pub fn id(&self) -> String {
        format!("{}-{}", self.category.prefix(), self.number)
    }
}

/// Extract all numbered invariants from threat-model text.
///
/// Duplicate identifiers keep the first occurrence. Results are ordered by
/// appearance.
pub fn extract_invariants(content: &str) -> Vec<Invariant> {
    let re = Regex::new(r"\b(IC|IS|IA|IT|IB)-(\d+)\s*:\s*([^\n]+)").unwrap();
    let mut seen = std::collections::HashSet::new();
    let mut invariants = Vec::new();

    for caps in re.captures_iter(content) {
        let category = match InvariantCategory::from_prefix(&caps[1]) {
            Some(c) => c,
            None => continue,
        };
        let number: u32 = match caps[2].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let id = format!("{}-{}", caps[1].to_string(), number);
        if !seen.insert(id) {
            continue;
        }
        invariants.push(Invariant {
            category,
            number,
            expression: caps[3].trim().trim_end_matches('`').trim().to_string(),
        });
    }

    invariants
}

/// Render the invariants artifact: numbered expressions and categories
/// only.
pub fn render_invariants(invariants: &[Invariant]) -> String {
    let mut out = String::from("# Invariants\n");
    for category in [
        InvariantCategory::Core,
        InvariantCategory::State,
        InvariantCategory::Access,
        InvariantCategory::Token,
        InvariantCategory::Balance,
    ] {
        let in_category: Vec<&Invariant> = invariants
            .iter()
            .filter(|i| i.category == category)
            .collect();
        if in_category.is_empty() {
            continue;
        }
        out.push_str(&format!("\n## {} ({})\n", category.name(), category.prefix()));
        for inv in in_category {
            out.push_str(&format!("- {}: {}\n", inv.id(), inv.expression));
        }
    }
    out
}
