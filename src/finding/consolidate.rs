//! Finding consolidation across exploration stages.
//!
//! Takes the raw findings from the detection and exploration stages
//! (exploit-hunt, attack-plan, deep-exploit, dispute-resolution) and
//! produces a single canonical list of HIGH/MEDIUM issues with sequential
//! RT-identifiers.
//!
//! Dedup is two-pass: exact location keys first, then a broad pass over
//! same-file findings with compatible mechanisms. Two findings in the same
//! file at distinct positive lines are distinct bugs and are never merged
//! by the broad pass.

use tracing::debug;

use super::types::{
    ConsolidatedFinding, Finding, MatchedMetadata, Mechanism, Severity,
};

/// Working group of findings being merged into one consolidated record.
struct Group {
    contributors: Vec<Finding>,
}

impl Group {
    fn new(finding: Finding) -> Self {
        Self {
            contributors: vec![finding],
        }
    }

    fn representative(&self) -> &Finding {
        &self.contributors[0]
    }

    /// The group's file key (normalized).
    fn file_key(&self) -> String {
        self.representative().broad_key()
    }

    /// The group's best-known line: first positive contributor line.
    fn line(&self) -> u32 {
        self.contributors
            .iter()
            .map(|f| f.line)
            .find(|&l| l > 0)
            .unwrap_or(0)
    }

    /// The group's mechanism, with wildcards upgraded by merges.
    fn mechanism(&self) -> Mechanism {
        self.contributors
            .iter()
            .fold(Mechanism::Other, |acc, f| acc.merged_with(f.mechanism))
    }

    fn absorb(&mut self, other: Group) {
        self.contributors.extend(other.contributors);
    }

    fn into_consolidated(self, index: usize) -> ConsolidatedFinding {
        let severity = self
            .contributors
            .iter()
            .fold(Severity::Unknown, |acc, f| acc.promote(f.severity));
        let description = self
            .contributors
            .iter()
            .map(|f| f.description.as_str())
            .find(|d| !d.is_empty())
            .unwrap_or("")
            .to_string();
        let regression_test = self
            .contributors
            .iter()
            .filter_map(|f| f.regression_test.clone())
            .find(|t| !t.is_empty());

        let mut sources = Vec::new();
        for f in &self.contributors {
            if !sources.contains(&f.source) {
                sources.push(f.source);
            }
        }
        let multi_source = sources.len() > 1;
        let original_identifiers = self.contributors.iter().map(|f| f.id.clone()).collect();

        let line = self.line();
        let mechanism = self.mechanism();
        let rep = &self.contributors[0];

        ConsolidatedFinding {
            rt_id: ConsolidatedFinding::format_rt_id(index),
            severity,
            schema_severity: severity.schema(),
            title: rep.title.clone(),
            file: rep.file.clone(),
            line,
            mechanism,
            description,
            regression_test,
            matched: MatchedMetadata {
                original_identifiers,
                sources,
                multi_source,
            },
        }
    }
}

/// Consolidate findings into the canonical RT issue list.
///
/// Only findings at medium severity or above contribute; lower-severity
/// records are dropped before dedup. The returned list is stable: feeding
/// it back through [`consolidated_to_findings`] and re-consolidating yields
/// the same RT-identifiers.
pub fn consolidate_findings(inputs: &[Finding]) -> Vec<ConsolidatedFinding> {
    let eligible: Vec<Finding> = inputs
        .iter()
        .filter(|f| {
            matches!(
                f.severity,
                Severity::Critical | Severity::High | Severity::Medium
            )
        })
        .cloned()
        .collect();

    // Pass 1: exact location keys.
    let mut groups: Vec<Group> = Vec::new();
    for finding in eligible {
        let key = finding.location_key();
        if let Some(group) = groups
            .iter_mut()
            .find(|g| g.representative().location_key() == key)
        {
            group.contributors.push(finding);
        } else {
            groups.push(Group::new(finding));
        }
    }

    // Pass 2: broad merge within a file. Distinct positive lines stay
    // distinct bugs.
    let mut merged: Vec<Group> = Vec::new();
    for group in groups {
        let target = merged.iter_mut().find(|existing| {
            if existing.file_key() != group.file_key() {
                return false;
            }
            if !existing.mechanism().compatible_with(group.mechanism()) {
                return false;
            }
            let (a, b) = (existing.line(), group.line());
            !(a > 0 && b > 0 && a != b)
        });
        match target {
            Some(existing) => existing.absorb(group),
            None => merged.push(group),
        }
    }

    let consolidated: Vec<ConsolidatedFinding> = merged
        .into_iter()
        .enumerate()
        .map(|(i, g)| g.into_consolidated(i))
        .collect();

    debug!(
        inputs = inputs.len(),
        consolidated = consolidated.len(),
        "consolidated findings"
    );
    consolidated
}

/// View consolidated records as plain findings, e.g. for hint generation or
/// re-consolidation.
pub fn consolidated_to_findings(consolidated: &[ConsolidatedFinding]) -> Vec<Finding> {
    consolidated
        .iter()
        .map(|c| {
            let mut f = Finding::new(
                c.rt_id.clone(),
                c.severity,
                c.title.clone(),
                c.file.clone(),
                c.line,
                c.mechanism,
                *c.matched
                    .sources
                    .first()
                    .unwrap_or(&super::types::Source::Primary),
            )
            .with_description(c.description.clone());
            f.regression_test = c.regression_test.clone();
            f.matched = Some(c.matched.clone());
            f
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::types::Source;
    use pretty_assertions::assert_eq;

    fn finding(
        id: &str,
        file: &str,
        line: u32,
        severity: Severity,
        mechanism: Mechanism,
    ) -> Finding {
        Finding::new(id, severity, "issue", file, line, mechanism, Source::Secondary)
    }

    #[test]
    fn test_exact_pass_merges_same_location() {
        let inputs = vec![
            finding("A", "src/Vault.sol", 10, Severity::Medium, Mechanism::Reentrancy),
            finding("B", "src/vault.sol", 10, Severity::High, Mechanism::Reentrancy),
        ];
        let out = consolidate_findings(&inputs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rt_id, "RT-001");
        assert_eq!(out[0].severity, Severity::High);
        assert_eq!(
            out[0].matched.original_identifiers,
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn test_distinct_positive_lines_stay_distinct() {
        let inputs = vec![
            finding("A", "src/Vault.sol", 10, Severity::High, Mechanism::Reentrancy),
            finding("B", "src/Vault.sol", 200, Severity::High, Mechanism::Reentrancy),
        ];
        let out = consolidate_findings(&inputs);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].rt_id, "RT-001");
        assert_eq!(out[1].rt_id, "RT-002");
    }

    #[test]
    fn test_broad_pass_merges_unknown_line() {
        let inputs = vec![
            finding("A", "src/Vault.sol", 10, Severity::High, Mechanism::Reentrancy),
            finding("B", "src/Vault.sol", 0, Severity::Medium, Mechanism::Reentrancy),
        ];
        let out = consolidate_findings(&inputs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].line, 10);
    }

    #[test]
    fn test_wildcard_mechanism_upgraded() {
        let inputs = vec![
            finding("A", "src/Vault.sol", 0, Severity::Medium, Mechanism::Other),
            finding("B", "src/Vault.sol", 7, Severity::Medium, Mechanism::FlashLoan),
        ];
        let out = consolidate_findings(&inputs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].mechanism, Mechanism::FlashLoan);
    }

    #[test]
    fn test_incompatible_mechanisms_not_merged_broadly() {
        let inputs = vec![
            finding("A", "src/Vault.sol", 0, Severity::High, Mechanism::Reentrancy),
            finding("B", "src/Vault.sol", 0, Severity::High, Mechanism::FlashLoan),
        ];
        let out = consolidate_findings(&inputs);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_low_severity_dropped() {
        let inputs = vec![
            finding("A", "src/Vault.sol", 10, Severity::Low, Mechanism::Reentrancy),
            finding("B", "src/Vault.sol", 20, Severity::Info, Mechanism::Arithmetic),
            finding("C", "src/Vault.sol", 30, Severity::High, Mechanism::Arithmetic),
        ];
        let out = consolidate_findings(&inputs);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].matched.original_identifiers, vec!["C".to_string()]);
    }

    #[test]
    fn test_multi_source_flag() {
        let mut a = finding("A", "src/Vault.sol", 10, Severity::High, Mechanism::Reentrancy);
        a.source = Source::Primary;
        let b = finding("B", "src/Vault.sol", 10, Severity::High, Mechanism::Reentrancy);
        let out = consolidate_findings(&[a, b]);
        assert_eq!(out.len(), 1);
        assert!(out[0].matched.multi_source);
        assert_eq!(out[0].matched.sources, vec![Source::Primary, Source::Secondary]);
    }

    #[test]
    fn test_description_from_first_non_empty() {
        let a = finding("A", "src/Vault.sol", 10, Severity::High, Mechanism::Reentrancy);
        let b = finding("B", "src/Vault.sol", 10, Severity::High, Mechanism::Reentrancy)
            .with_description("drains the vault");
        let out = consolidate_findings(&[a, b]);
        assert_eq!(out[0].description, "drains the vault");
    }

    #[test]
    fn test_consolidation_stable_under_rerun() {
        let inputs = vec![
            finding("A", "src/Vault.sol", 10, Severity::High, Mechanism::Reentrancy),
            finding("B", "src/Pool.sol", 0, Severity::Medium, Mechanism::Other),
            finding("C", "src/Pool.sol", 33, Severity::Medium, Mechanism::Economic),
            finding("D", "src/Vault.sol", 99, Severity::Critical, Mechanism::Arithmetic),
        ];
        let first = consolidate_findings(&inputs);
        let again = consolidate_findings(&consolidated_to_findings(&first));

        let ids: Vec<_> = first.iter().map(|c| c.rt_id.clone()).collect();
        let ids_again: Vec<_> = again.iter().map(|c| c.rt_id.clone()).collect();
        assert_eq!(ids, ids_again);
        assert_eq!(first.len(), again.len());
    }

    #[test]
    fn test_schema_severity_on_output() {
        let inputs = vec![finding(
            "A",
            "src/Vault.sol",
            10,
            Severity::Critical,
            Mechanism::Reentrancy,
        )];
        let out = consolidate_findings(&inputs);
        assert_eq!(out[0].schema_severity, crate::finding::types::SchemaSeverity::High);
    }
}
