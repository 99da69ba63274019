//! Cross-party hint generation.
//!
//! A hint is the projection of one party's finding that is safe to share
//! with another party at a calibrated information level. Levels are
//! strictly layered: low carries location and severity only, medium adds
//! the mechanism classification, high adds title, description, and the
//! exploit scenario when present.
//!
//! Only findings at medium severity or above produce hints.

use serde::{Deserialize, Serialize};

use crate::finding::{classify_mechanism, Finding, Mechanism, Severity};

/// Information level for hint projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintLevel {
    Low,
    Medium,
    High,
}

/// One projected hint. Fields beyond the level are absent, not empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hint {
    pub hint_id: String,
    pub file: String,
    pub line: u32,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<Mechanism>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploit_scenario: Option<String>,
}

/// A hint artifact: the level plus the projected hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HintSet {
    pub level: HintLevel,
    pub hints: Vec<Hint>,
}

impl HintSet {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn hint_eligible(finding: &Finding) -> bool {
    matches!(
        finding.severity,
        Severity::Critical | Severity::High | Severity::Medium
    )
}

/// The mechanism a hint reports: the finding's own tag, or a keyword
/// classification when the producer left it unspecified.
fn hint_mechanism(finding: &Finding) -> Mechanism {
    if finding.mechanism != Mechanism::Other {
        finding.mechanism
    } else {
        classify_mechanism(&finding.classification_text())
    }
}

/// Project findings into hints at the requested level.
pub fn generate_hints(findings: &[Finding], level: HintLevel) -> HintSet {
    let hints = findings
        .iter()
        .filter(|f| hint_eligible(f))
        .enumerate()
        .map(|(i, f)| {
            let mut hint = Hint {
                hint_id: format!("HINT-{}", i + 1),
                file: f.file.clone(),
                line: f.line,
                severity: f.severity,
                mechanism: None,
                title: None,
                description: None,
                exploit_scenario: None,
            };
            if matches!(level, HintLevel::Medium | HintLevel::High) {
                hint.mechanism = Some(hint_mechanism(f));
            }
            if level == HintLevel::High {
                hint.title = Some(f.title.clone());
                hint.description = Some(f.description.clone());
                hint.exploit_scenario = f.exploit_scenario.clone();
            }
            hint
        })
        .collect();

    HintSet { level, hints }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finding::Source;
    use pretty_assertions::assert_eq;

    fn finding(id: &str, severity: Severity) -> Finding {
        Finding::new(
            id,
            severity,
            "Price oracle can be skewed",
            "src/Oracle.sol",
            31,
            Mechanism::OracleManipulation,
            Source::Primary,
        )
        .with_description("Spot price read in the same block")
        .with_exploit_scenario("Take a flash loan, swap, read price")
    }

    #[test]
    fn test_low_level_is_location_and_severity_only() {
        let set = generate_hints(&[finding("F1", Severity::High)], HintLevel::Low);
        assert_eq!(set.hints.len(), 1);
        let hint = &set.hints[0];
        assert_eq!(hint.hint_id, "HINT-1");
        assert_eq!(hint.file, "src/Oracle.sol");
        assert_eq!(hint.line, 31);
        assert!(hint.mechanism.is_none());
        assert!(hint.title.is_none());
        assert!(hint.description.is_none());
    }

    #[test]
    fn test_medium_adds_mechanism_only() {
        let set = generate_hints(&[finding("F1", Severity::High)], HintLevel::Medium);
        let hint = &set.hints[0];
        assert_eq!(hint.mechanism, Some(Mechanism::OracleManipulation));
        assert!(hint.title.is_none());
    }

    #[test]
    fn test_high_adds_text() {
        let set = generate_hints(&[finding("F1", Severity::Critical)], HintLevel::High);
        let hint = &set.hints[0];
        assert_eq!(hint.title.as_deref(), Some("Price oracle can be skewed"));
        assert_eq!(
            hint.exploit_scenario.as_deref(),
            Some("Take a flash loan, swap, read price")
        );
    }

    #[test]
    fn test_low_severity_findings_filtered() {
        let findings = vec![
            finding("F1", Severity::High),
            finding("F2", Severity::Low),
            finding("F3", Severity::Info),
            finding("F4", Severity::Medium),
        ];
        let set = generate_hints(&findings, HintLevel::Low);
        assert_eq!(set.hints.len(), 2);
        assert_eq!(set.hints[0].hint_id, "HINT-1");
        assert_eq!(set.hints[1].hint_id, "HINT-2");
    }

    #[test]
    fn test_unclassified_mechanism_derived_from_text() {
        let mut f = finding("F1", Severity::High);
        f.mechanism = Mechanism::Other;
        let set = generate_hints(&[f], HintLevel::Medium);
        // "flash loan" appears in the scenario but oracle keywords win by
        // precedence.
        assert_eq!(set.hints[0].mechanism, Some(Mechanism::OracleManipulation));
    }

    #[test]
    fn test_serialized_low_hint_omits_higher_fields() {
        let set = generate_hints(&[finding("F1", Severity::High)], HintLevel::Low);
        let json = set.to_json().unwrap();
        assert!(!json.contains("mechanism"));
        assert!(!json.contains("description"));
    }
}
