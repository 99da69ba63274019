//! Cross-model finding merge.
//!
//! Combines PRIMARY and SECONDARY findings from a single run into one
//! collection tagged with confidence. Findings that both models reported at
//! matching locations become dual-confirmed; the rest are kept as
//! single-source records, with unmatched secondary findings flagged for
//! scrutiny.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::types::{Finding, MatchedMetadata, Severity, Source};

/// Confidence tag assigned by the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeConfidence {
    #[serde(rename = "DUAL_CONFIRMED")]
    DualConfirmed,
    #[serde(rename = "SINGLE_PRIMARY")]
    SinglePrimary,
    #[serde(rename = "SINGLE_SECONDARY")]
    SingleSecondary,
}

/// How a dual-confirmed pair was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMatchType {
    ExactLocationMatch,
    BroadFileMatch,
}

/// One record in the merged output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedFinding {
    /// Sequential identifier by category: DUAL-n, SINGLE-PRIMARY-n,
    /// SINGLE-SECONDARY-n.
    pub id: String,
    pub confidence: MergeConfidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<MergeMatchType>,
    pub severity: Severity,
    pub title: String,
    pub file: String,
    #[serde(default)]
    pub line: u32,
    pub mechanism: super::types::Mechanism,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub needs_scrutiny: bool,
    #[serde(flatten)]
    pub matched: MatchedMetadata,
}

impl MergedFinding {
    /// View this merged record as a plain finding (for downstream engines
    /// that operate over finding shapes).
    pub fn to_finding(&self) -> Finding {
        let mut finding = Finding::new(
            self.id.clone(),
            self.severity,
            self.title.clone(),
            self.file.clone(),
            self.line,
            self.mechanism,
            *self.matched.sources.first().unwrap_or(&Source::Primary),
        )
        .with_description(self.description.clone());
        finding.matched = Some(self.matched.clone());
        finding
    }
}

/// Merged output plus summary counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergedSet {
    pub records: Vec<MergedFinding>,
    pub total: usize,
    pub dual_confirmed: usize,
    pub single_primary: usize,
    pub single_secondary: usize,
}

/// Merge primary and secondary findings into a single tagged collection.
///
/// Exact matches share a location key; broad matches share a file with
/// either a missing line or a compatible mechanism. Unmatched secondary
/// findings are flagged `needs_scrutiny`; remaining primary findings are
/// emitted last. Inputs are not mutated.
pub fn merge_findings(primary: &[Finding], secondary: &[Finding]) -> MergedSet {
    // Index primary findings by location and by file. Values are indices so
    // consumption can be tracked without cloning.
    let mut by_location: HashMap<String, Vec<usize>> = HashMap::new();
    let mut by_file: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, f) in primary.iter().enumerate() {
        by_location.entry(f.location_key()).or_default().push(i);
        by_file.entry(f.broad_key()).or_default().push(i);
    }

    let mut consumed = vec![false; primary.len()];
    let mut duals: Vec<MergedFinding> = Vec::new();
    let mut single_secondary: Vec<MergedFinding> = Vec::new();

    for sec in secondary {
        let exact = by_location
            .get(&sec.location_key())
            .and_then(|idxs| idxs.iter().find(|&&i| !consumed[i]).copied());

        if let Some(i) = exact {
            consumed[i] = true;
            duals.push(dual_record(
                &primary[i],
                sec,
                MergeMatchType::ExactLocationMatch,
            ));
            continue;
        }

        let broad = by_file.get(&sec.broad_key()).and_then(|idxs| {
            idxs.iter()
                .find(|&&i| {
                    if consumed[i] {
                        return false;
                    }
                    let pri = &primary[i];
                    pri.line == 0
                        || sec.line == 0
                        || pri.mechanism.compatible_with(sec.mechanism)
                })
                .copied()
        });

        if let Some(i) = broad {
            consumed[i] = true;
            duals.push(dual_record(&primary[i], sec, MergeMatchType::BroadFileMatch));
            continue;
        }

        let mut record = single_record(sec, MergeConfidence::SingleSecondary);
        record.needs_scrutiny = true;
        single_secondary.push(record);
    }

    let single_primary: Vec<MergedFinding> = primary
        .iter()
        .enumerate()
        .filter(|(i, _)| !consumed[*i])
        .map(|(_, f)| single_record(f, MergeConfidence::SinglePrimary))
        .collect();

    let mut records = Vec::with_capacity(duals.len() + single_secondary.len() + single_primary.len());
    for (n, mut r) in duals.into_iter().enumerate() {
        r.id = format!("DUAL-{}", n + 1);
        records.push(r);
    }
    for (n, mut r) in single_secondary.into_iter().enumerate() {
        r.id = format!("SINGLE-SECONDARY-{}", n + 1);
        records.push(r);
    }
    for (n, mut r) in single_primary.into_iter().enumerate() {
        r.id = format!("SINGLE-PRIMARY-{}", n + 1);
        records.push(r);
    }

    let set = MergedSet {
        total: records.len(),
        dual_confirmed: records
            .iter()
            .filter(|r| r.confidence == MergeConfidence::DualConfirmed)
            .count(),
        single_primary: records
            .iter()
            .filter(|r| r.confidence == MergeConfidence::SinglePrimary)
            .count(),
        single_secondary: records
            .iter()
            .filter(|r| r.confidence == MergeConfidence::SingleSecondary)
            .count(),
        records,
    };

    debug!(
        total = set.total,
        dual = set.dual_confirmed,
        "merged cross-model findings"
    );
    set
}

fn dual_record(pri: &Finding, sec: &Finding, match_type: MergeMatchType) -> MergedFinding {
    MergedFinding {
        id: String::new(),
        confidence: MergeConfidence::DualConfirmed,
        match_type: Some(match_type),
        severity: pri.severity.promote(sec.severity),
        title: pri.title.clone(),
        file: pri.file.clone(),
        line: if pri.line > 0 { pri.line } else { sec.line },
        mechanism: pri.mechanism.merged_with(sec.mechanism),
        description: if pri.description.is_empty() {
            sec.description.clone()
        } else {
            pri.description.clone()
        },
        needs_scrutiny: false,
        matched: MatchedMetadata {
            original_identifiers: vec![pri.id.clone(), sec.id.clone()],
            sources: vec![Source::Primary, Source::Secondary],
            multi_source: true,
        },
    }
}

fn single_record(f: &Finding, confidence: MergeConfidence) -> MergedFinding {
    MergedFinding {
        id: String::new(),
        confidence,
        match_type: None,
        severity: f.severity,
        title: f.title.clone(),
        file: f.file.clone(),
        line: f.line,
        mechanism: f.mechanism,
        description: f.description.clone(),
        needs_scrutiny: false,
        matched: MatchedMetadata {
            original_identifiers: vec![f.id.clone()],
            sources: vec![f.source],
            multi_source: false,
        },
    }
}
