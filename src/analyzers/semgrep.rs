//! Semgrep JSON adapter.
//!
//! Parses `results[]` with `{check_id, path, start: {line}, extra:
//! {severity, message}}` into the unified finding shape.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::finding::{classify_mechanism, Finding, Severity, Source};

#[derive(Debug, Deserialize)]
struct SemgrepReport {
    #[serde(default)]
    results: Vec<SemgrepResult>,
}

#[derive(Debug, Deserialize)]
struct SemgrepResult {
    #[serde(default)]
    check_id: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    start: Option<SemgrepPosition>,
    #[serde(default)]
    extra: Option<SemgrepExtra>,
}

#[derive(Debug, Deserialize)]
struct SemgrepPosition {
    #[serde(default)]
    line: u32,
}

#[derive(Debug, Deserialize)]
struct SemgrepExtra {
    #[serde(default)]
    severity: String,
    #[serde(default)]
    message: String,
}

fn map_severity(label: &str) -> Severity {
    match label.to_ascii_uppercase().as_str() {
        "ERROR" => Severity::High,
        "WARNING" => Severity::Medium,
        "INFO" => Severity::Info,
        _ => Severity::Unknown,
    }
}

/// Parse semgrep JSON output into findings.
pub fn parse_semgrep(json: &str) -> Result<Vec<Finding>> {
    let report: SemgrepReport = serde_json::from_str(json)
        .map_err(|e| Error::Validation(format!("semgrep output is not valid JSON: {e}")))?;

    let findings = report
        .results
        .into_iter()
        .enumerate()
        .map(|(i, res)| {
            let line = res.start.map(|s| s.line).unwrap_or(0);
            let (severity, message) = match res.extra {
                Some(extra) => (map_severity(&extra.severity), extra.message),
                None => (Severity::Unknown, String::new()),
            };
            let mechanism = classify_mechanism(&format!("{} {}", res.check_id, message));

            Finding::new(
                format!("SEMGREP-{}", i + 1),
                severity,
                res.check_id.clone(),
                res.path,
                line,
                mechanism,
                Source::StaticAnalysis,
            )
            .with_description(message)
        })
        .collect();

    Ok(findings)
}
