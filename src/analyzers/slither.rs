//! Slither JSON adapter.
//!
//! Parses `results.detectors[]` into the unified finding shape. Effective
//! severity is the impact × confidence product:
//! High/High → CRITICAL, High/Medium or Medium/High → HIGH,
//! High/Low or Medium/Medium → MEDIUM, Medium/Low or Low/anything → LOW,
//! Informational → INFO.

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::finding::{classify_mechanism, Finding, Severity, Source};

#[derive(Debug, Deserialize)]
struct SlitherReport {
    #[serde(default)]
    results: SlitherResults,
}

#[derive(Debug, Default, Deserialize)]
struct SlitherResults {
    #[serde(default)]
    detectors: Vec<SlitherDetector>,
}

#[derive(Debug, Deserialize)]
struct SlitherDetector {
    #[serde(default)]
    check: String,
    #[serde(default)]
    impact: String,
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    elements: Vec<SlitherElement>,
}

#[derive(Debug, Deserialize)]
struct SlitherElement {
    #[serde(default)]
    source_mapping: Option<SlitherSourceMapping>,
}

#[derive(Debug, Deserialize)]
struct SlitherSourceMapping {
    #[serde(default)]
    filename_relative: String,
    #[serde(default)]
    lines: Vec<u32>,
}

/// Effective severity from slither's impact and confidence labels.
pub fn effective_severity(impact: &str, confidence: &str) -> Severity {
    let impact = impact.to_ascii_lowercase();
    let confidence = confidence.to_ascii_lowercase();
    if impact.starts_with("informational") {
        return Severity::Info;
    }
    match (impact.as_str(), confidence.as_str()) {
        ("high", "high") => Severity::Critical,
        ("high", "medium") | ("medium", "high") => Severity::High,
        ("high", "low") | ("medium", "medium") => Severity::Medium,
        ("medium", "low") => Severity::Low,
        ("low", _) => Severity::Low,
        _ => Severity::Unknown,
    }
}

/// Parse slither JSON output into findings.
pub fn parse_slither(json: &str) -> Result<Vec<Finding>> {
    let report: SlitherReport = serde_json::from_str(json)
        .map_err(|e| Error::Validation(format!("slither output is not valid JSON: {e}")))?;

    let findings = report
        .results
        .detectors
        .into_iter()
        .enumerate()
        .map(|(i, det)| {
            let mapping = det
                .elements
                .iter()
                .find_map(|e| e.source_mapping.as_ref());
            let file = mapping
                .map(|m| m.filename_relative.clone())
                .unwrap_or_default();
            let line = mapping
                .and_then(|m| m.lines.first().copied())
                .unwrap_or(0);
            let severity = effective_severity(&det.impact, &det.confidence);
            let mechanism = classify_mechanism(&format!("{} {}", det.check, det.description));

            Finding::new(
                format!("SLITHER-{}", i + 1),
                severity,
                det.check.clone(),
                file,
                line,
                mechanism,
                Source::StaticAnalysis,
            )
            .with_description(det.description)
        })
        .collect();

    Ok(findings)
}
