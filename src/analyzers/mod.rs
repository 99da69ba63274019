//! Static-analyzer adapters.
//!
//! Two known JSON formats are parsed (never produced): slither and semgrep.
//! Both map into the unified [`Finding`](crate::finding::Finding) shape so
//! the pipeline can pre-seed detection with static-analysis results.

pub mod semgrep;
pub mod slither;

pub use semgrep::parse_semgrep;
pub use slither::{effective_severity, parse_slither};

use crate::error::Result;
use crate::finding::Finding;

/// Parse analyzer output, auto-detecting the format.
///
/// Slither reports carry a `results.detectors` object; semgrep reports a
/// top-level `results` array.
pub fn parse_analyzer_output(json: &str) -> Result<Vec<Finding>> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| {
        crate::error::Error::Validation(format!("analyzer output is not valid JSON: {e}"))
    })?;
    if value
        .get("results")
        .map(|r| r.is_array())
        .unwrap_or(false)
    {
        parse_semgrep(json)
    } else {
        parse_slither(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_autodetection() {
        let slither = r#"{"results": {"detectors": []}}"#;
        assert!(parse_analyzer_output(slither).unwrap().is_empty());

        let semgrep = r#"{"results": []}"#;
        assert!(parse_analyzer_output(semgrep).unwrap().is_empty());
    }
}
