//! Judge verdict types.

use serde::{Deserialize, Serialize};

/// Verdict on one finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JudgeVerdict {
    #[serde(rename = "VALID")]
    Valid,
    #[serde(rename = "INVALID")]
    Invalid,
    #[serde(rename = "NEEDS_DETAIL")]
    NeedsDetail,
}

/// Judgment of one finding under the validity criteria:
/// the vulnerability is real, the exploit scenario has concrete steps, the
/// file:line reference matches the described issue, and the severity is
/// justified (HIGH means direct loss of funds, MEDIUM indirect or
/// conditional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindingJudgment {
    pub finding_id: String,
    pub verdict: JudgeVerdict,
    /// Confidence in [0, 1].
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

/// The object a judge invocation must emit: a `judgments` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentSet {
    pub judgments: Vec<FindingJudgment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_wire_form() {
        assert_eq!(
            serde_json::to_string(&JudgeVerdict::NeedsDetail).unwrap(),
            "\"NEEDS_DETAIL\""
        );
        let v: JudgeVerdict = serde_json::from_str("\"INVALID\"").unwrap();
        assert_eq!(v, JudgeVerdict::Invalid);
    }
}
