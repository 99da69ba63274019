//! Mechanism classification by keyword matching.
//!
//! The classifier walks a precedence-ordered rule set over the concatenated
//! title/description/root-cause text, lowercased, and returns the first
//! mechanism whose keyword list matches. Precedence is deterministic and
//! test-locked: "flashloan-based price manipulation" classifies as
//! oracle-manipulation because oracle keywords are checked before
//! flash-loan keywords.

use super::types::Mechanism;

/// Precedence-ordered classification rules. Earlier entries win.
const RULES: &[(Mechanism, &[&str])] = &[
    (
        Mechanism::Reentrancy,
        &["reentran", "re-entran", "reentrancy guard", "cross-function call"],
    ),
    (
        Mechanism::AccessControl,
        &[
            "access control",
            "access-control",
            "onlyowner",
            "unauthoriz",
            "missing authoriz",
            "permission check",
            "privilege",
            "unprotected",
        ],
    ),
    (
        Mechanism::Arithmetic,
        &[
            "overflow",
            "underflow",
            "precision loss",
            "rounding",
            "division by zero",
            "arithmetic",
            "truncat",
        ],
    ),
    (
        Mechanism::OracleManipulation,
        &[
            "oracle",
            "price manipulation",
            "price feed",
            "spot price",
            "twap",
            "stale price",
        ],
    ),
    (
        Mechanism::FlashLoan,
        &["flash loan", "flashloan", "flash-loan", "flash borrow"],
    ),
    (
        Mechanism::FrontRunning,
        &["front-run", "frontrun", "front run", "sandwich", "mev", "slippage"],
    ),
    (
        Mechanism::DosGriefing,
        &[
            "denial of service",
            "denial-of-service",
            "dos",
            "grief",
            "gas limit",
            "out of gas",
            "unbounded loop",
            "block stuffing",
        ],
    ),
    (
        Mechanism::StateCorruption,
        &[
            "state corruption",
            "storage collision",
            "storage slot",
            "corrupted state",
            "inconsistent state",
        ],
    ),
    (
        Mechanism::UpgradeSafety,
        &[
            "upgrade",
            "upgradeable",
            "proxy",
            "implementation contract",
            "delegatecall",
        ],
    ),
    (
        Mechanism::TokenHandling,
        &[
            "erc20",
            "erc-20",
            "erc721",
            "erc-721",
            "transferfrom",
            "safetransfer",
            "fee-on-transfer",
            "rebasing",
            "token approval",
            "allowance",
        ],
    ),
    (
        Mechanism::CrossContract,
        &[
            "cross-contract",
            "cross contract",
            "external call",
            "composab",
            "integration",
        ],
    ),
    (
        Mechanism::Economic,
        &[
            "economic",
            "incentive",
            "liquidat",
            "collateral",
            "insolven",
            "bad debt",
        ],
    ),
    (
        Mechanism::LogicError,
        &[
            "logic error",
            "logic bug",
            "incorrect calculation",
            "wrong condition",
            "off-by-one",
            "invariant violation",
            "incorrect",
        ],
    ),
    (
        Mechanism::Initialization,
        &["initializ", "uninitialized", "constructor", "init function"],
    ),
];

/// Classify free text into a mechanism tag.
///
/// The text is lowercased before matching; callers may pass concatenated
/// title/description/rootCause/type/category text. Returns
/// [`Mechanism::Other`] when nothing matches.
pub fn classify_mechanism(text: &str) -> Mechanism {
    let haystack = text.to_lowercase();
    for (mechanism, keywords) in RULES {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return *mechanism;
        }
    }
    Mechanism::Other
}

/// Keywords that indicate a given mechanism; used by the ground-truth
/// matcher to test whether a detected finding's text describes a mechanism.
pub fn mechanism_keywords(mechanism: Mechanism) -> &'static [&'static str] {
    for (m, keywords) in RULES {
        if *m == mechanism {
            return keywords;
        }
    }
    &[]
}

/// True when the text mentions the mechanism by keyword or by its canonical
/// tag name.
pub fn text_mentions_mechanism(text: &str, mechanism: Mechanism) -> bool {
    let haystack = text.to_lowercase();
    if haystack.contains(mechanism.as_str()) {
        return true;
    }
    mechanism_keywords(mechanism)
        .iter()
        .any(|k| haystack.contains(k))
}
