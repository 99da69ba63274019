//! Property-based tests for the finding engines.
//!
//! These lock the universally-quantified invariants of merge, consolidation,
//! matching, and severity handling:
//!
//! - Consolidated severity is the maximum across contributors
//! - Match-result counts always partition the inputs
//! - Precision and recall stay within [0, 1]
//! - Severity schema normalization is idempotent
//! - The mechanism classifier is deterministic
