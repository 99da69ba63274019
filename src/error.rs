//! Error types for redteam-core.

use thiserror::Error;

/// Result type alias using redteam-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A stage precondition failed: missing bundle directory, absent
    /// required artifact, invalid registry entry.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An isolation predicate rejected a bundle. The offending bundle is
    /// kept on disk with `violated=true` in its manifest.
    #[error("Bundle isolation violated ({stage}): {}", violations.join("; "))]
    BundleViolation {
        stage: String,
        violations: Vec<String>,
    },

    /// External tool returned non-zero, could not be spawned, or was not
    /// found on the PATH.
    #[error("Subprocess error: {tool} - {message}")]
    Subprocess { tool: String, message: String },

    /// Timeout during an external invocation.
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Parsed output does not meet minimum structural requirements.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Replay or grading could not be completed.
    #[error("Grading failure: {0}")]
    Grading(String),

    /// Judge process errored or produced unparseable output.
    #[error("Judge failure: {0}")]
    Judge(String),

    /// Both detection models yielded no findings and nothing was pre-seeded.
    #[error("No findings produced by any detection source")]
    NoFindings,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Create a bundle violation error.
    pub fn bundle_violation(stage: impl Into<String>, violations: Vec<String>) -> Self {
        Self::BundleViolation {
            stage: stage.into(),
            violations,
        }
    }

    /// Create a subprocess error.
    pub fn subprocess(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Subprocess {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Exit code for CLI wrappers.
    ///
    /// 0 is reserved for clean completion; hard precondition failures map
    /// to 1, external-tool errors to 2, timeouts to 3.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Subprocess { .. } => 2,
            Self::Timeout { .. } => 3,
            _ => 1,
        }
    }
}
