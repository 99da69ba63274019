//! Subprocess supervision for external collaborators.

pub mod supervisor;

pub use supervisor::{
    parse_status_envelope, parse_token_usage, ExecutionRecord, ExternalTool,
    SubprocessSupervisor, TokenUsage, ToolOutput, TERMINATION_GRACE,
};
