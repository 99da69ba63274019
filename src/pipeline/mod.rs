//! Pipeline orchestration: run context, artifact store, phase machine.

pub mod artifacts;
pub mod context;
pub mod orchestrator;

pub use artifacts::{ArtifactKind, FallbackArtifact, StageArtifactStore};
pub use context::{
    generate_run_id, repo_root_from_env, PipelineConfig, RunContext, DEFAULT_MODEL_CLI,
    DEFAULT_SECONDARY_TIMEOUT_MS, MODEL_CLI_ENV, PLUGIN_ROOT_ENV, REPO_ROOT_ENV,
};
pub use orchestrator::{DetectPipeline, PipelineSummary};
