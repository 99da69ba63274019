//! Run context and pipeline configuration.
//!
//! A [`RunContext`] owns everything a run needs: paths, configuration,
//! the artifact store, and a cancellation token. It is passed through
//! every stage; there is no global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use super::artifacts::StageArtifactStore;
use crate::coverage::DEFAULT_COVERAGE_THRESHOLD;
use crate::error::Result;
use crate::hints::HintLevel;

/// Environment variable naming the model CLI executable.
pub const MODEL_CLI_ENV: &str = "REDTEAM_MODEL_CLI";
/// Environment variable overriding the audited repository root.
pub const REPO_ROOT_ENV: &str = "REDTEAM_REPO_ROOT";
/// Environment variable naming the plugin root (command-file collaborators).
pub const PLUGIN_ROOT_ENV: &str = "REDTEAM_PLUGIN_ROOT";
/// Default model CLI executable.
pub const DEFAULT_MODEL_CLI: &str = "codex";

/// Repository root from the environment hook, when set.
pub fn repo_root_from_env() -> Option<PathBuf> {
    std::env::var(REPO_ROOT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Default wall-clock budget for the secondary model, milliseconds.
pub const DEFAULT_SECONDARY_TIMEOUT_MS: u64 = 900_000;

/// Configuration for one detection run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Total detection passes allowed (first pass plus hinted re-detects).
    pub max_passes: u32,
    pub skip_primary: bool,
    pub skip_secondary: bool,
    pub skip_static_preseed: bool,
    pub secondary_timeout_ms: u64,
    /// Coverage percentage both gates must reach.
    pub coverage_threshold: f64,
    /// Information level for re-detect hints.
    pub hint_level: HintLevel,
    /// Model CLI executable.
    pub model_cli: String,
    /// Model name passed to the secondary invocation, when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_passes: 2,
            skip_primary: false,
            skip_secondary: false,
            skip_static_preseed: false,
            secondary_timeout_ms: DEFAULT_SECONDARY_TIMEOUT_MS,
            coverage_threshold: DEFAULT_COVERAGE_THRESHOLD,
            hint_level: HintLevel::Medium,
            model_cli: DEFAULT_MODEL_CLI.to_string(),
            secondary_model: None,
            reasoning_effort: None,
        }
    }
}

impl PipelineConfig {
    /// Default configuration with the model CLI resolved from the
    /// environment hook.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(cli) = std::env::var(MODEL_CLI_ENV) {
            if !cli.trim().is_empty() {
                config.model_cli = cli;
            }
        }
        config
    }
}

/// Generate a run identifier: `<stage>-<epoch-ms>`.
pub fn generate_run_id(stage: &str) -> String {
    format!("{stage}-{}", chrono::Utc::now().timestamp_millis())
}

/// Everything a single run owns.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub repo_root: PathBuf,
    pub run_id: String,
    pub config: PipelineConfig,
    pub artifacts: StageArtifactStore,
    pub cancel: CancellationToken,
}

impl RunContext {
    /// Create a context for a repository. A run identifier is generated
    /// when none is supplied.
    pub fn new(
        repo_root: impl Into<PathBuf>,
        run_id: Option<String>,
        config: PipelineConfig,
    ) -> Result<Self> {
        let repo_root = repo_root.into();
        let run_id = run_id.unwrap_or_else(|| generate_run_id("detect"));
        let artifacts = StageArtifactStore::open(&repo_root, &run_id)?;
        Ok(Self {
            repo_root,
            run_id,
            config,
            artifacts,
            cancel: CancellationToken::new(),
        })
    }

    /// Directory a stage bundle lives in.
    pub fn bundle_dir(&self, stage: crate::bundle::BundleStage) -> PathBuf {
        self.artifacts
            .path(&super::artifacts::ArtifactKind::Bundle(stage))
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }
}
