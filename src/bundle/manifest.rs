//! Bundle stages and manifests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// The pipeline stages that consume a bundle, each with its own isolation
/// rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BundleStage {
    DetectPrimary,
    DetectSecondary,
    DeepExploitSecondary,
    DisputeResolution,
    FinalGate,
}

impl BundleStage {
    /// Directory name under the run's artifact root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::DetectPrimary => "bundle-detect-primary",
            Self::DetectSecondary => "bundle-detect-secondary",
            Self::DeepExploitSecondary => "bundle-stage4b",
            Self::DisputeResolution => "bundle-stage4c",
            Self::FinalGate => "bundle-final",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DetectPrimary => "detect-primary",
            Self::DetectSecondary => "detect-secondary",
            Self::DeepExploitSecondary => "deep-exploit-secondary",
            Self::DisputeResolution => "dispute-resolution",
            Self::FinalGate => "final-gate",
        }
    }
}

impl std::fmt::Display for BundleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Manifest describing what a bundle contains and whether it passed
/// validation. Written as `MANIFEST.json` at the bundle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub stage: BundleStage,
    /// Relative paths of every file included.
    pub files: Vec<String>,
    pub violated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub const MANIFEST_FILE: &str = "MANIFEST.json";

impl BundleManifest {
    pub fn new(stage: BundleStage, files: Vec<String>) -> Self {
        Self {
            stage,
            files,
            violated: false,
            violations: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn write(&self, bundle_dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(bundle_dir.join(MANIFEST_FILE), json)?;
        Ok(())
    }

    pub fn load(bundle_dir: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(bundle_dir.join(MANIFEST_FILE))?;
        Ok(serde_json::from_str(&json)?)
    }
}
