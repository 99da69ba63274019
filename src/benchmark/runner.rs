//! Benchmark runner.
//!
//! Replays the pipeline across a registry in one of four modes:
//!
//! - **detect**: run detection, score against ground truth.
//! - **exploit**: ground truth is the work list; an independent forge-test
//!   grader checks the PoCs. The denominator is the ground-truth count, so
//!   skipping hard vulnerabilities cannot inflate the score.
//! - **patch**: post-fix verification via unseen tests; placeholder-only
//!   benchmarks have their scores nullified.
//! - **pipeline**: detect, then exploit and patch chained on the agent's
//!   own findings (not independently seeded).
//!
//! Runs are independent (default 3); each run's record is write-once, and
//! a multi-run summary reports mean/min/max over runs.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::registry::BenchmarkEntry;
use super::scoring::{
    aggregate_detection, aggregate_exploit, aggregate_patch, is_placeholder_test,
    BenchmarkStatus, DetectResult, ExploitScores, MultiRunSummary, PatchAggregate, PatchScores,
    summarize_runs,
};
use crate::error::{Error, Result};
use crate::finding::{
    consolidated_to_findings, match_findings, match_findings_heuristic, ConsolidatedFinding,
    DetectionScores, SemanticJudge,
};
use crate::pipeline::{ArtifactKind, DetectPipeline, PipelineConfig, RunContext};
use crate::process::{ExternalTool, SubprocessSupervisor};

/// Execution mode for a registry session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BenchmarkMode {
    Detect,
    Exploit,
    Patch,
    Pipeline,
}

/// Configuration for a registry session.
#[derive(Debug, Clone)]
pub struct BenchmarkRunConfig {
    pub mode: BenchmarkMode,
    /// Independent runs (default 3).
    pub runs: usize,
    /// Where run records and the summary are persisted.
    pub output_root: PathBuf,
    pub pipeline: PipelineConfig,
    /// Forge executable used by the exploit/patch graders.
    pub forge_bin: String,
    pub forge_timeout: Duration,
}

impl BenchmarkRunConfig {
    pub fn new(mode: BenchmarkMode, output_root: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            runs: 3,
            output_root: output_root.into(),
            pipeline: PipelineConfig::default(),
            forge_bin: "forge".to_string(),
            forge_timeout: Duration::from_secs(600),
        }
    }
}

/// Result record for one benchmark within one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub benchmark_id: String,
    pub status: BenchmarkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect: Option<DetectResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploit: Option<ExploitScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<PatchScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One run's persisted record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run: usize,
    pub mode: BenchmarkMode,
    pub results: Vec<BenchmarkResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_aggregate: Option<DetectionScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploit_aggregate: Option<ExploitScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch_aggregate: Option<PatchAggregate>,
}

/// Whole-session summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySummary {
    /// Unique session identifier.
    pub session: uuid::Uuid,
    pub mode: BenchmarkMode,
    pub runs: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_run: Option<MultiRunSummary>,
    pub records: Vec<RunRecord>,
}

/// Drives the pipeline over a registry.
pub struct BenchmarkRunner {
    pipeline: DetectPipeline,
    supervisor: SubprocessSupervisor,
    cancel: CancellationToken,
    semantic_judge: Option<Arc<dyn SemanticJudge>>,
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchmarkRunner {
    pub fn new() -> Self {
        Self {
            pipeline: DetectPipeline::new(),
            supervisor: SubprocessSupervisor::new(),
            cancel: CancellationToken::new(),
            semantic_judge: None,
        }
    }

    /// Enable the semantic matching tier.
    pub fn with_semantic_judge(mut self, judge: Arc<dyn SemanticJudge>) -> Self {
        self.semantic_judge = Some(judge);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute the whole registry for the configured number of runs.
    #[instrument(skip(self, entries, config), fields(mode = ?config.mode, runs = config.runs))]
    pub async fn run_registry(
        &self,
        entries: &[BenchmarkEntry],
        config: &BenchmarkRunConfig,
    ) -> Result<RegistrySummary> {
        std::fs::create_dir_all(&config.output_root)?;
        let mut records = Vec::with_capacity(config.runs);

        for run in 1..=config.runs.max(1) {
            info!(run, "benchmark run start");
            // Benchmarks are independent repositories; fan out within a
            // run. Result order follows registry order.
            let results = futures::future::join_all(
                entries
                    .iter()
                    .map(|entry| self.run_benchmark(entry, run, config)),
            )
            .await;

            let detect_results: Vec<DetectResult> =
                results.iter().filter_map(|r| r.detect.clone()).collect();
            let exploit_results: Vec<ExploitScores> =
                results.iter().filter_map(|r| r.exploit).collect();
            let patch_results: Vec<PatchScores> =
                results.iter().filter_map(|r| r.patch.clone()).collect();

            let record = RunRecord {
                run,
                mode: config.mode,
                detect_aggregate: (!detect_results.is_empty())
                    .then(|| aggregate_detection(&detect_results)),
                exploit_aggregate: (!exploit_results.is_empty())
                    .then(|| aggregate_exploit(&exploit_results)),
                patch_aggregate: (!patch_results.is_empty())
                    .then(|| aggregate_patch(&patch_results)),
                results,
            };
            self.persist_run(&record, config)?;
            records.push(record);
        }

        let per_run: Vec<DetectionScores> = records
            .iter()
            .filter_map(|r| r.detect_aggregate)
            .collect();
        let multi_run = (!per_run.is_empty()).then(|| summarize_runs(&per_run));

        let summary = RegistrySummary {
            session: uuid::Uuid::new_v4(),
            mode: config.mode,
            runs: config.runs,
            multi_run,
            records,
        };
        std::fs::write(
            config.output_root.join("multi-run-summary.json"),
            serde_json::to_string_pretty(&summary)?,
        )?;
        Ok(summary)
    }

    /// Per-run records are write-once.
    fn persist_run(&self, record: &RunRecord, config: &BenchmarkRunConfig) -> Result<()> {
        let path = config.output_root.join(format!("run-{}.json", record.run));
        if path.exists() {
            return Err(Error::precondition(format!(
                "run record {} already exists",
                path.display()
            )));
        }
        std::fs::write(path, serde_json::to_string_pretty(record)?)?;
        Ok(())
    }

    async fn run_benchmark(
        &self,
        entry: &BenchmarkEntry,
        run: usize,
        config: &BenchmarkRunConfig,
    ) -> BenchmarkResult {
        let mut result = BenchmarkResult {
            benchmark_id: entry.id.clone(),
            status: BenchmarkStatus::Completed,
            detect: None,
            exploit: None,
            patch: None,
            error: None,
        };
        if !entry.repo.exists() {
            result.status = BenchmarkStatus::Skipped;
            result.error = Some(format!("repository {} missing", entry.repo.display()));
            return result;
        }

        match config.mode {
            BenchmarkMode::Detect => {
                let detect = self.run_detect(entry, run, config).await;
                if detect.status == BenchmarkStatus::Failed {
                    result.status = BenchmarkStatus::Failed;
                }
                result.detect = Some(detect);
            }
            BenchmarkMode::Exploit => {
                result.exploit = Some(self.run_exploit(entry, config).await);
            }
            BenchmarkMode::Patch => {
                result.patch = Some(self.run_patch(entry, config).await);
            }
            BenchmarkMode::Pipeline => {
                let detect = self.run_detect(entry, run, config).await;
                if detect.status == BenchmarkStatus::Failed {
                    result.status = BenchmarkStatus::Failed;
                }
                result.detect = Some(detect);
                result.exploit = Some(self.run_exploit(entry, config).await);
                result.patch = Some(self.run_patch(entry, config).await);
            }
        }
        result
    }

    /// Detect mode: run the pipeline, score consolidated findings against
    /// the curated ground truth.
    async fn run_detect(
        &self,
        entry: &BenchmarkEntry,
        run: usize,
        config: &BenchmarkRunConfig,
    ) -> DetectResult {
        let run_id = format!("bench-{}-run{}", entry.id, run);
        let ctx = match RunContext::new(&entry.repo, Some(run_id), config.pipeline.clone()) {
            Ok(ctx) => ctx,
            Err(e) => {
                return failed_detect(entry, e.to_string());
            }
        };

        if let Err(e) = self.pipeline.run(&ctx).await {
            warn!(benchmark = %entry.id, error = %e, "pipeline failed");
            return failed_detect(entry, e.to_string());
        }

        let consolidated: Vec<ConsolidatedFinding> =
            match ctx.artifacts.read_json(&ArtifactKind::ConsolidatedFindings) {
                Ok(c) => c,
                Err(e) => return failed_detect(entry, e.to_string()),
            };
        let detected = consolidated_to_findings(&consolidated);

        let outcome = match self.semantic_judge {
            Some(ref judge) => {
                match_findings(&entry.ground_truth, &detected, Some(judge.as_ref())).await
            }
            None => match_findings_heuristic(&entry.ground_truth, &detected),
        };

        DetectResult {
            benchmark_id: entry.id.clone(),
            status: BenchmarkStatus::Completed,
            detected_count: detected.len(),
            ground_truth_count: entry.ground_truth.len(),
            match_results: outcome.results,
            scores: outcome.scores,
            judge_used: self.semantic_judge.is_some(),
        }
    }

    /// Exploit mode: one PoC test per ground-truth row, graded by forge.
    async fn run_exploit(&self, entry: &BenchmarkEntry, config: &BenchmarkRunConfig) -> ExploitScores {
        let mut exploited = 0usize;
        for gt in &entry.ground_truth {
            let poc = entry.repo.join("test/exploit").join(format!("{}.t.sol", gt.id));
            if !poc.exists() {
                continue;
            }
            if self.forge_test_passes(&entry.repo, &poc, config).await {
                exploited += 1;
            }
        }
        ExploitScores::compute(exploited, entry.ground_truth.len())
    }

    /// Patch mode: run each unseen verification test; placeholder scaffolds
    /// nullify the benchmark when nothing meaningful remains.
    async fn run_patch(&self, entry: &BenchmarkEntry, config: &BenchmarkRunConfig) -> PatchScores {
        let mut total = 0usize;
        let mut placeholders = 0usize;
        let mut passed = 0usize;

        for gt in &entry.ground_truth {
            let Some(ref test_file) = gt.unseen_test_file else {
                continue;
            };
            total += 1;
            let path = entry.repo.join(test_file);
            let content = std::fs::read_to_string(&path).unwrap_or_default();
            if is_placeholder_test(&content) {
                placeholders += 1;
                continue;
            }
            if self.forge_test_passes(&entry.repo, &path, config).await {
                passed += 1;
            }
        }
        PatchScores::compute(passed, placeholders, total)
    }

    async fn forge_test_passes(
        &self,
        repo: &std::path::Path,
        test_path: &std::path::Path,
        config: &BenchmarkRunConfig,
    ) -> bool {
        let rel = test_path.strip_prefix(repo).unwrap_or(test_path);
        let tool = ExternalTool::new(&config.forge_bin)
            .arg("test")
            .arg("--match-path")
            .arg(rel.to_string_lossy().to_string())
            .current_dir(repo);
        match self
            .supervisor
            .run(&tool, None, config.forge_timeout, &self.cancel)
            .await
        {
            Ok(output) => output.success(),
            Err(e) => {
                warn!(error = %e, "forge grader unavailable");
                false
            }
        }
    }
}

fn failed_detect(entry: &BenchmarkEntry, _reason: String) -> DetectResult {
    DetectResult {
        benchmark_id: entry.id.clone(),
        status: BenchmarkStatus::Failed,
        detected_count: 0,
        ground_truth_count: entry.ground_truth.len(),
        match_results: Vec::new(),
        scores: DetectionScores::compute(0, 0, entry.ground_truth.len()),
        judge_used: false,
    }
}
