//! The five-phase detection pipeline.
//!
//! Phase 0 pre-seeds from static analyzers; Phase 1 runs blind detection
//! (the secondary model is spawned here, the primary's findings are
//! produced externally and read from its bundle); Phase 2 merges; Phase 3
//! checks coverage; Phase 4 re-detects with hints while coverage is unmet
//! and passes remain; Phase 5 consolidates and emits.
//!
//! Phase ordering is strict: phase N fully completes before N+1 begins,
//! and within Phase 1 both models complete before the merge.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

use super::artifacts::ArtifactKind;
use super::context::RunContext;
use crate::analyzers::parse_analyzer_output;
use crate::bundle::{BundleGenerator, BundleInputs, BundleStage};
use crate::coverage::{check_coverage, scan_repository, CoverageReport, CoverageTargets};
use crate::error::{Error, Result};
use crate::finding::{
    consolidate_findings, consolidated_to_findings, merge_findings, Finding, FindingCollection,
    MergedSet, Source,
};
use crate::hints::generate_hints;
use crate::process::{ExecutionRecord, ExternalTool, SubprocessSupervisor};

/// Candidate analyzer report locations relative to the repository root.
const SLITHER_REPORT_CANDIDATES: &[&str] = &["slither-report.json", "reports/slither.json"];
const SEMGREP_REPORT_CANDIDATES: &[&str] = &["semgrep-report.json", "reports/semgrep.json"];

/// Filename each detection model writes inside its bundle.
const PRIMARY_OUTPUT: &str = "findings-primary.json";
const SECONDARY_OUTPUT: &str = "findings-secondary.json";

const SECONDARY_DETECT_PROMPT: &str = "Audit the Solidity sources in this directory for \
    vulnerabilities. Use invariants.md, public-api.md and \
    static-analysis-summary.md as context, and hints.json when present. \
    Write your findings to findings-secondary.json as a JSON array of \
    objects with id, severity, title, file, line, mechanism, description.";

/// Result summary of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub run_id: String,
    pub total_findings: usize,
    pub dual_confirmed: usize,
    pub single_primary: usize,
    pub single_secondary: usize,
    pub passes_performed: u32,
    pub coverage_met: bool,
    pub duration_ms: u64,
    /// Non-fatal problems encountered along the way. A non-empty list
    /// means "completed with warnings".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// The five-phase detection pipeline.
pub struct DetectPipeline {
    supervisor: SubprocessSupervisor,
}

impl Default for DetectPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectPipeline {
    pub fn new() -> Self {
        Self {
            supervisor: SubprocessSupervisor::new(),
        }
    }

    pub fn with_supervisor(mut self, supervisor: SubprocessSupervisor) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Drive the full pipeline for one repository and run identifier.
    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    pub async fn run(&self, ctx: &RunContext) -> Result<PipelineSummary> {
        let start = Instant::now();
        let mut records: Vec<ExecutionRecord> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        info!(phase = 0, "static pre-seed");
        let static_findings = if ctx.config.skip_static_preseed {
            Vec::new()
        } else {
            self.static_preseed(ctx, &mut warnings)
        };
        ctx.artifacts.write_json(
            &ArtifactKind::StaticFindings,
            &FindingCollection::new(static_findings.clone()),
        )?;

        info!(phase = 1, "blind detect");
        let generator = BundleGenerator::new(&ctx.repo_root);
        let inputs = BundleInputs {
            static_findings: static_findings.clone(),
            ..Default::default()
        };
        if !ctx.config.skip_primary {
            generator.generate(
                &ctx.bundle_dir(BundleStage::DetectPrimary),
                BundleStage::DetectPrimary,
                &inputs,
            )?;
        }
        if !ctx.config.skip_secondary {
            generator.generate(
                &ctx.bundle_dir(BundleStage::DetectSecondary),
                BundleStage::DetectSecondary,
                &inputs,
            )?;
        }

        let secondary = self.run_secondary(ctx, &mut records, &mut warnings).await?;
        let primary = self.read_primary(ctx, &mut warnings)?;

        if primary.is_empty() && secondary.is_empty() && static_findings.is_empty() {
            return Err(Error::NoFindings);
        }

        info!(phase = 2, "merge");
        let mut merged = merge_findings(&primary, &secondary);
        ctx.artifacts
            .write_json(&ArtifactKind::MergedFindings, &merged)?;

        info!(phase = 3, "coverage check");
        let targets = self.coverage_targets(ctx, &mut warnings);
        let mut passes: u32 = 1;
        let mut report = self.coverage_check(ctx, &targets, &merged, &static_findings)?;
        let mut coverage_met = !report.pass_required;

        while !coverage_met && passes < ctx.config.max_passes {
            info!(phase = 4, pass = passes + 1, "hinted re-detect");
            self.write_hint_artifacts(ctx, &merged, &static_findings, &report)?;

            let hints_json =
                std::fs::read_to_string(ctx.artifacts.path(&ArtifactKind::Hints {
                    source: "primary".into(),
                    target: "secondary".into(),
                }))?;
            let hinted_inputs = BundleInputs {
                static_findings: static_findings.clone(),
                hints_json: Some(hints_json),
                ..Default::default()
            };
            if !ctx.config.skip_secondary {
                generator.generate(
                    &ctx.bundle_dir(BundleStage::DetectSecondary),
                    BundleStage::DetectSecondary,
                    &hinted_inputs,
                )?;
            }

            let secondary = self.run_secondary(ctx, &mut records, &mut warnings).await?;
            merged = merge_findings(&primary, &secondary);
            ctx.artifacts
                .write_json(&ArtifactKind::MergedFindings, &merged)?;

            passes += 1;
            report = self.coverage_check(ctx, &targets, &merged, &static_findings)?;
            coverage_met = !report.pass_required;
        }

        info!(phase = 5, "emit");
        let all_findings = self.all_findings(&merged, &static_findings);
        let consolidated = consolidate_findings(&all_findings);
        ctx.artifacts
            .write_json(&ArtifactKind::ConsolidatedFindings, &consolidated)?;
        ctx.artifacts
            .write_json(&ArtifactKind::ExecutionLog, &records)?;

        let summary = PipelineSummary {
            run_id: ctx.run_id.clone(),
            total_findings: merged.total,
            dual_confirmed: merged.dual_confirmed,
            single_primary: merged.single_primary,
            single_secondary: merged.single_secondary,
            passes_performed: passes,
            coverage_met,
            duration_ms: start.elapsed().as_millis() as u64,
            warnings,
        };
        ctx.artifacts
            .write_json(&ArtifactKind::PipelineSummary, &summary)?;
        info!(
            total = summary.total_findings,
            dual = summary.dual_confirmed,
            passes = summary.passes_performed,
            coverage_met = summary.coverage_met,
            "pipeline complete"
        );
        Ok(summary)
    }

    /// Phase 0: parse any analyzer reports present in the repository.
    fn static_preseed(&self, ctx: &RunContext, warnings: &mut Vec<String>) -> Vec<Finding> {
        let mut findings = Vec::new();
        for candidate in SLITHER_REPORT_CANDIDATES
            .iter()
            .chain(SEMGREP_REPORT_CANDIDATES)
        {
            let path = ctx.repo_root.join(candidate);
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            match parse_analyzer_output(&content) {
                Ok(parsed) => findings.extend(parsed),
                Err(e) => warnings.push(format!("analyzer report {candidate} skipped: {e}")),
            }
        }
        findings
    }

    /// Spawn the secondary model against its bundle and collect its
    /// findings. Failures are recovered: a fallback artifact is written and
    /// the secondary contribution is treated as absent.
    async fn run_secondary(
        &self,
        ctx: &RunContext,
        records: &mut Vec<ExecutionRecord>,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<Finding>> {
        if ctx.config.skip_secondary {
            return Ok(Vec::new());
        }
        let bundle_dir = ctx.bundle_dir(BundleStage::DetectSecondary);
        let tool = ExternalTool::model_cli(
            &ctx.config.model_cli,
            &bundle_dir,
            ctx.config.secondary_model.as_deref(),
            ctx.config.reasoning_effort.as_deref(),
            SECONDARY_DETECT_PROMPT,
        );
        if !tool.available() {
            return Err(Error::subprocess(
                &ctx.config.model_cli,
                "model CLI not found on PATH",
            ));
        }

        let output = self
            .supervisor
            .run(
                &tool,
                None,
                Duration::from_millis(ctx.config.secondary_timeout_ms),
                &ctx.cancel,
            )
            .await?;
        records.push(ExecutionRecord::from_output(&tool, &output));

        if output.timed_out || !output.success() {
            let reason = if output.timed_out {
                format!("secondary model timed out after {}ms", output.duration_ms)
            } else {
                format!("secondary model exited with {:?}", output.exit_code)
            };
            warn!(%reason, "secondary detection failed");
            ctx.artifacts.write_fallback(
                &ArtifactKind::SecondaryFindings,
                "detect-secondary",
                &reason,
            )?;
            warnings.push(reason);
            return Ok(Vec::new());
        }

        let findings_path = bundle_dir.join(SECONDARY_OUTPUT);
        let Ok(json) = std::fs::read_to_string(&findings_path) else {
            let reason = "secondary model produced no findings file".to_string();
            ctx.artifacts.write_fallback(
                &ArtifactKind::SecondaryFindings,
                "detect-secondary",
                &reason,
            )?;
            warnings.push(reason);
            return Ok(Vec::new());
        };
        match FindingCollection::from_json(&json) {
            Ok(collection) => {
                let mut findings = collection.findings;
                for f in &mut findings {
                    f.source = Source::Secondary;
                }
                ctx.artifacts.write_json(
                    &ArtifactKind::SecondaryFindings,
                    &FindingCollection::new(findings.clone()),
                )?;
                Ok(findings)
            }
            Err(e) => {
                let reason = format!("secondary findings invalid: {e}");
                ctx.artifacts.write_fallback(
                    &ArtifactKind::SecondaryFindings,
                    "detect-secondary",
                    &reason,
                )?;
                warnings.push(reason);
                Ok(Vec::new())
            }
        }
    }

    /// Read the externally-produced primary findings from the primary
    /// bundle, copying them to the canonical artifact location.
    fn read_primary(&self, ctx: &RunContext, warnings: &mut Vec<String>) -> Result<Vec<Finding>> {
        if ctx.config.skip_primary {
            return Ok(Vec::new());
        }
        let path = ctx
            .bundle_dir(BundleStage::DetectPrimary)
            .join(PRIMARY_OUTPUT);
        let Ok(json) = std::fs::read_to_string(&path) else {
            warnings.push("primary findings not present in bundle".to_string());
            return Ok(Vec::new());
        };
        match FindingCollection::from_json(&json) {
            Ok(collection) => {
                let mut findings = collection.findings;
                for f in &mut findings {
                    f.source = Source::Primary;
                }
                ctx.artifacts.write_json(
                    &ArtifactKind::PrimaryFindings,
                    &FindingCollection::new(findings.clone()),
                )?;
                Ok(findings)
            }
            Err(e) => {
                warnings.push(format!("primary findings invalid: {e}"));
                Ok(Vec::new())
            }
        }
    }

    fn coverage_targets(&self, ctx: &RunContext, warnings: &mut Vec<String>) -> CoverageTargets {
        match scan_repository(&ctx.repo_root) {
            Ok(targets) => targets,
            Err(e) => {
                warnings.push(format!("coverage extraction failed: {e}"));
                CoverageTargets::default()
            }
        }
    }

    /// Phase 3: compute and persist coverage. A check that cannot produce a
    /// readable result is treated as "not met" (fail-closed).
    fn coverage_check(
        &self,
        ctx: &RunContext,
        targets: &CoverageTargets,
        merged: &MergedSet,
        static_findings: &[Finding],
    ) -> Result<CoverageReport> {
        let findings = self.all_findings(merged, static_findings);
        let report = check_coverage(targets, &findings, ctx.config.coverage_threshold);
        ctx.artifacts
            .write_json(&ArtifactKind::DetectCoverage, &report)?;

        // Read back what downstream consumers will see; unparseable means
        // another pass is required.
        match ctx
            .artifacts
            .read_json::<CoverageReport>(&ArtifactKind::DetectCoverage)
        {
            Ok(report) => Ok(report),
            Err(e) => {
                warn!(error = %e, "coverage result unreadable; failing closed");
                let mut closed = report;
                closed.pass_required = true;
                Ok(closed)
            }
        }
    }

    /// Phase 4 entry: regenerate hint artifacts from the current
    /// consolidated view.
    fn write_hint_artifacts(
        &self,
        ctx: &RunContext,
        merged: &MergedSet,
        static_findings: &[Finding],
        report: &CoverageReport,
    ) -> Result<()> {
        let consolidated = consolidate_findings(&self.all_findings(merged, static_findings));
        let hint_source = consolidated_to_findings(&consolidated);
        let hints = generate_hints(&hint_source, ctx.config.hint_level);
        ctx.artifacts
            .write_json(&ArtifactKind::CoverageHints, &report.hints())?;
        ctx.artifacts.write_json(
            &ArtifactKind::Hints {
                source: "primary".into(),
                target: "secondary".into(),
            },
            &hints,
        )?;
        Ok(())
    }

    fn all_findings(&self, merged: &MergedSet, static_findings: &[Finding]) -> Vec<Finding> {
        let mut findings: Vec<Finding> = merged.records.iter().map(|r| r.to_finding()).collect();
        findings.extend(static_findings.iter().cloned());
        findings
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::pipeline::context::PipelineConfig;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    fn seed_repo(dir: &Path) {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(
            dir.join("src/Vault.sol"),
            "contract Vault { function withdraw() external {} }",
        )
        .unwrap();
    }

    /// A stand-in model CLI: writes a findings file into its cwd (the
    /// bundle directory) and exits 0.
    fn fake_model_cli(dir: &Path, findings_json: &str) -> String {
        let script = dir.join("fake-model");
        let body = format!(
            "#!/bin/sh\ncat > findings-secondary.json <<'EOF'\n{findings_json}\nEOF\n"
        );
        std::fs::write(&script, body).unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();
        script.to_string_lossy().to_string()
    }

    fn config_with_cli(cli: String) -> PipelineConfig {
        PipelineConfig {
            model_cli: cli,
            skip_primary: true,
            skip_static_preseed: true,
            ..Default::default()
        }
    }

    const SECONDARY_FINDINGS: &str = r#"[
        {"id": "C1", "severity": "HIGH", "title": "Reentrancy in withdraw",
         "file": "src/Vault.sol", "line": 1, "mechanism": "reentrancy",
         "source": "secondary", "description": "classic reentrancy"}
    ]"#;

    #[tokio::test]
    async fn test_pipeline_single_pass_with_coverage_met() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());
        let cli = fake_model_cli(repo.path(), SECONDARY_FINDINGS);

        let ctx = RunContext::new(
            repo.path(),
            Some("detect-t1".into()),
            config_with_cli(cli),
        )
        .unwrap();

        let summary = DetectPipeline::new().run(&ctx).await.unwrap();
        assert_eq!(summary.total_findings, 1);
        assert_eq!(summary.single_secondary, 1);
        assert_eq!(summary.passes_performed, 1);
        assert!(summary.coverage_met);

        assert!(ctx.artifacts.exists(&ArtifactKind::MergedFindings));
        assert!(ctx.artifacts.exists(&ArtifactKind::ConsolidatedFindings));
        assert!(ctx.artifacts.exists(&ArtifactKind::PipelineSummary));
        assert!(ctx.artifacts.exists(&ArtifactKind::DetectCoverage));
    }

    #[tokio::test]
    async fn test_pipeline_no_findings_errors() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());
        let cli = fake_model_cli(repo.path(), "[]");

        let ctx = RunContext::new(
            repo.path(),
            Some("detect-t2".into()),
            config_with_cli(cli),
        )
        .unwrap();

        let err = DetectPipeline::new().run(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::NoFindings));
    }

    #[tokio::test]
    async fn test_pipeline_hinted_repass_consumes_budget() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());
        // An extra uncovered contract keeps coverage below threshold.
        std::fs::write(
            repo.path().join("src/Pool.sol"),
            "contract Pool { function swap() external {} }",
        )
        .unwrap();
        let cli = fake_model_cli(repo.path(), SECONDARY_FINDINGS);

        let ctx = RunContext::new(
            repo.path(),
            Some("detect-t3".into()),
            config_with_cli(cli),
        )
        .unwrap();

        let summary = DetectPipeline::new().run(&ctx).await.unwrap();
        // One blind pass plus one hinted pass; coverage still unmet.
        assert_eq!(summary.passes_performed, 2);
        assert!(!summary.coverage_met);

        // Hint artifacts were produced for the re-detect.
        assert!(ctx.artifacts.exists(&ArtifactKind::CoverageHints));
        assert!(ctx.artifacts.exists(&ArtifactKind::Hints {
            source: "primary".into(),
            target: "secondary".into()
        }));

        let hints: serde_json::Value = ctx
            .artifacts
            .read_json(&ArtifactKind::CoverageHints)
            .unwrap();
        let uncovered = hints["uncovered_modules"].as_array().unwrap();
        assert!(uncovered.iter().any(|m| m == "Pool"));
    }

    #[tokio::test]
    async fn test_pipeline_model_failure_writes_fallback() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());
        // A model CLI that always fails.
        let script = repo.path().join("fake-model");
        std::fs::write(&script, "#!/bin/sh\nexit 7\n").unwrap();
        let mut perms = std::fs::metadata(&script).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&script, perms).unwrap();

        let ctx = RunContext::new(
            repo.path(),
            Some("detect-t4".into()),
            config_with_cli(script.to_string_lossy().to_string()),
        )
        .unwrap();

        let err = DetectPipeline::new().run(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::NoFindings));
        assert!(ctx.artifacts.is_fallback(&ArtifactKind::SecondaryFindings));
    }

    #[tokio::test]
    async fn test_pipeline_missing_model_cli_is_subprocess_error() {
        let repo = tempfile::tempdir().unwrap();
        seed_repo(repo.path());

        let ctx = RunContext::new(
            repo.path(),
            Some("detect-t5".into()),
            config_with_cli("no-such-model-cli-3fa9".into()),
        )
        .unwrap();

        let err = DetectPipeline::new().run(&ctx).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
