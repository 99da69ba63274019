//! External-process supervision.
//!
//! Every model CLI, analyzer, and forge invocation goes through the
//! [`SubprocessSupervisor`]: one place for timeouts, cancellation,
//! process-group termination, output capture, and token-usage parsing.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};

/// Grace period between SIGTERM and SIGKILL when a subprocess must be
/// terminated.
pub const TERMINATION_GRACE: Duration = Duration::from_millis(2_000);

/// Description of an external tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalTool {
    pub program: String,
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<(String, String)>,
}

impl ExternalTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Build a reasoning-model invocation per the model CLI contract:
    /// `exec --full-auto --skip-git-repo-check [-m <model>]
    /// [-c model_reasoning_effort="<level>"] <prompt>`, run from inside the
    /// bundle directory so the model reads bundle files directly.
    pub fn model_cli(
        executable: impl Into<String>,
        bundle_dir: impl Into<PathBuf>,
        model: Option<&str>,
        reasoning_effort: Option<&str>,
        prompt: impl Into<String>,
    ) -> Self {
        let mut tool = Self::new(executable)
            .arg("exec")
            .arg("--full-auto")
            .arg("--skip-git-repo-check");
        if let Some(model) = model {
            tool = tool.arg("-m").arg(model);
        }
        if let Some(effort) = reasoning_effort {
            tool = tool
                .arg("-c")
                .arg(format!("model_reasoning_effort=\"{effort}\""));
        }
        tool.arg(prompt).current_dir(bundle_dir)
    }

    /// Check that the program resolves on the PATH.
    pub fn available(&self) -> bool {
        which::which(&self.program).is_ok()
    }
}

/// Token usage parsed from a tool's combined output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// Captured result of one supervised invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    /// None when the process was terminated (timeout or cancellation).
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Combined stdout + stderr, the surface token usage is scanned from.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Record of one external invocation for the run's execution log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub tool: String,
    pub args: Vec<String>,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

impl ExecutionRecord {
    pub fn from_output(tool: &ExternalTool, output: &ToolOutput) -> Self {
        Self {
            tool: tool.program.clone(),
            args: tool.args.clone(),
            exit_code: output.exit_code,
            duration_ms: output.duration_ms,
            timed_out: output.timed_out,
            token_usage: output.token_usage,
            recorded_at: chrono::Utc::now(),
        }
    }
}

/// Supervisor for external tool invocations.
#[derive(Debug, Clone)]
pub struct SubprocessSupervisor {
    grace: Duration,
}

impl Default for SubprocessSupervisor {
    fn default() -> Self {
        Self {
            grace: TERMINATION_GRACE,
        }
    }
}

impl SubprocessSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the SIGTERM→SIGKILL grace period (tests).
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run a tool to completion, timeout, or cancellation.
    ///
    /// Stdout and stderr are captured in full. Timeout and cancellation
    /// terminate the whole process group (SIGTERM, then SIGKILL after the
    /// grace period) and return the partial output with the corresponding
    /// flag set; spawn failures are the only hard errors.
    #[instrument(skip(self, tool, stdin_bytes, cancel), fields(program = %tool.program))]
    pub async fn run(
        &self,
        tool: &ExternalTool,
        stdin_bytes: Option<&[u8]>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let mut cmd = Command::new(&tool.program);
        cmd.args(&tool.args)
            .stdin(if stdin_bytes.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = tool.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &tool.env {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            Error::subprocess(&tool.program, format!("failed to spawn: {e}"))
        })?;

        if let Some(bytes) = stdin_bytes {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(bytes).await.map_err(|e| {
                    Error::subprocess(&tool.program, format!("failed to write stdin: {e}"))
                })?;
            }
        }

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_task = tokio::spawn(read_to_string(stdout_pipe));
        let stderr_task = tokio::spawn(read_to_string(stderr_pipe));

        let mut timed_out = false;
        let mut cancelled = false;
        let exit_status = tokio::select! {
            status = child.wait() => Some(status.map_err(|e| {
                Error::subprocess(&tool.program, format!("wait failed: {e}"))
            })?),
            _ = tokio::time::sleep(timeout) => {
                timed_out = true;
                None
            }
            _ = cancel.cancelled() => {
                cancelled = true;
                None
            }
        };

        if exit_status.is_none() {
            warn!(
                program = %tool.program,
                timed_out,
                "terminating subprocess group"
            );
            self.terminate(&mut child).await;
        }

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        let duration_ms = start.elapsed().as_millis() as u64;

        let mut output = ToolOutput {
            stdout,
            stderr,
            exit_code: exit_status.and_then(|s| s.code()),
            duration_ms,
            timed_out,
            cancelled,
            token_usage: None,
        };
        output.token_usage = parse_token_usage(&output.combined());

        debug!(
            exit_code = ?output.exit_code,
            duration_ms,
            timed_out,
            "subprocess finished"
        );
        Ok(output)
    }

    /// SIGTERM the process group, wait out the grace period, then SIGKILL
    /// whatever is left.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        if let Some(pid) = child.id() {
            // Negative pid signals the whole process group.
            unsafe {
                libc::kill(-(pid as i32), libc::SIGTERM);
            }
            let deadline = tokio::time::sleep(self.grace);
            tokio::pin!(deadline);
            tokio::select! {
                _ = child.wait() => return,
                _ = &mut deadline => {}
            }
            unsafe {
                libc::kill(-(pid as i32), libc::SIGKILL);
            }
        }
        let _ = child.kill().await;
        let _ = child.wait().await;
    }
}

async fn read_to_string(pipe: Option<impl tokio::io::AsyncRead + Unpin>) -> String {
    use tokio::io::AsyncReadExt;
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf).await;
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Scan combined output for token usage.
///
/// Two surfaces are recognized: a JSON `"usage"` object carrying
/// `input_tokens`/`prompt_tokens` and `output_tokens`/`completion_tokens`,
/// or a plain `total tokens: N` line. Returns None when neither appears, in
/// which case token metrics are omitted from the execution log.
pub fn parse_token_usage(combined: &str) -> Option<TokenUsage> {
    if combined.contains("\"usage\"") {
        let input_re = Regex::new(r#""(?:input_tokens|prompt_tokens)"\s*:\s*(\d+)"#).unwrap();
        let output_re =
            Regex::new(r#""(?:output_tokens|completion_tokens)"\s*:\s*(\d+)"#).unwrap();
        let input = input_re
            .captures(combined)
            .and_then(|c| c[1].parse::<u64>().ok());
        let output = output_re
            .captures(combined)
            .and_then(|c| c[1].parse::<u64>().ok());
        if input.is_some() || output.is_some() {
            let input_tokens = input.unwrap_or(0);
            let output_tokens = output.unwrap_or(0);
            return Some(TokenUsage {
                input_tokens,
                output_tokens,
                total_tokens: input_tokens + output_tokens,
            });
        }
    }

    let total_re = Regex::new(r"(?i)total tokens:\s*(\d+)").unwrap();
    if let Some(caps) = total_re.captures(combined) {
        if let Ok(total) = caps[1].parse::<u64>() {
            return Some(TokenUsage {
                input_tokens: 0,
                output_tokens: 0,
                total_tokens: total,
            });
        }
    }

    None
}

/// Parse the last non-empty stdout line as a JSON status envelope.
///
/// Legacy external tools report status by printing a JSON object as their
/// final line; the rest of stdout is advisory log text.
pub fn parse_status_envelope(stdout: &str) -> Option<serde_json::Value> {
    let line = stdout.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str(line.trim()).ok()
}
