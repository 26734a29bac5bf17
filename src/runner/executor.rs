//! Step executor - spawns external programs and enforces fail-fast.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::invocation::Invocation;
use crate::error::ProcessError;

/// Record of a step that ran to a zero exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub label: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

impl StepOutcome {
    pub fn new(label: impl Into<String>, exit_code: i32, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            label: label.into(),
            exit_code,
            duration_ms: duration.as_millis() as u64,
            started_at: now - chrono::Duration::from_std(duration).unwrap_or_default(),
        }
    }
}

/// Something that can run an [`Invocation`] to completion.
///
/// Implementations must return `Err` for any exit other than zero so the
/// pipelines can stop at the first failing step.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> Result<StepOutcome, ProcessError>;
}

/// Runs invocations as child processes with inherited stdio.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        timeout: Option<Duration>,
    ) -> Result<StepOutcome, ProcessError> {
        let label = invocation.label.clone();
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (key, value) in &invocation.envs {
            cmd.env(key, value);
        }

        info!(step = %label, "Running: {}", invocation);
        let start = Instant::now();

        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            label: label.clone(),
            program: invocation.program.clone(),
            source,
        })?;

        let status = match timeout {
            Some(limit) => {
                let waited = tokio::time::timeout(limit, child.wait()).await;
                match waited {
                    Ok(status) => status?,
                    Err(_) => {
                        warn!(step = %label, ?limit, "Step timed out, killing child");
                        if let Err(e) = child.kill().await {
                            debug!(step = %label, "Kill after timeout failed: {}", e);
                        }
                        return Err(ProcessError::Timeout {
                            label,
                            timeout: limit,
                        });
                    }
                }
            }
            None => child.wait().await?,
        };

        let duration = start.elapsed();
        match status.code() {
            Some(0) => {
                info!(
                    step = %label,
                    exit_code = 0,
                    duration_ms = duration.as_millis() as u64,
                    "Step finished"
                );
                Ok(StepOutcome::new(label, 0, duration))
            }
            Some(code) => {
                warn!(step = %label, exit_code = code, "Step failed");
                Err(ProcessError::NonZeroExit { label, code })
            }
            None => Err(ProcessError::Terminated { label }),
        }
    }
}
