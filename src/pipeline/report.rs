//! Run report written at the end of `run`, whether it succeeded or not.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::config::PipelineConfig;
use crate::error::PipelineError;
use crate::runner::StepOutcome;
use crate::stats::{mean_success_rate, StatsSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportStatus::Running => write!(f, "running"),
            ReportStatus::Succeeded => write!(f, "succeeded"),
            ReportStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Everything recorded for one `tr{i}` repetition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run: u32,
    pub run_dir: PathBuf,
    pub eval_results: PathBuf,
    pub failed_tasks_csv: PathBuf,
    pub steps: Vec<StepOutcome>,
    /// Trajectory outcome counts, keyed by outcome name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trajectories: Option<BTreeMap<String, usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<StatsSummary>,
}

/// Top-level `pipeline_report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub status: ReportStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub model_name: String,
    pub eval_model: String,
    pub score_threshold: u8,
    pub runs_planned: u32,
    pub runs: Vec<RunRecord>,
    pub mean_success_rate: Option<f64>,
    pub error: Option<String>,
}

impl PipelineReport {
    pub fn start(config: &PipelineConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: ReportStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            model_name: config.model_name.clone(),
            eval_model: config.eval_model.clone(),
            score_threshold: config.score_threshold,
            runs_planned: config.runs,
            runs: Vec::new(),
            mean_success_rate: None,
            error: None,
        }
    }

    /// Marks the report finished and computes the cross-run aggregate.
    pub fn finish(&mut self, error: Option<String>) {
        self.finished_at = Some(Utc::now());
        self.status = if error.is_some() {
            ReportStatus::Failed
        } else {
            ReportStatus::Succeeded
        };
        self.error = error;
        self.mean_success_rate =
            mean_success_rate(self.runs.iter().filter_map(|r| r.stats.as_ref()));
    }

    pub fn completed_runs(&self) -> usize {
        self.runs.iter().filter(|r| r.stats.is_some()).count()
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}
