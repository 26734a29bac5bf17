//! File naming conventions shared by the pipeline stages.
//!
//! Everything here is pure path arithmetic; nothing touches the filesystem.

use std::path::{Path, PathBuf};

/// Name of the JSON report written at the end of `run`.
pub const REPORT_FILE: &str = "pipeline_report.json";
pub const CORPUS_FILE: &str = "failure_corpus.md";
pub const SUMMARY_FILE: &str = "category_summaries.md";
pub const OPTIMISED_PROMPT_FILE: &str = "optimised_prompt.md";
pub const PROMPT_DIFF_FILE: &str = "prompt.diff";

/// Derives every per-run and optimiser path from a handful of settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RunLayout {
    trajectories_root: PathBuf,
    results_root: PathBuf,
    optimizer_dir: PathBuf,
    model_name: String,
    score_threshold: u8,
}

impl RunLayout {
    pub fn new(
        trajectories_root: impl AsRef<Path>,
        results_root: impl AsRef<Path>,
        optimizer_dir: impl AsRef<Path>,
        model_name: impl Into<String>,
        score_threshold: u8,
    ) -> Self {
        Self {
            trajectories_root: trajectories_root.as_ref().to_path_buf(),
            results_root: results_root.as_ref().to_path_buf(),
            optimizer_dir: optimizer_dir.as_ref().to_path_buf(),
            model_name: model_name.into(),
            score_threshold,
        }
    }

    /// `{trajectories_root}/tr{run}`; runs are numbered from 1.
    pub fn run_dir(&self, run: u32) -> PathBuf {
        self.trajectories_root.join(format!("tr{run}"))
    }

    /// `{results_root}/tr{run}`, handed to the harness as `--output_path`.
    pub fn eval_dir(&self, run: u32) -> PathBuf {
        self.results_root.join(format!("tr{run}"))
    }

    /// The JSONL results file the harness writes into [`Self::eval_dir`].
    pub fn eval_results_path(&self, run: u32) -> PathBuf {
        self.eval_dir(run)
            .join(format!("{}_auto_eval_results.json", self.artifact_stem()))
    }

    pub fn error_path(&self, run: u32) -> PathBuf {
        self.eval_dir(run)
            .join(format!("{}_errors.json", self.artifact_stem()))
    }

    /// CSV of failed tasks produced by the statistics step.
    pub fn failed_tasks_csv(&self, run: u32) -> PathBuf {
        self.eval_dir(run)
            .join(format!("{}_failed_tasks.csv", self.artifact_stem()))
    }

    pub fn report_path(&self) -> PathBuf {
        self.results_root.join(REPORT_FILE)
    }

    pub fn corpus_md(&self) -> PathBuf {
        self.optimizer_dir.join(CORPUS_FILE)
    }

    pub fn summary_md(&self) -> PathBuf {
        self.optimizer_dir.join(SUMMARY_FILE)
    }

    pub fn optimised_prompt(&self) -> PathBuf {
        self.optimizer_dir.join(OPTIMISED_PROMPT_FILE)
    }

    pub fn prompt_diff(&self) -> PathBuf {
        self.optimizer_dir.join(PROMPT_DIFF_FILE)
    }

    pub fn optimizer_dir(&self) -> &Path {
        &self.optimizer_dir
    }

    /// The harness joins its raw `--model` value into the path, so a
    /// name like `openai/gpt-4o` lands in an `openai/` sub-directory.
    fn artifact_stem(&self) -> String {
        format!("{}_score_threshold_{}", self.model_name, self.score_threshold)
    }
}
