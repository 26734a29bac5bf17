//! The repeated trace-generation + auto-evaluation benchmark loop.
//!
//! Each repetition `i` records trajectories into `tr{i}`, has the
//! Online-Mind2Web harness judge them, then summarises the judged results.
//! Repetitions and steps run strictly in order; the first failing step
//! aborts the whole loop.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use super::config::{PipelineConfig, GOOGLE_API_KEY_ENV, OPENAI_API_KEY_ENV};
use super::report::{PipelineReport, RunRecord};
use super::UNSET;
use crate::error::PipelineError;
use crate::runner::{CommandRunner, Invocation, InvocationView};
use crate::stats::EvalStats;
use crate::trajectory;

pub const TRACE_STEP: &str = "trace";
pub const EVAL_STEP: &str = "auto-eval";

/// The two invocations and derived paths for one repetition.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub run: u32,
    pub run_dir: PathBuf,
    pub eval_dir: PathBuf,
    pub eval_results: PathBuf,
    pub error_path: PathBuf,
    pub failed_tasks_csv: PathBuf,
    pub trace: Invocation,
    pub evaluate: Invocation,
}

impl RunPlan {
    pub fn view(&self) -> RunPlanView {
        RunPlanView {
            run: self.run,
            run_dir: self.run_dir.clone(),
            eval_results: self.eval_results.clone(),
            failed_tasks_csv: self.failed_tasks_csv.clone(),
            steps: vec![self.trace.view(), self.evaluate.view()],
        }
    }
}

/// Secret-free rendering of a [`RunPlan`] for `plan` and `--dry-run --json`.
#[derive(Debug, Clone, Serialize)]
pub struct RunPlanView {
    pub run: u32,
    pub run_dir: PathBuf,
    pub eval_results: PathBuf,
    pub failed_tasks_csv: PathBuf,
    pub steps: Vec<InvocationView>,
}

/// Planned and executable benchmark loop.
pub struct BenchmarkPipeline {
    config: PipelineConfig,
    plans: Vec<RunPlan>,
}

impl BenchmarkPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let plans = Self::plan(&config);
        Self { config, plans }
    }

    pub fn plans(&self) -> &[RunPlan] {
        &self.plans
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Builds the invocations for every repetition without touching the filesystem.
    pub fn plan(config: &PipelineConfig) -> Vec<RunPlan> {
        let layout = config.layout();
        let google_key = config
            .google_api_key
            .as_ref()
            .map_or(UNSET, |k| k.expose());
        let openai_key = config
            .openai_api_key
            .as_ref()
            .map_or(UNSET, |k| k.expose());

        (1..=config.runs)
            .map(|run| {
                let run_dir = layout.run_dir(run);
                let eval_dir = layout.eval_dir(run);
                let error_path = layout.error_path(run);

                let mut trace = Invocation::new(TRACE_STEP, &config.python)
                    .path_arg(&config.scripts.trace)
                    .flag("--start_id", config.start_id.clone().unwrap_or_default())
                    .path_flag("--output_dir", &run_dir)
                    .flag("--model", &config.model_name)
                    .flag("--temperature", config.temperature.to_string())
                    .env(GOOGLE_API_KEY_ENV, google_key);
                if config.hierarchical {
                    trace = trace.switch("--hierarchical");
                }

                let evaluate = Invocation::new(EVAL_STEP, &config.python)
                    .path_arg(&config.scripts.eval)
                    .flag("--model", &config.eval_model)
                    .path_flag("--trajectories_dir", &run_dir)
                    .flag("--api_key", openai_key)
                    .path_flag("--output_path", &eval_dir)
                    .path_flag("--error_path", &error_path)
                    .flag("--num_worker", config.num_workers.to_string())
                    .flag("--score_threshold", config.score_threshold.to_string())
                    .env(OPENAI_API_KEY_ENV, openai_key);

                RunPlan {
                    run,
                    eval_results: layout.eval_results_path(run),
                    failed_tasks_csv: layout.failed_tasks_csv(run),
                    run_dir,
                    eval_dir,
                    error_path,
                    trace,
                    evaluate,
                }
            })
            .collect()
    }

    /// Both keys must be present before anything is spawned.
    pub fn check_api_keys(&self) -> Result<(), PipelineError> {
        if self.config.google_api_key.is_none() {
            return Err(PipelineError::MissingApiKey(GOOGLE_API_KEY_ENV));
        }
        if self.config.openai_api_key.is_none() {
            return Err(PipelineError::MissingApiKey(OPENAI_API_KEY_ENV));
        }
        Ok(())
    }

    /// Runs every repetition and writes `pipeline_report.json`.
    ///
    /// The report is written even when a step fails; the step's error is
    /// then returned unchanged.
    pub async fn execute(
        &self,
        runner: &dyn CommandRunner,
    ) -> Result<PipelineReport, PipelineError> {
        self.check_api_keys()?;

        let mut report = PipelineReport::start(&self.config);
        info!(
            run_id = %report.run_id,
            runs = self.plans.len(),
            model = %self.config.model_name,
            "Starting benchmark pipeline"
        );

        let result = self.execute_runs(runner, &mut report).await;
        report.finish(result.as_ref().err().map(ToString::to_string));

        let report_path = self.config.layout().report_path();
        match result {
            Ok(()) => {
                report.save(&report_path)?;
                info!(
                    path = %report_path.display(),
                    mean_success_rate = ?report.mean_success_rate,
                    "Benchmark pipeline finished"
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(save_err) = report.save(&report_path) {
                    warn!("Failed to write partial report: {}", save_err);
                }
                Err(e)
            }
        }
    }

    async fn execute_runs(
        &self,
        runner: &dyn CommandRunner,
        report: &mut PipelineReport,
    ) -> Result<(), PipelineError> {
        let timeout = self.config.step_timeout();

        for plan in &self.plans {
            fs::create_dir_all(&plan.run_dir)?;
            fs::create_dir_all(&plan.eval_dir)?;

            report.runs.push(RunRecord {
                run: plan.run,
                run_dir: plan.run_dir.clone(),
                eval_results: plan.eval_results.clone(),
                failed_tasks_csv: plan.failed_tasks_csv.clone(),
                steps: Vec::new(),
                trajectories: None,
                stats: None,
            });
            let idx = report.runs.len() - 1;

            info!(run = plan.run, "Generating traces into {}", plan.run_dir.display());
            let outcome = runner.run(&plan.trace, timeout).await?;
            report.runs[idx].steps.push(outcome);
            report.runs[idx].trajectories = summarize_trajectories(plan);

            info!(run = plan.run, "Evaluating {}", plan.run_dir.display());
            let outcome = runner.run(&plan.evaluate, timeout).await?;
            report.runs[idx].steps.push(outcome);

            if !plan.eval_results.exists() {
                return Err(PipelineError::MissingArtifact {
                    step: EVAL_STEP.to_string(),
                    path: plan.eval_results.clone(),
                });
            }

            let stats = EvalStats::from_jsonl(&plan.eval_results)?;
            stats.write_failed_csv(&plan.failed_tasks_csv)?;
            let summary = stats.summary();
            info!(
                run = plan.run,
                total = summary.total_tasks,
                successful = summary.successful_tasks,
                success_rate = ?summary.success_rate,
                csv = %plan.failed_tasks_csv.display(),
                "Run evaluated"
            );
            report.runs[idx].stats = Some(summary);
        }
        Ok(())
    }
}

fn summarize_trajectories(plan: &RunPlan) -> Option<BTreeMap<String, usize>> {
    match trajectory::scan(&plan.run_dir) {
        Ok(report) => {
            let counts: BTreeMap<String, usize> = report
                .counts()
                .into_iter()
                .map(|(outcome, n)| (outcome.to_string(), n))
                .collect();
            info!(run = plan.run, tasks = report.total(), ?counts, "Trajectories recorded");
            Some(counts)
        }
        Err(e) => {
            warn!(run = plan.run, "Could not inspect trajectories: {}", e);
            None
        }
    }
}
