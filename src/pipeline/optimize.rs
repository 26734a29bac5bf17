//! Three-stage prompt optimisation over judged results.
//!
//! categorize -> summarize -> propose, each stage consuming the previous
//! stage's `--out` file. The crate only sequences the stages and diffs the
//! proposed prompt against the current one.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use similar::TextDiff;
use tracing::info;

use super::config::{PipelineConfig, GOOGLE_API_KEY_ENV};
use super::UNSET;
use crate::error::PipelineError;
use crate::runner::{CommandRunner, Invocation, InvocationView, StepOutcome};

pub const CATEGORIZE_STEP: &str = "categorize";
pub const SUMMARIZE_STEP: &str = "summarize";
pub const PROPOSE_STEP: &str = "propose";

/// Printed in place of a diff when the proposal equals the current prompt.
pub const NO_CHANGES: &str = "<no changes proposed>";

/// The planned optimiser stages and the files they exchange.
#[derive(Debug, Clone)]
pub struct OptimizePlan {
    pub results_jsonl: PathBuf,
    pub prompt_file: PathBuf,
    pub corpus_md: PathBuf,
    pub summary_md: PathBuf,
    pub optimised_prompt: PathBuf,
    pub prompt_diff: PathBuf,
    pub optimizer_dir: PathBuf,
    pub stages: Vec<Invocation>,
    has_key: bool,
    timeout_secs: Option<u64>,
}

/// Secret-free rendering of an [`OptimizePlan`].
#[derive(Debug, Clone, Serialize)]
pub struct OptimizePlanView {
    pub results_jsonl: PathBuf,
    pub prompt_file: PathBuf,
    pub optimised_prompt: PathBuf,
    pub prompt_diff: PathBuf,
    pub stages: Vec<InvocationView>,
}

/// Unified diff between the current and the proposed prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptDiff {
    pub changed: bool,
    pub unified: String,
}

impl PromptDiff {
    pub fn between(current: &str, proposed: &str) -> Self {
        let current = normalize_lines(current);
        let proposed = normalize_lines(proposed);
        let changed = current != proposed;
        let unified = if changed {
            TextDiff::from_lines(&current, &proposed)
                .unified_diff()
                .header("current_prompt", "optimised_prompt")
                .to_string()
        } else {
            String::new()
        };
        Self { changed, unified }
    }

    /// What gets printed after the propose stage.
    pub fn render(&self) -> &str {
        if self.changed {
            &self.unified
        } else {
            NO_CHANGES
        }
    }
}

/// Outcome of a completed optimisation.
#[derive(Debug, Clone, Serialize)]
pub struct OptimizeOutcome {
    pub steps: Vec<StepOutcome>,
    pub optimised_prompt: PathBuf,
    pub prompt_diff: PathBuf,
    pub diff: PromptDiff,
}

impl OptimizePlan {
    /// Plans the stages; `results_jsonl` defaults to the last run's results.
    pub fn new(config: &PipelineConfig, results_jsonl: Option<PathBuf>) -> Self {
        let layout = config.layout();
        let results_jsonl = results_jsonl.unwrap_or_else(|| layout.eval_results_path(config.runs));
        let corpus_md = layout.corpus_md();
        let summary_md = layout.summary_md();
        let optimised_prompt = layout.optimised_prompt();
        let key = config
            .google_api_key
            .as_ref()
            .map_or(UNSET, |k| k.expose());

        let stage = |label: &str, script: &Path| {
            Invocation::new(label, &config.python)
                .path_arg(script)
                .env(GOOGLE_API_KEY_ENV, key)
        };

        let stages = vec![
            stage(CATEGORIZE_STEP, &config.scripts.categorize)
                .path_flag("--jsonl", &results_jsonl)
                .path_flag("--out", &corpus_md),
            stage(SUMMARIZE_STEP, &config.scripts.summarize)
                .path_flag("--corpus_md", &corpus_md)
                .path_flag("--out", &summary_md),
            stage(PROPOSE_STEP, &config.scripts.propose)
                .path_flag("--prompt_file", &config.prompt_file)
                .path_flag("--summary_md", &summary_md)
                .path_flag("--out", &optimised_prompt),
        ];

        Self {
            results_jsonl,
            prompt_file: config.prompt_file.clone(),
            corpus_md,
            summary_md,
            optimised_prompt,
            prompt_diff: layout.prompt_diff(),
            optimizer_dir: layout.optimizer_dir().to_path_buf(),
            stages,
            has_key: config.google_api_key.is_some(),
            timeout_secs: config.step_timeout_secs,
        }
    }

    pub fn view(&self) -> OptimizePlanView {
        OptimizePlanView {
            results_jsonl: self.results_jsonl.clone(),
            prompt_file: self.prompt_file.clone(),
            optimised_prompt: self.optimised_prompt.clone(),
            prompt_diff: self.prompt_diff.clone(),
            stages: self.stages.iter().map(Invocation::view).collect(),
        }
    }

    /// Checks the key and both inputs before anything is spawned.
    pub fn preflight(&self) -> Result<(), PipelineError> {
        if !self.has_key {
            return Err(PipelineError::MissingApiKey(GOOGLE_API_KEY_ENV));
        }
        for input in [&self.results_jsonl, &self.prompt_file] {
            if !input.is_file() {
                return Err(PipelineError::MissingInput(input.clone()));
            }
        }
        Ok(())
    }

    /// Runs the stages in order, stopping at the first failure, then
    /// writes and returns the prompt diff.
    pub async fn execute(
        &self,
        runner: &dyn CommandRunner,
    ) -> Result<OptimizeOutcome, PipelineError> {
        self.preflight()?;
        fs::create_dir_all(&self.optimizer_dir)?;

        let timeout = self.timeout_secs.map(std::time::Duration::from_secs);
        let mut steps = Vec::with_capacity(self.stages.len());
        for stage in &self.stages {
            steps.push(runner.run(stage, timeout).await?);
        }

        if !self.optimised_prompt.exists() {
            return Err(PipelineError::MissingArtifact {
                step: PROPOSE_STEP.to_string(),
                path: self.optimised_prompt.clone(),
            });
        }

        let current = fs::read_to_string(&self.prompt_file)?;
        let proposed = fs::read_to_string(&self.optimised_prompt)?;
        let diff = PromptDiff::between(&current, &proposed);
        fs::write(&self.prompt_diff, &diff.unified)?;

        info!(
            changed = diff.changed,
            prompt = %self.optimised_prompt.display(),
            diff = %self.prompt_diff.display(),
            "Prompt optimisation finished"
        );

        Ok(OptimizeOutcome {
            steps,
            optimised_prompt: self.optimised_prompt.clone(),
            prompt_diff: self.prompt_diff.clone(),
            diff,
        })
    }
}

/// Strips trailing whitespace per line so editor noise does not count as a change.
fn normalize_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProcessError;
    use crate::runner::executor::fake::RecordingRunner;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PipelineConfig, PathBuf) {
        let temp = TempDir::new().unwrap();
        let mut config = PipelineConfig::default().with_api_keys("g-key", "o-key");
        config.optimizer_dir = temp.path().join("output");
        config.prompt_file = temp.path().join("system_prompt.md");
        fs::write(&config.prompt_file, "You are a web agent.\nBe careful.\n").unwrap();

        let jsonl = temp.path().join("results.json");
        fs::write(&jsonl, "{\"task_id\":\"a\",\"predicted_label\":0}\n").unwrap();
        (temp, config, jsonl)
    }

    #[test]
    fn test_stages_chain_outputs() {
        let config = PipelineConfig::default();
        let plan = OptimizePlan::new(&config, Some(PathBuf::from("r.json")));
        let [categorize, summarize, propose] = &plan.stages[..] else {
            panic!("expected three stages");
        };

        assert_eq!(categorize.value_of("--jsonl"), Some("r.json"));
        assert_eq!(categorize.value_of("--out"), summarize.value_of("--corpus_md"));
        assert_eq!(summarize.value_of("--out"), propose.value_of("--summary_md"));
        assert_eq!(
            propose.value_of("--out"),
            Some("./auto-optimizer/output/optimised_prompt.md")
        );
        assert_eq!(propose.value_of("--prompt_file"), Some("agent/system_prompt.md"));
        for stage in &plan.stages {
            assert_eq!(stage.envs[0].0, "GOOGLE_API_KEY");
        }
    }

    #[test]
    fn test_default_input_is_last_run() {
        let config = PipelineConfig::default().with_runs(2);
        let plan = OptimizePlan::new(&config, None);
        assert_eq!(
            plan.results_jsonl,
            PathBuf::from("./eval_results/tr2/o4-mini_score_threshold_3_auto_eval_results.json")
        );
    }

    #[test]
    fn test_diff_reports_changes() {
        let diff = PromptDiff::between("a\nb\n", "a\nc\n");
        assert!(diff.changed);
        assert!(diff.unified.contains("--- current_prompt"));
        assert!(diff.unified.contains("+++ optimised_prompt"));
        assert!(diff.unified.contains("-b"));
        assert!(diff.unified.contains("+c"));
    }

    #[test]
    fn test_diff_ignores_trailing_whitespace() {
        let diff = PromptDiff::between("a\nb", "a  \nb\n");
        assert!(!diff.changed);
        assert_eq!(diff.render(), NO_CHANGES);
    }

    #[tokio::test]
    async fn test_execute_writes_diff() {
        let (_temp, config, jsonl) = setup();
        let plan = OptimizePlan::new(&config, Some(jsonl));
        let out = plan.optimised_prompt.clone();
        let runner = RecordingRunner::new().with_effect(move |inv: &Invocation| {
            if inv.label == PROPOSE_STEP {
                fs::write(&out, "You are a web agent.\nVerify filters.\n").unwrap();
            }
        });

        let outcome = plan.execute(&runner).await.unwrap();
        assert_eq!(runner.labels(), vec!["categorize", "summarize", "propose"]);
        assert!(outcome.diff.changed);
        let written = fs::read_to_string(&plan.prompt_diff).unwrap();
        assert!(written.contains("+Verify filters."));
    }

    #[tokio::test]
    async fn test_execute_stops_on_failed_stage() {
        let (_temp, config, jsonl) = setup();
        let plan = OptimizePlan::new(&config, Some(jsonl));
        let runner = RecordingRunner::new().failing_on(SUMMARIZE_STEP);

        let err = plan.execute(&runner).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Process(ProcessError::NonZeroExit { .. })
        ));
        assert_eq!(runner.labels(), vec!["categorize", "summarize"]);
    }

    #[tokio::test]
    async fn test_missing_input_spawns_nothing() {
        let (temp, config, _jsonl) = setup();
        let plan = OptimizePlan::new(&config, Some(temp.path().join("absent.json")));
        let runner = RecordingRunner::new();

        let err = plan.execute(&runner).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput(_)));
        assert!(runner.labels().is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_spawns_nothing() {
        let (_temp, mut config, jsonl) = setup();
        config.google_api_key = None;
        let plan = OptimizePlan::new(&config, Some(jsonl));
        let runner = RecordingRunner::new();

        let err = plan.execute(&runner).await.unwrap_err();
        assert!(matches!(err, PipelineError::MissingApiKey("GOOGLE_API_KEY")));
        assert!(runner.labels().is_empty());
    }
}
