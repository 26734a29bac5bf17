//! Pipeline configuration for the benchmark and optimisation loops.
//!
//! Settings are layered, lowest precedence first: built-in defaults, an
//! optional YAML file, environment variables, then CLI flags (applied by
//! the caller before [`PipelineConfig::validate`]).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::layout::RunLayout;
use crate::error::ConfigError;

/// Environment variable holding the Google (Gemini) API key.
pub const GOOGLE_API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Environment variable holding the OpenAI API key used by the judge.
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// An API key that never shows up in debug output or serialized config.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key for handing to a child process.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Locations of the external entry points, relative to the working directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScriptPaths {
    /// Trace generation (`run_online_mw2.py`).
    pub trace: PathBuf,
    /// Online-Mind2Web auto-evaluation harness.
    pub eval: PathBuf,
    /// Failure categorisation into a Markdown corpus.
    pub categorize: PathBuf,
    /// Per-category failure summarisation.
    pub summarize: PathBuf,
    /// Prompt edit proposal.
    pub propose: PathBuf,
}

impl Default for ScriptPaths {
    fn default() -> Self {
        Self {
            trace: PathBuf::from("run_online_mw2.py"),
            eval: PathBuf::from("Online-Mind2Web/src/run.py"),
            categorize: PathBuf::from("auto-optimizer/analyze_results.py"),
            summarize: PathBuf::from("auto-optimizer/summarize_categories_failures.py"),
            propose: PathBuf::from("auto-optimizer/auto_prompt_optimizer.py"),
        }
    }
}

/// Configuration shared by `run` and `optimize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Agent model used for trace generation.
    pub model_name: String,
    /// Judge model passed to the evaluation harness.
    pub eval_model: String,
    /// Agent sampling temperature.
    pub temperature: f64,
    /// Key-point score threshold used by the judge (1-5).
    pub score_threshold: u8,
    /// Worker count forwarded to the harness as `--num_worker`.
    pub num_workers: usize,
    /// How many times the trace + evaluation pair is repeated.
    pub runs: u32,
    /// Task id to resume trace generation from.
    pub start_id: Option<String>,
    /// Run the agent in hierarchical (planner + checklist) mode.
    pub hierarchical: bool,
    /// Interpreter used to launch every script.
    pub python: String,
    pub scripts: ScriptPaths,
    /// Root under which `tr{i}` trajectory directories are created.
    pub trajectories_root: PathBuf,
    /// Root under which per-run evaluation artifacts are written.
    pub results_root: PathBuf,
    /// Directory for optimiser artifacts.
    pub optimizer_dir: PathBuf,
    /// The agent system prompt the optimiser revises.
    pub prompt_file: PathBuf,
    /// Per-step wall clock limit; unset means wait indefinitely.
    pub step_timeout_secs: Option<u64>,

    #[serde(skip)]
    pub google_api_key: Option<ApiKey>,
    #[serde(skip)]
    pub openai_api_key: Option<ApiKey>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_name: "gemini-2.5-flash".to_string(),
            eval_model: "o4-mini".to_string(),
            temperature: 0.2,
            score_threshold: 3,
            num_workers: 1,
            runs: 3,
            start_id: None,
            hierarchical: false,
            python: "python3".to_string(),
            scripts: ScriptPaths::default(),
            trajectories_root: PathBuf::from("./trajectories"),
            results_root: PathBuf::from("./eval_results"),
            optimizer_dir: PathBuf::from("./auto-optimizer/output"),
            prompt_file: PathBuf::from("agent/system_prompt.md"),
            step_timeout_secs: None,
            google_api_key: None,
            openai_api_key: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults, then the YAML file (if any), then the process environment.
    ///
    /// Validation is left to the caller so CLI overrides can be applied first.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Reads a YAML config file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// # Environment Variables
    ///
    /// - `GOOGLE_API_KEY`: agent and optimiser key
    /// - `OPENAI_API_KEY`: judge key
    /// - `MW2_MODEL`: agent model
    /// - `MW2_EVAL_MODEL`: judge model
    /// - `MW2_RUNS`: number of repetitions
    /// - `MW2_SCORE_THRESHOLD`: judge score threshold
    /// - `MW2_NUM_WORKERS`: harness worker count
    /// - `MW2_TEMPERATURE`: agent temperature
    /// - `MW2_PYTHON`: interpreter
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty(GOOGLE_API_KEY_ENV) {
            self.google_api_key = Some(ApiKey::new(key));
        }
        if let Some(key) = non_empty(OPENAI_API_KEY_ENV) {
            self.openai_api_key = Some(ApiKey::new(key));
        }
        if let Some(val) = non_empty("MW2_MODEL") {
            self.model_name = val;
        }
        if let Some(val) = non_empty("MW2_EVAL_MODEL") {
            self.eval_model = val;
        }
        if let Some(val) = non_empty("MW2_RUNS") {
            self.runs = parse_env_value(&val, "MW2_RUNS")?;
        }
        if let Some(val) = non_empty("MW2_SCORE_THRESHOLD") {
            self.score_threshold = parse_env_value(&val, "MW2_SCORE_THRESHOLD")?;
        }
        if let Some(val) = non_empty("MW2_NUM_WORKERS") {
            self.num_workers = parse_env_value(&val, "MW2_NUM_WORKERS")?;
        }
        if let Some(val) = non_empty("MW2_TEMPERATURE") {
            self.temperature = parse_env_value(&val, "MW2_TEMPERATURE")?;
        }
        if let Some(val) = non_empty("MW2_PYTHON") {
            self.python = val;
        }
        Ok(())
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model_name.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "model_name cannot be empty".to_string(),
            ));
        }

        if self.eval_model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "eval_model cannot be empty".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationFailed(
                "temperature must be between 0.0 and 2.0".to_string(),
            ));
        }

        if !(1..=5).contains(&self.score_threshold) {
            return Err(ConfigError::ValidationFailed(
                "score_threshold must be between 1 and 5".to_string(),
            ));
        }

        if self.num_workers == 0 {
            return Err(ConfigError::ValidationFailed(
                "num_workers must be greater than 0".to_string(),
            ));
        }

        if self.runs == 0 {
            return Err(ConfigError::ValidationFailed(
                "runs must be greater than 0".to_string(),
            ));
        }

        if self.python.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "python interpreter cannot be empty".to_string(),
            ));
        }

        if self.step_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationFailed(
                "step_timeout_secs must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Path layout derived from the current settings.
    ///
    /// Result files are named after the judge model, since that is the
    /// `--model` the harness sees.
    pub fn layout(&self) -> RunLayout {
        RunLayout::new(
            &self.trajectories_root,
            &self.results_root,
            &self.optimizer_dir,
            &self.eval_model,
            self.score_threshold,
        )
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_secs.map(Duration::from_secs)
    }

    /// Builder method to set the agent model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = model.into();
        self
    }

    /// Builder method to set the number of runs.
    pub fn with_runs(mut self, runs: u32) -> Self {
        self.runs = runs;
        self
    }

    /// Builder method to set the judge score threshold.
    pub fn with_score_threshold(mut self, threshold: u8) -> Self {
        self.score_threshold = threshold;
        self
    }

    /// Builder method to set the interpreter.
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Builder method to set both API keys.
    pub fn with_api_keys(mut self, google: impl Into<String>, openai: impl Into<String>) -> Self {
        self.google_api_key = Some(ApiKey::new(google));
        self.openai_api_key = Some(ApiKey::new(openai));
        self
    }
}

/// Parses an environment variable value into the target type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}
