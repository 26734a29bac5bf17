//! Orchestration of the benchmark and prompt-optimisation loops.
//!
//! Neither loop does any model work itself. Each is a fixed sequence of
//! external programs run one at a time through a [`CommandRunner`]:
//!
//! - **Benchmark** ([`BenchmarkPipeline`]): for `tr1..=trN`, generate
//!   trajectories with the agent, then have the Online-Mind2Web judge
//!   score them. Per-run statistics and a failed-task CSV are derived from
//!   the judge's JSONL output, and a `pipeline_report.json` is written.
//! - **Optimize** ([`OptimizePlan`]): categorize failures, summarise each
//!   category, then propose a revised system prompt and diff it against
//!   the current one.
//!
//! Both stop at the first step that fails.
//!
//! # Example
//!
//! ```rust,ignore
//! use mw2_pipeline::pipeline::{BenchmarkPipeline, PipelineConfig};
//! use mw2_pipeline::runner::ProcessRunner;
//!
//! let mut config = PipelineConfig::load(None)?;
//! config.runs = 1;
//! config.validate()?;
//!
//! let report = BenchmarkPipeline::new(config)
//!     .execute(&ProcessRunner::new())
//!     .await?;
//! println!("mean success rate: {:?}", report.mean_success_rate);
//! ```
//!
//! [`CommandRunner`]: crate::runner::CommandRunner

pub mod benchmark;
pub mod config;
pub mod layout;
pub mod optimize;
pub mod report;

/// Rendered in place of an API key that is not configured.
pub const UNSET: &str = "<unset>";

pub use benchmark::{BenchmarkPipeline, RunPlan, RunPlanView, EVAL_STEP, TRACE_STEP};
pub use config::{ApiKey, PipelineConfig, ScriptPaths, GOOGLE_API_KEY_ENV, OPENAI_API_KEY_ENV};
pub use layout::RunLayout;
pub use optimize::{OptimizeOutcome, OptimizePlan, OptimizePlanView, PromptDiff, NO_CHANGES};
pub use report::{PipelineReport, ReportStatus, RunRecord};
