//! CLI command definitions for mw2-pipeline.
//!
//! `run` and `optimize` replace the `full_pipeline.sh` and
//! `auto_optimize.sh` wrappers; `stats`, `trajectories` and `plan` inspect
//! results and configuration without running anything.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::pipeline::{
    BenchmarkPipeline, OptimizePlan, OptimizePlanView, PipelineConfig, PipelineReport,
    RunPlanView,
};
use crate::runner::ProcessRunner;
use crate::stats::EvalStats;
use crate::trajectory::{self, TrajectoryReport};

/// Default output path of `stats`, relative to the working directory.
const DEFAULT_STATS_CSV: &str = "failed_tasks.csv";

/// Benchmark and prompt-optimisation driver for the Online-Mind2Web agent.
#[derive(Parser)]
#[command(name = "mw2-pipeline")]
#[command(about = "Run Online-Mind2Web benchmark repetitions and the prompt optimiser")]
#[command(version)]
#[command(
    long_about = "mw2-pipeline sequences the trace generator, the Online-Mind2Web auto-evaluation harness and the prompt optimiser scripts.\n\nExample usage:\n  mw2-pipeline run --runs 3 --model gemini-2.5-flash\n  mw2-pipeline optimize\n  mw2-pipeline stats eval_results/tr1/o4-mini_score_threshold_3_auto_eval_results.json"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,

    /// YAML configuration file; environment and flags override it.
    #[arg(short, long, global = true, env = "MW2_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate trajectories and auto-evaluate them, once per repetition.
    #[command(alias = "pipeline")]
    Run(RunArgs),

    /// Categorize failures, summarise them and propose a revised prompt.
    #[command(alias = "opt")]
    Optimize(OptimizeArgs),

    /// Summarise an auto-evaluation results file and export failed tasks.
    Stats(StatsArgs),

    /// Inspect the trajectories recorded in one run directory.
    Trajectories(TrajectoriesArgs),

    /// Print the resolved configuration and both plans as JSON.
    Plan,
}

/// Arguments for `mw2-pipeline run`.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Agent model used for trace generation.
    #[arg(short = 'm', long)]
    pub model: Option<String>,

    /// Judge model used by the evaluation harness.
    #[arg(long)]
    pub eval_model: Option<String>,

    /// Agent sampling temperature.
    #[arg(short = 't', long)]
    pub temperature: Option<f64>,

    /// Judge key-point score threshold (1-5).
    #[arg(long)]
    pub score_threshold: Option<u8>,

    /// Worker count forwarded to the harness.
    #[arg(short = 'w', long)]
    pub num_workers: Option<usize>,

    /// Number of trace + evaluation repetitions.
    #[arg(short = 'n', long)]
    pub runs: Option<u32>,

    /// Task id to resume trace generation from.
    #[arg(long)]
    pub start_id: Option<String>,

    /// Run the agent in hierarchical mode.
    #[arg(long)]
    pub hierarchical: bool,

    /// Print the planned commands without running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Output JSON instead of human-readable text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(model) = &self.model {
            config.model_name = model.clone();
        }
        if let Some(model) = &self.eval_model {
            config.eval_model = model.clone();
        }
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
        if let Some(s) = self.score_threshold {
            config.score_threshold = s;
        }
        if let Some(n) = self.num_workers {
            config.num_workers = n;
        }
        if let Some(n) = self.runs {
            config.runs = n;
        }
        if let Some(id) = &self.start_id {
            config.start_id = Some(id.clone());
        }
        if self.hierarchical {
            config.hierarchical = true;
        }
    }
}

/// Arguments for `mw2-pipeline optimize`.
#[derive(Parser, Debug, Default)]
pub struct OptimizeArgs {
    /// Auto-evaluation JSONL to optimise against (default: last run's results).
    #[arg(long)]
    pub jsonl: Option<PathBuf>,

    /// The system prompt to revise.
    #[arg(long)]
    pub prompt_file: Option<PathBuf>,

    /// Where the corpus, summaries, proposal and diff are written.
    #[arg(long)]
    pub optimizer_dir: Option<PathBuf>,

    /// Print the planned commands without running them.
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for `mw2-pipeline stats`.
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// JSON lines file written by the evaluation harness.
    pub jsonl: PathBuf,

    /// CSV file receiving the failed tasks.
    #[arg(long, default_value = DEFAULT_STATS_CSV)]
    pub csv_output: PathBuf,

    /// Output JSON instead of human-readable text.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `mw2-pipeline trajectories`.
#[derive(Parser, Debug)]
pub struct TrajectoriesArgs {
    /// A run directory such as `./trajectories/tr1`.
    pub dir: PathBuf,

    /// Output JSON instead of a table.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Parse CLI arguments and return the Cli struct.
///
/// This allows main.rs to access CLI arguments (like log_level) before running commands.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run(args) => run_pipeline_command(config_path, args).await?,
        Commands::Optimize(args) => run_optimize_command(config_path, args).await?,
        Commands::Stats(args) => run_stats_command(args)?,
        Commands::Trajectories(args) => run_trajectories_command(args)?,
        Commands::Plan => run_plan_command(config_path)?,
    }
    Ok(())
}

/// Loads file + environment settings, lets `overrides` apply flags, then validates.
fn resolve_config(
    path: Option<&Path>,
    overrides: impl FnOnce(&mut PipelineConfig),
) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load(path)?;
    overrides(&mut config);
    config.validate()?;
    Ok(config)
}

// ============================================================================
// run
// ============================================================================

async fn run_pipeline_command(config_path: Option<&Path>, args: RunArgs) -> anyhow::Result<()> {
    let config = resolve_config(config_path, |c| args.apply(c))?;
    let pipeline = BenchmarkPipeline::new(config);

    if args.dry_run {
        if args.json {
            let views: Vec<RunPlanView> = pipeline.plans().iter().map(|p| p.view()).collect();
            println!("{}", serde_json::to_string_pretty(&views)?);
        } else {
            for plan in pipeline.plans() {
                println!("# run {} -> {}", plan.run, plan.run_dir.display());
                println!("{}", plan.trace);
                println!("{}", plan.evaluate);
                println!();
            }
        }
        return Ok(());
    }

    info!(
        runs = pipeline.config().runs,
        model = %pipeline.config().model_name,
        eval_model = %pipeline.config().eval_model,
        "Running benchmark pipeline"
    );
    let report = pipeline.execute(&ProcessRunner::new()).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

fn render_report(report: &PipelineReport) -> String {
    let mut out = String::new();
    out.push_str("\n=== Benchmark Results ===\n");
    out.push_str(&format!("Run id:        {}\n", report.run_id));
    out.push_str(&format!("Agent model:   {}\n", report.model_name));
    out.push_str(&format!("Judge model:   {}\n", report.eval_model));
    out.push_str(&format!(
        "Runs:          {}/{}\n",
        report.completed_runs(),
        report.runs_planned
    ));
    for run in &report.runs {
        if let Some(stats) = &run.stats {
            out.push_str(&format!(
                "  tr{}: {}/{} successful ({})\n",
                run.run,
                stats.successful_tasks,
                stats.total_tasks,
                format_percent(stats.success_rate)
            ));
            out.push_str(&format!("    failed tasks: {}\n", run.failed_tasks_csv.display()));
        }
    }
    out.push_str(&format!(
        "Mean success rate: {}\n",
        format_percent(report.mean_success_rate)
    ));
    out
}

fn format_percent(rate: Option<f64>) -> String {
    rate.map_or_else(|| "n/a".to_string(), |r| format!("{r:.2}%"))
}

// ============================================================================
// optimize
// ============================================================================

async fn run_optimize_command(
    config_path: Option<&Path>,
    args: OptimizeArgs,
) -> anyhow::Result<()> {
    let config = resolve_config(config_path, |c| {
        if let Some(prompt) = &args.prompt_file {
            c.prompt_file = prompt.clone();
        }
        if let Some(dir) = &args.optimizer_dir {
            c.optimizer_dir = dir.clone();
        }
    })?;
    let plan = OptimizePlan::new(&config, args.jsonl.clone());

    if args.dry_run {
        for stage in &plan.stages {
            println!("{stage}");
        }
        return Ok(());
    }

    info!(input = %plan.results_jsonl.display(), "Running prompt optimiser");
    let outcome = plan.execute(&ProcessRunner::new()).await?;

    println!("{}", outcome.diff.render());
    println!("Optimised prompt: {}", outcome.optimised_prompt.display());
    println!("Diff:             {}", outcome.prompt_diff.display());
    Ok(())
}

// ============================================================================
// stats
// ============================================================================

fn run_stats_command(args: StatsArgs) -> anyhow::Result<()> {
    let stats = EvalStats::from_jsonl(&args.jsonl)?;
    stats.write_failed_csv(&args.csv_output)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats.summary())?);
    } else {
        print!("{}", render_stats(&stats, &args.csv_output));
    }
    Ok(())
}

/// Human-readable statistics, failed ids first.
fn render_stats(stats: &EvalStats, csv_output: &Path) -> String {
    let mut out = String::from("Unsuccessful task_ids:\n");
    for record in &stats.failed {
        out.push_str(&record.task_id);
        out.push('\n');
    }

    out.push_str("\nSummary:\n");
    out.push_str(&format!("Total tasks: {}\n", stats.total_tasks));
    out.push_str(&format!("Successful tasks: {}\n", stats.successful_tasks));
    if let (Some(rate), Some(steps)) = (stats.success_rate(), stats.average_steps()) {
        out.push_str(&format!("Success rate: {rate:.2}%\n"));
        out.push_str(&format!("Average steps per task: {steps:.2}\n"));
    }
    if stats.skipped_lines > 0 {
        out.push_str(&format!("Skipped invalid lines: {}\n", stats.skipped_lines));
    }

    out.push_str(&format!(
        "\nFailed task details written to CSV: {}\n",
        csv_output.display()
    ));
    out
}

// ============================================================================
// trajectories
// ============================================================================

fn run_trajectories_command(args: TrajectoriesArgs) -> anyhow::Result<()> {
    let report = trajectory::scan(&args.dir)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_trajectories(&report));
    }
    Ok(())
}

fn render_trajectories(report: &TrajectoryReport) -> String {
    let mut out = format!(
        "{:<10} {:<40} {:<11} {:>5} {:>5} {:>8}\n",
        "LEVEL", "TASK_ID", "OUTCOME", "STEPS", "SHOTS", "SUBTASKS"
    );
    for task in &report.tasks {
        let subtasks = match (task.subtasks_done, task.subtasks_total) {
            (Some(done), Some(total)) => format!("{done}/{total}"),
            _ => "-".to_string(),
        };
        out.push_str(&format!(
            "{:<10} {:<40} {:<11} {:>5} {:>5} {:>8}\n",
            task.level,
            task.task_id,
            task.outcome.to_string(),
            task.steps,
            task.screenshots,
            subtasks
        ));
    }

    out.push_str(&format!("\n{} tasks in {}\n", report.total(), report.run_dir.display()));
    for (outcome, count) in report.counts() {
        out.push_str(&format!("  {outcome}: {count}\n"));
    }
    out
}

// ============================================================================
// plan
// ============================================================================

#[derive(Serialize)]
struct PlanOutput {
    config: PipelineConfig,
    benchmark: Vec<RunPlanView>,
    optimize: OptimizePlanView,
}

fn run_plan_command(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = resolve_config(config_path, |_| {})?;
    let benchmark = BenchmarkPipeline::plan(&config)
        .iter()
        .map(|p| p.view())
        .collect();
    let optimize = OptimizePlan::new(&config, None).view();

    let output = PlanOutput {
        config,
        benchmark,
        optimize,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
