#![allow(dead_code)]

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Trace stand-in: records one finished task under `--output_dir`.
pub const TRACE_SCRIPT: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --output_dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
[ -n "$GOOGLE_API_KEY" ] || exit 3
mkdir -p "$out/medium/task-1/trajectory"
printf '%s' '{"task":"Find a recipe","action_history":["click","type"],"final_result_response":"<done>"}' > "$out/medium/task-1/result.json"
: > "$out/medium/task-1/trajectory/0.png"
"#;

/// Harness stand-in: writes one success and one failure into `--output_path`.
pub const EVAL_SCRIPT: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --output_path) out="$2"; shift 2 ;;
    --model) model="$2"; shift 2 ;;
    --score_threshold) threshold="$2"; shift 2 ;;
    --trajectories_dir) traj="$2"; shift 2 ;;
    *) shift ;;
  esac
done
[ -n "$OPENAI_API_KEY" ] || exit 3
[ -d "$traj/medium/task-1" ] || exit 4
mkdir -p "$out"
{
  echo '{"task_id":"task-1","task":"Find a recipe","predicted_label":1,"image_judge_record":[{},{}]}'
  echo '{"task_id":"task-2","task":"Book a flight","predicted_label":0,"image_judge_record":[{}],"evaluation_details":{"response":"Status: failure"}}'
} > "$out/${model}_score_threshold_${threshold}_auto_eval_results.json"
"#;

pub const FAILING_SCRIPT: &str = "exit 5\n";

/// Optimiser stand-in: copies its input into `--out`, appending a line.
pub const STAGE_SCRIPT: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --jsonl|--corpus_md|--summary_md) input="$2"; shift 2 ;;
    --prompt_file) prompt="$2"; shift 2 ;;
    --out) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
[ -n "$GOOGLE_API_KEY" ] || exit 3
[ -f "$input" ] || exit 4
if [ -n "$prompt" ]; then
  { cat "$prompt"; echo "Verify every filter before finishing."; } > "$out"
else
  { cat "$input"; echo "stage output"; } > "$out"
fi
"#;

/// Isolated working tree with stand-in scripts and a config pointing at them.
pub struct TestEnv {
    _tmp: TempDir,
    pub root: PathBuf,
    pub config: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_eval(EVAL_SCRIPT)
    }

    /// Same layout, but the evaluation step runs `eval_body`.
    pub fn with_eval(eval_body: &str) -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().to_path_buf();
        let scripts = root.join("scripts");
        fs::create_dir_all(&scripts).expect("create scripts dir");

        write_script(&scripts, "trace.sh", TRACE_SCRIPT);
        write_script(&scripts, "eval.sh", eval_body);
        write_script(&scripts, "stage.sh", STAGE_SCRIPT);
        fs::write(root.join("system_prompt.md"), "You are a careful web agent.\n")
            .expect("write prompt");

        let config = root.join("pipeline.yaml");
        let yaml = format!(
            "python: sh\n\
             runs: 2\n\
             step_timeout_secs: 60\n\
             trajectories_root: '{root}/trajectories'\n\
             results_root: '{root}/eval_results'\n\
             optimizer_dir: '{root}/optimizer'\n\
             prompt_file: '{root}/system_prompt.md'\n\
             scripts:\n\
             \x20 trace: '{root}/scripts/trace.sh'\n\
             \x20 eval: '{root}/scripts/eval.sh'\n\
             \x20 categorize: '{root}/scripts/stage.sh'\n\
             \x20 summarize: '{root}/scripts/stage.sh'\n\
             \x20 propose: '{root}/scripts/stage.sh'\n",
            root = root.display()
        );
        fs::write(&config, yaml).expect("write config");

        Self {
            _tmp: tmp,
            root,
            config,
        }
    }

    /// The binary with both keys set and no stray overrides from the host.
    pub fn cmd(&self) -> Command {
        let mut cmd = self.bare_cmd();
        cmd.env("GOOGLE_API_KEY", "test-google-key")
            .env("OPENAI_API_KEY", "test-openai-key");
        cmd
    }

    /// The binary without any API keys.
    pub fn bare_cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("mw2-pipeline");
        cmd.current_dir(&self.root)
            .arg("--config")
            .arg(&self.config)
            .env_remove("GOOGLE_API_KEY")
            .env_remove("OPENAI_API_KEY")
            .env_remove("RUST_LOG");
        for var in [
            "MW2_MODEL",
            "MW2_EVAL_MODEL",
            "MW2_RUNS",
            "MW2_SCORE_THRESHOLD",
            "MW2_NUM_WORKERS",
            "MW2_TEMPERATURE",
            "MW2_PYTHON",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    pub fn run_dir(&self, run: u32) -> PathBuf {
        self.root.join("trajectories").join(format!("tr{run}"))
    }

    pub fn eval_file(&self, run: u32, suffix: &str) -> PathBuf {
        self.root
            .join("eval_results")
            .join(format!("tr{run}"))
            .join(format!("o4-mini_score_threshold_3_{suffix}"))
    }

    pub fn report_path(&self) -> PathBuf {
        self.root.join("eval_results").join("pipeline_report.json")
    }
}

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).expect("write script");
    path
}
