//! Walks a run directory and summarises every recorded task.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use super::types::{TrajectoryOutcome, TrajectoryResult};
use crate::error::TrajectoryError;

/// File the trace writer drops in each task directory.
pub const RESULT_FILE: &str = "result.json";

/// Sub-directory holding the numbered screenshots.
pub const SCREENSHOT_DIR: &str = "trajectory";

/// One task directory, condensed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrajectorySummary {
    pub level: String,
    pub task_id: String,
    pub outcome: TrajectoryOutcome,
    pub steps: usize,
    pub screenshots: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtasks_done: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtasks_total: Option<usize>,
}

/// Every task found under one `tr{i}` directory.
#[derive(Debug, Clone, Serialize)]
pub struct TrajectoryReport {
    pub run_dir: PathBuf,
    pub tasks: Vec<TrajectorySummary>,
}

impl TrajectoryReport {
    /// Task count per outcome, in a stable order.
    pub fn counts(&self) -> BTreeMap<TrajectoryOutcome, usize> {
        let mut counts = BTreeMap::new();
        for task in &self.tasks {
            *counts.entry(task.outcome).or_insert(0) += 1;
        }
        counts
    }

    pub fn count(&self, outcome: TrajectoryOutcome) -> usize {
        self.tasks.iter().filter(|t| t.outcome == outcome).count()
    }

    pub fn total(&self) -> usize {
        self.tasks.len()
    }
}

/// Reads and parses one `result.json`.
pub fn load_result(path: &Path) -> Result<TrajectoryResult, TrajectoryError> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| TrajectoryError::InvalidResult {
        path: path.to_path_buf(),
        source,
    })
}

/// Scans `{run_dir}/{level}/{task_id}/` directories.
///
/// A `result.json` that fails to parse is reported as `incomplete` rather
/// than aborting the scan.
pub fn scan(run_dir: &Path) -> Result<TrajectoryReport, TrajectoryError> {
    if !run_dir.is_dir() {
        return Err(TrajectoryError::DirectoryNotFound(run_dir.to_path_buf()));
    }

    let mut tasks = Vec::new();
    for entry in WalkDir::new(run_dir)
        .min_depth(2)
        .max_depth(2)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let task_dir = entry.path();
        let task_id = entry.file_name().to_string_lossy().to_string();
        let level = task_dir
            .parent()
            .and_then(Path::file_name)
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        tasks.push(summarize_task(task_dir, level, task_id));
    }

    Ok(TrajectoryReport {
        run_dir: run_dir.to_path_buf(),
        tasks,
    })
}

fn summarize_task(task_dir: &Path, level: String, task_id: String) -> TrajectorySummary {
    let screenshots = count_screenshots(&task_dir.join(SCREENSHOT_DIR));
    let result_path = task_dir.join(RESULT_FILE);

    let mut summary = TrajectorySummary {
        level,
        task_id,
        outcome: TrajectoryOutcome::Missing,
        steps: 0,
        screenshots,
        subtasks_done: None,
        subtasks_total: None,
    };

    if !result_path.exists() {
        return summary;
    }

    match load_result(&result_path) {
        Ok(result) => {
            summary.outcome = result.outcome();
            summary.steps = result.action_history.len();
            if let Some((done, total)) = result.subtask_progress() {
                summary.subtasks_done = Some(done);
                summary.subtasks_total = Some(total);
            }
        }
        Err(e) => {
            warn!("Unreadable trajectory result: {}", e);
            summary.outcome = TrajectoryOutcome::Incomplete;
        }
    }
    summary
}

fn count_screenshots(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "png"))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_task(root: &Path, level: &str, task_id: &str, result: Option<&str>, shots: usize) {
        let dir = root.join(level).join(task_id);
        fs::create_dir_all(dir.join(SCREENSHOT_DIR)).unwrap();
        for i in 0..shots {
            fs::write(dir.join(SCREENSHOT_DIR).join(format!("{i}.png")), b"png").unwrap();
        }
        if let Some(result) = result {
            fs::write(dir.join(RESULT_FILE), result).unwrap();
        }
    }

    #[test]
    fn test_scan_classifies_each_task() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write_task(
            root,
            "medium",
            "a1",
            Some(r#"{"task":"t","action_history":["x","y","z"],"final_result_response":"<done>"}"#),
            3,
        );
        write_task(
            root,
            "medium",
            "b2",
            Some(r#"{"task":"t","action_history":[],"final_result_response":"Exception: boom"}"#),
            0,
        );
        write_task(root, "medium", "c3", None, 1);
        write_task(root, "hard", "d4", Some("{not json"), 0);

        let report = scan(root).unwrap();
        assert_eq!(report.total(), 4);
        assert_eq!(report.count(TrajectoryOutcome::Done), 1);
        assert_eq!(report.count(TrajectoryOutcome::Exception), 1);
        assert_eq!(report.count(TrajectoryOutcome::Missing), 1);
        assert_eq!(report.count(TrajectoryOutcome::Incomplete), 1);

        let done = report.tasks.iter().find(|t| t.task_id == "a1").unwrap();
        assert_eq!(done.level, "medium");
        assert_eq!(done.steps, 3);
        assert_eq!(done.screenshots, 3);

        let hard = report.tasks.iter().find(|t| t.task_id == "d4").unwrap();
        assert_eq!(hard.level, "hard");
    }

    #[test]
    fn test_counts_are_grouped() {
        let temp = TempDir::new().unwrap();
        write_task(temp.path(), "medium", "a", Some(r#"{"final_result_response":"<done>"}"#), 0);
        write_task(temp.path(), "medium", "b", Some(r#"{"final_result_response":"<done>"}"#), 0);

        let counts = scan(temp.path()).unwrap().counts();
        assert_eq!(counts.get(&TrajectoryOutcome::Done), Some(&2));
        assert_eq!(counts.len(), 1);
    }

    #[test]
    fn test_missing_directory_is_error() {
        let temp = TempDir::new().unwrap();
        let err = scan(&temp.path().join("tr9")).unwrap_err();
        assert!(matches!(err, TrajectoryError::DirectoryNotFound(_)));
    }

    #[test]
    fn test_empty_run_dir() {
        let temp = TempDir::new().unwrap();
        let report = scan(temp.path()).unwrap();
        assert_eq!(report.total(), 0);
        assert!(report.counts().is_empty());
    }
}
