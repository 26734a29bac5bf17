//! Data types for recorded Mind2Web trajectories.
//!
//! Trace generation writes one `result.json` per task. These types mirror
//! that file loosely: every field is optional on read so partially written
//! or older results still load.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker the trace writer uses for a task the agent finished.
pub const DONE_MARKER: &str = "<done>";

/// Prefix the trace writer uses when the agent crashed before producing history.
pub const EXCEPTION_PREFIX: &str = "Exception:";

/// Contents of `{level}/{task_id}/result.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrajectoryResult {
    /// Natural-language task description.
    pub task: String,

    /// One entry per agent step (the model output text).
    pub action_history: Vec<String>,

    /// All step thoughts joined with `---` separators.
    pub thoughts: Option<String>,

    /// `<done>`, an error message, or `Exception: ...`.
    pub final_result_response: Option<String>,

    /// Screenshot paths relative to the task directory.
    pub input_image_paths: Vec<String>,

    /// Checklist progress, present only for hierarchical runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtask_history: Option<Vec<SubtaskStatus>>,
}

impl TrajectoryResult {
    /// Classifies the final response.
    pub fn outcome(&self) -> TrajectoryOutcome {
        match self.final_result_response.as_deref() {
            None => TrajectoryOutcome::Incomplete,
            Some(DONE_MARKER) => TrajectoryOutcome::Done,
            Some(resp) if resp.starts_with(EXCEPTION_PREFIX) => TrajectoryOutcome::Exception,
            Some(_) => TrajectoryOutcome::Error,
        }
    }

    /// `(done, total)` subtasks for hierarchical runs.
    pub fn subtask_progress(&self) -> Option<(usize, usize)> {
        self.subtask_history
            .as_ref()
            .map(|subtasks| (subtasks.iter().filter(|s| s.done).count(), subtasks.len()))
    }
}

/// One checklist item of a hierarchical run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtaskStatus {
    pub name: String,
    pub done: bool,
    pub error: Option<String>,
}

/// How a recorded task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryOutcome {
    /// The agent signalled completion.
    Done,
    /// The agent reported an error on its last step.
    Error,
    /// The agent raised before any history was recorded.
    Exception,
    /// `result.json` exists but carries no final response.
    Incomplete,
    /// The task directory has no `result.json`.
    Missing,
}

impl fmt::Display for TrajectoryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrajectoryOutcome::Done => write!(f, "done"),
            TrajectoryOutcome::Error => write!(f, "error"),
            TrajectoryOutcome::Exception => write!(f, "exception"),
            TrajectoryOutcome::Incomplete => write!(f, "incomplete"),
            TrajectoryOutcome::Missing => write!(f, "missing"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_response(resp: Option<&str>) -> TrajectoryResult {
        TrajectoryResult {
            final_result_response: resp.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_outcome_classification() {
        assert_eq!(with_response(Some("<done>")).outcome(), TrajectoryOutcome::Done);
        assert_eq!(
            with_response(Some("Exception: browser crashed")).outcome(),
            TrajectoryOutcome::Exception
        );
        assert_eq!(
            with_response(Some("Element not found")).outcome(),
            TrajectoryOutcome::Error
        );
        assert_eq!(with_response(None).outcome(), TrajectoryOutcome::Incomplete);
    }

    #[test]
    fn test_parses_trace_writer_output() {
        let json = r#"{
            "task": "Find the cheapest flight",
            "action_history": ["open site", "search"],
            "thoughts": "open site\n---\nsearch",
            "final_result_response": "<done>",
            "input_image_paths": ["trajectory/0.png"],
            "subtask_history": [
                {"name": "open site", "done": true, "error": null},
                {"name": "search", "done": false, "error": "timed out after 60.0s"}
            ]
        }"#;
        let result: TrajectoryResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.action_history.len(), 2);
        assert_eq!(result.outcome(), TrajectoryOutcome::Done);
        assert_eq!(result.subtask_progress(), Some((1, 2)));
    }

    #[test]
    fn test_minimal_error_result_parses() {
        let json = r#"{"task": "t", "action_history": [], "thoughts": null,
            "final_result_response": "Exception: boom", "input_image_paths": []}"#;
        let result: TrajectoryResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.outcome(), TrajectoryOutcome::Exception);
        assert_eq!(result.subtask_progress(), None);
    }
}
