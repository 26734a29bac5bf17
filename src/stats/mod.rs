//! Statistics over auto-evaluation results.
//!
//! The harness writes one JSON object per line. A task counts as
//! successful only when `predicted_label` equals 1 (`1`, `1.0` and `true`
//! all do); anything else, including a missing label, is a failure. Lines
//! that are blank, not valid JSON, or valid JSON but not an object are
//! skipped.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::StatsError;

/// Header of the failed-tasks CSV.
pub const CSV_HEADER: [&str; 4] = ["task_id", "task", "image_judge_record", "response"];

/// One evaluated task, reduced to the fields the statistics need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    pub task_id: String,
    pub task: String,
    pub image_judge_record: Vec<Value>,
    pub predicted_label: Option<f64>,
    pub response: String,
}

impl EvalRecord {
    /// Builds a record from a raw harness line, defaulting absent fields.
    pub fn from_value(value: &Value) -> Self {
        let task_id = match value.get("task_id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Self {
            task_id,
            task: value
                .get("task")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            image_judge_record: value
                .get("image_judge_record")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
            predicted_label: value.get("predicted_label").and_then(numeric_label),
            response: value
                .get("evaluation_details")
                .and_then(|d| d.get("response"))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.predicted_label == Some(1.0)
    }

    /// Steps are counted from the judge's per-screenshot records.
    pub fn steps(&self) -> usize {
        self.image_judge_record.len()
    }
}

/// Numeric value of a label; booleans count as 0 and 1.
fn numeric_label(value: &Value) -> Option<f64> {
    match value {
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64(),
    }
}

/// Aggregate view of one results file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalStats {
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub total_steps: usize,
    pub skipped_lines: usize,
    pub failed: Vec<EvalRecord>,
}

impl EvalStats {
    /// Reads a JSONL results file.
    pub fn from_jsonl(path: &Path) -> Result<Self, StatsError> {
        if !path.exists() {
            return Err(StatsError::NotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let mut stats = Self::default();
        for line in reader.lines() {
            stats.ingest_line(&line?);
        }
        debug!(
            path = %path.display(),
            total = stats.total_tasks,
            skipped = stats.skipped_lines,
            "Loaded evaluation results"
        );
        Ok(stats)
    }

    /// Same as [`Self::from_jsonl`] over an in-memory string.
    pub fn from_str_lines(content: &str) -> Self {
        let mut stats = Self::default();
        for line in content.lines() {
            stats.ingest_line(line);
        }
        stats
    }

    fn ingest_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) if value.is_object() => self.push(EvalRecord::from_value(&value)),
            _ => self.skipped_lines += 1,
        }
    }

    pub fn push(&mut self, record: EvalRecord) {
        self.total_tasks += 1;
        self.total_steps += record.steps();
        if record.is_success() {
            self.successful_tasks += 1;
        } else {
            self.failed.push(record);
        }
    }

    pub fn failed_tasks(&self) -> usize {
        self.failed.len()
    }

    /// Success rate as a percentage; `None` without tasks.
    pub fn success_rate(&self) -> Option<f64> {
        (self.total_tasks > 0)
            .then(|| self.successful_tasks as f64 / self.total_tasks as f64 * 100.0)
    }

    pub fn average_steps(&self) -> Option<f64> {
        (self.total_tasks > 0).then(|| self.total_steps as f64 / self.total_tasks as f64)
    }

    /// Writes the failed tasks as CSV, creating parent directories.
    ///
    /// `image_judge_record` is stored as a JSON string in its column.
    pub fn write_failed_csv(&self, path: &Path) -> Result<(), StatsError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(CSV_HEADER)?;
        for record in &self.failed {
            let judge = serde_json::to_string(&record.image_judge_record)?;
            writer.write_record([
                record.task_id.as_str(),
                record.task.as_str(),
                judge.as_str(),
                record.response.as_str(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Serializable summary without the per-task payloads.
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            total_tasks: self.total_tasks,
            successful_tasks: self.successful_tasks,
            failed_tasks: self.failed_tasks(),
            success_rate: self.success_rate(),
            average_steps: self.average_steps(),
            skipped_lines: self.skipped_lines,
            failed_task_ids: self.failed.iter().map(|r| r.task_id.clone()).collect(),
        }
    }
}

/// What `stats --json` prints and the run report embeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub total_tasks: usize,
    pub successful_tasks: usize,
    pub failed_tasks: usize,
    pub success_rate: Option<f64>,
    pub average_steps: Option<f64>,
    pub skipped_lines: usize,
    pub failed_task_ids: Vec<String>,
}

/// Mean of the success rates that are defined.
pub fn mean_success_rate<'a>(summaries: impl IntoIterator<Item = &'a StatsSummary>) -> Option<f64> {
    let rates: Vec<f64> = summaries
        .into_iter()
        .filter_map(|s| s.success_rate)
        .collect();
    if rates.is_empty() {
        None
    } else {
        Some(rates.iter().sum::<f64>() / rates.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"{"task_id": "t1", "task": "Book a table", "predicted_label": 1, "image_judge_record": [{}, {}]}
{"task_id": "t2", "task": "Find a flight", "predicted_label": 0, "image_judge_record": [{"score": 2}], "evaluation_details": {"response": "Status: failure, filter not applied"}}

not json at all
{"task_id": "t3", "task": "Buy shoes"}
"#;

    #[test]
    fn test_counts_and_rates() {
        let stats = EvalStats::from_str_lines(SAMPLE);
        assert_eq!(stats.total_tasks, 3);
        assert_eq!(stats.successful_tasks, 1);
        assert_eq!(stats.failed_tasks(), 2);
        assert_eq!(stats.skipped_lines, 1);
        assert!((stats.success_rate().unwrap() - 33.333).abs() < 0.01);
        assert!((stats.average_steps().unwrap() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_missing_label_is_failure() {
        let stats = EvalStats::from_str_lines(SAMPLE);
        let ids: Vec<&str> = stats.failed.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3"]);
        assert_eq!(stats.failed[0].response, "Status: failure, filter not applied");
        assert_eq!(stats.failed[1].response, "");
    }

    #[test]
    fn test_non_object_lines_are_skipped() {
        let stats = EvalStats::from_str_lines(
            "42\nnull\n[1,2]\n\"text\"\n{\"task_id\":\"a\",\"predicted_label\":1}\n",
        );
        assert_eq!(stats.total_tasks, 1);
        assert_eq!(stats.successful_tasks, 1);
        assert_eq!(stats.skipped_lines, 4);
        assert!(stats.failed.is_empty());
    }

    #[test]
    fn test_label_compares_by_value() {
        let stats = EvalStats::from_str_lines(
            "{\"task_id\":\"a\",\"predicted_label\":1.0}\n\
             {\"task_id\":\"b\",\"predicted_label\":true}\n\
             {\"task_id\":\"c\",\"predicted_label\":0.5}\n\
             {\"task_id\":\"d\",\"predicted_label\":\"1\"}\n",
        );
        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.successful_tasks, 2);
        let ids: Vec<&str> = stats.failed.iter().map(|r| r.task_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "d"]);
    }

    #[test]
    fn test_empty_input_has_no_rates() {
        let stats = EvalStats::from_str_lines("\n\n");
        assert_eq!(stats.total_tasks, 0);
        assert!(stats.success_rate().is_none());
        assert!(stats.average_steps().is_none());
    }

    #[test]
    fn test_from_jsonl_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = EvalStats::from_jsonl(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, StatsError::NotFound(_)));
    }

    #[test]
    fn test_failed_csv_layout() {
        let temp = TempDir::new().unwrap();
        let jsonl = temp.path().join("results.json");
        fs::write(&jsonl, SAMPLE).unwrap();
        let csv_path = temp.path().join("out").join("failed.csv");

        let stats = EvalStats::from_jsonl(&jsonl).unwrap();
        stats.write_failed_csv(&csv_path).unwrap();

        let mut reader = csv::Reader::from_path(&csv_path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());

        let rows: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "t2");
        assert_eq!(&rows[0][2], r#"[{"score":2}]"#);
        assert_eq!(&rows[0][3], "Status: failure, filter not applied");
        assert_eq!(&rows[1][2], "[]");
    }

    #[test]
    fn test_numeric_task_ids_are_kept() {
        let stats = EvalStats::from_str_lines(r#"{"task_id": 42, "predicted_label": 0}"#);
        assert_eq!(stats.failed[0].task_id, "42");
    }

    #[test]
    fn test_mean_success_rate() {
        let a = EvalStats::from_str_lines(r#"{"task_id":"a","predicted_label":1}"#).summary();
        let b = EvalStats::from_str_lines(r#"{"task_id":"b","predicted_label":0}"#).summary();
        let empty = EvalStats::default().summary();

        assert_eq!(mean_success_rate([&a, &b, &empty]), Some(50.0));
        assert_eq!(mean_success_rate([&empty]), None);
    }
}
