//! Error types for mw2-pipeline operations.
//!
//! Defines error types for the major subsystems:
//! - Configuration loading and validation
//! - External process invocation
//! - Evaluation result statistics
//! - Trajectory inspection
//! - Pipeline sequencing

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while running an external program.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}' for step '{label}': {source}")]
    Spawn {
        label: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Step '{label}' exited with non-zero code {code}")]
    NonZeroExit { label: String, code: i32 },

    #[error("Step '{label}' was terminated by a signal")]
    Terminated { label: String },

    #[error("Step '{label}' timed out after {timeout:?}")]
    Timeout { label: String, timeout: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while computing evaluation statistics.
#[derive(Debug, Error)]
pub enum StatsError {
    #[error("Results file not found: {0}")]
    NotFound(PathBuf),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while inspecting recorded trajectories.
#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("Trajectory directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to parse '{path}': {source}")]
    InvalidResult {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} is required but not set")]
    MissingApiKey(&'static str),

    #[error("Expected artifact was not produced by step '{step}': {path}")]
    MissingArtifact { step: String, path: PathBuf },

    #[error("Required input does not exist: {0}")]
    MissingInput(PathBuf),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
