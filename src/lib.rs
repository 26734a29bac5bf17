//! mw2-pipeline: benchmark and prompt-optimisation driver for an
//! Online-Mind2Web browser agent.
//!
//! This library sequences the external trace generator, the auto-evaluation
//! harness and the prompt optimiser, and reads back what they produce.

// Core modules
pub mod cli;
pub mod error;
pub mod pipeline;
pub mod runner;
pub mod stats;
pub mod trajectory;

// Re-export commonly used error types
pub use error::{ConfigError, PipelineError, ProcessError, StatsError, TrajectoryError};
