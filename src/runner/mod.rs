//! Step runner for external pipeline programs.
//!
//! Every stage of both pipelines is an external script. This module turns
//! a stage into an [`Invocation`] and runs it through a [`CommandRunner`]:
//!
//! ```text
//! Invocation (argv + env) → CommandRunner → child process → StepOutcome | ProcessError
//! ```
//!
//! Any exit other than zero is surfaced as an error, which callers
//! propagate with `?` to get `set -e` semantics.
//!
//! # Example
//!
//! ```ignore
//! use mw2_pipeline::runner::{CommandRunner, Invocation, ProcessRunner};
//!
//! let step = Invocation::new("categorize", "python3")
//!     .arg("auto-optimizer/analyze_results.py")
//!     .flag("--jsonl", "results.json")
//!     .flag("--out", "failure_corpus.md");
//!
//! let outcome = ProcessRunner::new().run(&step, None).await?;
//! println!("{} took {} ms", outcome.label, outcome.duration_ms);
//! ```

pub mod executor;
pub mod invocation;

pub use executor::{CommandRunner, ProcessRunner, StepOutcome};
pub use invocation::{Invocation, InvocationView};
