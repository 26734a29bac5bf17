//! Inspection of recorded Mind2Web trajectories.
//!
//! Trace generation lays out one directory per task:
//!
//! ```text
//! trajectories/tr1/
//!   medium/
//!     <task_id>/
//!       result.json        task, action_history, thoughts, final_result_response
//!       trajectory/0.png   one screenshot per step
//! ```
//!
//! The files are produced and consumed by external programs; this module
//! only reads them to report how a run went.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mw2_pipeline::trajectory::{scan, TrajectoryOutcome};
//!
//! let report = scan(Path::new("./trajectories/tr1"))?;
//! println!(
//!     "{} of {} tasks finished",
//!     report.count(TrajectoryOutcome::Done),
//!     report.total()
//! );
//! ```

pub mod scan;
pub mod types;

pub use scan::{load_result, scan, TrajectoryReport, TrajectorySummary};
pub use types::{SubtaskStatus, TrajectoryOutcome, TrajectoryResult};
