//! Broadcasting of pipeline run progress for real-time event streaming.

pub mod run_progress;

pub use run_progress::{RunPhase, RunProgressBroadcaster, RunProgressEvent, RunProgressTracker};
