//! Run progress broadcaster for real-time pipeline status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Stage a pipeline run is in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Queued,
    Fetching,
    Analyzing,
    Promoting,
    Completed,
    Failed,
}

impl RunPhase {
    /// Stage name persisted in `pipeline_runs.progress_stage`.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Queued => "queued",
            RunPhase::Fetching => "fetch",
            RunPhase::Analyzing => "analyze",
            RunPhase::Promoting => "promote",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunPhase::Queued => write!(f, "Queued"),
            RunPhase::Fetching => write!(f, "Fetching articles"),
            RunPhase::Analyzing => write!(f, "Analyzing viewpoints"),
            RunPhase::Promoting => write!(f, "Promoting stories"),
            RunPhase::Completed => write!(f, "Completed"),
            RunPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Progress event for a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgressEvent {
    pub run_id: String,
    pub phase: RunPhase,
    /// Overall completion, 0 to 100.
    pub percent: u8,
    /// Human-readable message describing current activity.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Category being worked on, if the stage is category-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Error message (set on failure).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunProgressEvent {
    pub fn new(run_id: &str, phase: RunPhase, percent: u8, message: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            phase,
            percent: percent.min(100),
            message: message.to_string(),
            timestamp: Utc::now(),
            category: None,
            error: None,
        }
    }

    pub fn failed(run_id: &str, error: &str) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::new(run_id, RunPhase::Failed, 100, "Run failed")
        }
    }
}

/// Broadcasts run progress events for streaming.
#[derive(Clone)]
pub struct RunProgressBroadcaster {
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers. Having no subscribers is not an error.
    pub fn send(&self, event: RunProgressEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunProgressEvent> {
        self.sender.subscribe()
    }

    /// Creates a tracker for a run and emits its `queued` event.
    pub fn start_run(&self, run_id: &str) -> RunProgressTracker {
        let tracker = RunProgressTracker::new(run_id, Arc::clone(&self.sender));
        tracker.update(RunPhase::Queued, 0, None, "Run queued");
        tracker
    }
}

impl Default for RunProgressBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Tracks progress for a single run.
pub struct RunProgressTracker {
    run_id: String,
    sender: Arc<broadcast::Sender<RunProgressEvent>>,
}

impl RunProgressTracker {
    pub fn new(run_id: &str, sender: Arc<broadcast::Sender<RunProgressEvent>>) -> Self {
        Self {
            run_id: run_id.to_string(),
            sender,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn update(&self, phase: RunPhase, percent: u8, category: Option<&str>, message: &str) {
        let mut event = RunProgressEvent::new(&self.run_id, phase, percent, message);
        event.category = category.map(str::to_string);
        let _ = self.sender.send(event);
    }

    pub fn completed(&self, message: &str) {
        let event = RunProgressEvent::new(&self.run_id, RunPhase::Completed, 100, message);
        let _ = self.sender.send(event);
    }

    pub fn failed(&self, error: &str) {
        let _ = self.sender.send(RunProgressEvent::failed(&self.run_id, error));
    }
}
