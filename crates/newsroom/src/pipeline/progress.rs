use log::warn;

use super::runs::RunManager;
use crate::broadcast::run_progress::{RunPhase, RunProgressTracker};

/// Events emitted by the orchestrator while a run progresses.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Stage {
        phase: RunPhase,
        category: Option<String>,
        percent: u8,
        message: String,
    },
    Completed {
        message: String,
    },
    Failed {
        error: String,
    },
}

impl ProgressEvent {
    pub fn stage(phase: RunPhase, category: Option<&str>, percent: u8, message: impl Into<String>) -> Self {
        ProgressEvent::Stage {
            phase,
            category: category.map(str::to_string),
            percent: percent.min(100),
            message: message.into(),
        }
    }
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Bridges pipeline events to the broadcast channel.
pub struct BroadcastProgress {
    tracker: RunProgressTracker,
}

impl BroadcastProgress {
    pub fn new(tracker: RunProgressTracker) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Stage {
                phase,
                category,
                percent,
                message,
            } => self
                .tracker
                .update(phase, percent, category.as_deref(), &message),
            ProgressEvent::Completed { message } => self.tracker.completed(&message),
            ProgressEvent::Failed { error } => self.tracker.failed(&error),
        }
    }
}

/// Writes stage progress to the run row so pollers see it, then forwards.
///
/// A failed progress write is logged and otherwise ignored; it never fails
/// the run.
pub struct PersistingProgress<R: ProgressReporter> {
    runs: RunManager,
    run_id: String,
    inner: R,
}

impl<R: ProgressReporter> PersistingProgress<R> {
    pub fn new(runs: RunManager, run_id: &str, inner: R) -> Self {
        Self {
            runs,
            run_id: run_id.to_string(),
            inner,
        }
    }
}

impl<R: ProgressReporter> ProgressReporter for PersistingProgress<R> {
    fn report(&self, event: ProgressEvent) {
        let (stage, percent, message) = match &event {
            ProgressEvent::Stage {
                phase,
                percent,
                message,
                ..
            } => (phase.as_str(), *percent, message.as_str()),
            ProgressEvent::Completed { message } => (RunPhase::Completed.as_str(), 100, message.as_str()),
            ProgressEvent::Failed { error } => (RunPhase::Failed.as_str(), 100, error.as_str()),
        };
        if let Err(e) = self.runs.update_progress(&self.run_id, stage, percent, message) {
            warn!("Failed to persist progress for run {}: {}", self.run_id, e);
        }
        self.inner.report(event);
    }
}

/// Either a broadcast bridge or nothing.
pub enum RunReporter {
    Broadcast(BroadcastProgress),
    Noop(NoopProgress),
}

impl ProgressReporter for RunReporter {
    fn report(&self, event: ProgressEvent) {
        match self {
            RunReporter::Broadcast(b) => b.report(event),
            RunReporter::Noop(n) => n.report(event),
        }
    }
}
