use serde::Serialize;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::model::RunState;

/// A trigger request that cannot be run. Raised before the lock is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("Unknown trigger source '{0}'")]
    UnknownTriggerSource(String),

    #[error("Invalid parameters for {operation}: {reason}")]
    InvalidParameters { operation: String, reason: String },

    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("{operation} needs at least one of: {expected}")]
    MissingSelector {
        operation: &'static str,
        expected: &'static str,
    },
}

/// Another run holds the pipeline lock.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Pipeline is locked by run {holder} (since {acquired_at})")]
pub struct LockHeld {
    pub holder: String,
    pub acquired_at: String,
}

/// Writing the live store failed. Always fatal to the run.
#[derive(Error, Debug)]
pub enum PromotionError {
    #[error("Promotion of '{category}' failed: {source}")]
    Storage {
        category: String,
        #[source]
        source: DatabaseError,
    },
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    LockHeld(#[from] LockHeld),

    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error("Run {run_id} cannot move from {from} to {to}")]
    InvalidTransition {
        run_id: String,
        from: RunState,
        to: RunState,
    },

    #[error("Run not found: {0}")]
    RunNotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Stage of a run, as recorded on errors and in outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    LockAcquire,
    RunCreate,
    Fetch,
    Analyze,
    Promote,
    RunFinalize,
    LockRelease,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::LockAcquire => "lock_acquire",
            Stage::RunCreate => "run_create",
            Stage::Fetch => "fetch",
            Stage::Analyze => "analyze",
            Stage::Promote => "promote",
            Stage::RunFinalize => "run_finalize",
            Stage::LockRelease => "lock_release",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recovered (or final) error, scoped to the unit of work it hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageError {
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    pub message: String,
}

impl StageError {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            category: None,
            article_id: None,
            message: message.into(),
        }
    }

    pub fn in_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn for_article(mut self, article_id: &str) -> Self {
        self.article_id = Some(article_id.to_string());
        self
    }
}
