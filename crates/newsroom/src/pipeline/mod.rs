//! The ingestion pipeline: lock, fetch and dedup, analysis, promotion.

pub mod analysis;
pub mod config;
pub mod context;
pub mod dedup;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod progress;
pub mod promotion;
pub mod quota;
pub mod runs;

pub use analysis::{AnalysisDispatcher, DispatchMode};
pub use config::{AnalysisType, RunConfig, RunRequest};
pub use context::{RunContext, RunStats, StageReport};
pub use dedup::{normalize_title, normalize_url, DedupSets, FetchEngine};
pub use error::{LockHeld, PipelineError, PromotionError, Stage, StageError, ValidationError};
pub use lock::LockService;
pub use orchestrator::{Orchestrator, OutcomeStatus, RunOutcome};
pub use progress::{BroadcastProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use runs::{RunManager, RunStatusSnapshot};
