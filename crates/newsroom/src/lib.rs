pub mod analysis;
pub mod broadcast;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod sanitize;
pub mod secrets;
pub mod sources;

pub use analysis::{AnalysisError, Analyzer, ScriptAnalyzer};
pub use broadcast::{RunProgressBroadcaster, RunProgressEvent};
pub use config::{load_config, Config};
pub use db::{Database, DatabaseError};
pub use error::{ConfigError, NewsroomError, Result};
pub use pipeline::{Orchestrator, OutcomeStatus, PipelineError, RunConfig, RunOutcome, RunRequest};
pub use secrets::{resolve_secret, SecretError};
pub use sources::{FetchError, HttpNewsSource, NewsSource};
