//! Run lifecycle: creation, state transitions, error log and status snapshots.

use serde::Serialize;
use tracing::debug;

use super::config::RunConfig;
use super::error::{PipelineError, Stage, StageError};
use crate::config::PipelineSettings;
use crate::db::analysis_job_repo::{self, JobCounts};
use crate::db::category_repo::{self, CategoryStatusRow};
use crate::db::run_repo::{self, NewRun, RunErrorRow, RunRow};
use crate::db::{now_timestamp, staging_repo, Database};
use crate::model::{RunState, RunType, TriggerSource};

/// Seconds assumed for one analyzer call when estimating run duration.
const ANALYSIS_SECS_PER_ARTICLE: u64 = 20;
/// Seconds assumed for one fetch cycle.
const FETCH_SECS_PER_CYCLE: u64 = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunProgressSnapshot {
    /// Current phase, including the unit being worked on. Unlike the run
    /// status this moves back to `fetch` for each new category.
    pub stage: Option<String>,
    pub percent: u8,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCounts {
    pub staged_articles: u64,
    pub jobs: JobCounts,
}

/// Everything a poller needs to know about one run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusSnapshot {
    pub run_id: String,
    pub run_type: RunType,
    pub status: RunState,
    pub trigger_source: TriggerSource,
    pub config: serde_json::Value,
    pub progress: RunProgressSnapshot,
    pub stats: RunCounts,
    pub category_breakdown: Vec<CategoryStatusRow>,
    /// Most recent first.
    pub errors: Vec<RunErrorRow>,
    pub estimated_seconds: Option<u64>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

pub struct RunManager {
    db: Database,
    recent_error_limit: u32,
}

impl RunManager {
    pub fn new(db: &Database, recent_error_limit: u32) -> Self {
        Self {
            db: db.clone(),
            recent_error_limit: recent_error_limit.max(1),
        }
    }

    /// Inserts a `pending` run under a caller-allocated id.
    pub fn create_run(
        &self,
        run_id: &str,
        config: &RunConfig,
        trigger_source: TriggerSource,
        trigger_context: Option<&serde_json::Value>,
        estimated_seconds: Option<u64>,
    ) -> Result<(), PipelineError> {
        let config_json = serde_json::to_value(config).map_err(crate::db::DatabaseError::from)?;
        let now = now_timestamp();
        run_repo::insert(
            &self.db,
            &NewRun {
                id: run_id,
                run_type: config.run_type(),
                config: &config_json,
                trigger_source,
                trigger_context,
                estimated_seconds,
                created_at: &now,
            },
        )?;
        debug!(run_id, run_type = %config.run_type(), "Run created");
        Ok(())
    }

    /// Moves a run to `next` if its lifecycle allows it.
    pub fn transition(&self, run_id: &str, next: RunState) -> Result<(), PipelineError> {
        let current = run_repo::status_of(&self.db, run_id)?
            .ok_or_else(|| PipelineError::RunNotFound(run_id.to_string()))?;
        if !current.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                run_id: run_id.to_string(),
                from: current,
                to: next,
            });
        }
        if current != next {
            run_repo::update_status(&self.db, run_id, next, &now_timestamp())?;
            debug!(run_id, from = %current, to = %next, "Run transitioned");
        }
        Ok(())
    }

    /// Fails a run whose process went away, recording `reason`. Returns
    /// false when the run is unknown or already finished.
    pub fn abandon(&self, run_id: &str, reason: &str) -> Result<bool, PipelineError> {
        match run_repo::status_of(&self.db, run_id)? {
            Some(state) if !state.is_terminal() => {
                self.transition(run_id, RunState::Failed)?;
                self.record_error(run_id, &StageError::new(Stage::LockAcquire, reason))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn record_error(&self, run_id: &str, error: &StageError) -> Result<(), PipelineError> {
        run_repo::insert_error(
            &self.db,
            run_id,
            error.stage.as_str(),
            error.category.as_deref(),
            error.article_id.as_deref(),
            &error.message,
            &now_timestamp(),
        )?;
        Ok(())
    }

    pub fn update_progress(
        &self,
        run_id: &str,
        stage: &str,
        percent: u8,
        message: &str,
    ) -> Result<(), PipelineError> {
        run_repo::update_progress(&self.db, run_id, stage, percent, message)?;
        Ok(())
    }

    /// Most recent runs, newest first.
    pub fn list_runs(&self, limit: u32) -> Result<Vec<RunRow>, PipelineError> {
        Ok(run_repo::list_recent(&self.db, limit)?)
    }

    /// Aggregates the run row, category breakdown, job counts and recent errors.
    pub fn get_run_status(&self, run_id: &str) -> Result<Option<RunStatusSnapshot>, PipelineError> {
        let Some(run) = run_repo::find_by_id(&self.db, run_id)? else {
            return Ok(None);
        };
        let category_breakdown = category_repo::list_for_run(&self.db, run_id)?;
        let jobs = analysis_job_repo::counts_for_run(&self.db, run_id)?;
        let staged_articles = staging_repo::count_articles(&self.db, run_id)?;
        let errors = run_repo::recent_errors(&self.db, run_id, self.recent_error_limit)?;

        Ok(Some(RunStatusSnapshot {
            run_id: run.id,
            run_type: run.run_type,
            status: run.status,
            trigger_source: run.trigger_source,
            config: run.config,
            progress: RunProgressSnapshot {
                stage: run.progress_stage,
                percent: run.progress_percent,
                message: run.progress_message,
            },
            stats: RunCounts {
                staged_articles,
                jobs,
            },
            category_breakdown,
            errors,
            estimated_seconds: run.estimated_seconds,
            created_at: run.created_at,
            started_at: run.started_at,
            completed_at: run.completed_at,
        }))
    }
}

/// Advisory duration estimate in seconds, for client progress hints.
///
/// `units` is the resolved list of `(unit, target)` pairs; reanalysis runs
/// pass the selected story count as their single unit's target.
pub fn estimate_duration(config: &RunConfig, settings: &PipelineSettings, units: &[(String, u32)]) -> u64 {
    let per_article = ANALYSIS_SECS_PER_ARTICLE + settings.analysis_delay_ms / 1000;
    let fetch = match config {
        RunConfig::ReanalyzeCategory { .. } => 0,
        RunConfig::KeywordSearch { .. } => FETCH_SECS_PER_CYCLE,
        _ => units.len() as u64 * FETCH_SECS_PER_CYCLE * settings.max_pull_attempts.max(1) as u64,
    };
    let articles: u64 = units.iter().map(|(_, target)| *target as u64).sum();
    fetch + articles * per_article
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (Database, RunManager) {
        let db = Database::open_in_memory().unwrap();
        let manager = RunManager::new(&db, 5);
        (db, manager)
    }

    fn refresh() -> RunConfig {
        RunConfig::CategoryRefresh {
            categories: vec!["politics".to_string()],
            target_count: Some(5),
        }
    }

    #[test]
    fn test_create_and_transition() {
        let (_db, manager) = manager();
        manager
            .create_run("r1", &refresh(), TriggerSource::Api, None, Some(120))
            .unwrap();

        manager.transition("r1", RunState::Running).unwrap();
        manager.transition("r1", RunState::Analyzing).unwrap();
        manager.transition("r1", RunState::Analyzing).unwrap();
        manager.transition("r1", RunState::Complete).unwrap();

        let snapshot = manager.get_run_status("r1").unwrap().unwrap();
        assert_eq!(snapshot.status, RunState::Complete);
        assert_eq!(snapshot.run_type, RunType::CategoryRefresh);
        assert!(snapshot.started_at.is_some());
        assert!(snapshot.completed_at.is_some());
        assert_eq!(snapshot.estimated_seconds, Some(120));
        assert_eq!(snapshot.config["operation"], "category_refresh");
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let (_db, manager) = manager();
        manager
            .create_run("r1", &refresh(), TriggerSource::Cli, None, None)
            .unwrap();
        assert!(matches!(
            manager.transition("r1", RunState::Complete),
            Err(PipelineError::InvalidTransition { .. })
        ));
        manager.transition("r1", RunState::Failed).unwrap();
        assert!(matches!(
            manager.transition("r1", RunState::Running),
            Err(PipelineError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_abandon_fails_only_unfinished_runs() {
        let (_db, manager) = manager();
        manager
            .create_run("r1", &refresh(), TriggerSource::Scheduled, None, None)
            .unwrap();
        manager.transition("r1", RunState::Running).unwrap();

        assert!(manager.abandon("r1", "abandoned: pipeline lock expired").unwrap());
        let snapshot = manager.get_run_status("r1").unwrap().unwrap();
        assert_eq!(snapshot.status, RunState::Failed);
        assert!(snapshot.completed_at.is_some());
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].message, "abandoned: pipeline lock expired");

        assert!(!manager.abandon("r1", "again").unwrap());
        assert!(!manager.abandon("ghost", "missing").unwrap());
        assert_eq!(manager.get_run_status("r1").unwrap().unwrap().errors.len(), 1);
    }

    #[test]
    fn test_transition_unknown_run() {
        let (_db, manager) = manager();
        assert!(matches!(
            manager.transition("nope", RunState::Running),
            Err(PipelineError::RunNotFound(_))
        ));
        assert!(manager.get_run_status("nope").unwrap().is_none());
    }

    #[test]
    fn test_errors_and_progress_in_snapshot() {
        let (_db, manager) = manager();
        manager
            .create_run("r1", &refresh(), TriggerSource::Manual, None, None)
            .unwrap();
        for i in 0..7 {
            manager
                .record_error(
                    "r1",
                    &StageError::new(Stage::Fetch, format!("error {}", i))
                        .in_category("politics"),
                )
                .unwrap();
        }
        manager.update_progress("r1", "fetch", 15, "Fetching politics").unwrap();

        let snapshot = manager.get_run_status("r1").unwrap().unwrap();
        assert_eq!(snapshot.errors.len(), 5);
        assert_eq!(snapshot.errors[0].message, "error 6");
        assert_eq!(snapshot.errors[0].category.as_deref(), Some("politics"));
        assert_eq!(snapshot.progress.stage.as_deref(), Some("fetch"));
        assert_eq!(snapshot.progress.percent, 15);
        assert_eq!(snapshot.stats.staged_articles, 0);
    }

    #[test]
    fn test_list_runs_newest_first() {
        let (_db, manager) = manager();
        manager.create_run("r1", &refresh(), TriggerSource::Cli, None, None).unwrap();
        manager.create_run("r2", &refresh(), TriggerSource::Cli, None, None).unwrap();
        let runs = manager.list_runs(10).unwrap();
        assert_eq!(runs[0].id, "r2");
        assert_eq!(runs.len(), 2);
    }

    #[test]
    fn test_estimate_duration() {
        let settings = PipelineSettings::default();
        let units = vec![("politics".to_string(), 5), ("world".to_string(), 5)];
        let estimate = estimate_duration(&refresh(), &settings, &units);
        assert!(estimate >= 10 * ANALYSIS_SECS_PER_ARTICLE);

        let reanalysis = RunConfig::ReanalyzeCategory {
            category: Some("politics".to_string()),
            story_ids: None,
            from: None,
            to: None,
            analysis_types: vec![],
        };
        assert_eq!(estimate_duration(&reanalysis, &settings, &[]), 0);
        assert!(estimate_duration(&reanalysis, &settings, &[("politics".to_string(), 3)]) > 0);
    }
}
