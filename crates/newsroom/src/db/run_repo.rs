//! Run repository: the `pipeline_runs` audit trail and its error log.

use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::model::{RunState, RunType, TriggerSource};

/// A pipeline run row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRow {
    pub id: String,
    pub run_type: RunType,
    pub status: RunState,
    /// Serialized `RunConfig`.
    pub config: serde_json::Value,
    pub trigger_source: TriggerSource,
    pub trigger_context: Option<serde_json::Value>,
    pub progress_stage: Option<String>,
    pub progress_percent: u8,
    pub progress_message: Option<String>,
    pub estimated_seconds: Option<u64>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl RunRow {
    fn from_row(row: &Row<'_>) -> Result<Self, DatabaseError> {
        let run_type: String = row.get("run_type")?;
        let status: String = row.get("status")?;
        let trigger_source: String = row.get("trigger_source")?;
        let config: String = row.get("config")?;
        let trigger_context: Option<String> = row.get("trigger_context")?;
        let percent: i64 = row.get("progress_percent")?;
        let estimated: Option<i64> = row.get("estimated_seconds")?;

        Ok(Self {
            id: row.get("id")?,
            run_type: run_type.parse()?,
            status: status.parse()?,
            config: serde_json::from_str(&config)?,
            trigger_source: trigger_source.parse()?,
            trigger_context: trigger_context
                .map(|c| serde_json::from_str(&c))
                .transpose()?,
            progress_stage: row.get("progress_stage")?,
            progress_percent: percent.clamp(0, 100) as u8,
            progress_message: row.get("progress_message")?,
            estimated_seconds: estimated.map(|s| s.max(0) as u64),
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Fields for a new run. The id is allocated by the caller so that it can
/// take the pipeline lock before the row exists.
#[derive(Debug, Clone)]
pub struct NewRun<'a> {
    pub id: &'a str,
    pub run_type: RunType,
    pub config: &'a serde_json::Value,
    pub trigger_source: TriggerSource,
    pub trigger_context: Option<&'a serde_json::Value>,
    pub estimated_seconds: Option<u64>,
    pub created_at: &'a str,
}

/// A recorded stage error.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunErrorRow {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub article_id: Option<String>,
    pub message: String,
    pub created_at: String,
}

/// Inserts a new run in the `pending` state.
pub fn insert(db: &Database, run: &NewRun<'_>) -> Result<(), DatabaseError> {
    let config = serde_json::to_string(run.config)?;
    let context = run.trigger_context.map(serde_json::to_string).transpose()?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO pipeline_runs (id, run_type, status, config, trigger_source,
             trigger_context, estimated_seconds, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id,
                run.run_type.as_str(),
                RunState::Pending.as_str(),
                config,
                run.trigger_source.as_str(),
                context,
                run.estimated_seconds.map(|s| s as i64),
                run.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a run by id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<RunRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM pipeline_runs WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(RunRow::from_row(row)?)),
            None => Ok(None),
        }
    })
}

/// Lists the most recent runs, newest first.
pub fn list_recent(db: &Database, limit: u32) -> Result<Vec<RunRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM pipeline_runs ORDER BY created_at DESC, rowid DESC LIMIT ?1")?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(RunRow::from_row(row)?);
        }
        Ok(out)
    })
}

/// Counts runs that are not in a terminal state.
pub fn count_active(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM pipeline_runs WHERE status NOT IN ('complete', 'failed')",
            [],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Reads only the status column.
pub fn status_of(db: &Database, id: &str) -> Result<Option<RunState>, DatabaseError> {
    db.with_conn(|conn| {
        let status: Option<String> = conn
            .query_row(
                "SELECT status FROM pipeline_runs WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(status.map(|s| s.parse::<RunState>()).transpose()?)
    })
}

/// Writes a new status, stamping `started_at` on the first move to
/// `running` and `completed_at` on terminal states.
pub fn update_status(
    db: &Database,
    id: &str,
    status: RunState,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE pipeline_runs SET status = ?2,
               started_at = CASE WHEN ?2 = 'running' AND started_at IS NULL THEN ?3 ELSE started_at END,
               completed_at = CASE WHEN ?2 IN ('complete', 'failed') THEN ?3 ELSE completed_at END
             WHERE id = ?1",
            params![id, status.as_str(), now],
        )?;
        Ok(())
    })
}

/// Updates the progress columns shown to status pollers.
pub fn update_progress(
    db: &Database,
    id: &str,
    stage: &str,
    percent: u8,
    message: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE pipeline_runs SET progress_stage = ?2, progress_percent = ?3,
             progress_message = ?4 WHERE id = ?1",
            params![id, stage, percent.min(100) as i64, message],
        )?;
        Ok(())
    })
}

/// Appends an error to the run's error log.
pub fn insert_error(
    db: &Database,
    run_id: &str,
    stage: &str,
    category: Option<&str>,
    article_id: Option<&str>,
    message: &str,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO pipeline_run_errors (run_id, stage, category, article_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![run_id, stage, category, article_id, message, now],
        )?;
        Ok(())
    })
}

/// Most recent errors of a run, newest first.
pub fn recent_errors(
    db: &Database,
    run_id: &str,
    limit: u32,
) -> Result<Vec<RunErrorRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT stage, category, article_id, message, created_at
             FROM pipeline_run_errors WHERE run_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![run_id, limit as i64], |row| {
                Ok(RunErrorRow {
                    stage: row.get(0)?,
                    category: row.get(1)?,
                    article_id: row.get(2)?,
                    message: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn insert_run(db: &Database, id: &str, created_at: &str) {
        let config = serde_json::json!({"operation": "full_refresh"});
        insert(
            db,
            &NewRun {
                id,
                run_type: RunType::FullRefresh,
                config: &config,
                trigger_source: TriggerSource::Manual,
                trigger_context: None,
                estimated_seconds: Some(90),
                created_at,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert_run(&db, "run-1", "2026-01-01T00:00:00Z");

        let run = find_by_id(&db, "run-1").unwrap().unwrap();
        assert_eq!(run.run_type, RunType::FullRefresh);
        assert_eq!(run.status, RunState::Pending);
        assert_eq!(run.trigger_source, TriggerSource::Manual);
        assert_eq!(run.estimated_seconds, Some(90));
        assert_eq!(run.config["operation"], "full_refresh");
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
        assert!(status_of(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_status_timestamps() {
        let db = test_db();
        insert_run(&db, "run-2", "2026-01-01T00:00:00Z");

        update_status(&db, "run-2", RunState::Running, "2026-01-01T00:00:01Z").unwrap();
        update_status(&db, "run-2", RunState::Analyzing, "2026-01-01T00:00:05Z").unwrap();
        update_status(&db, "run-2", RunState::Complete, "2026-01-01T00:01:00Z").unwrap();

        let run = find_by_id(&db, "run-2").unwrap().unwrap();
        assert_eq!(run.status, RunState::Complete);
        assert_eq!(run.started_at.as_deref(), Some("2026-01-01T00:00:01Z"));
        assert_eq!(run.completed_at.as_deref(), Some("2026-01-01T00:01:00Z"));
    }

    #[test]
    fn test_count_active() {
        let db = test_db();
        insert_run(&db, "a", "2026-01-01T00:00:00Z");
        insert_run(&db, "b", "2026-01-01T00:00:01Z");
        update_status(&db, "b", RunState::Failed, "2026-01-01T00:00:02Z").unwrap();
        assert_eq!(count_active(&db).unwrap(), 1);
    }

    #[test]
    fn test_errors_newest_first() {
        let db = test_db();
        insert_run(&db, "run-3", "2026-01-01T00:00:00Z");
        insert_error(&db, "run-3", "fetch", Some("politics"), None, "first", "t1").unwrap();
        insert_error(&db, "run-3", "analyze", None, Some("art-1"), "second", "t2").unwrap();

        let errors = recent_errors(&db, "run-3", 10).unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "second");
        assert_eq!(errors[0].article_id.as_deref(), Some("art-1"));
        assert_eq!(errors[1].category.as_deref(), Some("politics"));

        let limited = recent_errors(&db, "run-3", 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_list_recent_order() {
        let db = test_db();
        insert_run(&db, "old", "2026-01-01T00:00:00Z");
        insert_run(&db, "new", "2026-01-02T00:00:00Z");
        let runs = list_recent(&db, 10).unwrap();
        assert_eq!(runs[0].id, "new");
        assert_eq!(runs[1].id, "old");
    }

    #[test]
    fn test_progress_is_capped() {
        let db = test_db();
        insert_run(&db, "run-4", "2026-01-01T00:00:00Z");
        update_progress(&db, "run-4", "fetch", 250, "Fetching politics").unwrap();
        let run = find_by_id(&db, "run-4").unwrap().unwrap();
        assert_eq!(run.progress_percent, 100);
        assert_eq!(run.progress_stage.as_deref(), Some("fetch"));
    }
}
