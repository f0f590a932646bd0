//! Analysis job repository: one job per staged article.

use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::model::JobState;

/// An analysis job row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJobRow {
    pub id: String,
    pub run_id: String,
    pub article_id: String,
    pub status: JobState,
    pub attempt_count: u32,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl AnalysisJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, DatabaseError> {
        let status: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            run_id: row.get("run_id")?,
            article_id: row.get("article_id")?,
            status: status.parse()?,
            attempt_count: row.get("attempt_count")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            completed_at: row.get("completed_at")?,
        })
    }
}

/// Job counts of a run, by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
}

impl JobCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.running + self.done + self.failed
    }

    pub fn finished(&self) -> u64 {
        self.done + self.failed
    }
}

/// Inserts a pending job for an article and returns its id.
pub fn insert_pending(
    db: &Database,
    run_id: &str,
    article_id: &str,
    now: &str,
) -> Result<String, DatabaseError> {
    let id = uuid::Uuid::new_v4().to_string();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO analysis_jobs (id, run_id, article_id, status, attempt_count, created_at)
             VALUES (?1, ?2, ?3, 'pending', 0, ?4)",
            params![id, run_id, article_id, now],
        )?;
        Ok(())
    })?;
    Ok(id)
}

/// Moves a job to `running` and counts the attempt.
pub fn mark_running(db: &Database, id: &str, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE analysis_jobs SET status = 'running', attempt_count = attempt_count + 1,
             started_at = ?2, error = NULL WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    })
}

/// Moves a job to `done`.
pub fn mark_done(db: &Database, id: &str, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE analysis_jobs SET status = 'done', completed_at = ?2 WHERE id = ?1",
            params![id, now],
        )?;
        Ok(())
    })
}

/// Moves a job to `failed` with the error that caused it.
pub fn mark_failed(db: &Database, id: &str, error: &str, now: &str) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE analysis_jobs SET status = 'failed', error = ?2, completed_at = ?3 WHERE id = ?1",
            params![id, error, now],
        )?;
        Ok(())
    })
}

/// Finds a job by id.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<AnalysisJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM analysis_jobs WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(AnalysisJobRow::from_row(row)?)),
            None => Ok(None),
        }
    })
}

/// All jobs of a run in creation order.
pub fn list_for_run(db: &Database, run_id: &str) -> Result<Vec<AnalysisJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM analysis_jobs WHERE run_id = ?1 ORDER BY rowid")?;
        let mut rows = stmt.query(params![run_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(AnalysisJobRow::from_row(row)?);
        }
        Ok(out)
    })
}

/// Counts the jobs of a run by state.
pub fn counts_for_run(db: &Database, run_id: &str) -> Result<JobCounts, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM analysis_jobs WHERE run_id = ?1 GROUP BY status",
        )?;
        let grouped = stmt
            .query_map(params![run_id], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, u64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut counts = JobCounts::default();
        for (status, n) in grouped {
            match status.parse::<JobState>()? {
                JobState::Pending => counts.pending = n,
                JobState::Running => counts.running = n,
                JobState::Done => counts.done = n,
                JobState::Failed => counts.failed = n,
            }
        }
        Ok(counts)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.with_conn(|conn| {
            conn.execute_batch(
                "INSERT INTO pipeline_runs (id, run_type, status, config, trigger_source, created_at)
                 VALUES ('run-1', 'category_refresh', 'running', '{}', 'manual', 't0');
                 INSERT INTO staging_articles (id, run_id, category, title, url, normalized_url,
                   normalized_title, position, created_at)
                 VALUES ('a1', 'run-1', 'politics', 'T1', 'u1', 'u1', 't1', 0, 't0'),
                        ('a2', 'run-1', 'politics', 'T2', 'u2', 'u2', 't2', 1, 't0');",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_job_lifecycle() {
        let db = test_db();
        let id = insert_pending(&db, "run-1", "a1", "t0").unwrap();

        mark_running(&db, &id, "t1").unwrap();
        let job = find_by_id(&db, &id).unwrap().unwrap();
        assert_eq!(job.status, JobState::Running);
        assert_eq!(job.attempt_count, 1);

        mark_failed(&db, &id, "timed out", "t2").unwrap();
        let job = find_by_id(&db, &id).unwrap().unwrap();
        assert_eq!(job.status, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("timed out"));
        assert_eq!(job.completed_at.as_deref(), Some("t2"));
    }

    #[test]
    fn test_counts_for_run() {
        let db = test_db();
        let j1 = insert_pending(&db, "run-1", "a1", "t0").unwrap();
        let _j2 = insert_pending(&db, "run-1", "a2", "t0").unwrap();
        mark_running(&db, &j1, "t1").unwrap();
        mark_done(&db, &j1, "t2").unwrap();

        let counts = counts_for_run(&db, "run-1").unwrap();
        assert_eq!(counts.done, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.total(), 2);
        assert_eq!(counts.finished(), 1);
    }

    #[test]
    fn test_jobs_cascade_with_article() {
        let db = test_db();
        insert_pending(&db, "run-1", "a1", "t0").unwrap();
        db.with_conn(|conn| {
            conn.execute("DELETE FROM staging_articles WHERE id = 'a1'", [])?;
            Ok(())
        })
        .unwrap();
        assert!(list_for_run(&db, "run-1").unwrap().is_empty());
    }
}
