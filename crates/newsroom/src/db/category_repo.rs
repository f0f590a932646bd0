//! Category status repository: per-run quota bookkeeping rows.

use rusqlite::{params, Row};
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::model::CategoryState;

/// One `(run_id, category)` quota row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStatusRow {
    pub run_id: String,
    pub category: String,
    pub target_count: u32,
    pub current_count: u32,
    pub pull_attempts: u32,
    pub status: CategoryState,
    pub updated_at: String,
}

impl CategoryStatusRow {
    fn from_row(row: &Row<'_>) -> Result<Self, DatabaseError> {
        let status: String = row.get("status")?;
        Ok(Self {
            run_id: row.get("run_id")?,
            category: row.get("category")?,
            target_count: row.get("target_count")?,
            current_count: row.get("current_count")?,
            pull_attempts: row.get("pull_attempts")?,
            status: status.parse()?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts a `pending` row for a category, or resets it if it already exists.
pub fn insert_pending(
    db: &Database,
    run_id: &str,
    category: &str,
    target_count: u32,
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO category_status (run_id, category, target_count, current_count,
             pull_attempts, status, updated_at)
             VALUES (?1, ?2, ?3, 0, 0, 'pending', ?4)
             ON CONFLICT(run_id, category) DO UPDATE SET
               target_count = excluded.target_count, current_count = 0,
               pull_attempts = 0, status = 'pending', updated_at = excluded.updated_at",
            params![run_id, category, target_count, now],
        )?;
        Ok(())
    })
}

/// Overwrites the mutable columns of a row.
pub fn save(db: &Database, row: &CategoryStatusRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE category_status SET target_count = ?3, current_count = ?4,
             pull_attempts = ?5, status = ?6, updated_at = ?7
             WHERE run_id = ?1 AND category = ?2",
            params![
                row.run_id,
                row.category,
                row.target_count,
                row.current_count,
                row.pull_attempts,
                row.status.as_str(),
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds the row for one category of a run.
pub fn find(
    db: &Database,
    run_id: &str,
    category: &str,
) -> Result<Option<CategoryStatusRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM category_status WHERE run_id = ?1 AND category = ?2")?;
        let mut rows = stmt.query(params![run_id, category])?;
        match rows.next()? {
            Some(row) => Ok(Some(CategoryStatusRow::from_row(row)?)),
            None => Ok(None),
        }
    })
}

/// All category rows of a run, in insertion order.
pub fn list_for_run(db: &Database, run_id: &str) -> Result<Vec<CategoryStatusRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM category_status WHERE run_id = ?1 ORDER BY rowid")?;
        let mut rows = stmt.query(params![run_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(CategoryStatusRow::from_row(row)?);
        }
        Ok(out)
    })
}
