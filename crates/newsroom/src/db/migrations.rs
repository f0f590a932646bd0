//! Schema migrations.
//!
//! Applied versions are recorded in `_migrations`. Each pending migration
//! runs in its own transaction together with its bookkeeping row, so a
//! failed script leaves no trace.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

impl Migration {
    const fn script(version: u32, description: &'static str, sql: &'static str) -> Self {
        Self {
            version,
            description,
            sql,
        }
    }

    fn apply(&self, conn: &Connection) -> Result<(), DatabaseError> {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(self.sql).map_err(|e| DatabaseError::Migration {
            version: self.version,
            reason: e.to_string(),
        })?;
        tx.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![self.version, self.description],
        )?;
        tx.commit()?;
        Ok(())
    }
}

const MIGRATIONS: &[Migration] = &[
    Migration::script(1, "create_pipeline_runs_table", include_str!("sql/001_create_pipeline_runs.sql")),
    Migration::script(2, "create_category_status_table", include_str!("sql/002_create_category_status.sql")),
    Migration::script(3, "create_pipeline_lock_table", include_str!("sql/003_create_pipeline_lock.sql")),
    Migration::script(4, "create_staging_tables", include_str!("sql/004_create_staging.sql")),
    Migration::script(5, "create_live_story_tables", include_str!("sql/005_create_live_stories.sql")),
];

/// Brings the schema up to the latest version.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied: u32 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |r| {
        r.get(0)
    })?;

    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    if pending.is_empty() {
        log::debug!("Schema is at v{}", applied);
        return Ok(());
    }
    for migration in pending {
        log::info!("Applying migration v{}: {}", migration.version, migration.description);
        migration.apply(conn)?;
    }
    Ok(())
}
