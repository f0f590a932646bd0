//! Pipeline lock repository: the singleton `pipeline_lock` row.
//!
//! The row's primary key is constrained to `1`, so the table can never hold
//! more than one holder. Acquisition is a single `INSERT … ON CONFLICT DO
//! NOTHING`; the affected-row count tells the caller whether it won. Failing
//! an abandoned holder's run is left to the lock service.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::{Database, DatabaseError};

/// The current lock holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockHolder {
    pub run_id: String,
    pub acquired_at: String,
}

/// Result of an acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller now holds the lock.
    Acquired,
    /// Someone else holds the lock.
    Held(LockHolder),
}

/// Reads the current holder, if any.
pub fn holder(db: &Database) -> Result<Option<LockHolder>, DatabaseError> {
    db.with_conn(|conn| Ok(current_holder(conn).optional()?))
}

/// Atomically takes the lock for `run_id`, or reports the current holder.
pub fn try_acquire(db: &Database, run_id: &str, now: DateTime<Utc>) -> Result<AcquireOutcome, DatabaseError> {
    db.with_transaction(|conn| {
        let inserted = conn.execute(
            "INSERT INTO pipeline_lock (id, run_id, acquired_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO NOTHING",
            params![run_id, now.to_rfc3339()],
        )?;
        if inserted == 1 {
            return Ok(AcquireOutcome::Acquired);
        }
        Ok(AcquireOutcome::Held(current_holder(conn)?))
    })
}

/// Hands a lock over from `stale` to `run_id`.
///
/// The delete only matches the exact holder row the caller inspected, so
/// when two acquirers race on the same stale lock at most one wins.
/// Returns whether `run_id` now holds the lock.
pub fn reclaim(
    db: &Database,
    stale: &LockHolder,
    run_id: &str,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    db.with_transaction(|conn| {
        let removed = conn.execute(
            "DELETE FROM pipeline_lock WHERE id = 1 AND run_id = ?1 AND acquired_at = ?2",
            params![stale.run_id, stale.acquired_at],
        )?;
        if removed == 0 {
            return Ok(false);
        }
        let inserted = conn.execute(
            "INSERT INTO pipeline_lock (id, run_id, acquired_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO NOTHING",
            params![run_id, now.to_rfc3339()],
        )?;
        Ok(inserted == 1)
    })
}

/// Deletes the lock only if `run_id` holds it. Returns whether a row was removed.
pub fn release(db: &Database, run_id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let removed = conn.execute(
            "DELETE FROM pipeline_lock WHERE id = 1 AND run_id = ?1",
            params![run_id],
        )?;
        Ok(removed == 1)
    })
}

/// Deletes the lock regardless of holder. Returns the previous holder.
pub fn force_release(db: &Database) -> Result<Option<LockHolder>, DatabaseError> {
    let previous = holder(db)?;
    db.with_conn(|conn| {
        conn.execute("DELETE FROM pipeline_lock WHERE id = 1", [])?;
        Ok(())
    })?;
    Ok(previous)
}

fn current_holder(conn: &Connection) -> Result<LockHolder, rusqlite::Error> {
    conn.query_row(
        "SELECT run_id, acquired_at FROM pipeline_lock WHERE id = 1",
        [],
        |r| {
            Ok(LockHolder {
                run_id: r.get(0)?,
                acquired_at: r.get(1)?,
            })
        },
    )
}

/// True when a lock taken at `acquired_at` is older than `stale_after`.
/// An unreadable timestamp cannot be proven fresh.
pub fn is_stale(acquired_at: &str, now: DateTime<Utc>, stale_after: Duration) -> bool {
    match DateTime::parse_from_rfc3339(acquired_at) {
        Ok(at) => now.signed_duration_since(at.with_timezone(&Utc)) > stale_after,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_acquire_free_lock() {
        let db = test_db();
        let outcome = try_acquire(&db, "run-a", at("2026-01-01T00:00:00Z")).unwrap();
        assert_eq!(outcome, AcquireOutcome::Acquired);
        assert_eq!(holder(&db).unwrap().unwrap().run_id, "run-a");
    }

    #[test]
    fn test_second_acquire_is_rejected() {
        let db = test_db();
        try_acquire(&db, "run-a", at("2026-01-01T00:00:00Z")).unwrap();
        let outcome = try_acquire(&db, "run-b", at("2026-01-01T00:00:01Z")).unwrap();
        match outcome {
            AcquireOutcome::Held(holder) => assert_eq!(holder.run_id, "run-a"),
            other => panic!("expected Held, got {:?}", other),
        }
    }

    #[test]
    fn test_release_only_by_holder() {
        let db = test_db();
        try_acquire(&db, "run-a", at("2026-01-01T00:00:00Z")).unwrap();

        assert!(!release(&db, "run-b").unwrap());
        assert!(holder(&db).unwrap().is_some());

        assert!(release(&db, "run-a").unwrap());
        assert!(holder(&db).unwrap().is_none());
    }

    #[test]
    fn test_reclaim_hands_over_inspected_holder() {
        let db = test_db();
        try_acquire(&db, "crashed", at("2026-01-01T00:00:00Z")).unwrap();
        let stale = holder(&db).unwrap().unwrap();

        assert!(reclaim(&db, &stale, "fresh", at("2026-01-01T02:00:00Z")).unwrap());
        assert_eq!(holder(&db).unwrap().unwrap().run_id, "fresh");

        // A second acquirer that saw the same stale row loses.
        assert!(!reclaim(&db, &stale, "late", at("2026-01-01T02:00:01Z")).unwrap());
        assert_eq!(holder(&db).unwrap().unwrap().run_id, "fresh");
    }

    #[test]
    fn test_staleness() {
        let now = at("2026-01-01T02:00:00Z");
        assert!(is_stale("2026-01-01T00:00:00Z", now, Duration::hours(1)));
        assert!(!is_stale("2026-01-01T01:30:00Z", now, Duration::hours(1)));
        assert!(is_stale("yesterday", now, Duration::hours(1)));
    }

    #[test]
    fn test_force_release_returns_previous_holder() {
        let db = test_db();
        try_acquire(&db, "run-a", at("2026-01-01T00:00:00Z")).unwrap();
        let previous = force_release(&db).unwrap();
        assert_eq!(previous.unwrap().run_id, "run-a");
        assert!(holder(&db).unwrap().is_none());
    }
}
