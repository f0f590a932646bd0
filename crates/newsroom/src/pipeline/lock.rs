//! Global advisory lock: at most one run is active at a time.

use chrono::Utc;
use tracing::{info, warn};

use super::error::{LockHeld, PipelineError};
use super::runs::RunManager;
use crate::db::lock_repo::{self, AcquireOutcome, LockHolder};
use crate::db::run_repo;
use crate::db::Database;

const ABANDONED: &str = "abandoned: pipeline lock expired";

pub struct LockService {
    db: Database,
    runs: RunManager,
    stale_after: Option<chrono::Duration>,
}

impl LockService {
    /// `stale_after_secs == 0` disables stale-lock reclaim.
    pub fn new(db: &Database, stale_after_secs: u64) -> Self {
        let stale_after = (stale_after_secs > 0)
            .then(|| chrono::Duration::seconds(stale_after_secs.min(i64::MAX as u64) as i64));
        Self {
            db: db.clone(),
            runs: RunManager::new(db, 1),
            stale_after,
        }
    }

    /// Takes the lock for `run_id` or fails immediately with [`LockHeld`].
    ///
    /// A lock older than the stale threshold is reclaimed: its holder's run
    /// is failed first, then the lock changes hands. Returns the run whose
    /// lock was reclaimed, if any.
    pub fn acquire(&self, run_id: &str) -> Result<Option<String>, PipelineError> {
        let now = Utc::now();
        let holder = match lock_repo::try_acquire(&self.db, run_id, now)? {
            AcquireOutcome::Acquired => return Ok(None),
            AcquireOutcome::Held(holder) => holder,
        };

        let stale = self
            .stale_after
            .is_some_and(|after| lock_repo::is_stale(&holder.acquired_at, now, after));
        if !stale {
            return Err(held(holder));
        }

        self.runs.abandon(&holder.run_id, ABANDONED)?;
        if lock_repo::reclaim(&self.db, &holder, run_id, now)? {
            warn!(run_id, previous = %holder.run_id, "Reclaimed stale pipeline lock");
            return Ok(Some(holder.run_id));
        }
        match lock_repo::holder(&self.db)? {
            Some(current) => Err(held(current)),
            // Released between our reads; one more plain attempt.
            None => match lock_repo::try_acquire(&self.db, run_id, Utc::now())? {
                AcquireOutcome::Acquired => Ok(None),
                AcquireOutcome::Held(current) => Err(held(current)),
            },
        }
    }

    /// Releases the lock if `run_id` holds it; a no-op otherwise.
    pub fn release(&self, run_id: &str) -> Result<bool, PipelineError> {
        let released = lock_repo::release(&self.db, run_id)?;
        if !released {
            warn!(run_id, "Lock release skipped: not the holder");
        }
        Ok(released)
    }

    pub fn holder(&self) -> Result<Option<LockHolder>, PipelineError> {
        Ok(lock_repo::holder(&self.db)?)
    }

    /// Clears the lock regardless of holder.
    pub fn force_release(&self) -> Result<Option<LockHolder>, PipelineError> {
        let previous = lock_repo::force_release(&self.db)?;
        if let Some(ref holder) = previous {
            info!(run_id = %holder.run_id, "Pipeline lock force-released");
        }
        let active = run_repo::count_active(&self.db)?;
        if active > 0 {
            warn!(active, "Runs still marked active after lock release");
        }
        Ok(previous)
    }
}

fn held(holder: LockHolder) -> PipelineError {
    LockHeld {
        holder: holder.run_id,
        acquired_at: holder.acquired_at,
    }
    .into()
}
