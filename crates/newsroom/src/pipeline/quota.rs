//! Per-category quota bookkeeping: `pending → fetching → complete | exhausted`.

use crate::db::category_repo::{self, CategoryStatusRow};
use crate::db::{now_timestamp, Database, DatabaseError};
use crate::model::CategoryState;

/// Tracks one category's target, accepted count and pull attempts within a
/// run. Every mutation is written through to `category_status`.
pub struct QuotaTracker {
    db: Database,
    row: CategoryStatusRow,
    max_attempts: u32,
}

impl QuotaTracker {
    /// Creates (or resets) the category's row as `pending`.
    pub fn start(
        db: &Database,
        run_id: &str,
        category: &str,
        target_count: u32,
        max_attempts: u32,
    ) -> Result<Self, DatabaseError> {
        let now = now_timestamp();
        category_repo::insert_pending(db, run_id, category, target_count, &now)?;
        Ok(Self {
            db: db.clone(),
            row: CategoryStatusRow {
                run_id: run_id.to_string(),
                category: category.to_string(),
                target_count,
                current_count: 0,
                pull_attempts: 0,
                status: CategoryState::Pending,
                updated_at: now,
            },
            max_attempts: max_attempts.max(1),
        })
    }

    pub fn row(&self) -> &CategoryStatusRow {
        &self.row
    }

    pub fn target(&self) -> u32 {
        self.row.target_count
    }

    pub fn remaining(&self) -> u32 {
        self.row.target_count.saturating_sub(self.row.current_count)
    }

    pub fn is_full(&self) -> bool {
        self.row.current_count >= self.row.target_count
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.row.status,
            CategoryState::Complete | CategoryState::Exhausted
        )
    }

    /// Whether another fetch cycle is allowed.
    pub fn can_pull(&self) -> bool {
        !self.is_terminal() && !self.is_full() && self.row.pull_attempts < self.max_attempts
    }

    pub fn begin_fetching(&mut self) -> Result<(), DatabaseError> {
        if self.row.status == CategoryState::Pending {
            self.row.status = CategoryState::Fetching;
            self.save()?;
        }
        Ok(())
    }

    /// Counts one fetch cycle against the attempt cap.
    pub fn record_attempt(&mut self) -> Result<(), DatabaseError> {
        self.row.pull_attempts += 1;
        self.save()
    }

    /// Adds newly accepted articles, never past the target.
    pub fn record_accepted(&mut self, count: u32) -> Result<(), DatabaseError> {
        if count == 0 {
            return Ok(());
        }
        self.row.current_count = (self.row.current_count + count).min(self.row.target_count);
        self.save()
    }

    /// Ends the category early because the source has nothing new.
    pub fn mark_exhausted(&mut self) -> Result<CategoryState, DatabaseError> {
        self.set_terminal(CategoryState::Exhausted)
    }

    /// Ends the category: `complete` if the target was met, else `exhausted`.
    pub fn finish(&mut self) -> Result<CategoryState, DatabaseError> {
        if self.is_terminal() {
            return Ok(self.row.status);
        }
        let state = if self.is_full() {
            CategoryState::Complete
        } else {
            CategoryState::Exhausted
        };
        self.set_terminal(state)
    }

    fn set_terminal(&mut self, state: CategoryState) -> Result<CategoryState, DatabaseError> {
        self.row.status = state;
        self.save()?;
        Ok(state)
    }

    fn save(&mut self) -> Result<(), DatabaseError> {
        self.row.updated_at = now_timestamp();
        category_repo::save(&self.db, &self.row)
    }
}
