//! Promotion: staged, analyzed articles become the live set.

use tracing::{info, warn};

use super::config::AnalysisType;
use super::error::PromotionError;
use crate::db::live_repo::{self, ReanalysisScope, StoryDraft};
use crate::db::staging_repo::{self, StagingArticleRow};
use crate::db::{now_timestamp, Database, DatabaseError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// The live set of the category now holds `inserted` stories.
    Replaced { inserted: usize, removed: usize },
    /// Stories were merged by normalized URL.
    Merged { inserted: usize, replaced: usize },
    /// Nothing was staged; the previous live set stays untouched.
    Skipped,
}

impl Promotion {
    pub fn promoted(&self) -> usize {
        match self {
            Promotion::Replaced { inserted, .. } | Promotion::Merged { inserted, .. } => *inserted,
            Promotion::Skipped => 0,
        }
    }
}

fn storage(category: &str) -> impl FnOnce(DatabaseError) -> PromotionError + '_ {
    move |source| PromotionError::Storage {
        category: category.to_string(),
        source,
    }
}

fn drafts(db: &Database, rows: &[StagingArticleRow]) -> Result<Vec<StoryDraft>, DatabaseError> {
    rows.iter()
        .map(|row| {
            Ok(StoryDraft {
                title: row.title.clone(),
                url: row.url.clone(),
                normalized_url: row.normalized_url.clone(),
                normalized_title: row.normalized_title.clone(),
                description: row.description.clone(),
                source: row.source.clone(),
                image_url: row.image_url.clone(),
                published_at: row.published_at.clone(),
                summary: row.analysis_summary.clone(),
                viewpoints: staging_repo::viewpoints_for_article(db, &row.id)?,
            })
        })
        .collect()
}

/// Replaces the live set of `category` with this run's staged articles in
/// one transaction. Zero staged articles leaves the live set alone.
pub fn promote_category(db: &Database, run_id: &str, category: &str) -> Result<Promotion, PromotionError> {
    let rows = staging_repo::list_articles(db, run_id, Some(category)).map_err(storage(category))?;
    if rows.is_empty() {
        warn!(run_id, category, "Nothing staged; keeping the current live set");
        return Ok(Promotion::Skipped);
    }
    let stories = drafts(db, &rows).map_err(storage(category))?;
    let removed = live_repo::replace_category(db, category, run_id, &stories, &now_timestamp())
        .map_err(storage(category))?;
    info!(run_id, category, inserted = stories.len(), removed, "Category promoted");
    Ok(Promotion::Replaced {
        inserted: stories.len(),
        removed,
    })
}

/// Merges this run's staged articles under `category` by normalized URL.
pub fn merge_category(db: &Database, run_id: &str, category: &str) -> Result<Promotion, PromotionError> {
    let rows = staging_repo::list_articles(db, run_id, Some(category)).map_err(storage(category))?;
    if rows.is_empty() {
        warn!(run_id, category, "Nothing staged to merge");
        return Ok(Promotion::Skipped);
    }
    let stories = drafts(db, &rows).map_err(storage(category))?;
    let replaced = live_repo::merge_stories(db, category, run_id, &stories, &now_timestamp())
        .map_err(storage(category))?;
    info!(run_id, category, inserted = stories.len(), replaced, "Stories merged");
    Ok(Promotion::Merged {
        inserted: stories.len(),
        replaced,
    })
}

pub fn reanalysis_scope(types: &[AnalysisType]) -> ReanalysisScope {
    ReanalysisScope {
        sentiment: types.contains(&AnalysisType::Sentiment),
        social: types.contains(&AnalysisType::Social),
    }
}

/// Writes the fresh analysis of reanalysis copies back onto their live
/// stories. Only `article_ids` (the successful ones) are applied. Returns
/// the number of stories updated.
pub fn apply_reanalysis(
    db: &Database,
    category: &str,
    article_ids: &[String],
    types: &[AnalysisType],
) -> Result<usize, PromotionError> {
    let scope = reanalysis_scope(types);
    let mut applied = 0;
    for article_id in article_ids {
        let Some(row) = staging_repo::find_article(db, article_id).map_err(storage(category))? else {
            continue;
        };
        let Some(ref story_id) = row.live_story_id else {
            continue;
        };
        let viewpoints = staging_repo::viewpoints_for_article(db, article_id).map_err(storage(category))?;
        let updated = live_repo::apply_reanalysis(
            db,
            story_id,
            row.analysis_summary.as_deref(),
            &viewpoints,
            scope,
        )
        .map_err(storage(category))?;
        if updated {
            applied += 1;
        } else {
            warn!(story_id = %story_id, "Live story disappeared before reanalysis was applied");
        }
    }
    info!(category, applied, "Reanalysis applied");
    Ok(applied)
}
