//! Live repository: the reader-facing stories, viewpoints and social posts.
//!
//! Stories own their viewpoints, viewpoints own their posts; both foreign
//! keys cascade, so deleting a story removes its whole subtree.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::staging_repo::{insert_posts, load_viewpoints, ViewpointRecord};
use super::{Database, DatabaseError};

/// A story ready to be written to the live store.
#[derive(Debug, Clone)]
pub struct StoryDraft {
    pub title: String,
    pub url: String,
    pub normalized_url: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
    pub summary: Option<String>,
    pub viewpoints: Vec<ViewpointRecord>,
}

/// A live story row (without its viewpoints).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRow {
    pub id: String,
    pub category: String,
    pub title: String,
    pub url: String,
    pub normalized_url: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
    pub summary: Option<String>,
    pub run_id: Option<String>,
    pub position: u32,
    pub promoted_at: String,
}

impl StoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            category: row.get("category")?,
            title: row.get("title")?,
            url: row.get("url")?,
            normalized_url: row.get("normalized_url")?,
            normalized_title: row.get("normalized_title")?,
            description: row.get("description")?,
            source: row.get("source")?,
            image_url: row.get("image_url")?,
            published_at: row.get("published_at")?,
            summary: row.get("summary")?,
            run_id: row.get("run_id")?,
            position: row.get("position")?,
            promoted_at: row.get("promoted_at")?,
        })
    }
}

/// Selection filter for live stories.
#[derive(Debug, Default, Clone)]
pub struct StoryFilter {
    pub category: Option<String>,
    pub ids: Option<Vec<String>>,
    /// Inclusive lower bound on `published_at` (RFC 3339 text comparison).
    pub published_from: Option<String>,
    /// Inclusive upper bound on `published_at`.
    pub published_to: Option<String>,
    pub limit: Option<u64>,
}

/// Which parts of existing viewpoints a reanalysis rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReanalysisScope {
    /// Rewrite `summary` and `sentiment_score`.
    pub sentiment: bool,
    /// Replace the viewpoint's social posts.
    pub social: bool,
}

/// Replaces the live set of `category` with `stories`, in one transaction.
/// Returns the number of stories deleted.
pub fn replace_category(
    db: &Database,
    category: &str,
    run_id: &str,
    stories: &[StoryDraft],
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_transaction(|conn| {
        let removed = conn.execute("DELETE FROM stories WHERE category = ?1", params![category])?;
        for (position, story) in stories.iter().enumerate() {
            insert_story(conn, category, run_id, story, position as u32, now)?;
        }
        Ok(removed)
    })
}

/// Upserts `stories` into `category` keyed by normalized URL: an existing
/// live story with the same normalized URL is replaced, others are appended.
/// Returns the number of stories replaced.
pub fn merge_stories(
    db: &Database,
    category: &str,
    run_id: &str,
    stories: &[StoryDraft],
    now: &str,
) -> Result<usize, DatabaseError> {
    db.with_transaction(|conn| {
        let mut replaced = 0;
        let mut next_position: u32 = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM stories WHERE category = ?1",
            params![category],
            |r| r.get(0),
        )?;
        for story in stories {
            replaced += conn.execute(
                "DELETE FROM stories WHERE normalized_url = ?1 AND category = ?2",
                params![story.normalized_url, category],
            )?;
            insert_story(conn, category, run_id, story, next_position, now)?;
            next_position += 1;
        }
        Ok(replaced)
    })
}

/// Rewrites the viewpoints of one live story from a reanalysis.
///
/// Leans present in `viewpoints` are updated according to `scope`; a lean
/// the story did not have yet is inserted whole. Leans missing from
/// `viewpoints` are left untouched. Returns false if the story no longer exists.
pub fn apply_reanalysis(
    db: &Database,
    story_id: &str,
    summary: Option<&str>,
    viewpoints: &[ViewpointRecord],
    scope: ReanalysisScope,
) -> Result<bool, DatabaseError> {
    db.with_transaction(|conn| {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM stories WHERE id = ?1)",
            params![story_id],
            |r| r.get(0),
        )?;
        if !exists {
            return Ok(false);
        }

        if scope.sentiment {
            if let Some(summary) = summary {
                conn.execute(
                    "UPDATE stories SET summary = ?2 WHERE id = ?1",
                    params![story_id, summary],
                )?;
            }
        }

        for viewpoint in viewpoints {
            let existing: Option<String> = {
                let mut stmt =
                    conn.prepare("SELECT id FROM viewpoints WHERE story_id = ?1 AND lean = ?2")?;
                let mut rows = stmt.query(params![story_id, viewpoint.lean.as_str()])?;
                match rows.next()? {
                    Some(row) => Some(row.get(0)?),
                    None => None,
                }
            };

            match existing {
                None => insert_viewpoint(conn, story_id, viewpoint)?,
                Some(viewpoint_id) => {
                    if scope.sentiment {
                        conn.execute(
                            "UPDATE viewpoints SET summary = ?2, sentiment_score = ?3,
                             is_fallback = ?4, note = ?5 WHERE id = ?1",
                            params![
                                viewpoint_id,
                                viewpoint.summary,
                                viewpoint.sentiment_score,
                                viewpoint.is_fallback,
                                viewpoint.note,
                            ],
                        )?;
                    }
                    if scope.social {
                        conn.execute(
                            "DELETE FROM social_posts WHERE viewpoint_id = ?1",
                            params![viewpoint_id],
                        )?;
                        insert_posts(conn, "social_posts", &viewpoint_id, &viewpoint.social_posts)?;
                    }
                }
            }
        }
        Ok(true)
    })
}

/// Lists live stories matching `filter`, in category then position order.
pub fn list_stories(db: &Database, filter: &StoryFilter) -> Result<Vec<StoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut conditions = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref category) = filter.category {
            conditions.push(format!("category = ?{}", param_values.len() + 1));
            param_values.push(Box::new(category.clone()));
        }
        if let Some(ref ids) = filter.ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let mut placeholders = Vec::with_capacity(ids.len());
            for id in ids {
                param_values.push(Box::new(id.clone()));
                placeholders.push(format!("?{}", param_values.len()));
            }
            conditions.push(format!("id IN ({})", placeholders.join(", ")));
        }
        if let Some(ref from) = filter.published_from {
            conditions.push(format!("published_at >= ?{}", param_values.len() + 1));
            param_values.push(Box::new(from.clone()));
        }
        if let Some(ref to) = filter.published_to {
            conditions.push(format!("published_at <= ?{}", param_values.len() + 1));
            param_values.push(Box::new(to.clone()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);
        param_values.push(Box::new(limit));
        let sql = format!(
            "SELECT * FROM stories {} ORDER BY category, position LIMIT ?{}",
            where_clause,
            param_values.len()
        );

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_ref.as_slice(), StoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts live stories in a category.
pub fn count_by_category(db: &Database, category: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM stories WHERE category = ?1",
            params![category],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Viewpoints of a live story with their posts, ordered left → center → right.
pub fn viewpoints_for_story(
    db: &Database,
    story_id: &str,
) -> Result<Vec<ViewpointRecord>, DatabaseError> {
    db.with_conn(|conn| {
        load_viewpoints(
            conn,
            "SELECT id, lean, summary, sentiment_score, is_fallback, note
             FROM viewpoints WHERE story_id = ?1",
            "social_posts",
            story_id,
        )
    })
}

fn insert_story(
    conn: &Connection,
    category: &str,
    run_id: &str,
    story: &StoryDraft,
    position: u32,
    now: &str,
) -> Result<(), DatabaseError> {
    let story_id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO stories (id, category, title, url, normalized_url, normalized_title,
         description, source, image_url, published_at, summary, run_id, position, promoted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            story_id,
            category,
            story.title,
            story.url,
            story.normalized_url,
            story.normalized_title,
            story.description,
            story.source,
            story.image_url,
            story.published_at,
            story.summary,
            run_id,
            position,
            now,
        ],
    )?;
    for viewpoint in &story.viewpoints {
        insert_viewpoint(conn, &story_id, viewpoint)?;
    }
    Ok(())
}

fn insert_viewpoint(
    conn: &Connection,
    story_id: &str,
    viewpoint: &ViewpointRecord,
) -> Result<(), DatabaseError> {
    let viewpoint_id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO viewpoints (id, story_id, lean, summary, sentiment_score, is_fallback, note)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            viewpoint_id,
            story_id,
            viewpoint.lean.as_str(),
            viewpoint.summary,
            viewpoint.sentiment_score,
            viewpoint.is_fallback,
            viewpoint.note,
        ],
    )?;
    insert_posts(conn, "social_posts", &viewpoint_id, &viewpoint.social_posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::staging_repo::SocialPostRecord;
    use crate::model::Lean;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    fn draft(n: usize, viewpoints: Vec<ViewpointRecord>) -> StoryDraft {
        StoryDraft {
            title: format!("Story {}", n),
            url: format!("https://news.test/{}", n),
            normalized_url: format!("https://news.test/{}", n),
            normalized_title: format!("story {}", n),
            description: None,
            source: Some("wire".to_string()),
            image_url: None,
            published_at: Some(format!("2026-01-{:02}T00:00:00Z", n + 1)),
            summary: Some("neutral".to_string()),
            viewpoints,
        }
    }

    fn viewpoint(lean: Lean, score: f64, posts: usize) -> ViewpointRecord {
        ViewpointRecord {
            lean,
            summary: format!("{} summary", lean),
            sentiment_score: score,
            is_fallback: false,
            note: None,
            social_posts: (0..posts)
                .map(|i| SocialPostRecord {
                    author: format!("author{}", i),
                    handle: format!("@author{}", i),
                    text: "post".to_string(),
                    url: None,
                    platform: "x".to_string(),
                    is_real: false,
                    likes: 0,
                    reposts: 0,
                    replies: 0,
                })
                .collect(),
        }
    }

    fn count(db: &Database, table: &str) -> u64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn test_replace_category_replaces_not_appends() {
        let db = test_db();
        let first: Vec<_> = (0..3)
            .map(|n| draft(n, vec![viewpoint(Lean::Left, 0.1, 2)]))
            .collect();
        replace_category(&db, "politics", "run-1", &first, "t1").unwrap();
        assert_eq!(count_by_category(&db, "politics").unwrap(), 3);

        let second: Vec<_> = (10..12).map(|n| draft(n, vec![])).collect();
        let removed = replace_category(&db, "politics", "run-2", &second, "t2").unwrap();
        assert_eq!(removed, 3);
        assert_eq!(count_by_category(&db, "politics").unwrap(), 2);
        assert_eq!(count(&db, "viewpoints"), 0);
        assert_eq!(count(&db, "social_posts"), 0);
    }

    #[test]
    fn test_replace_category_leaves_other_categories() {
        let db = test_db();
        replace_category(&db, "sports", "run-1", &[draft(1, vec![])], "t1").unwrap();
        replace_category(&db, "politics", "run-1", &[draft(2, vec![])], "t1").unwrap();
        replace_category(&db, "politics", "run-2", &[], "t2").unwrap();
        assert_eq!(count_by_category(&db, "sports").unwrap(), 1);
        assert_eq!(count_by_category(&db, "politics").unwrap(), 0);
    }

    #[test]
    fn test_merge_replaces_same_url_and_appends_new() {
        let db = test_db();
        merge_stories(&db, "search", "run-1", &[draft(1, vec![]), draft(2, vec![])], "t1")
            .unwrap();
        let replaced =
            merge_stories(&db, "search", "run-2", &[draft(2, vec![]), draft(3, vec![])], "t2")
                .unwrap();
        assert_eq!(replaced, 1);
        assert_eq!(count_by_category(&db, "search").unwrap(), 3);
    }

    #[test]
    fn test_merge_never_touches_other_categories() {
        let db = test_db();
        let politics: Vec<_> = (0..3)
            .map(|n| draft(n, vec![viewpoint(Lean::Right, 0.2, 1)]))
            .collect();
        replace_category(&db, "politics", "run-1", &politics, "t1").unwrap();

        let replaced = merge_stories(&db, "search", "run-2", &[draft(0, vec![])], "t2").unwrap();
        assert_eq!(replaced, 0);
        assert_eq!(count_by_category(&db, "politics").unwrap(), 3);
        assert_eq!(count_by_category(&db, "search").unwrap(), 1);
        assert_eq!(count(&db, "viewpoints"), 3);
        assert_eq!(count(&db, "social_posts"), 3);
    }

    #[test]
    fn test_list_stories_filters() {
        let db = test_db();
        let stories: Vec<_> = (0..5).map(|n| draft(n, vec![])).collect();
        replace_category(&db, "politics", "run-1", &stories, "t1").unwrap();

        let by_date = list_stories(
            &db,
            &StoryFilter {
                published_from: Some("2026-01-02T00:00:00Z".to_string()),
                published_to: Some("2026-01-03T00:00:00Z".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_date.len(), 2);

        let ids = vec![by_date[0].id.clone()];
        let by_id = list_stories(
            &db,
            &StoryFilter {
                ids: Some(ids),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_id.len(), 1);

        let limited = list_stories(
            &db,
            &StoryFilter {
                category: Some("politics".to_string()),
                limit: Some(2),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].position, 0);
    }

    #[test]
    fn test_apply_reanalysis_social_only_keeps_sentiment() {
        let db = test_db();
        replace_category(
            &db,
            "politics",
            "run-1",
            &[draft(1, vec![viewpoint(Lean::Left, 0.5, 1)])],
            "t1",
        )
        .unwrap();
        let story = list_stories(&db, &StoryFilter::default()).unwrap().remove(0);

        let fresh = vec![viewpoint(Lean::Left, -0.9, 3), viewpoint(Lean::Right, 0.2, 1)];
        let applied = apply_reanalysis(
            &db,
            &story.id,
            Some("new summary"),
            &fresh,
            ReanalysisScope {
                sentiment: false,
                social: true,
            },
        )
        .unwrap();
        assert!(applied);

        let viewpoints = viewpoints_for_story(&db, &story.id).unwrap();
        assert_eq!(viewpoints.len(), 2);
        assert_eq!(viewpoints[0].lean, Lean::Left);
        assert_eq!(viewpoints[0].sentiment_score, 0.5);
        assert_eq!(viewpoints[0].social_posts.len(), 3);
        assert_eq!(viewpoints[1].lean, Lean::Right);

        let story = list_stories(&db, &StoryFilter::default()).unwrap().remove(0);
        assert_eq!(story.summary.as_deref(), Some("neutral"));
    }

    #[test]
    fn test_apply_reanalysis_missing_story() {
        let db = test_db();
        let applied = apply_reanalysis(
            &db,
            "gone",
            None,
            &[],
            ReanalysisScope {
                sentiment: true,
                social: true,
            },
        )
        .unwrap();
        assert!(!applied);
    }
}
