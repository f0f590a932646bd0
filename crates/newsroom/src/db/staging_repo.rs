//! Staging repository: articles, viewpoints and social posts that have not
//! been promoted to the live store yet.

use rusqlite::{params, Connection, Row};
use serde::Serialize;

use super::{Database, DatabaseError};
use crate::model::Lean;

/// Fields for a newly accepted article.
#[derive(Debug, Clone)]
pub struct NewStagingArticle<'a> {
    pub id: &'a str,
    pub run_id: &'a str,
    pub category: &'a str,
    pub title: &'a str,
    pub url: &'a str,
    pub normalized_url: &'a str,
    pub normalized_title: &'a str,
    pub description: Option<&'a str>,
    pub source: Option<&'a str>,
    pub image_url: Option<&'a str>,
    pub published_at: Option<&'a str>,
    /// Set when the article is a reanalysis copy of a live story.
    pub live_story_id: Option<&'a str>,
    pub payload: Option<&'a serde_json::Value>,
    pub position: u32,
    pub created_at: &'a str,
}

/// A staged article row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingArticleRow {
    pub id: String,
    pub run_id: String,
    pub category: String,
    pub title: String,
    pub url: String,
    pub normalized_url: String,
    pub normalized_title: String,
    pub description: Option<String>,
    pub source: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<String>,
    pub live_story_id: Option<String>,
    pub analysis_summary: Option<String>,
    pub superseded_by: Option<String>,
    pub position: u32,
    pub created_at: String,
}

impl StagingArticleRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            run_id: row.get("run_id")?,
            category: row.get("category")?,
            title: row.get("title")?,
            url: row.get("url")?,
            normalized_url: row.get("normalized_url")?,
            normalized_title: row.get("normalized_title")?,
            description: row.get("description")?,
            source: row.get("source")?,
            image_url: row.get("image_url")?,
            published_at: row.get("published_at")?,
            live_story_id: row.get("live_story_id")?,
            analysis_summary: row.get("analysis_summary")?,
            superseded_by: row.get("superseded_by")?,
            position: row.get("position")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// One lean's analysis, as stored in staging and copied to the live store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewpointRecord {
    pub lean: Lean,
    pub summary: String,
    /// Always within `[-1.0, 1.0]`; the tables enforce it with a CHECK.
    pub sentiment_score: f64,
    pub is_fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub social_posts: Vec<SocialPostRecord>,
}

/// A social media post backing a viewpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPostRecord {
    pub author: String,
    pub handle: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub platform: String,
    pub is_real: bool,
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
}

/// Inserts a staged article.
pub fn insert_article(db: &Database, article: &NewStagingArticle<'_>) -> Result<(), DatabaseError> {
    let payload = article.payload.map(serde_json::to_string).transpose()?;
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO staging_articles (id, run_id, category, title, url, normalized_url,
             normalized_title, description, source, image_url, published_at, live_story_id,
             payload, position, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                article.id,
                article.run_id,
                article.category,
                article.title,
                article.url,
                article.normalized_url,
                article.normalized_title,
                article.description,
                article.source,
                article.image_url,
                article.published_at,
                article.live_story_id,
                payload,
                article.position,
                article.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Marks staged rows of `category` from other runs as superseded by `run_id`.
/// Returns the number of rows marked.
pub fn supersede_category(
    db: &Database,
    category: &str,
    run_id: &str,
) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE staging_articles SET superseded_by = ?2
             WHERE category = ?1 AND run_id != ?2 AND superseded_by IS NULL",
            params![category, run_id],
        )?;
        Ok(n)
    })
}

/// Staged articles of a run in fetch order, optionally restricted to one category.
pub fn list_articles(
    db: &Database,
    run_id: &str,
    category: Option<&str>,
) -> Result<Vec<StagingArticleRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM staging_articles
             WHERE run_id = ?1 AND (?2 IS NULL OR category = ?2)
             ORDER BY category, position",
        )?;
        let rows = stmt
            .query_map(params![run_id, category], StagingArticleRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Finds a staged article by id.
pub fn find_article(db: &Database, id: &str) -> Result<Option<StagingArticleRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM staging_articles WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], StagingArticleRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Counts staged articles of a run.
pub fn count_articles(db: &Database, run_id: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM staging_articles WHERE run_id = ?1",
            params![run_id],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

/// Stores the analyzer's neutral summary on the article.
pub fn set_analysis_summary(
    db: &Database,
    article_id: &str,
    summary: Option<&str>,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE staging_articles SET analysis_summary = ?2 WHERE id = ?1",
            params![article_id, summary],
        )?;
        Ok(())
    })
}

/// Replaces every staged viewpoint of an article in one transaction.
pub fn replace_viewpoints(
    db: &Database,
    run_id: &str,
    article_id: &str,
    viewpoints: &[ViewpointRecord],
    now: &str,
) -> Result<(), DatabaseError> {
    db.with_transaction(|conn| {
        conn.execute(
            "DELETE FROM staging_viewpoints WHERE article_id = ?1",
            params![article_id],
        )?;
        for viewpoint in viewpoints {
            let viewpoint_id = uuid::Uuid::new_v4().to_string();
            conn.execute(
                "INSERT INTO staging_viewpoints (id, run_id, article_id, lean, summary,
                 sentiment_score, is_fallback, note, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    viewpoint_id,
                    run_id,
                    article_id,
                    viewpoint.lean.as_str(),
                    viewpoint.summary,
                    viewpoint.sentiment_score,
                    viewpoint.is_fallback,
                    viewpoint.note,
                    now,
                ],
            )?;
            insert_posts(conn, "staging_social_posts", &viewpoint_id, &viewpoint.social_posts)?;
        }
        Ok(())
    })
}

/// Staged viewpoints of an article with their posts, ordered left → center → right.
pub fn viewpoints_for_article(
    db: &Database,
    article_id: &str,
) -> Result<Vec<ViewpointRecord>, DatabaseError> {
    db.with_conn(|conn| {
        load_viewpoints(
            conn,
            "SELECT id, lean, summary, sentiment_score, is_fallback, note
             FROM staging_viewpoints WHERE article_id = ?1",
            "staging_social_posts",
            article_id,
        )
    })
}

/// Inserts posts into `table` (`staging_social_posts` or `social_posts`).
pub(crate) fn insert_posts(
    conn: &Connection,
    table: &'static str,
    viewpoint_id: &str,
    posts: &[SocialPostRecord],
) -> Result<(), DatabaseError> {
    let sql = format!(
        "INSERT INTO {} (id, viewpoint_id, author, handle, text, url, platform, is_real,
         likes, reposts, replies, position)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        table
    );
    let mut stmt = conn.prepare(&sql)?;
    for (position, post) in posts.iter().enumerate() {
        stmt.execute(params![
            uuid::Uuid::new_v4().to_string(),
            viewpoint_id,
            post.author,
            post.handle,
            post.text,
            post.url,
            post.platform,
            post.is_real,
            post.likes as i64,
            post.reposts as i64,
            post.replies as i64,
            position as i64,
        ])?;
    }
    Ok(())
}

/// Loads viewpoints selected by `viewpoint_sql` (one `?1` parameter, columns
/// `id, lean, summary, sentiment_score, is_fallback, note`) plus their posts.
pub(crate) fn load_viewpoints(
    conn: &Connection,
    viewpoint_sql: &str,
    posts_table: &'static str,
    owner_id: &str,
) -> Result<Vec<ViewpointRecord>, DatabaseError> {
    let mut stmt = conn.prepare(viewpoint_sql)?;
    let raw: Vec<(String, String, String, f64, bool, Option<String>)> = stmt
        .query_map(params![owner_id], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let posts_sql = format!(
        "SELECT author, handle, text, url, platform, is_real, likes, reposts, replies
         FROM {} WHERE viewpoint_id = ?1 ORDER BY position",
        posts_table
    );
    let mut posts_stmt = conn.prepare(&posts_sql)?;

    let mut out = Vec::with_capacity(raw.len());
    for (id, lean, summary, sentiment_score, is_fallback, note) in raw {
        let social_posts = posts_stmt
            .query_map(params![id], |r| {
                Ok(SocialPostRecord {
                    author: r.get(0)?,
                    handle: r.get(1)?,
                    text: r.get(2)?,
                    url: r.get(3)?,
                    platform: r.get(4)?,
                    is_real: r.get(5)?,
                    likes: r.get::<_, i64>(6)?.max(0) as u64,
                    reposts: r.get::<_, i64>(7)?.max(0) as u64,
                    replies: r.get::<_, i64>(8)?.max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        out.push(ViewpointRecord {
            lean: lean.parse()?,
            summary,
            sentiment_score,
            is_fallback,
            note,
            social_posts,
        });
    }
    out.sort_by_key(|v| Lean::ALL.iter().position(|l| *l == v.lean));
    Ok(out)
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
                 INSERT INTO pipeline_runs (id, run_type, status, config, trigger_source, created_at)
                 VALUES ('run-2', 'category_refresh', 'running', '{}', 'manual', 't1');",
            )?;
            Ok(())
        })
        .unwrap();
        db
    }

    fn article<'a>(id: &'a str, run_id: &'a str, position: u32) -> NewStagingArticle<'a> {
        NewStagingArticle {
            id,
            run_id,
            category: "politics",
            title: "Senate passes budget",
            url: "https://news.test/a",
            normalized_url: "https://news.test/a",
            normalized_title: "senate passes budget",
            description: Some("desc"),
            source: Some("wire"),
            image_url: None,
            published_at: Some("2026-01-01T00:00:00Z"),
            live_story_id: None,
            payload: None,
            position,
            created_at: "t0",
        }
    }

    fn post(author: &str) -> SocialPostRecord {
        SocialPostRecord {
            author: author.to_string(),
            handle: format!("@{}", author),
            text: "take".to_string(),
            url: Some(format!("https://x.com/{}/status/1", author)),
            platform: "x".to_string(),
            is_real: true,
            likes: 3,
            reposts: 1,
            replies: 0,
        }
    }

    #[test]
    fn test_insert_and_list_in_position_order() {
        let db = test_db();
        insert_article(&db, &article("b", "run-1", 1)).unwrap();
        insert_article(&db, &article("a", "run-1", 0)).unwrap();

        let rows = list_articles(&db, "run-1", Some("politics")).unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(count_articles(&db, "run-1").unwrap(), 2);
        assert!(list_articles(&db, "run-1", Some("sports")).unwrap().is_empty());
        assert_eq!(list_articles(&db, "run-1", None).unwrap().len(), 2);
    }

    #[test]
    fn test_supersede_marks_older_runs_only() {
        let db = test_db();
        insert_article(&db, &article("old", "run-1", 0)).unwrap();
        insert_article(&db, &article("new", "run-2", 0)).unwrap();

        assert_eq!(supersede_category(&db, "politics", "run-2").unwrap(), 1);
        let old = find_article(&db, "old").unwrap().unwrap();
        assert_eq!(old.superseded_by.as_deref(), Some("run-2"));
        let new = find_article(&db, "new").unwrap().unwrap();
        assert!(new.superseded_by.is_none());
    }

    #[test]
    fn test_replace_viewpoints_round_trip() {
        let db = test_db();
        insert_article(&db, &article("a", "run-1", 0)).unwrap();

        let viewpoints = vec![
            ViewpointRecord {
                lean: Lean::Right,
                summary: "right view".to_string(),
                sentiment_score: -0.5,
                is_fallback: false,
                note: None,
                social_posts: vec![post("r1"), post("r2")],
            },
            ViewpointRecord {
                lean: Lean::Left,
                summary: "left view".to_string(),
                sentiment_score: 0.25,
                is_fallback: false,
                note: None,
                social_posts: vec![],
            },
        ];
        replace_viewpoints(&db, "run-1", "a", &viewpoints, "t1").unwrap();

        let loaded = viewpoints_for_article(&db, "a").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].lean, Lean::Left);
        assert_eq!(loaded[1].social_posts.len(), 2);
        assert_eq!(loaded[1].social_posts[0].author, "r1");

        replace_viewpoints(&db, "run-1", "a", &viewpoints[1..], "t2").unwrap();
        assert_eq!(viewpoints_for_article(&db, "a").unwrap().len(), 1);
    }

    #[test]
    fn test_analysis_summary_is_stored() {
        let db = test_db();
        insert_article(&db, &article("a", "run-1", 0)).unwrap();
        set_analysis_summary(&db, "a", Some("neutral take")).unwrap();
        let row = find_article(&db, "a").unwrap().unwrap();
        assert_eq!(row.analysis_summary.as_deref(), Some("neutral take"));
    }
}
