//! Analysis dispatcher: one analyzer call per staged article, strictly in order.

use std::time::Duration;

use tracing::{debug, warn};

use super::error::{Stage, StageError};
use super::progress::{ProgressEvent, ProgressReporter};
use crate::analysis::{AnalysisError, AnalysisResult, Analyzer, ArticleRef};
use crate::broadcast::RunPhase;
use crate::db::staging_repo::{self, SocialPostRecord, StagingArticleRow, ViewpointRecord};
use crate::db::{analysis_job_repo, now_timestamp, Database, DatabaseError};
use crate::model::Lean;
use crate::sanitize::{redact_url, truncate};

const FALLBACK_SUMMARY: &str = "Analysis unavailable for this perspective.";

/// How failures are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Fresh staging: a failed article gets neutral fallback viewpoints.
    Stage,
    /// Reanalysis of live stories: a failed article keeps its live analysis.
    Reanalysis,
}

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub analyzed: u32,
    pub failed: u32,
    /// Articles whose analysis succeeded, in dispatch order.
    pub succeeded: Vec<String>,
    pub errors: Vec<StageError>,
}

pub struct AnalysisDispatcher<'a> {
    db: &'a Database,
    analyzer: &'a dyn Analyzer,
    timeout: Duration,
    delay: Duration,
}

impl<'a> AnalysisDispatcher<'a> {
    pub fn new(db: &'a Database, analyzer: &'a dyn Analyzer, timeout: Duration, delay: Duration) -> Self {
        Self {
            db,
            analyzer,
            timeout,
            delay,
        }
    }

    /// Analyzes `articles` one at a time, pausing `delay` between calls.
    ///
    /// Analyzer failures and timeouts are recovered per article; only
    /// storage errors are returned. Progress is reported between
    /// `percent_from` and `percent_to`.
    pub async fn dispatch(
        &self,
        run_id: &str,
        articles: &[StagingArticleRow],
        mode: DispatchMode,
        reporter: &dyn ProgressReporter,
        percent_from: u8,
        percent_to: u8,
    ) -> Result<DispatchOutcome, DatabaseError> {
        let mut outcome = DispatchOutcome::default();
        let total = articles.len();
        let span = percent_to.saturating_sub(percent_from) as usize;

        for (index, article) in articles.iter().enumerate() {
            if index > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let percent = percent_from + (span * index / total.max(1)) as u8;
            reporter.report(ProgressEvent::stage(
                RunPhase::Analyzing,
                Some(&article.category),
                percent,
                format!("Analyzing article {}/{} in {}", index + 1, total, article.category),
            ));

            let job_id = analysis_job_repo::insert_pending(self.db, run_id, &article.id, &now_timestamp())?;
            analysis_job_repo::mark_running(self.db, &job_id, &now_timestamp())?;

            match self.analyze_one(article).await {
                Ok(result) => {
                    let (summary, viewpoints) = to_records(result);
                    staging_repo::replace_viewpoints(self.db, run_id, &article.id, &viewpoints, &now_timestamp())?;
                    staging_repo::set_analysis_summary(self.db, &article.id, summary.as_deref())?;
                    analysis_job_repo::mark_done(self.db, &job_id, &now_timestamp())?;
                    debug!(
                        article_id = %article.id,
                        viewpoints = viewpoints.len(),
                        "Article analyzed"
                    );
                    outcome.analyzed += 1;
                    outcome.succeeded.push(article.id.clone());
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(
                        article_id = %article.id,
                        url = %redact_url(&article.url),
                        error = %message,
                        "Analysis failed"
                    );
                    if mode == DispatchMode::Stage {
                        let fallback = fallback_viewpoints(&message);
                        staging_repo::replace_viewpoints(self.db, run_id, &article.id, &fallback, &now_timestamp())?;
                    }
                    analysis_job_repo::mark_failed(self.db, &job_id, &message, &now_timestamp())?;
                    outcome.failed += 1;
                    outcome.errors.push(
                        StageError::new(Stage::Analyze, message)
                            .in_category(&article.category)
                            .for_article(&article.id),
                    );
                }
            }
        }

        Ok(outcome)
    }

    async fn analyze_one(&self, article: &StagingArticleRow) -> Result<AnalysisResult, AnalysisError> {
        let article_ref = ArticleRef {
            id: article.id.clone(),
            title: article.title.clone(),
            url: article.url.clone(),
            category: article.category.clone(),
        };
        match tokio::time::timeout(self.timeout, self.analyzer.analyze(&article_ref)).await {
            Ok(result) => result,
            Err(_) => Err(AnalysisError::Timeout {
                secs: self.timeout.as_secs(),
            }),
        }
    }
}

/// Clamps a raw score into `[-1, 1]`; NaN becomes neutral.
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}

/// Converts an analyzer result into storable records. The first occurrence
/// of each lean wins.
pub fn to_records(result: AnalysisResult) -> (Option<String>, Vec<ViewpointRecord>) {
    let mut records: Vec<ViewpointRecord> = Vec::with_capacity(Lean::ALL.len());
    for viewpoint in result.viewpoints {
        if records.iter().any(|r| r.lean == viewpoint.lean) {
            continue;
        }
        records.push(ViewpointRecord {
            lean: viewpoint.lean,
            summary: viewpoint.summary,
            sentiment_score: clamp_score(viewpoint.sentiment_score),
            is_fallback: false,
            note: None,
            social_posts: viewpoint
                .social_posts
                .into_iter()
                .map(|p| SocialPostRecord {
                    author: p.author,
                    handle: p.handle,
                    text: p.text,
                    url: p.url,
                    platform: p.platform,
                    is_real: p.is_real,
                    likes: p.likes,
                    reposts: p.reposts,
                    replies: p.replies,
                })
                .collect(),
        });
    }
    (result.summary, records)
}

/// Neutral placeholder viewpoints for every lean.
pub fn fallback_viewpoints(reason: &str) -> Vec<ViewpointRecord> {
    let note = format!("analysis failed: {}", truncate(reason, 300));
    Lean::ALL
        .iter()
        .map(|lean| ViewpointRecord {
            lean: *lean,
            summary: FALLBACK_SUMMARY.to_string(),
            sentiment_score: 0.0,
            is_fallback: true,
            note: Some(note.clone()),
            social_posts: Vec::new(),
        })
        .collect()
}
