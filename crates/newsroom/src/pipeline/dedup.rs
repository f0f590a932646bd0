//! Fetch & dedup: oversampled pools, screened against run-scoped identity sets.

use std::collections::HashSet;
use std::time::Duration;

use tracing::{debug, warn};

use super::context::RunStats;
use super::quota::QuotaTracker;
use crate::db::DatabaseError;
use crate::model::CategoryState;
use crate::sources::{FetchError, FetchRequest, FetchScope, NewsSource, SourceArticle};

const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "yclid", "mc_cid", "mc_eid", "igshid", "_ga", "ref",
    "ref_src", "cmpid", "ocid", "smid", "sr_share", "taid", "at_medium", "at_campaign",
];

/// Canonical form of an article link, or `None` if it is not an http(s) URL.
///
/// Lower-cases scheme and host, drops `www.`, default ports, fragments,
/// tracking parameters and a trailing slash.
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = url::Url::parse(raw.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return None;
    }

    parsed.set_fragment(None);
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| {
            let key = key.to_ascii_lowercase();
            !key.starts_with("utm_") && !TRACKING_PARAMS.contains(&key.as_str())
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }

    let path = parsed.path().trim_end_matches('/');
    let mut out = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{}", port));
    }
    out.push_str(path);
    if let Some(query) = parsed.query() {
        out.push('?');
        out.push_str(query);
    }
    Some(out)
}

/// Lower-cases, replaces punctuation with spaces and collapses whitespace.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .to_lowercase();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// An accepted candidate with its identities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub article: SourceArticle,
    pub normalized_url: String,
    pub normalized_title: String,
}

/// Why a candidate was not accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    DuplicateUrl,
    DuplicateTitle,
    Invalid,
}

/// Seen-URL and seen-title sets of one run.
#[derive(Debug, Default)]
pub struct DedupSets {
    urls: HashSet<String>,
    titles: HashSet<String>,
}

impl DedupSets {
    /// Screens a candidate: URL first, then title. Accepting records both.
    pub fn screen(&mut self, article: SourceArticle) -> Result<Candidate, Rejection> {
        let normalized_title = normalize_title(&article.title);
        let Some(normalized_url) = normalize_url(&article.link) else {
            return Err(Rejection::Invalid);
        };
        if normalized_title.is_empty() {
            return Err(Rejection::Invalid);
        }
        if self.urls.contains(&normalized_url) {
            return Err(Rejection::DuplicateUrl);
        }
        if self.titles.contains(&normalized_title) {
            return Err(Rejection::DuplicateTitle);
        }
        self.urls.insert(normalized_url.clone());
        self.titles.insert(normalized_title.clone());
        Ok(Candidate {
            article,
            normalized_url,
            normalized_title,
        })
    }

    pub fn seen_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.urls.iter().cloned().collect();
        urls.sort();
        urls
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// What one category's fetch phase produced.
#[derive(Debug, Default)]
pub struct CategoryFetch {
    /// Accepted candidates in first-accepted order.
    pub accepted: Vec<Candidate>,
    /// Errors from cycles that failed; each consumed an attempt.
    pub errors: Vec<FetchError>,
    pub final_state: Option<CategoryState>,
}

/// Drives the news source for one category or keyword.
pub struct FetchEngine<'a> {
    source: &'a dyn NewsSource,
    pool_multiplier: u32,
    retry_delay: Duration,
}

impl<'a> FetchEngine<'a> {
    pub fn new(source: &'a dyn NewsSource, pool_multiplier: u32, retry_delay: Duration) -> Self {
        Self {
            source,
            pool_multiplier: pool_multiplier.max(2),
            retry_delay,
        }
    }

    pub fn pool_size(&self, target: u32) -> u32 {
        target.saturating_mul(self.pool_multiplier)
    }

    /// Fills a category up to its target in fetch cycles bounded by the
    /// quota's attempt cap. Only storage errors escape.
    pub async fn fill_category(
        &self,
        category: &str,
        dedup: &mut DedupSets,
        stats: &mut RunStats,
        quota: &mut QuotaTracker,
    ) -> Result<CategoryFetch, DatabaseError> {
        let mut outcome = CategoryFetch::default();
        quota.begin_fetching()?;

        while quota.can_pull() {
            quota.record_attempt()?;
            let attempt = quota.row().pull_attempts;
            let request = FetchRequest {
                scope: FetchScope::Category(category.to_string()),
                target_count: quota.target(),
                pool_size: self.pool_size(quota.target()),
                seen_urls: dedup.seen_urls(),
            };

            let pool = match self.source.fetch(&request).await {
                Ok(pool) => pool,
                Err(e) => {
                    warn!(category, attempt, error = %e, "Fetch cycle failed");
                    let rate_limited = match &e {
                        FetchError::RateLimited { retry_after_secs } => *retry_after_secs,
                        _ => None,
                    };
                    outcome.errors.push(e);
                    if quota.can_pull() {
                        let delay = rate_limited
                            .map(Duration::from_secs)
                            .unwrap_or(self.retry_delay)
                            .max(self.retry_delay);
                        tokio::time::sleep(delay).await;
                    }
                    continue;
                }
            };

            let before = outcome.accepted.len();
            let pool_len = pool.len();
            screen_pool(pool, quota.remaining() as usize, dedup, stats, &mut outcome.accepted);
            let new = (outcome.accepted.len() - before) as u32;
            quota.record_accepted(new)?;

            debug!(
                category,
                attempt,
                pool = pool_len,
                accepted = new,
                current = quota.row().current_count,
                target = quota.target(),
                "Fetch cycle screened"
            );

            if new == 0 && !quota.is_full() {
                outcome.final_state = Some(quota.mark_exhausted()?);
                break;
            }
        }

        if outcome.final_state.is_none() {
            outcome.final_state = Some(quota.finish()?);
        }
        Ok(outcome)
    }

    /// A single ad hoc keyword pull, with no quota bookkeeping.
    pub async fn fetch_keyword(
        &self,
        keyword: &str,
        limit: u32,
        dedup: &mut DedupSets,
        stats: &mut RunStats,
    ) -> Result<Vec<Candidate>, FetchError> {
        let request = FetchRequest {
            scope: FetchScope::Keyword(keyword.to_string()),
            target_count: limit,
            pool_size: self.pool_size(limit),
            seen_urls: dedup.seen_urls(),
        };
        let pool = self.source.fetch(&request).await?;
        let mut accepted = Vec::new();
        screen_pool(pool, limit as usize, dedup, stats, &mut accepted);
        Ok(accepted)
    }
}

/// Screens a pool in source order, accepting at most `room` candidates.
fn screen_pool(
    pool: Vec<SourceArticle>,
    room: usize,
    dedup: &mut DedupSets,
    stats: &mut RunStats,
    accepted: &mut Vec<Candidate>,
) {
    let start = accepted.len();
    for article in pool {
        if accepted.len() - start >= room {
            break;
        }
        stats.fetched += 1;
        match dedup.screen(article) {
            Ok(candidate) => {
                stats.accepted += 1;
                accepted.push(candidate);
            }
            Err(Rejection::DuplicateUrl) => stats.duplicate_urls += 1,
            Err(Rejection::DuplicateTitle) => stats.duplicate_titles += 1,
            Err(Rejection::Invalid) => stats.invalid += 1,
        }
    }
}
