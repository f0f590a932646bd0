//! newsdata.io-style HTTP news source.
//!
//! `GET {endpoint}?apikey=…&category=…|q=…&language=…&country=…&page=…`
//! returns `{status, results: [...], nextPage}`; pages are followed until the
//! requested pool is filled, `nextPage` is absent, or `max_pages` is reached.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{FetchError, FetchRequest, FetchScope, NewsSource, SourceArticle};
use crate::config::NewsSourceConfig;
use crate::pipeline::dedup::normalize_url;
use crate::sanitize::redact_url;
use crate::secrets::resolve_secret;

pub struct HttpNewsSource {
    client: reqwest::Client,
    endpoint: String,
    api_key: SecretString,
    language: Option<String>,
    country: Option<String>,
    max_pages: u32,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    status: String,
    #[serde(default)]
    results: serde_json::Value,
    #[serde(default, rename = "nextPage")]
    next_page: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawArticle {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
    #[serde(default)]
    source_id: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default, rename = "pubDate")]
    pub_date: Option<String>,
}

/// One decoded page of results.
#[derive(Debug, Default)]
pub(crate) struct NewsPage {
    pub articles: Vec<SourceArticle>,
    pub next_page: Option<String>,
}

impl HttpNewsSource {
    pub fn new(config: &NewsSourceConfig, api_key: SecretString) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            language: config.language.clone().filter(|l| !l.is_empty()),
            country: config.country.clone().filter(|c| !c.is_empty()),
            max_pages: config.max_pages.max(1),
        })
    }

    /// Builds a source from config, resolving the API key from its sources.
    pub fn from_config(config: &NewsSourceConfig) -> Result<Self, FetchError> {
        let api_key = resolve_secret(
            config.api_key.as_deref(),
            config.api_key_file.as_deref(),
            config.api_key_env.as_deref(),
        )
        .map_err(|e| FetchError::Config(format!("news source API key: {}", e)))?;
        Self::new(config, api_key)
    }

    fn query_params(&self, scope: &FetchScope, page: Option<&str>) -> Vec<(&'static str, String)> {
        let mut params = vec![("apikey", self.api_key.expose_secret().to_string())];
        match scope {
            FetchScope::Category(category) => params.push(("category", category.clone())),
            FetchScope::Keyword(keyword) => params.push(("q", keyword.clone())),
        }
        if let Some(ref language) = self.language {
            params.push(("language", language.clone()));
        }
        if let Some(ref country) = self.country {
            params.push(("country", country.clone()));
        }
        if let Some(page) = page {
            params.push(("page", page.to_string()));
        }
        params
    }

    async fn fetch_page(&self, scope: &FetchScope, page: Option<&str>) -> Result<NewsPage, FetchError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&self.query_params(scope, page))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let retry_after_secs = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            return Err(FetchError::RateLimited { retry_after_secs });
        }
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(FetchError::Api {
                status: status.as_u16(),
                message: error_message(&message),
            });
        }

        let body = resp.text().await?;
        parse_page(&body)
    }
}

#[async_trait]
impl NewsSource for HttpNewsSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SourceArticle>, FetchError> {
        let seen: HashSet<&str> = request.seen_urls.iter().map(String::as_str).collect();
        let wanted = request.pool_size as usize;
        let mut collected = Vec::with_capacity(wanted);
        let mut page: Option<String> = None;

        for page_no in 0..self.max_pages {
            let result = self.fetch_page(&request.scope, page.as_deref()).await?;
            debug!(
                endpoint = %redact_url(&self.endpoint),
                scope = request.scope.label(),
                page = page_no,
                returned = result.articles.len(),
                "Fetched news page"
            );

            for article in result.articles {
                if collected.len() >= wanted {
                    break;
                }
                let known = seen.contains(article.link.as_str())
                    || normalize_url(&article.link)
                        .is_some_and(|normalized| seen.contains(normalized.as_str()));
                if !known {
                    collected.push(article);
                }
            }

            match result.next_page {
                Some(next) if collected.len() < wanted => page = Some(next),
                _ => break,
            }
        }

        if collected.len() < wanted {
            debug!(
                scope = request.scope.label(),
                collected = collected.len(),
                wanted,
                "News source returned a short pool"
            );
        }
        Ok(collected)
    }
}

/// Decodes one response body.
pub(crate) fn parse_page(body: &str) -> Result<NewsPage, FetchError> {
    let raw: RawPage =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    if raw.status != "success" {
        return Err(FetchError::Api {
            status: 200,
            message: error_message(body),
        });
    }

    let items: Vec<RawArticle> = match raw.results {
        serde_json::Value::Null => Vec::new(),
        value => serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))?,
    };

    let mut articles = Vec::with_capacity(items.len());
    for item in items {
        match to_source_article(item) {
            Some(article) => articles.push(article),
            None => warn!("Skipping news item without title or link"),
        }
    }

    let next_page = match raw.next_page {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(NewsPage {
        articles,
        next_page,
    })
}

fn to_source_article(raw: RawArticle) -> Option<SourceArticle> {
    let title = raw.title.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())?;
    let link = raw.link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty())?;
    Some(SourceArticle {
        title,
        link,
        description: raw.description.filter(|d| !d.trim().is_empty()),
        source: raw.source_name.or(raw.source_id),
        image_url: raw.image_url.filter(|u| !u.is_empty()),
        published_at: raw.pub_date.as_deref().map(normalize_pub_date),
    })
}

/// newsdata reports `YYYY-MM-DD HH:MM:SS` in UTC; stored timestamps are RFC 3339.
fn normalize_pub_date(raw: &str) -> String {
    chrono::NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .map(|dt| dt.and_utc().to_rfc3339())
        .unwrap_or_else(|_| raw.trim().to_string())
}

/// Pulls `results.message` out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("results")
                .and_then(|r| r.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}
