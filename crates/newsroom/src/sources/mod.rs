//! News-source collaborator.
//!
//! The pipeline only sees the [`NewsSource`] trait; [`HttpNewsSource`] is the
//! production implementation and tests drive the pipeline with fakes.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpNewsSource;

/// What a fetch is scoped to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchScope {
    Category(String),
    Keyword(String),
}

impl FetchScope {
    pub fn label(&self) -> &str {
        match self {
            FetchScope::Category(c) => c,
            FetchScope::Keyword(k) => k,
        }
    }
}

/// One fetch cycle's request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub scope: FetchScope,
    /// Number of articles the caller ultimately wants.
    pub target_count: u32,
    /// Oversampled pool size the source should try to return.
    pub pool_size: u32,
    /// Links the run has already accepted; sources may skip them.
    pub seen_urls: Vec<String>,
}

/// A candidate article as returned by a source, before any normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceArticle {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

/// Errors from a news source. Each one is scoped to a single fetch cycle.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited by news source")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Could not decode news source response: {0}")]
    Decode(String),

    #[error("News source misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

#[async_trait]
pub trait NewsSource: Send + Sync {
    /// Fetches up to `request.pool_size` candidates in source order.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SourceArticle>, FetchError>;
}
