//! Analysis collaborator: left/center/right viewpoints for one article.
//!
//! The scoring itself is opaque to the pipeline. [`ScriptAnalyzer`] shells
//! out to a configured command; tests substitute their own [`Analyzer`].

pub mod markdown;
pub mod script;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::model::Lean;

pub use script::ScriptAnalyzer;

/// The article handed to an analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRef {
    /// Staging article id.
    pub id: String,
    pub title: String,
    pub url: String,
    pub category: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Non-biased summary of the story.
    pub summary: Option<String>,
    pub viewpoints: Vec<ViewpointAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewpointAnalysis {
    pub lean: Lean,
    pub summary: String,
    /// Raw score as reported; the dispatcher clamps it before storage.
    pub sentiment_score: f64,
    pub social_posts: Vec<SocialPostAnalysis>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPostAnalysis {
    pub author: String,
    pub handle: String,
    pub text: String,
    pub url: Option<String>,
    pub platform: String,
    pub is_real: bool,
    pub likes: u64,
    pub reposts: u64,
    pub replies: u64,
}

impl SocialPostAnalysis {
    /// Builds an X post from an `account` label such as `Jane Doe (@jdoe)`.
    pub fn from_account(account: &str, text: &str, url: Option<&str>) -> Self {
        let (author, handle) = split_account(account);
        let url = url.map(str::trim).filter(|u| !u.is_empty()).map(str::to_string);
        Self {
            author,
            handle,
            text: text.trim().to_string(),
            is_real: url.as_deref().is_some_and(is_status_url),
            url,
            platform: "x".to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Analysis timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Failed to start analyzer '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Analyzer exited with {status}: {stderr}")]
    ExitStatus { status: String, stderr: String },

    #[error("Analyzer reported an error: {0}")]
    Reported(String),

    #[error("Could not parse analyzer output: {0}")]
    Parse(String),
}

#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, article: &ArticleRef) -> Result<AnalysisResult, AnalysisError>;
}

/// Splits `Name (@handle)`, `@handle` or `Name` into `(author, handle)`.
pub fn split_account(account: &str) -> (String, String) {
    let account = account.trim().trim_matches('*').trim();

    if let (Some(open), true) = (account.rfind("(@"), account.ends_with(')')) {
        let author = account[..open].trim().trim_end_matches(['-', ',']).trim();
        let handle = &account[open + 1..account.len() - 1];
        let author = if author.is_empty() {
            handle.trim_start_matches('@')
        } else {
            author
        };
        return (author.to_string(), handle.to_string());
    }

    if let Some(at) = account.find('@') {
        let handle = account[at..]
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_end_matches([')', ',', '.']);
        let author = account[..at].trim().trim_end_matches(['-', ',', '(']).trim();
        let author = if author.is_empty() {
            handle.trim_start_matches('@')
        } else {
            author
        };
        return (author.to_string(), handle.to_string());
    }

    (account.to_string(), String::new())
}

/// True for `https://x.com/<user>/status/<id>` and the twitter.com equivalents.
pub fn is_status_url(raw: &str) -> bool {
    let Ok(parsed) = url::Url::parse(raw) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("mobile."))
        .unwrap_or(&host);
    if host != "x.com" && host != "twitter.com" {
        return false;
    }
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();
    segments.len() >= 3
        && segments[1] == "status"
        && !segments[2].is_empty()
        && segments[2].chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_account_forms() {
        assert_eq!(
            split_account("Jane Doe (@jdoe)"),
            ("Jane Doe".to_string(), "@jdoe".to_string())
        );
        assert_eq!(
            split_account("@jdoe"),
            ("jdoe".to_string(), "@jdoe".to_string())
        );
        assert_eq!(
            split_account("Jane Doe @jdoe"),
            ("Jane Doe".to_string(), "@jdoe".to_string())
        );
        assert_eq!(
            split_account("Jane Doe"),
            ("Jane Doe".to_string(), String::new())
        );
    }

    #[test]
    fn test_is_status_url() {
        assert!(is_status_url("https://x.com/jdoe/status/1789"));
        assert!(is_status_url("https://twitter.com/jdoe/status/1789?s=20"));
        assert!(is_status_url("https://mobile.twitter.com/jdoe/status/1789"));
        assert!(!is_status_url("https://x.com/jdoe"));
        assert!(!is_status_url("https://x.com/jdoe/status/abc"));
        assert!(!is_status_url("https://example.com/jdoe/status/1789"));
        assert!(!is_status_url("not a url"));
    }

    #[test]
    fn test_post_from_account_marks_real_posts() {
        let post = SocialPostAnalysis::from_account(
            "Jane Doe (@jdoe)",
            " Big news ",
            Some("https://x.com/jdoe/status/1"),
        );
        assert!(post.is_real);
        assert_eq!(post.text, "Big news");
        assert_eq!(post.platform, "x");

        let post = SocialPostAnalysis::from_account("@jdoe", "Big news", None);
        assert!(!post.is_real);
        assert!(post.url.is_none());
    }
}
