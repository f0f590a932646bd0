//! Analyzer backed by an external command.
//!
//! The command is run as `<command> <args…> <title> <url>` and reports on
//! stdout, either as a JSON document or as the raw markdown report.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::markdown;
use super::{AnalysisError, AnalysisResult, Analyzer, ArticleRef, SocialPostAnalysis, ViewpointAnalysis};
use crate::config::{AnalyzerConfig, AnalyzerFormat};
use crate::model::Lean;
use crate::sanitize::{redact_url, truncate};

pub struct ScriptAnalyzer {
    command: String,
    args: Vec<String>,
    format: AnalyzerFormat,
    working_directory: Option<PathBuf>,
    env: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonReport {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    non_biased_summary: Option<String>,
    #[serde(default)]
    left: Option<JsonLean>,
    #[serde(default)]
    center: Option<JsonLean>,
    #[serde(default)]
    right: Option<JsonLean>,
}

#[derive(Debug, Deserialize)]
struct JsonLean {
    #[serde(default)]
    sentiment: Option<f64>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    tweets: Vec<JsonTweet>,
}

#[derive(Debug, Deserialize)]
struct JsonTweet {
    #[serde(default)]
    account: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    likes: Option<u64>,
    #[serde(default, alias = "retweets")]
    reposts: Option<u64>,
    #[serde(default)]
    replies: Option<u64>,
}

impl ScriptAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            format: config.format,
            working_directory: config
                .working_directory
                .as_deref()
                .map(|d| PathBuf::from(crate::secrets::expand_home(d))),
            env: config.env.clone(),
        }
    }

    fn build_command(&self, article: &ArticleRef) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .arg(&article.title)
            .arg(&article.url)
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(ref dir) = self.working_directory {
            cmd.current_dir(dir);
        }
        cmd
    }

    fn parse_output(&self, stdout: &str) -> Result<AnalysisResult, AnalysisError> {
        match self.format {
            AnalyzerFormat::Json => parse_json_report(stdout),
            AnalyzerFormat::Markdown => markdown::parse_report(stdout),
        }
    }
}

#[async_trait]
impl Analyzer for ScriptAnalyzer {
    async fn analyze(&self, article: &ArticleRef) -> Result<AnalysisResult, AnalysisError> {
        debug!(
            command = %self.command,
            article_id = %article.id,
            url = %redact_url(&article.url),
            "Running analyzer"
        );

        let output = self
            .build_command(article)
            .output()
            .await
            .map_err(|e| AnalysisError::Spawn {
                command: self.command.clone(),
                source: e,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            if let Some(message) = reported_error(&stderr).or_else(|| reported_error(&stdout)) {
                return Err(AnalysisError::Reported(message));
            }
            return Err(AnalysisError::ExitStatus {
                status: output.status.to_string(),
                stderr: truncate(stderr.trim(), 500),
            });
        }

        self.parse_output(&stdout)
    }
}

/// Extracts `error` from a `{"error": "..."}` document.
fn reported_error(text: &str) -> Option<String> {
    serde_json::from_str::<JsonReport>(text.trim())
        .ok()
        .and_then(|r| r.error)
}

/// Maps the JSON report onto an [`AnalysisResult`]. A lean with neither a
/// summary nor posts is treated as absent.
pub fn parse_json_report(stdout: &str) -> Result<AnalysisResult, AnalysisError> {
    let report: JsonReport = serde_json::from_str(stdout.trim())
        .map_err(|e| AnalysisError::Parse(format!("invalid JSON: {}", e)))?;

    if let Some(error) = report.error {
        return Err(AnalysisError::Reported(error));
    }

    let mut viewpoints = Vec::new();
    for (lean, section) in [
        (Lean::Left, report.left),
        (Lean::Center, report.center),
        (Lean::Right, report.right),
    ] {
        let Some(section) = section else { continue };
        let summary = section.summary.unwrap_or_default().trim().to_string();
        let social_posts: Vec<SocialPostAnalysis> = section
            .tweets
            .into_iter()
            .filter(|t| !t.text.trim().is_empty())
            .map(|t| SocialPostAnalysis {
                likes: t.likes.unwrap_or(0),
                reposts: t.reposts.unwrap_or(0),
                replies: t.replies.unwrap_or(0),
                ..SocialPostAnalysis::from_account(&t.account, &t.text, t.url.as_deref())
            })
            .collect();
        if summary.is_empty() && social_posts.is_empty() {
            continue;
        }
        viewpoints.push(ViewpointAnalysis {
            lean,
            summary,
            sentiment_score: section.sentiment.unwrap_or(0.0),
            social_posts,
        });
    }

    let summary = report
        .non_biased_summary
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    if summary.is_none() && viewpoints.is_empty() {
        return Err(AnalysisError::Parse("report contains no analysis".to_string()));
    }

    Ok(AnalysisResult {
        summary,
        viewpoints,
    })
}
