//! Parser for the analyzer's markdown report.
//!
//! ```text
//! ### Non-Biased Review
//! Three neutral sentences.
//!
//! ### Left
//! **Score:** -0.4
//! How the left sees it.
//!
//! **Example Tweets:**
//! 1. **Account:** Jane Doe (@jdoe)
//!    **Tweet Text:** ...
//!    **Link:** https://x.com/jdoe/status/1
//! ```

use std::sync::LazyLock;

use regex::Regex;

use super::{AnalysisError, AnalysisResult, SocialPostAnalysis, ViewpointAnalysis};
use crate::model::Lean;

static RE_SCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*Score:\*\*\s*([-+]?\d*\.?\d+)").unwrap());
static RE_TWEET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\d+\.\s+\*\*Account:\*\*\s*([^\n]+)\s+\*\*Tweet Text:\*\*\s*([^\n]+)\s+\*\*Link:\*\*\s*(https?://\S+)",
    )
    .unwrap()
});

const EXAMPLE_TWEETS: &str = "**Example Tweets";

/// Parses a full report. Fails only when no section could be recognized.
pub fn parse_report(content: &str) -> Result<AnalysisResult, AnalysisError> {
    let mut result = AnalysisResult::default();

    for (heading, body) in sections(content) {
        let heading_lower = heading.to_ascii_lowercase();
        if heading_lower.starts_with("non-biased review") {
            let summary = body.trim();
            if !summary.is_empty() {
                result.summary = Some(summary.to_string());
            }
            continue;
        }

        let Some(lean) = lean_of(&heading_lower) else {
            continue;
        };
        if result.viewpoints.iter().any(|v| v.lean == lean) {
            continue;
        }
        if let Some(viewpoint) = parse_viewpoint(lean, body) {
            result.viewpoints.push(viewpoint);
        }
    }

    if result.summary.is_none() && result.viewpoints.is_empty() {
        return Err(AnalysisError::Parse(
            "report has no recognizable sections".to_string(),
        ));
    }
    Ok(result)
}

/// Splits on `### ` headings into `(heading, body)` pairs.
fn sections(content: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut current: Option<(&str, usize)> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        if let Some(heading) = line.trim_start().strip_prefix("### ") {
            if let Some((h, start)) = current.take() {
                out.push((h, &content[start..offset]));
            }
            current = Some((heading.trim(), offset + line.len()));
        }
        offset += line.len();
    }
    if let Some((h, start)) = current {
        out.push((h, &content[start..]));
    }
    out
}

fn lean_of(heading_lower: &str) -> Option<Lean> {
    let first = heading_lower
        .split(|c: char| !c.is_ascii_alphabetic())
        .find(|w| !w.is_empty())?;
    match first {
        "left" => Some(Lean::Left),
        "center" | "centre" => Some(Lean::Center),
        "right" => Some(Lean::Right),
        _ => None,
    }
}

fn parse_viewpoint(lean: Lean, body: &str) -> Option<ViewpointAnalysis> {
    let tweets_at = body.find(EXAMPLE_TWEETS);
    let head = &body[..tweets_at.unwrap_or(body.len())];

    let (sentiment_score, summary) = match RE_SCORE.captures(head) {
        Some(caps) => {
            let score = caps[1].parse::<f64>().unwrap_or(0.0);
            let after_score = caps.get(0).map(|m| m.end()).unwrap_or(0);
            let rest = &head[after_score..];
            let summary = rest.split_once('\n').map(|(_, s)| s).unwrap_or("");
            (score, summary.trim().to_string())
        }
        None => (0.0, head.trim().to_string()),
    };

    let social_posts: Vec<SocialPostAnalysis> = tweets_at
        .map(|at| {
            RE_TWEET
                .captures_iter(&body[at..])
                .map(|c| SocialPostAnalysis::from_account(&c[1], &c[2], Some(&c[3])))
                .collect()
        })
        .unwrap_or_default();

    if summary.is_empty() && social_posts.is_empty() {
        return None;
    }

    Some(ViewpointAnalysis {
        lean,
        summary,
        sentiment_score,
        social_posts,
    })
}
