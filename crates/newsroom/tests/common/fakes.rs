//! Scripted news source and analyzer.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use newsroom::analysis::{
    AnalysisError, AnalysisResult, Analyzer, ArticleRef, SocialPostAnalysis, ViewpointAnalysis,
};
use newsroom::model::Lean;
use newsroom::sources::{FetchError, FetchRequest, NewsSource, SourceArticle};

/// `count` distinct articles under `prefix`.
pub fn articles(prefix: &str, count: usize) -> Vec<SourceArticle> {
    (0..count)
        .map(|i| article(&format!("{} story {}", prefix, i), &format!("https://news.test/{}/{}", prefix, i)))
        .collect()
}

pub fn article(title: &str, link: &str) -> SourceArticle {
    SourceArticle {
        title: title.to_string(),
        link: link.to_string(),
        description: Some(format!("About {}", title)),
        source: Some("Test Wire".to_string()),
        image_url: None,
        published_at: Some("2026-03-01T12:00:00+00:00".to_string()),
    }
}

enum Gate {
    Any,
    Scope(String),
}

/// Serves a fixed pool per scope label, truncated to the requested pool
/// size. Like a real feed it returns the same articles on every call, so
/// repeated pulls surface duplicates.
#[derive(Default)]
pub struct FakeSource {
    pools: Mutex<HashMap<String, Vec<SourceArticle>>>,
    failures: Mutex<HashMap<String, VecDeque<FetchError>>>,
    requests: Mutex<Vec<FetchRequest>>,
    gate: Mutex<Option<Gate>>,
    /// Signalled when a gated fetch has started.
    pub entered: Notify,
    /// Lets a gated fetch continue.
    pub release: Notify,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pool(self, scope: &str, pool: Vec<SourceArticle>) -> Self {
        self.set_pool(scope, pool);
        self
    }

    pub fn set_pool(&self, scope: &str, pool: Vec<SourceArticle>) {
        self.pools.lock().unwrap().insert(scope.to_string(), pool);
    }

    /// The next `count` fetches for `scope` fail with a network error.
    pub fn fail_next(&self, scope: &str, count: usize) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(scope.to_string()).or_default();
        for i in 0..count {
            queue.push_back(FetchError::Network(format!("connection reset ({})", i + 1)));
        }
    }

    /// Makes the next fetch wait for `release`.
    pub fn gate(&self) {
        *self.gate.lock().unwrap() = Some(Gate::Any);
    }

    /// Makes the next fetch for `scope` wait for `release`.
    pub fn gate_scope(&self, scope: &str) {
        *self.gate.lock().unwrap() = Some(Gate::Scope(scope.to_string()));
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl NewsSource for FakeSource {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SourceArticle>, FetchError> {
        self.requests.lock().unwrap().push(request.clone());

        let label = request.scope.label().to_string();
        let gated = {
            let mut gate = self.gate.lock().unwrap();
            let hit = match gate.as_ref() {
                Some(Gate::Any) => true,
                Some(Gate::Scope(scope)) => *scope == label,
                None => false,
            };
            if hit {
                *gate = None;
            }
            hit
        };
        if gated {
            self.entered.notify_one();
            self.release.notified().await;
        }

        if let Some(err) = self
            .failures
            .lock()
            .unwrap()
            .get_mut(&label)
            .and_then(|q| q.pop_front())
        {
            return Err(err);
        }

        let pool = self.pools.lock().unwrap().get(&label).cloned().unwrap_or_default();
        Ok(pool.into_iter().take(request.pool_size as usize).collect())
    }
}

/// Analyzer whose behavior is chosen by the article title:
/// titles containing `hang` never return, `fail` errors, `wild` reports
/// out-of-range scores. Every call gets a fresh generation number that
/// shows up in summaries and posts.
#[derive(Default)]
pub struct FakeAnalyzer {
    generation: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl FakeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Analyzer for FakeAnalyzer {
    async fn analyze(&self, article: &ArticleRef) -> Result<AnalysisResult, AnalysisError> {
        self.calls.lock().unwrap().push(article.title.clone());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if article.title.contains("hang") {
            std::future::pending::<()>().await;
        }
        if article.title.contains("fail") {
            return Err(AnalysisError::Reported("model refused".to_string()));
        }

        let (left, right) = if article.title.contains("wild") {
            (-3.0, 5.0)
        } else {
            (-0.4, 0.6)
        };
        let viewpoint = |lean: Lean, score: f64| ViewpointAnalysis {
            lean,
            summary: format!("{} take v{}", lean, generation),
            sentiment_score: score,
            social_posts: vec![SocialPostAnalysis::from_account(
                "Jane Doe (@jdoe)",
                &format!("post v{}", generation),
                Some("https://x.com/jdoe/status/1"),
            )],
        };
        Ok(AnalysisResult {
            summary: Some(format!("neutral summary v{}", generation)),
            viewpoints: vec![
                viewpoint(Lean::Left, left),
                viewpoint(Lean::Center, 0.0),
                viewpoint(Lean::Right, right),
            ],
        })
    }
}
