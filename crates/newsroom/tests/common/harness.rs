//! Test harness wiring an orchestrator to an in-memory database.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;

use newsroom::config::{AnalyzerConfig, NewsSourceConfig, PipelineSettings};
use newsroom::db::live_repo::{self, StoryFilter, StoryRow};
use newsroom::model::TriggerSource;
use newsroom::pipeline::RunRequest;
use newsroom::{Config, Database, Orchestrator, RunOutcome, RunProgressBroadcaster};

use super::fakes::{FakeAnalyzer, FakeSource};

/// Settings that keep runs instant: no retry or inter-article delays.
pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        target_count: 5,
        pool_multiplier: 10,
        max_pull_attempts: 3,
        fetch_retry_delay_ms: 0,
        analysis_timeout_secs: 5,
        analysis_delay_ms: 0,
        ..PipelineSettings::default()
    }
}

pub fn test_config(settings: PipelineSettings) -> Config {
    Config {
        version: "1.0".to_string(),
        database_path: None,
        categories: vec!["politics".to_string(), "world".to_string()],
        pipeline: settings,
        news_source: NewsSourceConfig::default(),
        analyzer: AnalyzerConfig::default(),
    }
}

pub struct TestHarness {
    pub db: Database,
    pub source: Arc<FakeSource>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    pub fn new(source: FakeSource) -> Self {
        Self::with_settings(source, |_| {})
    }

    pub fn with_settings(source: FakeSource, tweak: impl FnOnce(&mut PipelineSettings)) -> Self {
        let mut settings = fast_settings();
        tweak(&mut settings);

        let db = Database::open_in_memory().expect("Failed to open test database");
        let source = Arc::new(source);
        let analyzer = Arc::new(FakeAnalyzer::new());
        let orchestrator = Orchestrator::new(
            db.clone(),
            Arc::new(test_config(settings)),
            source.clone(),
            analyzer.clone(),
        );
        Self {
            db,
            source,
            analyzer,
            orchestrator,
        }
    }

    pub fn broadcasting(mut self, broadcaster: RunProgressBroadcaster) -> Self {
        self.orchestrator = self.orchestrator.with_broadcaster(broadcaster);
        self
    }

    pub async fn trigger(&self, operation: &str, params: Value) -> RunOutcome {
        self.orchestrator
            .run(RunRequest::new(operation, params, TriggerSource::Manual))
            .await
    }

    pub fn live(&self, category: &str) -> Vec<StoryRow> {
        live_repo::list_stories(
            &self.db,
            &StoryFilter {
                category: Some(category.to_string()),
                ..Default::default()
            },
        )
        .expect("Failed to list live stories")
    }

    pub fn live_titles(&self, category: &str) -> Vec<String> {
        self.live(category).into_iter().map(|s| s.title).collect()
    }
}
