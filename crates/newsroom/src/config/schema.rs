use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file; defaults to `~/.newsroom/data/newsroom.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Categories processed by `full_refresh`, in order.
    pub categories: Vec<String>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub news_source: NewsSourceConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

impl Config {
    /// Target article count for a category, honoring per-category overrides.
    pub fn target_for(&self, category: &str) -> u32 {
        self.pipeline
            .category_targets
            .get(category)
            .copied()
            .unwrap_or(self.pipeline.target_count)
    }

    /// Resolved database location. `None` when no path is configured and
    /// no home directory can be found.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.database_path {
            Some(path) => Some(PathBuf::from(crate::secrets::expand_home(path))),
            None => crate::db::default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSettings {
    #[serde(default = "default_target_count")]
    pub target_count: u32,
    #[serde(default)]
    pub category_targets: HashMap<String, u32>,
    /// Pool size is `target × pool_multiplier`.
    #[serde(default = "default_pool_multiplier")]
    pub pool_multiplier: u32,
    #[serde(default = "default_max_pull_attempts")]
    pub max_pull_attempts: u32,
    #[serde(default = "default_fetch_retry_delay_ms")]
    pub fetch_retry_delay_ms: u64,
    #[serde(default = "default_analysis_timeout_secs")]
    pub analysis_timeout_secs: u64,
    #[serde(default = "default_analysis_delay_ms")]
    pub analysis_delay_ms: u64,
    /// A lock older than this is reclaimed. `0` disables reclaiming.
    #[serde(default = "default_lock_stale_after_secs")]
    pub lock_stale_after_secs: u64,
    #[serde(default = "default_recent_error_limit")]
    pub recent_error_limit: u32,
    /// Live category that keyword searches are merged into.
    #[serde(default = "default_search_category")]
    pub search_category: String,
}

fn default_target_count() -> u32 {
    10
}

fn default_pool_multiplier() -> u32 {
    3
}

fn default_max_pull_attempts() -> u32 {
    3
}

fn default_fetch_retry_delay_ms() -> u64 {
    2_000
}

fn default_analysis_timeout_secs() -> u64 {
    120
}

fn default_analysis_delay_ms() -> u64 {
    1_000
}

fn default_lock_stale_after_secs() -> u64 {
    3_600
}

fn default_recent_error_limit() -> u32 {
    20
}

fn default_search_category() -> String {
    "search".to_string()
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            category_targets: HashMap::new(),
            pool_multiplier: default_pool_multiplier(),
            max_pull_attempts: default_max_pull_attempts(),
            fetch_retry_delay_ms: default_fetch_retry_delay_ms(),
            analysis_timeout_secs: default_analysis_timeout_secs(),
            analysis_delay_ms: default_analysis_delay_ms(),
            lock_stale_after_secs: default_lock_stale_after_secs(),
            recent_error_limit: default_recent_error_limit(),
            search_category: default_search_category(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsSourceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_language")]
    pub language: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default = "default_source_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on `nextPage` follow-ups per fetch cycle.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_key_file: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: Option<String>,
}

fn default_endpoint() -> String {
    "https://newsdata.io/api/1/latest".to_string()
}

fn default_language() -> Option<String> {
    Some("en".to_string())
}

fn default_source_timeout_secs() -> u64 {
    30
}

fn default_max_pages() -> u32 {
    5
}

fn default_api_key_env() -> Option<String> {
    Some("NEWSDATA_API_KEY".to_string())
}

impl Default for NewsSourceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            language: default_language(),
            country: None,
            timeout_secs: default_source_timeout_secs(),
            max_pages: default_max_pages(),
            api_key: None,
            api_key_file: None,
            api_key_env: default_api_key_env(),
        }
    }
}

/// How the analyzer command reports its result on stdout.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerFormat {
    /// `{nonBiasedSummary, left: {sentiment, summary, tweets}, ...}`
    #[default]
    Json,
    /// The model's raw markdown report.
    Markdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_analyzer_command")]
    pub command: String,
    /// Arguments placed before the article title and URL.
    #[serde(default = "default_analyzer_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub format: AnalyzerFormat,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_analyzer_command() -> String {
    "python3".to_string()
}

fn default_analyzer_args() -> Vec<String> {
    vec!["scripts/analyze-sentiment-xai.py".to_string()]
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: default_analyzer_command(),
            args: default_analyzer_args(),
            format: AnalyzerFormat::default(),
            working_directory: None,
            env: HashMap::new(),
        }
    }
}
