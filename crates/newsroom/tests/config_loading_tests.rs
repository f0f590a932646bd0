//! Table-driven tests for configuration loading and validation.

mod common;

use std::io::Write;

use serial_test::serial;
use tempfile::Builder;

use newsroom::config::{load_config, load_config_from_str, ConfigFormat};
use newsroom::sources::FetchError;
use newsroom::HttpNewsSource;

struct ConfigTestCase {
    name: &'static str,
    content: &'static str,
    format: ConfigFormat,
    should_succeed: bool,
    expected_error: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "valid_minimal_json",
        content: r#"{ "version": "1.0", "categories": ["politics"] }"#,
        format: ConfigFormat::Json,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "valid_full_yaml",
        content: r#"
version: "1.0"
database_path: /tmp/newsroom.db
categories: [politics, world, business]
pipeline:
  target_count: 8
  category_targets:
    business: 4
  pool_multiplier: 3
  max_pull_attempts: 2
  fetch_retry_delay_ms: 500
  analysis_timeout_secs: 60
  analysis_delay_ms: 0
  lock_stale_after_secs: 0
  recent_error_limit: 50
  search_category: searches
news_source:
  endpoint: https://newsdata.io/api/1/latest
  language: en
  country: us
  api_key_env: NEWSDATA_API_KEY
analyzer:
  command: python3
  args: [analyze.py, --json]
  format: json
  env:
    MODEL: small
"#,
        format: ConfigFormat::Yaml,
        should_succeed: true,
        expected_error: None,
    },
    ConfigTestCase {
        name: "missing_categories",
        content: r#"{ "version": "1.0" }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "wrong_version",
        content: r#"{ "version": "2.0", "categories": ["politics"] }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "unknown_top_level_key",
        content: r#"{ "version": "1.0", "categories": ["politics"], "workers": 4 }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "pool_multiplier_too_small",
        content: r#"{ "version": "1.0", "categories": ["politics"], "pipeline": { "pool_multiplier": 1 } }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "duplicate_category",
        content: r#"{ "version": "1.0", "categories": ["politics", "politics"] }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("Duplicate category"),
    },
    ConfigTestCase {
        name: "blank_category",
        content: "version: \"1.0\"\ncategories: [\"  \"]\n",
        format: ConfigFormat::Yaml,
        should_succeed: false,
        expected_error: Some("Category name is blank"),
    },
    ConfigTestCase {
        name: "unknown_analyzer_format",
        content: r#"{ "version": "1.0", "categories": ["politics"], "analyzer": { "format": "xml" } }"#,
        format: ConfigFormat::Json,
        should_succeed: false,
        expected_error: Some("Schema validation failed"),
    },
    ConfigTestCase {
        name: "malformed_yaml",
        content: "version: \"1.0\"\ncategories: [politics\n",
        format: ConfigFormat::Yaml,
        should_succeed: false,
        expected_error: Some("Failed to parse config YAML"),
    },
];

#[test]
fn test_config_cases() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.content, case.format);
        match (case.should_succeed, result) {
            (true, Ok(_)) => {}
            (true, Err(e)) => panic!("case {}: expected success, got {}", case.name, e),
            (false, Ok(_)) => panic!("case {}: expected failure", case.name),
            (false, Err(e)) => {
                if let Some(expected) = case.expected_error {
                    assert!(
                        e.to_string().contains(expected),
                        "case {}: error '{}' does not contain '{}'",
                        case.name,
                        e,
                        expected
                    );
                }
            }
        }
    }
}

#[test]
fn test_full_yaml_values() {
    let case = CONFIG_TESTS
        .iter()
        .find(|c| c.name == "valid_full_yaml")
        .unwrap();
    let config = load_config_from_str(case.content, case.format).unwrap();
    assert_eq!(config.target_for("business"), 4);
    assert_eq!(config.target_for("world"), 8);
    assert_eq!(config.pipeline.search_category, "searches");
    assert_eq!(config.pipeline.lock_stale_after_secs, 0);
    assert_eq!(config.analyzer.args, vec!["analyze.py", "--json"]);
    assert_eq!(config.analyzer.env.get("MODEL").map(String::as_str), Some("small"));
    assert_eq!(
        config.database_path().unwrap().to_str(),
        Some("/tmp/newsroom.db")
    );
}

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_config_by_extension() {
    let cases = [
        (".json", r#"{ "version": "1.0", "categories": ["world"] }"#),
        (".yaml", "version: \"1.0\"\ncategories: [world]\n"),
        (".YML", "version: \"1.0\"\ncategories: [world]\n"),
    ];
    for (suffix, content) in cases {
        let file = write_config(suffix, content);
        let config = load_config(file.path())
            .unwrap_or_else(|e| panic!("{} failed to load: {}", suffix, e));
        assert_eq!(config.categories, vec!["world"]);
    }
}

#[test]
fn test_load_config_rejects_unknown_extension() {
    let file = write_config(".toml", "version = \"1.0\"");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Unsupported config file extension 'toml'"));
}

#[test]
fn test_load_config_missing_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let err = load_config(dir.path().join("absent.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
#[serial]
fn test_news_source_key_from_env() {
    let config = load_config_from_str(
        "version: \"1.0\"\ncategories: [politics]\nnews_source:\n  api_key_env: NEWSROOM_TEST_NEWS_KEY\n",
        ConfigFormat::Yaml,
    )
    .unwrap();

    std::env::remove_var("NEWSROOM_TEST_NEWS_KEY");
    assert!(matches!(
        HttpNewsSource::from_config(&config.news_source),
        Err(FetchError::Config(_))
    ));

    std::env::set_var("NEWSROOM_TEST_NEWS_KEY", "pub_123");
    assert!(HttpNewsSource::from_config(&config.news_source).is_ok());
    std::env::remove_var("NEWSROOM_TEST_NEWS_KEY");
}
