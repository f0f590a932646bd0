use std::collections::HashSet;
use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

/// Serialization of a config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        match extension.as_str() {
            "json" => Ok(ConfigFormat::Json),
            "yaml" | "yml" => Ok(ConfigFormat::Yaml),
            _ => Err(ConfigError::UnsupportedFormat { extension }),
        }
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = load_config_from_str(&content, format)?;
    log::debug!(
        "Loaded config from {} ({} categories)",
        path.display(),
        config.categories.len()
    );
    Ok(config)
}

pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Yaml => serde_yaml::from_str(content)?,
    };

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.categories.is_empty() {
        return Err(ConfigError::Validation {
            message: "At least one category is required".to_string(),
        });
    }

    let mut seen = HashSet::new();
    for category in &config.categories {
        if category.trim().is_empty() {
            return Err(ConfigError::InvalidCategory {
                name: category.clone(),
                reason: "Category name is blank".to_string(),
            });
        }
        if !seen.insert(category.as_str()) {
            return Err(ConfigError::InvalidCategory {
                name: category.clone(),
                reason: "Duplicate category".to_string(),
            });
        }
    }

    let pipeline = &config.pipeline;
    if pipeline.target_count == 0 {
        return Err(ConfigError::Validation {
            message: "pipeline.target_count must be at least 1".to_string(),
        });
    }
    for (category, target) in &pipeline.category_targets {
        if *target == 0 {
            return Err(ConfigError::InvalidCategory {
                name: category.clone(),
                reason: "Target count must be at least 1".to_string(),
            });
        }
    }
    if pipeline.pool_multiplier < 2 {
        return Err(ConfigError::Validation {
            message: "pipeline.pool_multiplier must be at least 2".to_string(),
        });
    }
    if pipeline.max_pull_attempts == 0 {
        return Err(ConfigError::Validation {
            message: "pipeline.max_pull_attempts must be at least 1".to_string(),
        });
    }
    if pipeline.analysis_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "pipeline.analysis_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.analyzer.command.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "analyzer.command must not be empty".to_string(),
        });
    }

    Ok(())
}
