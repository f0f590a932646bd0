use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::ValidationError;
use crate::model::{RunType, TriggerSource};

/// Which part of a live story's analysis a reanalysis rewrites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    /// Viewpoint summaries and sentiment scores.
    Sentiment,
    /// Social posts backing each viewpoint.
    #[serde(alias = "twitter")]
    Social,
}

impl FromStr for AnalysisType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentiment" => Ok(AnalysisType::Sentiment),
            "social" | "twitter" => Ok(AnalysisType::Social),
            other => Err(ValidationError::InvalidParameter {
                name: "analysis_types",
                reason: format!("unknown analysis type '{}'", other),
            }),
        }
    }
}

fn all_analysis_types() -> Vec<AnalysisType> {
    vec![AnalysisType::Sentiment, AnalysisType::Social]
}

/// The validated parameters of one run, persisted as `pipeline_runs.config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case", deny_unknown_fields)]
pub enum RunConfig {
    CategoryRefresh {
        categories: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_count: Option<u32>,
    },
    KeywordSearch {
        keyword: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u32>,
        /// Live category the results are merged into.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
    },
    FullRefresh {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_count: Option<u32>,
    },
    ReanalyzeCategory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        story_ids: Option<Vec<String>>,
        /// Inclusive lower bound on `published_at`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        /// Inclusive upper bound on `published_at`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default = "all_analysis_types")]
        analysis_types: Vec<AnalysisType>,
    },
}

impl RunConfig {
    /// Builds a validated config from an operation name and a JSON object of
    /// parameters. Dates are normalized to RFC 3339 day bounds.
    pub fn from_params(operation: &str, params: &serde_json::Value) -> Result<Self, ValidationError> {
        let run_type = RunType::from_str(operation.trim())
            .map_err(|_| ValidationError::UnknownOperation(operation.to_string()))?;

        let mut object = match params {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            _ => {
                return Err(ValidationError::InvalidParameters {
                    operation: run_type.to_string(),
                    reason: "parameters must be a JSON object".to_string(),
                })
            }
        };
        object.insert(
            "operation".to_string(),
            serde_json::Value::String(run_type.as_str().to_string()),
        );

        let config: RunConfig = serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| ValidationError::InvalidParameters {
                operation: run_type.to_string(),
                reason: e.to_string(),
            })?;
        config.validated()
    }

    pub fn run_type(&self) -> RunType {
        match self {
            RunConfig::CategoryRefresh { .. } => RunType::CategoryRefresh,
            RunConfig::KeywordSearch { .. } => RunType::KeywordSearch,
            RunConfig::FullRefresh { .. } => RunType::FullRefresh,
            RunConfig::ReanalyzeCategory { .. } => RunType::ReanalyzeCategory,
        }
    }

    /// Checks operation-specific parameters and returns the normalized config.
    pub fn validated(self) -> Result<Self, ValidationError> {
        match self {
            RunConfig::CategoryRefresh {
                categories,
                target_count,
            } => {
                if categories.is_empty() {
                    return Err(ValidationError::InvalidParameter {
                        name: "categories",
                        reason: "at least one category is required".to_string(),
                    });
                }
                let mut seen = HashSet::new();
                let mut cleaned = Vec::with_capacity(categories.len());
                for category in categories {
                    let category = category.trim().to_string();
                    if category.is_empty() {
                        return Err(ValidationError::InvalidParameter {
                            name: "categories",
                            reason: "category names must not be blank".to_string(),
                        });
                    }
                    if !seen.insert(category.clone()) {
                        return Err(ValidationError::InvalidParameter {
                            name: "categories",
                            reason: format!("'{}' is listed twice", category),
                        });
                    }
                    cleaned.push(category);
                }
                check_positive("target_count", target_count)?;
                Ok(RunConfig::CategoryRefresh {
                    categories: cleaned,
                    target_count,
                })
            }
            RunConfig::KeywordSearch {
                keyword,
                limit,
                category,
            } => {
                let keyword = keyword.trim().to_string();
                if keyword.is_empty() {
                    return Err(ValidationError::InvalidParameter {
                        name: "keyword",
                        reason: "keyword must not be blank".to_string(),
                    });
                }
                check_positive("limit", limit)?;
                Ok(RunConfig::KeywordSearch {
                    keyword,
                    limit,
                    category: category
                        .map(|c| c.trim().to_string())
                        .filter(|c| !c.is_empty()),
                })
            }
            RunConfig::FullRefresh { target_count } => {
                check_positive("target_count", target_count)?;
                Ok(RunConfig::FullRefresh { target_count })
            }
            RunConfig::ReanalyzeCategory {
                category,
                story_ids,
                from,
                to,
                analysis_types,
            } => {
                let category = category
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty());
                let story_ids = story_ids.filter(|ids| !ids.is_empty());
                let from = from.map(|d| normalize_bound("from", &d, false)).transpose()?;
                let to = to.map(|d| normalize_bound("to", &d, true)).transpose()?;

                if category.is_none() && story_ids.is_none() && from.is_none() && to.is_none() {
                    return Err(ValidationError::MissingSelector {
                        operation: "reanalyze_category",
                        expected: "category, story_ids, from, to",
                    });
                }
                if let (Some(from), Some(to)) = (&from, &to) {
                    if from > to {
                        return Err(ValidationError::InvalidParameter {
                            name: "from",
                            reason: "date range starts after it ends".to_string(),
                        });
                    }
                }

                let mut types = Vec::new();
                for t in analysis_types {
                    if !types.contains(&t) {
                        types.push(t);
                    }
                }
                if types.is_empty() {
                    types = all_analysis_types();
                }

                Ok(RunConfig::ReanalyzeCategory {
                    category,
                    story_ids,
                    from,
                    to,
                    analysis_types: types,
                })
            }
        }
    }
}

fn check_positive(name: &'static str, value: Option<u32>) -> Result<(), ValidationError> {
    if value == Some(0) {
        return Err(ValidationError::InvalidParameter {
            name,
            reason: "must be at least 1".to_string(),
        });
    }
    Ok(())
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates. A bare date
/// becomes the start of that day, or its last second when `end_of_day`.
fn normalize_bound(name: &'static str, raw: &str, end_of_day: bool) -> Result<String, ValidationError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&chrono::Utc).to_rfc3339());
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        ValidationError::InvalidParameter {
            name,
            reason: format!("'{}' is neither a date nor an RFC 3339 timestamp", raw),
        }
    })?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc().to_rfc3339())
        .ok_or_else(|| ValidationError::InvalidParameter {
            name,
            reason: format!("'{}' is out of range", raw),
        })
}

/// A trigger as received from a caller, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub operation: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default = "default_trigger_source")]
    pub trigger_source: String,
    #[serde(default)]
    pub trigger_context: Option<serde_json::Value>,
}

fn default_trigger_source() -> String {
    TriggerSource::Manual.as_str().to_string()
}

impl RunRequest {
    pub fn new(operation: &str, params: serde_json::Value, trigger_source: TriggerSource) -> Self {
        Self {
            operation: operation.to_string(),
            params,
            trigger_source: trigger_source.as_str().to_string(),
            trigger_context: None,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.trigger_context = Some(context);
        self
    }

    /// Validates operation, trigger source and parameters.
    pub fn validate(&self) -> Result<(RunConfig, TriggerSource), ValidationError> {
        let trigger = TriggerSource::from_str(self.trigger_source.trim())
            .map_err(|_| ValidationError::UnknownTriggerSource(self.trigger_source.clone()))?;
        let config = RunConfig::from_params(&self.operation, &self.params)?;
        Ok((config, trigger))
    }
}
