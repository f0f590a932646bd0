use serde::Serialize;

use super::config::RunConfig;
use super::dedup::DedupSets;
use super::error::{Stage, StageError};

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStats {
    pub fetched: u32,
    pub accepted: u32,
    pub duplicate_urls: u32,
    pub duplicate_titles: u32,
    pub invalid: u32,
    pub analyzed: u32,
    pub analysis_failed: u32,
    pub promoted: u32,
    pub units_total: u32,
    pub units_failed: u32,
}

/// One stage execution in a run's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    /// Category or keyword the stage ran for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// State carried through one run.
///
/// The dedup sets live here, not in any global, so they are shared by every
/// category of the run and dropped with it.
pub struct RunContext {
    pub run_id: String,
    pub config: RunConfig,
    pub dedup: DedupSets,
    pub stats: RunStats,
    pub errors: Vec<StageError>,
    pub stages: Vec<StageReport>,
}

impl RunContext {
    pub fn new(run_id: &str, config: RunConfig) -> Self {
        Self {
            run_id: run_id.to_string(),
            config,
            dedup: DedupSets::default(),
            stats: RunStats::default(),
            errors: Vec::new(),
            stages: Vec::new(),
        }
    }

    pub fn stage(&mut self, stage: Stage, unit: Option<&str>, ok: bool, detail: Option<String>) {
        self.stages.push(StageReport {
            stage,
            unit: unit.map(str::to_string),
            ok,
            detail,
        });
    }

    /// True when at least one unit ran and every one of them failed.
    pub fn all_units_failed(&self) -> bool {
        self.stats.units_total > 0 && self.stats.units_failed == self.stats.units_total
    }
}
