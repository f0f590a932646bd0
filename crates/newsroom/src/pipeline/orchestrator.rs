//! Top-level sequencer for one run:
//! `LOCK_ACQUIRE → RUN_CREATE → {FETCH → ANALYZE → PROMOTE}* → RUN_FINALIZE → LOCK_RELEASE`.
//!
//! Every path after the lock is taken releases it, and every trigger gets a
//! [`RunOutcome`] back instead of an error.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, info_span, warn, Instrument};

use super::analysis::{AnalysisDispatcher, DispatchMode, DispatchOutcome};
use super::config::{AnalysisType, RunConfig, RunRequest};
use super::context::{RunContext, RunStats, StageReport};
use super::dedup::{Candidate, FetchEngine};
use super::error::{PipelineError, Stage, StageError};
use super::lock::LockService;
use super::progress::{
    BroadcastProgress, NoopProgress, PersistingProgress, ProgressEvent, ProgressReporter, RunReporter,
};
use super::promotion::{self, Promotion};
use super::quota::QuotaTracker;
use super::runs::{estimate_duration, RunManager, RunStatusSnapshot};
use crate::analysis::Analyzer;
use crate::broadcast::{RunPhase, RunProgressBroadcaster};
use crate::config::Config;
use crate::db::live_repo::{self, StoryFilter, StoryRow};
use crate::db::lock_repo::LockHolder;
use crate::db::staging_repo::{self, NewStagingArticle};
use crate::db::{now_timestamp, Database, DatabaseError};
use crate::model::{RunState, TriggerSource};
use crate::sources::NewsSource;

/// Percent of a unit spent fetching, then analyzing; the rest is promotion.
const FETCH_SHARE: u8 = 20;
const ANALYZE_END: u8 = 90;

/// How a trigger ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Complete,
    Failed,
    /// Another run holds the lock; nothing was created.
    Locked,
    /// The request did not validate; nothing was created.
    Rejected,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    /// Set once the run row exists.
    pub run_id: Option<String>,
    pub status: OutcomeStatus,
    pub stages: Vec<StageReport>,
    pub errors: Vec<StageError>,
    pub stats: RunStats,
}

impl RunOutcome {
    fn refused(status: OutcomeStatus, stage: Stage, message: String) -> Self {
        Self {
            run_id: None,
            status,
            stages: vec![StageReport {
                stage,
                unit: None,
                ok: false,
                detail: Some(message.clone()),
            }],
            errors: vec![StageError::new(stage, message)],
            stats: RunStats::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Complete
    }
}

/// A failure that ends the run.
struct Fatal {
    stage: Stage,
    unit: Option<String>,
    error: PipelineError,
}

trait AtStage<T> {
    fn at(self, stage: Stage, unit: Option<&str>) -> Result<T, Fatal>;
}

impl<T, E: Into<PipelineError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage, unit: Option<&str>) -> Result<T, Fatal> {
        self.map_err(|e| Fatal {
            stage,
            unit: unit.map(str::to_string),
            error: e.into(),
        })
    }
}

/// Position of one unit of work within the run, for overall percentages.
#[derive(Clone, Copy)]
struct UnitSlot {
    index: usize,
    count: usize,
}

impl UnitSlot {
    fn percent(&self, within: u8) -> u8 {
        ((self.index * 100 + within.min(100) as usize) / self.count.max(1)) as u8
    }
}

pub struct Orchestrator {
    db: Database,
    config: Arc<Config>,
    source: Arc<dyn NewsSource>,
    analyzer: Arc<dyn Analyzer>,
    broadcaster: Option<RunProgressBroadcaster>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        config: Arc<Config>,
        source: Arc<dyn NewsSource>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            db,
            config,
            source,
            analyzer,
            broadcaster: None,
        }
    }

    pub fn with_broadcaster(mut self, broadcaster: RunProgressBroadcaster) -> Self {
        self.broadcaster = Some(broadcaster);
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn runs(&self) -> RunManager {
        RunManager::new(&self.db, self.config.pipeline.recent_error_limit)
    }

    pub fn lock(&self) -> LockService {
        LockService::new(&self.db, self.config.pipeline.lock_stale_after_secs)
    }

    pub fn status(&self, run_id: &str) -> Result<Option<RunStatusSnapshot>, PipelineError> {
        self.runs().get_run_status(run_id)
    }

    /// Operator escape hatch: clears the lock whoever holds it.
    pub fn force_release_lock(&self) -> Result<Option<LockHolder>, PipelineError> {
        self.lock().force_release()
    }

    /// Validates a raw trigger and runs it.
    pub async fn run(&self, request: RunRequest) -> RunOutcome {
        match request.validate() {
            Ok((config, trigger)) => {
                self.run_config(config, trigger, request.trigger_context.as_ref())
                    .await
            }
            Err(e) => {
                warn!(operation = %request.operation, error = %e, "Run request rejected");
                RunOutcome::refused(OutcomeStatus::Rejected, Stage::Validate, e.to_string())
            }
        }
    }

    /// Runs an already-built config.
    pub async fn run_config(
        &self,
        config: RunConfig,
        trigger: TriggerSource,
        trigger_context: Option<&serde_json::Value>,
    ) -> RunOutcome {
        let config = match config.validated() {
            Ok(config) => config,
            Err(e) => {
                return RunOutcome::refused(OutcomeStatus::Rejected, Stage::Validate, e.to_string())
            }
        };

        let run_id = uuid::Uuid::new_v4().to_string();
        let lock = self.lock();
        match lock.acquire(&run_id) {
            Ok(_) => {}
            Err(PipelineError::LockHeld(held)) => {
                info!(holder = %held.holder, "Run refused: pipeline is locked");
                return RunOutcome::refused(OutcomeStatus::Locked, Stage::LockAcquire, held.to_string());
            }
            Err(e) => {
                error!(error = %e, "Could not take the pipeline lock");
                return RunOutcome::refused(OutcomeStatus::Failed, Stage::LockAcquire, e.to_string());
            }
        }

        let span = info_span!("pipeline_run", run_id = %run_id, operation = %config.run_type());
        let mut ctx = RunContext::new(&run_id, config);
        ctx.stage(Stage::LockAcquire, None, true, None);

        let (created, failed) = self
            .execute(&mut ctx, trigger, trigger_context)
            .instrument(span)
            .await;

        match lock.release(&run_id) {
            Ok(_) => ctx.stage(Stage::LockRelease, None, true, None),
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Failed to release the pipeline lock");
                ctx.stage(Stage::LockRelease, None, false, Some(e.to_string()));
                ctx.errors.push(StageError::new(Stage::LockRelease, e.to_string()));
            }
        }

        RunOutcome {
            run_id: created.then(|| run_id.clone()),
            status: if failed {
                OutcomeStatus::Failed
            } else {
                OutcomeStatus::Complete
            },
            stages: ctx.stages,
            errors: ctx.errors,
            stats: ctx.stats,
        }
    }

    fn reporter(&self, run_id: &str) -> PersistingProgress<RunReporter> {
        let inner = match &self.broadcaster {
            Some(b) => RunReporter::Broadcast(BroadcastProgress::new(b.start_run(run_id))),
            None => RunReporter::Noop(NoopProgress),
        };
        PersistingProgress::new(self.runs(), run_id, inner)
    }

    /// Returns `(run row created, run failed)`.
    async fn execute(
        &self,
        ctx: &mut RunContext,
        trigger: TriggerSource,
        trigger_context: Option<&serde_json::Value>,
    ) -> (bool, bool) {
        let runs = self.runs();
        let run_id = ctx.run_id.clone();

        let estimate = match self.plan_units(&ctx.config) {
            Ok(units) => Some(estimate_duration(&ctx.config, &self.config.pipeline, &units)),
            Err(e) => {
                warn!(error = %e, "Could not plan run for estimation");
                None
            }
        };

        if let Err(e) = runs.create_run(&run_id, &ctx.config, trigger, trigger_context, estimate) {
            error!(error = %e, "Failed to create run");
            ctx.stage(Stage::RunCreate, None, false, Some(e.to_string()));
            ctx.errors.push(StageError::new(Stage::RunCreate, e.to_string()));
            return (false, true);
        }
        ctx.stage(Stage::RunCreate, None, true, None);
        info!(estimated_seconds = ?estimate, "Run started");

        let reporter = self.reporter(&run_id);
        let result = match runs.transition(&run_id, RunState::Running) {
            Ok(()) => self.run_units(ctx, &runs, &reporter).await,
            Err(e) => Err(Fatal {
                stage: Stage::RunCreate,
                unit: None,
                error: e,
            }),
        };

        let fatal = match result {
            Ok(()) => None,
            Err(fatal) => {
                error!(stage = %fatal.stage, unit = ?fatal.unit, error = %fatal.error, "Run aborted");
                let mut stage_error = StageError::new(fatal.stage, fatal.error.to_string());
                if let Some(ref unit) = fatal.unit {
                    stage_error = stage_error.in_category(unit);
                }
                ctx.stage(fatal.stage, fatal.unit.as_deref(), false, Some(fatal.error.to_string()));
                record(&runs, ctx, stage_error);
                Some(fatal.error)
            }
        };

        let failed = fatal.is_some() || ctx.all_units_failed();
        let final_state = if failed { RunState::Failed } else { RunState::Complete };
        if let Err(e) = runs.transition(&run_id, final_state) {
            error!(error = %e, "Failed to finalize run");
            record(&runs, ctx, StageError::new(Stage::RunFinalize, e.to_string()));
        }
        ctx.stage(Stage::RunFinalize, None, !failed, Some(final_state.to_string()));

        let stats = &ctx.stats;
        if failed {
            let reason = match fatal {
                Some(e) => e.to_string(),
                None => "every unit of work failed".to_string(),
            };
            reporter.report(ProgressEvent::Failed { error: reason });
        } else {
            reporter.report(ProgressEvent::Completed {
                message: format!("{} stories promoted", stats.promoted),
            });
        }
        info!(
            status = %final_state,
            accepted = stats.accepted,
            analyzed = stats.analyzed,
            analysis_failed = stats.analysis_failed,
            promoted = stats.promoted,
            errors = ctx.errors.len(),
            "Run finished"
        );
        (true, failed)
    }

    /// Resolves `(unit, article count)` pairs for a config.
    fn plan_units(&self, config: &RunConfig) -> Result<Vec<(String, u32)>, DatabaseError> {
        let settings = &self.config.pipeline;
        Ok(match config {
            RunConfig::CategoryRefresh {
                categories,
                target_count,
            } => categories
                .iter()
                .map(|c| (c.clone(), target_count.unwrap_or_else(|| self.config.target_for(c))))
                .collect(),
            RunConfig::FullRefresh { target_count } => self
                .config
                .categories
                .iter()
                .map(|c| (c.clone(), target_count.unwrap_or_else(|| self.config.target_for(c))))
                .collect(),
            RunConfig::KeywordSearch { limit, category, .. } => vec![(
                category.clone().unwrap_or_else(|| settings.search_category.clone()),
                limit.unwrap_or(settings.target_count),
            )],
            RunConfig::ReanalyzeCategory { .. } => {
                let stories = live_repo::list_stories(&self.db, &reanalysis_filter(config))?;
                vec![(reanalysis_label(config), stories.len() as u32)]
            }
        })
    }

    async fn run_units(
        &self,
        ctx: &mut RunContext,
        runs: &RunManager,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), Fatal> {
        let config = ctx.config.clone();
        match &config {
            RunConfig::CategoryRefresh { .. } | RunConfig::FullRefresh { .. } => {
                let units = self.plan_units(&config).at(Stage::RunCreate, None)?;
                let count = units.len();
                for (index, (category, target)) in units.into_iter().enumerate() {
                    let slot = UnitSlot { index, count };
                    self.refresh_category(ctx, runs, reporter, &category, target, slot)
                        .await?;
                }
            }
            RunConfig::KeywordSearch {
                keyword,
                limit,
                category,
            } => {
                let settings = &self.config.pipeline;
                let category = category.as_deref().unwrap_or(&settings.search_category);
                let limit = limit.unwrap_or(settings.target_count);
                self.keyword_search(ctx, runs, reporter, keyword, limit, category)
                    .await?;
            }
            RunConfig::ReanalyzeCategory { analysis_types, .. } => {
                self.reanalyze(ctx, runs, reporter, &config, analysis_types)
                    .await?;
            }
        }
        Ok(())
    }

    async fn refresh_category(
        &self,
        ctx: &mut RunContext,
        runs: &RunManager,
        reporter: &dyn ProgressReporter,
        category: &str,
        target: u32,
        slot: UnitSlot,
    ) -> Result<(), Fatal> {
        let settings = &self.config.pipeline;
        let run_id = ctx.run_id.clone();
        let unit = Some(category);
        ctx.stats.units_total += 1;

        reporter.report(ProgressEvent::stage(
            RunPhase::Fetching,
            unit,
            slot.percent(0),
            format!("Fetching {} ({} wanted)", category, target),
        ));
        let mut quota = QuotaTracker::start(&self.db, &run_id, category, target, settings.max_pull_attempts)
            .at(Stage::Fetch, unit)?;
        let engine = FetchEngine::new(
            self.source.as_ref(),
            settings.pool_multiplier,
            Duration::from_millis(settings.fetch_retry_delay_ms),
        );
        let fetched = engine
            .fill_category(category, &mut ctx.dedup, &mut ctx.stats, &mut quota)
            .instrument(info_span!("fetch", category))
            .await
            .at(Stage::Fetch, unit)?;

        for e in &fetched.errors {
            record(runs, ctx, StageError::new(Stage::Fetch, e.to_string()).in_category(category));
        }
        let staged = self
            .stage_candidates(&run_id, category, &fetched.accepted, true)
            .at(Stage::Fetch, unit)?;
        let final_state = fetched
            .final_state
            .map(|s| s.to_string())
            .unwrap_or_default();
        ctx.stage(
            Stage::Fetch,
            unit,
            staged > 0,
            Some(format!("{}/{} accepted, {}", staged, target, final_state)),
        );

        if staged == 0 {
            warn!(category, "No articles accepted; keeping the current live set");
            ctx.stats.units_failed += 1;
            record(
                runs,
                ctx,
                StageError::new(Stage::Promote, "nothing staged; promotion skipped").in_category(category),
            );
            ctx.stage(Stage::Promote, unit, false, Some("skipped".to_string()));
            return Ok(());
        }

        // No-op after the first category; the run status stays `analyzing`.
        runs.transition(&run_id, RunState::Analyzing)
            .at(Stage::Analyze, unit)?;
        let rows = staging_repo::list_articles(&self.db, &run_id, Some(category))
            .at(Stage::Analyze, unit)?;
        let analyzed = self
            .dispatch(&run_id, &rows, DispatchMode::Stage, reporter, slot, category)
            .await
            .at(Stage::Analyze, unit)?;
        self.absorb_analysis(ctx, runs, category, &analyzed);

        reporter.report(ProgressEvent::stage(
            RunPhase::Promoting,
            unit,
            slot.percent(ANALYZE_END),
            format!("Promoting {}", category),
        ));
        let promotion = info_span!("promote", category)
            .in_scope(|| promotion::promote_category(&self.db, &run_id, category))
            .at(Stage::Promote, unit)?;
        self.absorb_promotion(ctx, category, promotion);
        Ok(())
    }

    async fn keyword_search(
        &self,
        ctx: &mut RunContext,
        runs: &RunManager,
        reporter: &dyn ProgressReporter,
        keyword: &str,
        limit: u32,
        category: &str,
    ) -> Result<(), Fatal> {
        let settings = &self.config.pipeline;
        let run_id = ctx.run_id.clone();
        let unit = Some(keyword);
        let slot = UnitSlot { index: 0, count: 1 };
        ctx.stats.units_total += 1;

        reporter.report(ProgressEvent::stage(
            RunPhase::Fetching,
            Some(category),
            0,
            format!("Searching for '{}'", keyword),
        ));
        let engine = FetchEngine::new(
            self.source.as_ref(),
            settings.pool_multiplier,
            Duration::from_millis(settings.fetch_retry_delay_ms),
        );
        let fetched = engine
            .fetch_keyword(keyword, limit, &mut ctx.dedup, &mut ctx.stats)
            .instrument(info_span!("fetch", keyword))
            .await;
        let candidates = match fetched {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(keyword, error = %e, "Keyword fetch failed");
                ctx.stats.units_failed += 1;
                ctx.stage(Stage::Fetch, unit, false, Some(e.to_string()));
                record(runs, ctx, StageError::new(Stage::Fetch, e.to_string()).in_category(category));
                return Ok(());
            }
        };

        let staged = self
            .stage_candidates(&run_id, category, &candidates, false)
            .at(Stage::Fetch, unit)?;
        ctx.stage(Stage::Fetch, unit, staged > 0, Some(format!("{}/{} accepted", staged, limit)));
        if staged == 0 {
            ctx.stats.units_failed += 1;
            record(
                runs,
                ctx,
                StageError::new(Stage::Fetch, format!("no results for '{}'", keyword)).in_category(category),
            );
            return Ok(());
        }

        runs.transition(&run_id, RunState::Analyzing)
            .at(Stage::Analyze, unit)?;
        let rows = staging_repo::list_articles(&self.db, &run_id, Some(category))
            .at(Stage::Analyze, unit)?;
        let analyzed = self
            .dispatch(&run_id, &rows, DispatchMode::Stage, reporter, slot, category)
            .await
            .at(Stage::Analyze, unit)?;
        self.absorb_analysis(ctx, runs, category, &analyzed);

        reporter.report(ProgressEvent::stage(
            RunPhase::Promoting,
            Some(category),
            ANALYZE_END,
            format!("Merging results into {}", category),
        ));
        let promotion = info_span!("promote", category)
            .in_scope(|| promotion::merge_category(&self.db, &run_id, category))
            .at(Stage::Promote, unit)?;
        self.absorb_promotion(ctx, category, promotion);
        Ok(())
    }

    async fn reanalyze(
        &self,
        ctx: &mut RunContext,
        runs: &RunManager,
        reporter: &dyn ProgressReporter,
        config: &RunConfig,
        analysis_types: &[AnalysisType],
    ) -> Result<(), Fatal> {
        let run_id = ctx.run_id.clone();
        let label = reanalysis_label(config);
        let unit = Some(label.as_str());
        let slot = UnitSlot { index: 0, count: 1 };
        ctx.stats.units_total += 1;

        let stories = live_repo::list_stories(&self.db, &reanalysis_filter(config))
            .at(Stage::Analyze, unit)?;
        if stories.is_empty() {
            warn!(selection = %label, "No live stories matched the reanalysis selection");
            ctx.stats.units_failed += 1;
            ctx.stage(Stage::Analyze, unit, false, Some("no stories matched".to_string()));
            record(runs, ctx, StageError::new(Stage::Analyze, "no live stories matched").in_category(&label));
            return Ok(());
        }

        self.stage_live_copies(&run_id, &stories).at(Stage::Analyze, unit)?;
        runs.transition(&run_id, RunState::Analyzing)
            .at(Stage::Analyze, unit)?;
        let rows = staging_repo::list_articles(&self.db, &run_id, None).at(Stage::Analyze, unit)?;
        let analyzed = self
            .dispatch(&run_id, &rows, DispatchMode::Reanalysis, reporter, slot, &label)
            .await
            .at(Stage::Analyze, unit)?;
        self.absorb_analysis(ctx, runs, &label, &analyzed);

        reporter.report(ProgressEvent::stage(
            RunPhase::Promoting,
            unit,
            ANALYZE_END,
            format!("Applying reanalysis to {} stories", analyzed.succeeded.len()),
        ));
        let applied = info_span!("promote", category = %label)
            .in_scope(|| promotion::apply_reanalysis(&self.db, &label, &analyzed.succeeded, analysis_types))
            .at(Stage::Promote, unit)?;
        ctx.stats.promoted += applied as u32;
        ctx.stage(Stage::Promote, unit, true, Some(format!("{} stories updated", applied)));

        if analyzed.succeeded.is_empty() {
            ctx.stats.units_failed += 1;
        }
        Ok(())
    }

    async fn dispatch(
        &self,
        run_id: &str,
        rows: &[staging_repo::StagingArticleRow],
        mode: DispatchMode,
        reporter: &dyn ProgressReporter,
        slot: UnitSlot,
        unit: &str,
    ) -> Result<DispatchOutcome, DatabaseError> {
        let settings = &self.config.pipeline;
        let dispatcher = AnalysisDispatcher::new(
            &self.db,
            self.analyzer.as_ref(),
            Duration::from_secs(settings.analysis_timeout_secs),
            Duration::from_millis(settings.analysis_delay_ms),
        );
        dispatcher
            .dispatch(
                run_id,
                rows,
                mode,
                reporter,
                slot.percent(FETCH_SHARE),
                slot.percent(ANALYZE_END),
            )
            .instrument(info_span!("analyze", unit, articles = rows.len()))
            .await
    }

    fn absorb_analysis(&self, ctx: &mut RunContext, runs: &RunManager, unit: &str, outcome: &DispatchOutcome) {
        ctx.stats.analyzed += outcome.analyzed;
        ctx.stats.analysis_failed += outcome.failed;
        for e in &outcome.errors {
            record(runs, ctx, e.clone());
        }
        ctx.stage(
            Stage::Analyze,
            Some(unit),
            outcome.analyzed > 0 || outcome.failed == 0,
            Some(format!("{} analyzed, {} failed", outcome.analyzed, outcome.failed)),
        );
    }

    fn absorb_promotion(&self, ctx: &mut RunContext, unit: &str, promotion: Promotion) {
        ctx.stats.promoted += promotion.promoted() as u32;
        let detail = match promotion {
            Promotion::Replaced { inserted, removed } => format!("{} live, {} replaced", inserted, removed),
            Promotion::Merged { inserted, replaced } => format!("{} merged, {} replaced", inserted, replaced),
            Promotion::Skipped => "skipped".to_string(),
        };
        ctx.stage(Stage::Promote, Some(unit), promotion != Promotion::Skipped, Some(detail));
    }

    /// Writes accepted candidates to staging in acceptance order.
    fn stage_candidates(
        &self,
        run_id: &str,
        category: &str,
        candidates: &[Candidate],
        supersede: bool,
    ) -> Result<usize, DatabaseError> {
        if supersede {
            staging_repo::supersede_category(&self.db, category, run_id)?;
        }
        let now = now_timestamp();
        for (position, candidate) in candidates.iter().enumerate() {
            let id = uuid::Uuid::new_v4().to_string();
            let payload = serde_json::to_value(&candidate.article)?;
            let article = &candidate.article;
            staging_repo::insert_article(
                &self.db,
                &NewStagingArticle {
                    id: &id,
                    run_id,
                    category,
                    title: &article.title,
                    url: &article.link,
                    normalized_url: &candidate.normalized_url,
                    normalized_title: &candidate.normalized_title,
                    description: article.description.as_deref(),
                    source: article.source.as_deref(),
                    image_url: article.image_url.as_deref(),
                    published_at: article.published_at.as_deref(),
                    live_story_id: None,
                    payload: Some(&payload),
                    position: position as u32,
                    created_at: &now,
                },
            )?;
        }
        Ok(candidates.len())
    }

    /// Stages a copy of each live story so the dispatcher can analyze it.
    fn stage_live_copies(&self, run_id: &str, stories: &[StoryRow]) -> Result<(), DatabaseError> {
        let now = now_timestamp();
        for (position, story) in stories.iter().enumerate() {
            let id = uuid::Uuid::new_v4().to_string();
            staging_repo::insert_article(
                &self.db,
                &NewStagingArticle {
                    id: &id,
                    run_id,
                    category: &story.category,
                    title: &story.title,
                    url: &story.url,
                    normalized_url: &story.normalized_url,
                    normalized_title: &story.normalized_title,
                    description: story.description.as_deref(),
                    source: story.source.as_deref(),
                    image_url: story.image_url.as_deref(),
                    published_at: story.published_at.as_deref(),
                    live_story_id: Some(&story.id),
                    payload: None,
                    position: position as u32,
                    created_at: &now,
                },
            )?;
        }
        Ok(())
    }
}

/// Appends an error to the run context and the run's error log.
fn record(runs: &RunManager, ctx: &mut RunContext, error: StageError) {
    if let Err(e) = runs.record_error(&ctx.run_id, &error) {
        warn!(error = %e, "Failed to persist run error");
    }
    ctx.errors.push(error);
}

fn reanalysis_filter(config: &RunConfig) -> StoryFilter {
    match config {
        RunConfig::ReanalyzeCategory {
            category,
            story_ids,
            from,
            to,
            ..
        } => StoryFilter {
            category: category.clone(),
            ids: story_ids.clone(),
            published_from: from.clone(),
            published_to: to.clone(),
            limit: None,
        },
        _ => StoryFilter::default(),
    }
}

fn reanalysis_label(config: &RunConfig) -> String {
    match config {
        RunConfig::ReanalyzeCategory {
            category: Some(category),
            ..
        } => category.clone(),
        _ => "selection".to_string(),
    }
}
