use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;

use newsroom::db::live_repo::{self, StoryFilter};
use newsroom::model::TriggerSource;
use newsroom::pipeline::{RunManager, RunRequest};
use newsroom::secrets::has_secret_source;
use newsroom::sources::{FetchError, FetchRequest, SourceArticle};
use newsroom::{
    load_config, Config, Database, HttpNewsSource, NewsSource, Orchestrator, OutcomeStatus,
    RunProgressBroadcaster, RunProgressEvent, ScriptAnalyzer,
};

#[derive(Parser)]
#[command(name = "newsroom")]
#[command(about = "Staged news ingestion with viewpoint analysis")]
#[command(version)]
struct Cli {
    /// Configuration file (.json, .yaml or .yml)
    #[arg(short, long, global = true, env = "NEWSROOM_CONFIG", default_value = "newsroom.yaml")]
    config: PathBuf,

    /// Database file, overriding the configured one
    #[arg(long, global = true, env = "NEWSROOM_DATABASE")]
    database: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger a run and wait for it to finish
    Run(RunArgs),

    /// Show one run's status snapshot
    Status { run_id: String },

    /// List recent runs
    Runs {
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// List live stories
    Stories {
        #[arg(long)]
        category: Option<String>,

        #[arg(short, long)]
        limit: Option<u64>,

        /// Include viewpoints and posts
        #[arg(long)]
        full: bool,
    },

    /// Clear the pipeline lock regardless of holder
    ReleaseLock,

    /// Validate the configuration file and exit
    CheckConfig,
}

#[derive(Args)]
struct RunArgs {
    /// category_refresh, keyword_search, full_refresh or reanalyze_category
    operation: String,

    /// Raw parameters as a JSON object; flags below are merged on top
    #[arg(long, default_value = "{}")]
    params: String,

    /// Category (repeatable for category_refresh)
    #[arg(long = "category")]
    categories: Vec<String>,

    #[arg(long)]
    target_count: Option<u32>,

    #[arg(long)]
    keyword: Option<String>,

    #[arg(long)]
    limit: Option<u32>,

    /// Live story id to reanalyze (repeatable)
    #[arg(long = "story-id")]
    story_ids: Vec<String>,

    #[arg(long)]
    from: Option<String>,

    #[arg(long)]
    to: Option<String>,

    /// sentiment or social (repeatable)
    #[arg(long = "analysis-type")]
    analysis_types: Vec<String>,

    /// Stream progress to stderr while the run executes
    #[arg(long)]
    follow: bool,
}

impl RunArgs {
    /// Merges the convenience flags over `--params`.
    fn params(&self) -> Result<Value> {
        let mut map: Map<String, Value> =
            match serde_json::from_str(&self.params).context("--params is not valid JSON")? {
                Value::Object(map) => map,
                _ => bail!("--params must be a JSON object"),
            };
        if let Some(first) = self.categories.first() {
            if self.operation == "category_refresh" {
                map.insert("categories".into(), json!(self.categories));
            } else {
                map.insert("category".into(), json!(first));
            }
        }
        let optional = [
            ("target_count", self.target_count.map(|v| json!(v))),
            ("keyword", self.keyword.as_ref().map(|v| json!(v))),
            ("limit", self.limit.map(|v| json!(v))),
            ("from", self.from.as_ref().map(|v| json!(v))),
            ("to", self.to.as_ref().map(|v| json!(v))),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.into(), value);
            }
        }
        if !self.story_ids.is_empty() {
            map.insert("story_ids".into(), json!(self.story_ids));
        }
        if !self.analysis_types.is_empty() {
            map.insert("analysis_types".into(), json!(self.analysis_types));
        }
        Ok(Value::Object(map))
    }
}

/// Stands in for the news source when no API key is configured; only
/// reanalysis runs can succeed with it.
struct UnconfiguredSource(String);

#[async_trait]
impl NewsSource for UnconfiguredSource {
    async fn fetch(&self, _request: &FetchRequest) -> Result<Vec<SourceArticle>, FetchError> {
        Err(FetchError::Config(self.0.clone()))
    }
}

fn init_logging(json: bool) -> Result<()> {
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newsroom=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Prints progress events until every sender is gone.
async fn follow_progress(mut rx: broadcast::Receiver<RunProgressEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let scope = event.category.as_deref().unwrap_or("-");
                match event.error {
                    Some(error) => eprintln!("[{:>3}%] {} {}: {}", event.percent, scope, event.message, error),
                    None => eprintln!("[{:>3}%] {} {}", event.percent, scope, event.message),
                }
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                eprintln!("({} progress events skipped)", missed);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_database(cli: &Cli, config: &Config) -> Result<Database> {
    let path = match cli.database.clone().or_else(|| config.database_path()) {
        Some(path) => path,
        None => bail!("No database path configured and no home directory found"),
    };
    info!(path = %path.display(), "Opening database");
    Database::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;

    if let Commands::CheckConfig = cli.command {
        println!(
            "{}: OK ({} categories)",
            cli.config.display(),
            config.categories.len()
        );
        let source = &config.news_source;
        if !has_secret_source(
            source.api_key.as_deref(),
            source.api_key_file.as_deref(),
            source.api_key_env.as_deref(),
        ) {
            println!("warning: no news source API key configured; only reanalysis runs will work");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let db = open_database(&cli, &config)?;
    let settings = &config.pipeline;

    match cli.command {
        Commands::Run(args) => {
            let params = args.params()?;
            let operation = args.operation;
            let source: Arc<dyn NewsSource> = match HttpNewsSource::from_config(&config.news_source) {
                Ok(source) => Arc::new(source) as Arc<dyn NewsSource>,
                Err(e) if operation == "reanalyze_category" => Arc::new(UnconfiguredSource(e.to_string())),
                Err(e) => return Err(e).context("News source is not usable"),
            };
            let analyzer = Arc::new(ScriptAnalyzer::new(&config.analyzer));
            let mut orchestrator = Orchestrator::new(db, Arc::new(config.clone()), source, analyzer);
            let follower = if args.follow {
                let broadcaster = RunProgressBroadcaster::new(256);
                let rx = broadcaster.subscribe();
                orchestrator = orchestrator.with_broadcaster(broadcaster);
                Some(tokio::spawn(follow_progress(rx)))
            } else {
                None
            };

            let request = RunRequest::new(&operation, params, TriggerSource::Cli)
                .with_context(json!({ "cli": env!("CARGO_PKG_VERSION") }));
            let outcome = orchestrator.run(request).await;
            drop(orchestrator);
            if let Some(follower) = follower {
                let _ = follower.await;
            }
            print_json(&outcome)?;
            Ok(match outcome.status {
                OutcomeStatus::Complete => ExitCode::SUCCESS,
                OutcomeStatus::Locked => ExitCode::from(3),
                OutcomeStatus::Rejected => ExitCode::from(2),
                OutcomeStatus::Failed => ExitCode::FAILURE,
            })
        }
        Commands::Status { run_id } => {
            let manager = RunManager::new(&db, settings.recent_error_limit);
            match manager.get_run_status(&run_id)? {
                Some(snapshot) => {
                    print_json(&snapshot)?;
                    Ok(ExitCode::SUCCESS)
                }
                None => bail!("Run not found: {}", run_id),
            }
        }
        Commands::Runs { limit } => {
            let manager = RunManager::new(&db, settings.recent_error_limit);
            print_json(&manager.list_runs(limit)?)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stories {
            category,
            limit,
            full,
        } => {
            let stories = live_repo::list_stories(
                &db,
                &StoryFilter {
                    category,
                    limit,
                    ..Default::default()
                },
            )?;
            if full {
                let mut out = Vec::with_capacity(stories.len());
                for story in stories {
                    let viewpoints = live_repo::viewpoints_for_story(&db, &story.id)?;
                    out.push(json!({ "story": story, "viewpoints": viewpoints }));
                }
                print_json(&out)?;
            } else {
                print_json(&stories)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::ReleaseLock => {
            let lock = newsroom::pipeline::LockService::new(&db, settings.lock_stale_after_secs);
            match lock.force_release()? {
                Some(holder) => println!("Released lock held by run {} since {}", holder.run_id, holder.acquired_at),
                None => println!("Pipeline lock was not held"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckConfig => Ok(ExitCode::SUCCESS),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.json) {
        eprintln!("Error: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
