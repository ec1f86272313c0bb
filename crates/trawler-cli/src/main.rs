use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use trawler_client::{FetchConfig, GenericExtractor, HttpFetchClient, RobotsGate};
use trawler_core::dedup::DeduperConfig;
use trawler_core::extract::ExtractorRegistry;
use trawler_core::models::{NewJobSource, RunStatus};
use trawler_core::pipeline::{CrawlPipeline, PipelineConfig};
use trawler_core::scheduler::Scheduler;
use trawler_core::store::{PageStore, RunStore};
use trawler_core::worker::{TracingWorkerReporter, Worker, WorkerConfig};
use trawler_core::{RateLimiter, RateLimiterConfig};
use trawler_db::{CrawlRunRepository, Database, DatabaseConfig, PageRepository};

#[derive(Parser)]
#[command(name = "trawler", version, about = "Crawl scheduler and worker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register (or update) a job source
    AddSource {
        /// Unique source name
        #[arg(short, long)]
        name: String,

        /// Base URL the crawl starts from
        #[arg(short, long)]
        url: String,

        /// Minutes between crawls of this source
        #[arg(short, long, default_value_t = 60)]
        interval: u32,
    },

    /// Create pending runs for sources that are due
    Schedule {
        /// Restrict to these source names (repeatable)
        #[arg(short, long)]
        source: Vec<String>,

        /// Schedule even sources that are not yet due
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Process pending runs
    Worker {
        /// Drain pending runs once and exit (default: run until Ctrl-C)
        #[arg(long, default_value_t = false)]
        once: bool,

        /// Seconds between polls in continuous mode
        #[arg(long, env = "TRAWLER_POLL_INTERVAL", default_value_t = 5)]
        poll_interval: u64,

        /// Concurrent worker units sharing one rate limiter
        #[arg(long, default_value_t = 1)]
        workers: usize,

        /// Page budget per run (base page plus followed links)
        #[arg(long, default_value_t = 5)]
        max_pages: usize,
    },

    /// Fetch and extract a single URL without scheduling or persisting
    Crawl {
        /// Target URL
        #[arg(short, long)]
        url: String,

        /// Keyword hints to match alongside the built-in vocabulary
        #[arg(short, long)]
        keyword: Vec<String>,
    },

    /// Delete completed runs older than the retention window
    Cleanup {
        /// Retention in days; failed runs are always kept
        #[arg(long, default_value_t = 30)]
        days: u32,
    },

    /// Show source/page/run counts
    Stats,

    /// Export stored pages
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,

        #[arg(long, default_value_t = 100)]
        limit: usize,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("trawler=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::AddSource { name, url, interval } => {
            let db = connect_db().await?;
            let source = db
                .run_repo()
                .insert_source(NewJobSource::new(name, url).with_interval_minutes(interval))
                .await?;
            println!("{} {}", source.id, source.name);
        }
        Commands::Schedule { source, force } => {
            let db = connect_db().await?;
            let scheduler = Scheduler::new(db.run_repo());
            let filter = if source.is_empty() { None } else { Some(source) };
            let scheduled = scheduler
                .schedule_all_sources(filter.as_deref(), force)
                .await?;
            println!("scheduled {} source(s)", scheduled.len());
            for id in scheduled {
                println!("{id}");
            }
        }
        Commands::Worker {
            once,
            poll_interval,
            workers,
            max_pages,
        } => {
            let db = connect_db().await?;
            cmd_worker(&db, once, poll_interval, workers.max(1), max_pages).await?;
        }
        Commands::Crawl { url, keyword } => {
            let db = connect_db().await?;
            let pipeline = build_pipeline(&db, PipelineConfig::default())?;
            let result = pipeline.crawl_ad_hoc(&url, &keyword).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::Cleanup { days } => {
            let db = connect_db().await?;
            let deleted = Scheduler::new(db.run_repo()).cleanup_old_runs(days).await?;
            println!("deleted {deleted} completed run(s) older than {days} day(s)");
        }
        Commands::Stats => {
            let db = connect_db().await?;
            let runs = db.run_repo();
            println!("sources:   {}", runs.count_sources().await?);
            println!("pages:     {}", db.page_repo().count_pages().await?);
            println!("pending:   {}", runs.count_runs(RunStatus::Pending).await?);
            println!("running:   {}", runs.count_runs(RunStatus::Running).await?);
            println!("completed: {}", runs.count_runs(RunStatus::Completed).await?);
            println!("failed:    {}", runs.count_runs(RunStatus::Failed).await?);
        }
        Commands::Export { format, limit, output } => {
            let db = connect_db().await?;
            cmd_export(&db, format, limit, output).await?;
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()
        .context("DATABASE_URL not set. Required for all commands.")?;
    let db = Database::connect(&config).await?;
    db.migrate().await?;
    Ok(db)
}

/// One shared rate limiter feeds every fetch client, so politeness holds
/// across all worker units in this process.
fn build_pipeline(
    db: &Database,
    config: PipelineConfig,
) -> Result<CrawlPipeline<HttpFetchClient, PageRepository>> {
    let limiter = RateLimiter::new(RateLimiterConfig::default());
    build_pipeline_with_limiter(db, config, limiter)
}

fn build_pipeline_with_limiter(
    db: &Database,
    config: PipelineConfig,
    limiter: RateLimiter,
) -> Result<CrawlPipeline<HttpFetchClient, PageRepository>> {
    let fetcher = HttpFetchClient::with_config(limiter, FetchConfig::default())?
        .with_robots_gate(RobotsGate::new("Trawler")?);
    let registry = ExtractorRegistry::new(Arc::new(GenericExtractor::new()));

    Ok(CrawlPipeline::new(
        fetcher,
        Arc::new(registry),
        db.page_repo(),
        DeduperConfig::default(),
        config,
    ))
}

async fn cmd_worker(
    db: &Database,
    once: bool,
    poll_interval: u64,
    workers: usize,
    max_pages: usize,
) -> Result<()> {
    let limiter = RateLimiter::new(RateLimiterConfig::default());
    let pipeline_config = PipelineConfig {
        max_pages_per_run: max_pages,
    };

    let make_worker = |index: usize| -> Result<Worker<CrawlRunRepository, PageRepository, HttpFetchClient>> {
        let pipeline = build_pipeline_with_limiter(db, pipeline_config.clone(), limiter.clone())?;
        let config = WorkerConfig::default()
            .with_worker_id(format!("{}-{index}", hostname_prefix()))
            .with_poll_interval(Duration::from_secs(poll_interval));
        Ok(Worker::new(Scheduler::new(db.run_repo()), pipeline, config))
    };

    if once {
        let worker = make_worker(0)?;
        let processed = worker.run_once(&TracingWorkerReporter).await?;
        println!("processed {processed} run(s)");
        return Ok(());
    }

    let token = CancellationToken::new();
    let mut handles = tokio::task::JoinSet::new();
    for index in 0..workers {
        let worker = make_worker(index)?;
        let token = token.clone();
        handles.spawn(async move {
            worker.run_continuously(token, &TracingWorkerReporter).await
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install CTRL+C handler")?;
    tracing::info!("Shutdown signal received");
    token.cancel();

    while let Some(result) = handles.join_next().await {
        result??;
    }

    Ok(())
}

fn hostname_prefix() -> String {
    format!("worker-{}", &Uuid::new_v4().to_string()[..8])
}

async fn cmd_export(
    db: &Database,
    format: ExportFormat,
    limit: usize,
    output: Option<PathBuf>,
) -> Result<()> {
    let pages = db.page_repo().list_pages(limit).await?;

    let writer: Box<dyn std::io::Write> = match &output {
        Some(path) => Box::new(std::fs::File::create(path)?),
        None => Box::new(std::io::stdout()),
    };

    match format {
        ExportFormat::Json => {
            serde_json::to_writer_pretty(writer, &pages)?;
        }
        ExportFormat::Csv => {
            let mut csv_writer = csv::Writer::from_writer(writer);
            for page in &pages {
                csv_writer.serialize(page)?;
            }
            csv_writer.flush()?;
        }
    }

    if let Some(path) = output {
        eprintln!("exported {} page(s) to {}", pages.len(), path.display());
    }

    Ok(())
}
