//! Link preview enrichment job
//!
//! Drains pending link records: scrapes Open Graph metadata, falls back to a
//! headless browser when needed, and stores a normalized thumbnail per link.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use link_preview::{
    ChromiumRenderer, Enricher, EnrichConfig, EnrichOutcome, EnrichmentWorker, FsBlobStore,
    HttpFetcher, PostgresStore, RecordId, RenderConfig, WorkerConfig,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "enrich_links")]
#[command(about = "Fetch preview cards (title, description, thumbnail) for pending links")]
struct Cli {
    /// Keep polling for new links until Ctrl-C
    #[arg(long)]
    watch: bool,

    /// Process exactly one record by id
    #[arg(long, conflicts_with = "watch")]
    record: Option<i64>,
}

/// Job configuration loaded from environment variables.
#[derive(Debug, Clone)]
struct AppConfig {
    database_url: String,
    media_root: PathBuf,
    preview_subdir: String,
    concurrency: Option<usize>,
    batch_size: Option<usize>,
    poll_interval: Option<Duration>,
    chrome_executable: Option<PathBuf>,
    chrome_no_sandbox: bool,
}

impl AppConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            media_root: env::var("MEDIA_ROOT")
                .unwrap_or_else(|_| "./media".to_string())
                .into(),
            preview_subdir: env::var("PREVIEW_SUBDIR")
                .unwrap_or_else(|_| "link_previews".to_string()),
            concurrency: parse_var("ENRICH_CONCURRENCY")?,
            batch_size: parse_var("ENRICH_BATCH_SIZE")?,
            poll_interval: parse_var::<u64>("ENRICH_POLL_INTERVAL_SECS")?
                .map(Duration::from_secs),
            chrome_executable: env::var("CHROME_EXECUTABLE").ok().map(PathBuf::from),
            chrome_no_sandbox: parse_var::<bool>("CHROME_NO_SANDBOX")?.unwrap_or(false),
        })
    }

    fn worker_config(&self) -> WorkerConfig {
        let mut config = WorkerConfig::default();
        if let Some(concurrency) = self.concurrency {
            config = config.with_concurrency(concurrency);
        }
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(interval) = self.poll_interval {
            config = config.with_poll_interval(interval);
        }
        config
    }

    fn render_config(&self) -> RenderConfig {
        let mut config = RenderConfig::default().with_no_sandbox(self.chrome_no_sandbox);
        if let Some(path) = &self.chrome_executable {
            config = config.with_chrome_executable(path);
        }
        config
    }
}

fn parse_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be a valid value, got {value:?}")),
        Err(_) => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,link_preview=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    let store = PostgresStore::new(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let blobs = FsBlobStore::new(&config.media_root, &config.preview_subdir);
    let fetcher = HttpFetcher::new().context("Failed to build HTTP client")?;
    let renderer = Arc::new(ChromiumRenderer::new(config.render_config()));

    let enrich_config = EnrichConfig::default()
        .with_render_timeout(renderer.pool().config().total_budget());
    let enricher = Arc::new(Enricher::with_config(
        Arc::new(store),
        Arc::new(blobs),
        Arc::new(fetcher),
        renderer.clone(),
        enrich_config,
    ));

    tracing::info!(
        media_root = %config.media_root.display(),
        subdir = %config.preview_subdir,
        "Starting link enrichment"
    );

    let result = match cli.record {
        Some(id) => run_single(&enricher, RecordId(id)).await,
        None => run_worker(enricher, config.worker_config(), cli.watch).await,
    };

    renderer.shutdown().await;
    result
}

async fn run_single(
    enricher: &Enricher<PostgresStore, FsBlobStore, HttpFetcher, ChromiumRenderer>,
    id: RecordId,
) -> Result<()> {
    let outcome = enricher
        .process_by_id(id)
        .await
        .with_context(|| format!("Failed to load record {id}"))?;

    match &outcome {
        EnrichOutcome::Lightweight { image } | EnrichOutcome::Fallback { image, .. } => {
            tracing::info!(record_id = %id, image = %image, "Record enriched")
        }
        EnrichOutcome::Skipped => tracing::info!(record_id = %id, "Record already processed"),
        EnrichOutcome::Pending { stage, class, .. } => {
            tracing::warn!(record_id = %id, stage = %stage, error_class = %class, "Record left pending")
        }
        EnrichOutcome::TimedOut => tracing::warn!(record_id = %id, "Record timed out"),
    }
    Ok(())
}

async fn run_worker(
    enricher: Arc<Enricher<PostgresStore, FsBlobStore, HttpFetcher, ChromiumRenderer>>,
    worker_config: WorkerConfig,
    watch: bool,
) -> Result<()> {
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl-C received, finishing in-flight links");
            signal_token.cancel();
        }
    });

    let worker = EnrichmentWorker::with_config(enricher, worker_config);
    let summary = worker
        .run(watch, shutdown)
        .await
        .context("Enrichment worker failed")?;

    tracing::info!(
        claimed = summary.claimed,
        completed = summary.completed(),
        pending = summary.pending,
        "Done"
    );
    Ok(())
}
