use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use letterboxd_stremio::config::Config;
use letterboxd_stremio::enrichment::EnrichmentGateway;
use letterboxd_stremio::migration::MigrationEngine;
use letterboxd_stremio::model::{CollectionFile, CollectionKind};
use letterboxd_stremio::pipeline::{dedupe_collections, migrate_window, UpdatePipeline};
use letterboxd_stremio::scraper::LetterboxdScraper;
use letterboxd_stremio::store::RecordStore;
use letterboxd_stremio::{ApiServer, AppState};

#[derive(Parser)]
#[command(name = "letterboxd-stremio")]
#[command(version, author = "TigreRoll")]
#[command(about = "Letterboxd top-rated films as Stremio catalogs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the standard search paths)
    #[arg(long, short)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the manifests and catalogs
    Serve,
    /// Scrape, enrich and migrate once
    Update,
    /// Migrate against a saved recent window instead of scraping
    Migrate {
        /// JSON file shaped like the recent collection (`{"meta": [...]}`)
        new_recent: PathBuf,
    },
    /// Show collection statistics
    Stats,
    /// Remove duplicate ids from the short and long collections
    Dedupe,
    /// Write the effective configuration to a TOML file
    InitConfig {
        #[arg(default_value = "letterboxd-stremio.toml")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::from_env()
        }),
    };

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "letterboxd_stremio={},tower_http=info,warn",
            config.logging.level
        ))
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;
    info!("{}", config.summary());

    match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Update => update(config).await,
        Commands::Migrate { new_recent } => migrate_from_file(config, new_recent).await,
        Commands::Stats => stats(config).await,
        Commands::Dedupe => {
            let store = RecordStore::open(config.storage.clone()).await;
            let (short, long) = dedupe_collections(&store).await?;
            info!("🔍 Duplicates removed: short {}, long {}", short, long);
            Ok(())
        }
        Commands::InitConfig { path } => Ok(config.save(&path)?),
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("🚀 Letterboxd Stremio server starting...");
    let state = AppState::open(config).await?;

    let handle = ApiServer::new(state).start_background();
    handle.await.context("server task panicked")?
}

async fn update(config: Config) -> Result<()> {
    info!("🎬 Letterboxd update starting for {}", config.scraper.username);

    let feed = Arc::new(LetterboxdScraper::new(&config.scraper)?);
    let gateway = Arc::new(EnrichmentGateway::from_config(&config.enrichment)?);
    let store = Arc::new(RecordStore::open(config.storage.clone()).await);

    let pipeline = UpdatePipeline::new(&config, feed, gateway, store);
    let report = pipeline.run().await?;

    info!("✅ With IMDb id: {}/{}", report.with_imdb_id(), report.recent.len());
    info!("🖼️ With poster: {}/{}", report.with_poster(), report.recent.len());
    Ok(())
}

async fn migrate_from_file(config: Config, new_recent: PathBuf) -> Result<()> {
    let content = tokio::fs::read_to_string(&new_recent)
        .await
        .with_context(|| format!("reading {}", new_recent.display()))?;
    let file: CollectionFile = serde_json::from_str(&content)
        .with_context(|| format!("parsing {}", new_recent.display()))?;

    if file.meta.is_empty() {
        warn!("⚠️ {} holds no films, every current recent film will migrate", new_recent.display());
    }

    let store = RecordStore::open(config.storage.clone()).await;
    let engine = MigrationEngine::from_config(&config.migration);
    let (stats, counts) = migrate_window(&store, &engine, &file.meta, config.scraper.max_films).await?;

    info!("🔄 Films migrated: {} (short {}, long {})", stats.migrated, stats.to_short, stats.to_long);
    info!("📦 recent: {}, short: {}, long: {}", counts.recent, counts.short, counts.long);
    Ok(())
}

async fn stats(config: Config) -> Result<()> {
    let store = RecordStore::open(config.storage.clone()).await;
    let snapshot = store.snapshot().await;

    for kind in CollectionKind::ALL {
        let films = snapshot.collection(kind);
        let with_runtime = films.iter().filter(|film| film.known_runtime().is_some()).count();
        let with_imdb = films.iter().filter(|film| film.has_imdb_id()).count();
        let with_poster = films.iter().filter(|film| film.poster.is_some()).count();

        info!("📊 {} ({})", kind, store.path_for(kind).display());
        info!("   Films: {}", films.len());
        info!("   With runtime: {}", with_runtime);
        info!("   With IMDb id: {}", with_imdb);
        info!("   With poster: {}", with_poster);
    }

    Ok(())
}
