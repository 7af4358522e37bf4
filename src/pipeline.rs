use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::enrichment::EnrichmentGateway;
use crate::error::Result;
use crate::migration::{dedup_by_id, MigrationEngine, MigrationStats};
use crate::model::{CollectionKind, FilmRecord, RawFilmCandidate};
use crate::scraper::{select_candidates, FilmFeed};
use crate::store::{CollectionCounts, RecordStore};

/// Summary of one update run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Films in the new recent window
    pub recent: Vec<FilmRecord>,
    pub migration: MigrationStats,
    pub counts: CollectionCounts,
}

impl UpdateReport {
    pub fn with_imdb_id(&self) -> usize {
        self.recent.iter().filter(|film| film.has_imdb_id()).count()
    }

    pub fn with_poster(&self) -> usize {
        self.recent.iter().filter(|film| film.poster.is_some()).count()
    }
}

/// One scrape → enrich → migrate → persist run
pub struct UpdatePipeline {
    feed: Arc<dyn FilmFeed>,
    gateway: Arc<EnrichmentGateway>,
    store: Arc<RecordStore>,
    engine: MigrationEngine,
    min_rating: f32,
    max_films: usize,
    request_delay: Duration,
}

impl UpdatePipeline {
    pub fn new(
        config: &Config,
        feed: Arc<dyn FilmFeed>,
        gateway: Arc<EnrichmentGateway>,
        store: Arc<RecordStore>,
    ) -> Self {
        Self {
            feed,
            gateway,
            store,
            engine: MigrationEngine::from_config(&config.migration),
            min_rating: config.scraper.min_rating,
            max_films: config.scraper.max_films,
            request_delay: config.enrichment.request_delay(),
        }
    }

    /// Run the whole update
    ///
    /// Short and long are written before recent. Any failure aborts the run before
    /// recent is replaced, so the next run sees the same departures again and the
    /// dedup step makes the retry harmless.
    pub async fn run(&self) -> Result<UpdateReport> {
        let started_at = Utc::now();
        let start_time = Instant::now();

        let result = self.run_inner(started_at).await;

        match &result {
            Ok(report) => {
                info!("🎉 Update completed in {:.2}s", start_time.elapsed().as_secs_f64());
                info!("📦 recent: {}, short: {}, long: {}", report.counts.recent, report.counts.short, report.counts.long);
                info!(
                    "🔄 Films migrated: {}, duplicates removed: {}",
                    report.migration.migrated,
                    report.migration.duplicates_removed()
                );
            }
            Err(e) => {
                error!("❌ UPDATE FAILED: {}", e);
                if e.is_transient() {
                    info!("The failure looks transient, the next scheduled run will retry");
                }
            }
        }

        result
    }

    async fn run_inner(&self, started_at: DateTime<Utc>) -> Result<UpdateReport> {
        info!("━━━ STEP 1: SCRAPING ━━━");
        let candidates = self.feed.fetch_candidates().await?;
        let selected = select_candidates(candidates, self.min_rating, self.max_films)?;
        info!("🎯 Taking top {} films", selected.len());

        info!("━━━ STEP 2: ENRICHING ━━━");
        let recent = self.enrich_all(&selected).await;

        info!("━━━ STEP 3: MIGRATING OLD FILMS ━━━");
        let (migration, counts) = self.migrate_and_persist(&recent).await?;

        Ok(UpdateReport {
            started_at,
            finished_at: Utc::now(),
            recent,
            migration,
            counts,
        })
    }

    /// Enrich candidates one at a time, pausing between lookups
    pub async fn enrich_all(&self, candidates: &[RawFilmCandidate]) -> Vec<FilmRecord> {
        let mut enriched = Vec::with_capacity(candidates.len());

        for (i, candidate) in candidates.iter().enumerate() {
            info!("[{}/{}] {} ({}★)", i + 1, candidates.len(), candidate.name, candidate.rating);

            let record = self.gateway.enrich_candidate(candidate).await;
            info!(
                "   → {} | {} | {}min",
                record.id,
                record.year,
                record.runtime.unwrap_or(0)
            );
            enriched.push(record);

            if i + 1 < candidates.len() && !self.request_delay.is_zero() {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        enriched
    }

    /// Migrate departures against a new recent window and persist everything
    ///
    /// Usable without the scrape step, e.g. to replay a saved window.
    pub async fn migrate_and_persist(
        &self,
        new_recent: &[FilmRecord],
    ) -> Result<(MigrationStats, CollectionCounts)> {
        migrate_window(&self.store, &self.engine, new_recent, self.max_films).await
    }
}

/// Read the current collections, migrate departures from `new_recent`, and write short, long, then recent
pub async fn migrate_window(
    store: &RecordStore,
    engine: &MigrationEngine,
    new_recent: &[FilmRecord],
    max_films: usize,
) -> Result<(MigrationStats, CollectionCounts)> {
    info!("📂 Reading existing files...");
    let snapshot = store.reload().await;
    let counts = snapshot.counts();
    info!("   recent: {} films", counts.recent);
    info!("   short: {} films", counts.short);
    info!("   long: {} films", counts.long);

    // Migrate against the same window that gets stored as recent
    let window: Vec<FilmRecord> = new_recent.iter().take(max_films).cloned().collect();
    if window.len() < new_recent.len() {
        warn!(
            "⚠️ New recent window has {} films, keeping the first {}",
            new_recent.len(),
            window.len()
        );
    }

    let outcome = engine.migrate(&snapshot.recent, &window, &snapshot.short, &snapshot.long);
    store.persist_migration(&outcome).await?;

    store.replace_recent(&window).await?;
    info!("✅ Saved {} with {} films", store.path_for(CollectionKind::Recent).display(), window.len());

    Ok((outcome.stats, store.snapshot().await.counts()))
}

/// Remove repeated ids from the short and long collections, returning how many went from each
pub async fn dedupe_collections(store: &RecordStore) -> Result<(usize, usize)> {
    let snapshot = store.reload().await;
    let mut removed = (0, 0);

    for kind in [CollectionKind::Short, CollectionKind::Long] {
        let films = snapshot.collection(kind);
        let unique = dedup_by_id(films.to_vec());
        let dropped = films.len() - unique.len();

        if dropped > 0 {
            store.write_collection(kind, &unique).await?;
            info!("🔍 {}: removed {} duplicate(s)", kind, dropped);
        }

        match kind {
            CollectionKind::Short => removed.0 = dropped,
            _ => removed.1 = dropped,
        }
    }

    if removed != (0, 0) {
        store.reload().await;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StaticFeed(Vec<RawFilmCandidate>);

    #[async_trait]
    impl FilmFeed for StaticFeed {
        async fn fetch_candidates(&self) -> Result<Vec<RawFilmCandidate>> {
            Ok(self.0.clone())
        }
    }

    fn candidate(slug: &str, rating: f32) -> RawFilmCandidate {
        RawFilmCandidate {
            name: slug.to_string(),
            rating,
            slug: format!("/film/{}/", slug),
            page_url: String::new(),
            site_film_id: None,
        }
    }

    async fn pipeline(dir: &TempDir, films: Vec<RawFilmCandidate>) -> (UpdatePipeline, Arc<RecordStore>) {
        let config = ConfigBuilder::new()
            .with_data_dir(dir.path().to_path_buf())
            .with_request_delay_ms(0)
            .build();
        let store = Arc::new(RecordStore::open(config.storage.clone()).await);
        let pipeline = UpdatePipeline::new(
            &config,
            Arc::new(StaticFeed(films)),
            Arc::new(EnrichmentGateway::disabled()),
            store.clone(),
        );
        (pipeline, store)
    }

    #[tokio::test]
    async fn test_first_run_fills_recent_only() {
        let temp_dir = TempDir::new().unwrap();
        let (pipeline, store) = pipeline(&temp_dir, vec![candidate("a", 4.0), candidate("b", 3.5)]).await;

        let report = pipeline.run().await.unwrap();

        assert_eq!(report.recent.len(), 2);
        assert_eq!(report.migration.migrated, 0);
        assert_eq!(report.counts, CollectionCounts { recent: 2, short: 0, long: 0 });
        assert!(!temp_dir.path().join("films-short.json").exists());
        assert_eq!(store.read_collection(CollectionKind::Recent).await.len(), 2);
    }

    #[tokio::test]
    async fn test_departed_fallback_films_go_short() {
        let temp_dir = TempDir::new().unwrap();
        let (first, _) = pipeline(&temp_dir, vec![candidate("a", 4.0), candidate("b", 4.0)]).await;
        first.run().await.unwrap();

        let (second, store) = pipeline(&temp_dir, vec![candidate("c", 4.0), candidate("a", 4.0)]).await;
        let report = second.run().await.unwrap();

        assert_eq!(report.migration.migrated, 1);
        assert_eq!(report.migration.unknown_runtime, 1);
        let short = store.read_collection(CollectionKind::Short).await;
        assert_eq!(short.len(), 1);
        assert_eq!(short[0].id, "unknown__film_b_");
    }

    #[tokio::test]
    async fn test_zero_qualifying_keeps_recent() {
        let temp_dir = TempDir::new().unwrap();
        let (first, _) = pipeline(&temp_dir, vec![candidate("a", 4.0)]).await;
        first.run().await.unwrap();

        let (second, store) = pipeline(&temp_dir, vec![candidate("z", 1.0)]).await;
        assert!(second.run().await.is_err());

        let recent = store.read_collection(CollectionKind::Recent).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "unknown__film_a_");
    }

    #[tokio::test]
    async fn test_dedupe_collections() {
        let temp_dir = TempDir::new().unwrap();
        let (_, store) = pipeline(&temp_dir, Vec::new()).await;
        let films = vec![
            FilmRecord::new("tt1", "A", "2001").with_runtime(90),
            FilmRecord::new("tt2", "B", "2002").with_runtime(80),
            FilmRecord::new("tt1", "A again", "2001").with_runtime(90),
        ];
        store.write_collection(CollectionKind::Short, &films).await.unwrap();

        assert_eq!(dedupe_collections(&store).await.unwrap(), (1, 0));
        let short = store.snapshot().await.short.clone();
        assert_eq!(short.len(), 2);
        assert_eq!(short[0].name, "A");

        assert_eq!(dedupe_collections(&store).await.unwrap(), (0, 0));
    }
}
