//! Metadata enrichment: runtime and poster art for scraped films
//!
//! The [`EnrichmentGateway`] wraps an optional [`MetadataProvider`]. Every lookup
//! failure degrades to a well-defined fallback so one bad film never stops a run.

pub mod tmdb;

pub use tmdb::TmdbClient;

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::model::{FilmRecord, RawFilmCandidate, UNKNOWN_YEAR};

/// Best match returned by a metadata provider
#[derive(Debug, Clone, PartialEq)]
pub struct MovieMatch {
    pub tmdb_id: u64,
    pub imdb_id: Option<String>,
    pub title: String,
    pub year: Option<String>,
    /// Minutes, 0 when unknown
    pub runtime: u32,
    /// Absolute poster URL
    pub poster_url: Option<String>,
}

impl MovieMatch {
    /// Stable id: the IMDb id when known, otherwise `tmdb_<id>`
    pub fn film_id(&self) -> String {
        self.imdb_id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("tmdb_{}", self.tmdb_id))
    }
}

/// External movie database
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Best match for a title, optionally narrowed by release year
    async fn search_movie(&self, title: &str, year: Option<&str>) -> Result<Option<MovieMatch>>;

    /// Poster URL for a film id (`tt…` or `tmdb_<n>`)
    async fn lookup_poster(&self, film_id: &str) -> Result<Option<String>>;
}

fn year_suffix() -> &'static Regex {
    static YEAR_SUFFIX: OnceLock<Regex> = OnceLock::new();
    YEAR_SUFFIX.get_or_init(|| Regex::new(r"\s*\((\d{4})\)\s*$").expect("valid year regex"))
}

/// Split `"Dune (2021)"` into `("Dune", Some("2021"))`
pub fn split_title_year(name: &str) -> (String, Option<String>) {
    match year_suffix().captures(name) {
        Some(captures) => {
            let year = captures.get(1).map(|m| m.as_str().to_string());
            let start = captures.get(0).map(|m| m.start()).unwrap_or(name.len());
            (name[..start].trim().to_string(), year)
        }
        None => (name.trim().to_string(), None),
    }
}

/// Memoizing front for metadata lookups
pub struct EnrichmentGateway {
    provider: Option<Arc<dyn MetadataProvider>>,

    /// film id → poster URL; `None` records a lookup that found nothing
    poster_cache: RwLock<HashMap<String, Option<String>>>,
}

impl std::fmt::Debug for EnrichmentGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentGateway")
            .field("enabled", &self.provider.is_some())
            .finish()
    }
}

impl EnrichmentGateway {
    pub fn new(provider: Arc<dyn MetadataProvider>) -> Self {
        Self {
            provider: Some(provider),
            poster_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Gateway without a metadata service; every lookup yields the fallback
    pub fn disabled() -> Self {
        Self {
            provider: None,
            poster_cache: RwLock::new(HashMap::new()),
        }
    }

    /// TMDB-backed gateway when an API key is configured, disabled otherwise
    pub fn from_config(config: &crate::config::EnrichmentConfig) -> Result<Self> {
        match config.tmdb_api_key.as_deref() {
            Some(api_key) if !api_key.trim().is_empty() => {
                let client = TmdbClient::new(api_key.to_string(), config)?;
                Ok(Self::new(Arc::new(client)))
            }
            _ => {
                warn!("⚠️  TMDB API Key not configured");
                Ok(Self::disabled())
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Poster for a film id, memoized for the life of the gateway
    ///
    /// Successful lookups are cached whether or not they found a poster.
    /// Transport errors are logged and not cached.
    pub async fn resolve_poster(&self, film_id: &str) -> Option<String> {
        if let Some(cached) = self.poster_cache.read().await.get(film_id) {
            return cached.clone();
        }

        let Some(provider) = &self.provider else {
            return None;
        };

        match provider.lookup_poster(film_id).await {
            Ok(poster) => {
                debug!("🖼️ Poster for {}: {:?}", film_id, poster);
                self.poster_cache
                    .write()
                    .await
                    .insert(film_id.to_string(), poster.clone());
                poster
            }
            Err(e) => {
                warn!("Poster lookup failed for {}: {}", film_id, e);
                None
            }
        }
    }

    /// Look a film up by name; `None` when nothing matched or the service is unavailable
    pub async fn resolve_by_name_and_year(
        &self,
        name: &str,
        year_hint: Option<&str>,
    ) -> Result<Option<MovieMatch>> {
        match &self.provider {
            Some(provider) => provider.search_movie(name, year_hint).await,
            None => Ok(None),
        }
    }

    /// Turn a scraped candidate into a film record; never fails
    pub async fn enrich_candidate(&self, candidate: &RawFilmCandidate) -> FilmRecord {
        let (clean_name, year_hint) = split_title_year(&candidate.name);

        if !self.is_enabled() {
            return fallback_record(candidate, &candidate.name, None);
        }

        match self.resolve_by_name_and_year(&clean_name, year_hint.as_deref()).await {
            Ok(Some(found)) => {
                let mut record = FilmRecord::new(
                    found.film_id(),
                    if found.title.is_empty() { clean_name.clone() } else { found.title.clone() },
                    found
                        .year
                        .clone()
                        .or_else(|| year_hint.clone())
                        .unwrap_or_else(|| UNKNOWN_YEAR.to_string()),
                );
                record.runtime = Some(found.runtime);
                record.poster = found.poster_url.clone();
                record.tmdb_id = Some(found.tmdb_id);

                if let Some(poster) = &found.poster_url {
                    self.poster_cache
                        .write()
                        .await
                        .insert(record.id.clone(), Some(poster.clone()));
                }
                record
            }
            Ok(None) => {
                warn!("⚠️  Film not found on TMDB: {}", candidate.name);
                fallback_record(candidate, &clean_name, year_hint.as_deref())
            }
            Err(e) => {
                warn!("❌ TMDB API error for {}: {}", candidate.name, e);
                fallback_record(candidate, &candidate.name, None)
            }
        }
    }

    /// Number of memoized poster lookups
    pub async fn cached_posters(&self) -> usize {
        self.poster_cache.read().await.len()
    }
}

/// Record used when the metadata service cannot resolve a candidate
pub fn fallback_record(candidate: &RawFilmCandidate, name: &str, year: Option<&str>) -> FilmRecord {
    info!("   ↪ Using fallback record for {}", candidate.name);
    let mut record = FilmRecord::new(
        candidate.fallback_id(),
        name,
        year.unwrap_or(UNKNOWN_YEAR),
    );
    record.runtime = Some(0);
    record
}
