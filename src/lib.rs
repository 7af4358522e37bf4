//! Letterboxd → Stremio catalogs
//!
//! Scrapes a user's top-rated films, enriches them with runtime and poster art,
//! moves films that leave the recent window into short and long collections, and
//! serves all three as paginated addon catalogs.

pub mod api;
pub mod cache;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod migration;
pub mod model;
pub mod pipeline;
pub mod scraper;
pub mod store;

// Re-export main types for easy access
pub use crate::api::{build_router, ApiServer, AppState};
pub use crate::cache::CatalogCache;
pub use crate::config::{Config, ConfigBuilder};
pub use crate::enrichment::{EnrichmentGateway, MetadataProvider, TmdbClient};
pub use crate::error::{CatalogError, Result};
pub use crate::migration::{migrate, CrossBucketPolicy, MigrationEngine, MigrationOutcome, MigrationStats};
pub use crate::model::{CollectionKind, FilmRecord, RawFilmCandidate};
pub use crate::pipeline::{UpdatePipeline, UpdateReport};
pub use crate::scraper::{FilmFeed, LetterboxdScraper};
pub use crate::store::{RecordStore, StoreSnapshot};
