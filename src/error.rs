//! Error types shared across the store, pipeline and server

use std::path::PathBuf;

use crate::model::CollectionKind;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Error types for catalog operations
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to persist {collection} collection to {}: {source}", path.display())]
    Persistence {
        collection: CollectionKind,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No films found with rating >= {min_rating} stars")]
    NoQualifyingFilms { min_rating: f32 },

    #[error("Metadata service error: {0}")]
    Metadata(String),

    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown catalog: {0}")]
    UnknownCatalog(String),
}

impl CatalogError {
    /// Whether the failure came from a remote service and may succeed on the next scheduled run
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            CatalogError::Metadata(_) | CatalogError::Scrape(_) => true,
            _ => false,
        }
    }
}
