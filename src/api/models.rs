//! API data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::FilmRecord;
use crate::store::CollectionCounts;

/// Addon manifest served at `/<ns>/manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    pub resources: Vec<String>,
    pub types: Vec<String>,
    pub catalogs: Vec<ManifestCatalog>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestCatalog {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub name: String,
    pub extra: Vec<ExtraField>,
}

/// Optional catalog argument advertised in the manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraField {
    pub name: String,
    pub is_required: bool,
}

/// One catalog page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub metas: Vec<FilmRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub counts: CollectionCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Self-description served at `/`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub addons: Vec<AddonInfo>,
    pub status: String,
    pub last_shuffle_short: Option<DateTime<Utc>>,
    pub last_shuffle_long: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddonInfo {
    pub name: String,
    pub manifest: String,
    pub films: usize,
}

/// Body of every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
