//! Film records and the collections they live in

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type tag carried by every record
pub const MOVIE_TYPE: &str = "movie";

/// Year placeholder used when neither the feed nor the metadata service knows it
pub const UNKNOWN_YEAR: &str = "Unknown";

/// One entry in any collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilmRecord {
    /// IMDb id, `tmdb_<n>`, or a synthesized `unknown_<slug>` fallback
    pub id: String,

    #[serde(rename = "type", default = "default_type")]
    pub kind: String,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_year")]
    pub year: String,

    /// Runtime in minutes; absent or zero means unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,

    #[serde(rename = "tmdbId", default, skip_serializing_if = "Option::is_none")]
    pub tmdb_id: Option<u64>,

    /// Fields this model does not know about, kept so that rewrites never drop data
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_type() -> String {
    MOVIE_TYPE.to_string()
}

fn default_year() -> String {
    UNKNOWN_YEAR.to_string()
}

impl FilmRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, year: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: default_type(),
            name: name.into(),
            year: year.into(),
            runtime: None,
            poster: None,
            logo: None,
            tmdb_id: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_runtime(mut self, minutes: u32) -> Self {
        self.runtime = Some(minutes);
        self
    }

    pub fn with_poster(mut self, poster: impl Into<String>) -> Self {
        self.poster = Some(poster.into());
        self
    }

    /// Runtime in minutes, or `None` when missing or zero
    pub fn known_runtime(&self) -> Option<u32> {
        self.runtime.filter(|minutes| *minutes > 0)
    }

    /// Whether the id is an IMDb title id (`tt…`)
    pub fn has_imdb_id(&self) -> bool {
        is_imdb_id(&self.id)
    }
}

pub fn is_imdb_id(id: &str) -> bool {
    id.len() > 2 && id.starts_with("tt") && id[2..].chars().all(|c| c.is_ascii_digit())
}

/// The three named collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    /// Bounded window of the most recent top-rated films, replaced on every run
    Recent,
    /// Runtime below the threshold, or unknown
    Short,
    /// Runtime at or above the threshold
    Long,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 3] = [
        CollectionKind::Recent,
        CollectionKind::Short,
        CollectionKind::Long,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionKind::Recent => "recent",
            CollectionKind::Short => "short",
            CollectionKind::Long => "long",
        }
    }

    /// Whether the served order is a periodic shuffle rather than storage order
    pub fn is_shuffled(&self) -> bool {
        matches!(self, CollectionKind::Short | CollectionKind::Long)
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollectionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent" => Ok(CollectionKind::Recent),
            "short" => Ok(CollectionKind::Short),
            "long" => Ok(CollectionKind::Long),
            other => Err(format!("unknown collection: {}", other)),
        }
    }
}

/// On-disk shape of a collection file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionFile {
    #[serde(default)]
    pub meta: Vec<FilmRecord>,
}

/// Raw film as scraped from the rating site, before enrichment
#[derive(Debug, Clone, PartialEq)]
pub struct RawFilmCandidate {
    /// Display name, possibly with a trailing "(YYYY)"
    pub name: String,
    /// Stars, 0.5 to 5.0 (0.0 when unrated)
    pub rating: f32,
    /// Site-relative film path, e.g. `/film/dune-2021/`
    pub slug: String,
    /// Absolute film page URL
    pub page_url: String,
    /// Site-internal film id, when exposed
    pub site_film_id: Option<String>,
}

impl RawFilmCandidate {
    /// Identity used when enrichment cannot resolve the film
    pub fn fallback_id(&self) -> String {
        format!("unknown_{}", self.slug.replace('/', "_"))
    }
}
