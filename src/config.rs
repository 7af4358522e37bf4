use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CatalogError, Result};
use crate::migration::CrossBucketPolicy;
use crate::model::CollectionKind;

/// Configuration for the catalog server and the update pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Collection file locations
    pub storage: StorageConfig,

    /// Rating site feed settings
    pub scraper: ScraperConfig,

    /// Metadata service settings
    pub enrichment: EnrichmentConfig,

    /// Migration rules
    pub migration: MigrationConfig,

    /// Addon manifest branding
    pub addon: AddonConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Public base URL used in the self-description
    pub base_url: String,

    /// Items per catalog page
    pub page_size: usize,

    /// Lifetime of a shuffle epoch in hours
    pub shuffle_interval_hours: u64,

    /// Interval between automatic store reloads in seconds (0 disables)
    pub reload_interval_secs: u64,

    /// Look up missing posters while serving
    pub serve_time_enrichment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the collection files
    pub data_dir: PathBuf,

    pub recent_file: String,
    pub short_file: String,
    pub long_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Rating site user whose films are followed
    pub username: String,

    /// Rating site root
    pub site_url: String,

    pub user_agent: String,

    /// HTTP request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Minimum star rating for a film to qualify
    pub min_rating: f32,

    /// Size of the recent window
    pub max_films: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// TMDB API key; enrichment degrades to fallback records without it
    pub tmdb_api_key: Option<String>,

    pub tmdb_base_url: String,

    /// Prefix for poster paths returned by TMDB
    pub tmdb_image_base_url: String,

    /// Image service resolving posters and logos by IMDb id
    pub metahub_base_url: String,

    /// HTTP request timeout in seconds
    pub request_timeout_seconds: u64,

    /// Pause between successive lookups during an update run
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Films at or above this runtime go to the long collection
    pub runtime_threshold_minutes: u32,

    /// What to do when a departed film already lives in the other bucket
    pub cross_bucket_policy: CrossBucketPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AddonConfig {
    /// Manifest id prefix, e.g. `com.letterboxd` gives `com.letterboxd.short`
    pub id_prefix: String,

    /// Catalog id prefix, e.g. `letterboxd` gives `letterboxd_short`
    pub catalog_prefix: String,

    /// Human readable name used in manifests
    pub display_name: String,

    pub version: String,

    pub logo: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            page_size: 100,
            shuffle_interval_hours: 12,
            reload_interval_secs: 3600,
            serve_time_enrichment: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            recent_file: "current_10.json".to_string(),
            short_file: "films-short.json".to_string(),
            long_file: "films-long.json".to_string(),
        }
    }
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            username: "f_frusciante".to_string(),
            site_url: "https://letterboxd.com".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            request_timeout_seconds: 30,
            min_rating: 3.0,
            max_films: 10,
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            tmdb_api_key: None,
            tmdb_base_url: "https://api.themoviedb.org/3".to_string(),
            tmdb_image_base_url: "https://image.tmdb.org/t/p/w500".to_string(),
            metahub_base_url: "https://images.metahub.space".to_string(),
            request_timeout_seconds: 15,
            request_delay_ms: 300,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            runtime_threshold_minutes: 120,
            cross_bucket_policy: CrossBucketPolicy::default(),
        }
    }
}

impl Default for AddonConfig {
    fn default() -> Self {
        Self {
            id_prefix: "com.letterboxd".to_string(),
            catalog_prefix: "letterboxd".to_string(),
            display_name: "Letterboxd".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            logo: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            scraper: ScraperConfig::default(),
            enrichment: EnrichmentConfig::default(),
            migration: MigrationConfig::default(),
            addon: AddonConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StorageConfig {
    /// Full path of the file backing a collection
    pub fn path_for(&self, kind: CollectionKind) -> PathBuf {
        let file = match kind {
            CollectionKind::Recent => &self.recent_file,
            CollectionKind::Short => &self.short_file,
            CollectionKind::Long => &self.long_file,
        };
        self.data_dir.join(file)
    }
}

impl ServerConfig {
    pub fn shuffle_interval(&self) -> Duration {
        Duration::from_secs(self.shuffle_interval_hours * 3600)
    }

    pub fn reload_interval(&self) -> Option<Duration> {
        (self.reload_interval_secs > 0).then(|| Duration::from_secs(self.reload_interval_secs))
    }
}

impl EnrichmentConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl Config {
    /// Locations searched by [`Config::load`], in order
    pub const SEARCH_PATHS: [&'static str; 3] = [
        "letterboxd-stremio.toml",
        "config/letterboxd-stremio.toml",
        "/etc/letterboxd-stremio/config.toml",
    ];

    /// Load configuration from the first readable config file, then apply environment overrides
    pub fn load() -> Result<Self> {
        for path in &Self::SEARCH_PATHS {
            if let Ok(config_str) = std::fs::read_to_string(path) {
                match toml::from_str::<Config>(&config_str) {
                    Ok(mut config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path);
                        config.apply_env();
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path, e);
                    }
                }
            }
        }

        Ok(Self::from_env())
    }

    /// Load configuration from an explicit file, then apply environment overrides
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&config_str).map_err(|e| {
            CatalogError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        tracing::info!("📄 Loaded configuration from: {}", path.display());
        config.apply_env();
        Ok(config)
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(api_key) = std::env::var("TMDB_API_KEY") {
            if !api_key.trim().is_empty() {
                self.enrichment.tmdb_api_key = Some(api_key);
            }
        }

        if let Ok(port) = std::env::var("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => tracing::warn!("Ignoring invalid PORT value: {}", port),
            }
        }

        if let Ok(base_url) = std::env::var("BASE_URL") {
            self.server.base_url = base_url;
        }

        if let Ok(username) = std::env::var("LETTERBOXD_USER") {
            self.scraper.username = username;
        }

        if let Ok(data_dir) = std::env::var("LETTERBOXD_STREMIO_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(log_level) = std::env::var("LETTERBOXD_STREMIO_LOG_LEVEL") {
            self.logging.level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &str) -> Result<()> {
        let config_str = toml::to_string_pretty(self)
            .map_err(|e| CatalogError::Configuration(e.to_string()))?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.page_size == 0 {
            return Err(CatalogError::Configuration(
                "page_size must be greater than 0".to_string(),
            ));
        }

        if self.server.shuffle_interval_hours == 0 {
            return Err(CatalogError::Configuration(
                "shuffle_interval_hours must be greater than 0".to_string(),
            ));
        }

        if self.scraper.max_films == 0 {
            return Err(CatalogError::Configuration(
                "max_films must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=5.0).contains(&self.scraper.min_rating) {
            return Err(CatalogError::Configuration(format!(
                "min_rating must be between 0 and 5, got {}",
                self.scraper.min_rating
            )));
        }

        if self.migration.runtime_threshold_minutes == 0 {
            return Err(CatalogError::Configuration(
                "runtime_threshold_minutes must be greater than 0".to_string(),
            ));
        }

        let names = [
            &self.storage.recent_file,
            &self.storage.short_file,
            &self.storage.long_file,
        ];
        if names[0] == names[1] || names[0] == names[2] || names[1] == names[2] {
            return Err(CatalogError::Configuration(
                "collection files must be distinct".to_string(),
            ));
        }

        if url::Url::parse(&self.server.base_url).is_err() {
            return Err(CatalogError::Configuration(format!(
                "base_url is not a valid URL: {}",
                self.server.base_url
            )));
        }

        if self.enrichment.tmdb_api_key.is_none() {
            tracing::warn!("⚠️  TMDB API key not configured, enrichment will use fallback records");
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Letterboxd Stremio Configuration:\n\
            - Letterboxd user: {}\n\
            - Data directory: {}\n\
            - Listen: {}:{}\n\
            - Base URL: {}\n\
            - Page size: {}\n\
            - Shuffle every: {}h\n\
            - Runtime threshold: {}min\n\
            - TMDB enrichment: {}",
            self.scraper.username,
            self.storage.data_dir.display(),
            self.server.host,
            self.server.port,
            self.server.base_url,
            self.server.page_size,
            self.server.shuffle_interval_hours,
            self.migration.runtime_threshold_minutes,
            if self.enrichment.tmdb_api_key.is_some() { "enabled" } else { "disabled" },
        )
    }
}

/// Configuration builder for programmatic config creation
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_data_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.data_dir = dir;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.server.base_url = base_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.config.server.page_size = page_size;
        self
    }

    pub fn with_tmdb_api_key(mut self, api_key: String) -> Self {
        self.config.enrichment.tmdb_api_key = Some(api_key);
        self
    }

    pub fn with_request_delay_ms(mut self, delay_ms: u64) -> Self {
        self.config.enrichment.request_delay_ms = delay_ms;
        self
    }

    pub fn with_cross_bucket_policy(mut self, policy: CrossBucketPolicy) -> Self {
        self.config.migration.cross_bucket_policy = policy;
        self
    }

    pub fn enable_serve_time_enrichment(mut self, enable: bool) -> Self {
        self.config.server.serve_time_enrichment = enable;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.page_size, 100);
        assert_eq!(config.server.shuffle_interval(), Duration::from_secs(12 * 3600));
        assert_eq!(config.migration.runtime_threshold_minutes, 120);
        assert_eq!(config.scraper.max_films, 10);
        assert_eq!(config.scraper.min_rating, 3.0);
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .with_port(8080)
            .with_page_size(25)
            .enable_serve_time_enrichment(false)
            .build();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.page_size, 25);
        assert!(!config.server.serve_time_enrichment);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());

        let config = ConfigBuilder::new().with_page_size(0).build();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.short_file = config.storage.long_file.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 7000

            [migration]
            cross_bucket_policy = "reclassify"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.server.page_size, 100);
        assert_eq!(config.migration.cross_bucket_policy, CrossBucketPolicy::Reclassify);
        assert_eq!(config.storage.recent_file, "current_10.json");
    }

    #[test]
    fn test_collection_paths() {
        let storage = StorageConfig {
            data_dir: PathBuf::from("/data"),
            ..StorageConfig::default()
        };
        assert_eq!(
            storage.path_for(CollectionKind::Long),
            PathBuf::from("/data/films-long.json")
        );
    }

    #[test]
    fn test_reload_interval_disabled_at_zero() {
        let mut server = ServerConfig::default();
        assert_eq!(server.reload_interval(), Some(Duration::from_secs(3600)));
        server.reload_interval_secs = 0;
        assert_eq!(server.reload_interval(), None);
    }
}
