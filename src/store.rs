use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::StorageConfig;
use crate::error::{CatalogError, Result};
use crate::migration::MigrationOutcome;
use crate::model::{CollectionFile, CollectionKind, FilmRecord};

/// Immutable view of all three collections at one point in time
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Bumped every time the store installs a new snapshot
    pub version: u64,

    pub recent: Arc<Vec<FilmRecord>>,
    pub short: Arc<Vec<FilmRecord>>,
    pub long: Arc<Vec<FilmRecord>>,

    pub loaded_at: DateTime<Utc>,
}

impl StoreSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            recent: Arc::new(Vec::new()),
            short: Arc::new(Vec::new()),
            long: Arc::new(Vec::new()),
            loaded_at: Utc::now(),
        }
    }

    pub fn collection(&self, kind: CollectionKind) -> &Arc<Vec<FilmRecord>> {
        match kind {
            CollectionKind::Recent => &self.recent,
            CollectionKind::Short => &self.short,
            CollectionKind::Long => &self.long,
        }
    }

    pub fn counts(&self) -> CollectionCounts {
        CollectionCounts {
            recent: self.recent.len(),
            short: self.short.len(),
            long: self.long.len(),
        }
    }
}

/// Collection sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCounts {
    pub recent: usize,
    pub short: usize,
    pub long: usize,
}

/// Durable home of the recent, short and long collections
#[derive(Debug)]
pub struct RecordStore {
    storage: StorageConfig,

    /// Current snapshot, swapped wholesale on reload or commit
    current: RwLock<Arc<StoreSnapshot>>,
}

impl RecordStore {
    /// Create a store over the configured files; nothing is read until [`RecordStore::reload`]
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            current: RwLock::new(Arc::new(StoreSnapshot::empty())),
        }
    }

    /// Create a store and load the collections from disk
    pub async fn open(storage: StorageConfig) -> Self {
        let store = Self::new(storage);
        let snapshot = store.reload().await;
        let counts = snapshot.counts();
        info!(
            "📊 Record store initialized: recent {}, short {}, long {}",
            counts.recent, counts.short, counts.long
        );
        store
    }

    pub fn path_for(&self, kind: CollectionKind) -> PathBuf {
        self.storage.path_for(kind)
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.current.read().await.clone()
    }

    /// Re-read all collections from disk and install them as a fresh snapshot
    ///
    /// When the files hold exactly what the current snapshot holds, the current
    /// snapshot is kept and its version does not change.
    pub async fn reload(&self) -> Arc<StoreSnapshot> {
        let recent = self.read_collection(CollectionKind::Recent).await;
        let short = self.read_collection(CollectionKind::Short).await;
        let long = self.read_collection(CollectionKind::Long).await;

        let mut current = self.current.write().await;
        if current.version > 0
            && *current.recent == recent
            && *current.short == short
            && *current.long == long
        {
            debug!("Collections unchanged, keeping store snapshot v{}", current.version);
            return current.clone();
        }

        let snapshot = Arc::new(StoreSnapshot {
            version: current.version + 1,
            recent: Arc::new(recent),
            short: Arc::new(short),
            long: Arc::new(long),
            loaded_at: Utc::now(),
        });
        *current = snapshot.clone();

        debug!("🔄 Installed store snapshot v{}", snapshot.version);
        snapshot
    }

    /// Read one collection; unreadable or malformed files count as empty
    pub async fn read_collection(&self, kind: CollectionKind) -> Vec<FilmRecord> {
        let path = self.path_for(kind);
        match load_collection_file(&path).await {
            Ok(films) => {
                debug!("📂 {}: {} films", path.display(), films.len());
                films
            }
            Err(e) => {
                warn!("❌ Error reading {} ({}), treating it as empty: {}", path.display(), kind, e);
                Vec::new()
            }
        }
    }

    /// Atomically replace one collection file
    pub async fn write_collection(&self, kind: CollectionKind, films: &[FilmRecord]) -> Result<()> {
        let path = self.path_for(kind);
        write_collection_file(&path, films)
            .await
            .map_err(|source| CatalogError::Persistence {
                collection: kind,
                path: path.clone(),
                source,
            })?;
        info!("✅ Saved {} ({} films)", path.display(), films.len());
        Ok(())
    }

    /// Persist the short and long collections of a migration, then install them in memory
    ///
    /// Short is written before long. If a write fails the in-memory snapshot is left
    /// as it was and the error is returned.
    pub async fn persist_migration(&self, outcome: &MigrationOutcome) -> Result<()> {
        if !outcome.has_changes() {
            debug!("Nothing migrated, skipping collection writes");
            return Ok(());
        }

        info!("💾 Saving updated collections...");
        self.write_collection(CollectionKind::Short, &outcome.short).await?;
        self.write_collection(CollectionKind::Long, &outcome.long).await?;

        let mut current = self.current.write().await;
        *current = Arc::new(StoreSnapshot {
            version: current.version + 1,
            recent: current.recent.clone(),
            short: Arc::new(outcome.short.clone()),
            long: Arc::new(outcome.long.clone()),
            loaded_at: Utc::now(),
        });
        Ok(())
    }

    /// Replace the recent window on disk and in memory
    pub async fn replace_recent(&self, films: &[FilmRecord]) -> Result<()> {
        self.write_collection(CollectionKind::Recent, films).await?;

        let mut current = self.current.write().await;
        *current = Arc::new(StoreSnapshot {
            version: current.version + 1,
            recent: Arc::new(films.to_vec()),
            short: current.short.clone(),
            long: current.long.clone(),
            loaded_at: Utc::now(),
        });
        Ok(())
    }
}

async fn load_collection_file(path: &Path) -> Result<Vec<FilmRecord>> {
    let content = fs::read_to_string(path).await?;
    let file: CollectionFile = serde_json::from_str(&content)?;
    Ok(file.meta)
}

/// Write to a sibling temp file and rename it over the target
async fn write_collection_file(path: &Path, films: &[FilmRecord]) -> std::io::Result<()> {
    let file = CollectionFile {
        meta: films.to_vec(),
    };
    let json_content = serde_json::to_string_pretty(&file)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "collection.json".to_string());
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp_path, json_content).await?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &Path) -> StorageConfig {
        StorageConfig {
            data_dir: dir.to_path_buf(),
            ..StorageConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_files_load_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::open(storage(temp_dir.path())).await;

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.counts(), CollectionCounts::default());
        assert_eq!(snapshot.version, 1);
    }

    #[tokio::test]
    async fn test_malformed_file_loads_as_empty() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("films-short.json"), b"{ not json").await.unwrap();
        fs::write(
            temp_dir.path().join("films-long.json"),
            br#"{"meta":[{"id":"tt1","type":"movie","name":"A","year":"2001","runtime":150}]}"#,
        )
        .await
        .unwrap();

        let store = RecordStore::open(storage(temp_dir.path())).await;
        let snapshot = store.snapshot().await;
        assert!(snapshot.short.is_empty());
        assert_eq!(snapshot.long.len(), 1);
    }

    #[tokio::test]
    async fn test_write_then_reload() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::new(storage(temp_dir.path()));

        let films = vec![FilmRecord::new("tt2", "B", "2002").with_runtime(95)];
        store.write_collection(CollectionKind::Short, &films).await.unwrap();

        let snapshot = store.reload().await;
        assert_eq!(snapshot.short.as_slice(), films.as_slice());
        assert!(!temp_dir.path().join(".films-short.json.tmp").exists());

        let raw = fs::read_to_string(temp_dir.path().join("films-short.json")).await.unwrap();
        assert!(raw.contains("\"meta\""));
    }

    #[tokio::test]
    async fn test_reload_bumps_version_only_on_change() {
        let temp_dir = TempDir::new().unwrap();
        let store = RecordStore::new(storage(temp_dir.path()));
        let first = store.reload().await.version;
        let unchanged = store.reload().await.version;
        assert_eq!(unchanged, first);

        // Written behind the store's back, as the update job does
        let writer = RecordStore::new(storage(temp_dir.path()));
        writer
            .write_collection(CollectionKind::Short, &[FilmRecord::new("tt1", "A", "2001").with_runtime(90)])
            .await
            .unwrap();

        let changed = store.reload().await;
        assert!(changed.version > first);
        assert_eq!(changed.short.len(), 1);
        assert_eq!(store.reload().await.version, changed.version);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        // A directory where the long file should be makes the rename fail
        fs::create_dir_all(temp_dir.path().join("films-long.json").join("blocker"))
            .await
            .unwrap();
        let store = RecordStore::open(storage(temp_dir.path())).await;
        let before = store.snapshot().await;

        let outcome = crate::migration::migrate(
            &[FilmRecord::new("tt3", "C", "2003").with_runtime(200)],
            &[],
            &[],
            &[],
        );
        let err = store.persist_migration(&outcome).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Persistence { collection: CollectionKind::Long, .. }
        ));

        let after = store.snapshot().await;
        assert_eq!(after.version, before.version);
        assert!(after.long.is_empty());
    }
}
