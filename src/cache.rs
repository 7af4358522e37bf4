/// Shuffled per-collection views with a fixed refresh epoch
use chrono::{DateTime, Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::model::{CollectionKind, FilmRecord};
use crate::store::StoreSnapshot;

/// Cached order for one collection
#[derive(Debug, Default)]
struct ShuffleEntry {
    ordered: Arc<Vec<FilmRecord>>,
    last_shuffle: Option<DateTime<Utc>>,
    source_version: u64,
}

impl ShuffleEntry {
    fn needs_rebuild(&self, now: DateTime<Utc>, epoch: Duration, source_version: u64) -> bool {
        match self.last_shuffle {
            None => true,
            Some(_) if self.ordered.is_empty() => true,
            Some(_) if self.source_version != source_version => true,
            Some(last) => now - last > epoch,
        }
    }
}

/// Randomly ordered views of the short and long collections
///
/// Each collection keeps its order for one epoch so that paging through a catalog
/// sees stable page boundaries. Rebuilds hold the collection's lock, so concurrent
/// readers never race to produce different shuffles.
#[derive(Debug)]
pub struct CatalogCache {
    epoch: Duration,
    short: Mutex<ShuffleEntry>,
    long: Mutex<ShuffleEntry>,
}

impl CatalogCache {
    pub fn new(epoch: std::time::Duration) -> Self {
        Self {
            epoch: Duration::from_std(epoch).unwrap_or_else(|_| Duration::hours(12)),
            short: Mutex::new(ShuffleEntry::default()),
            long: Mutex::new(ShuffleEntry::default()),
        }
    }

    fn entry(&self, kind: CollectionKind) -> Option<&Mutex<ShuffleEntry>> {
        match kind {
            CollectionKind::Short => Some(&self.short),
            CollectionKind::Long => Some(&self.long),
            CollectionKind::Recent => None,
        }
    }

    /// Served order of a collection; recent is returned in storage order
    pub async fn ordered(&self, kind: CollectionKind, snapshot: &StoreSnapshot) -> Arc<Vec<FilmRecord>> {
        self.ordered_at(kind, snapshot, Utc::now()).await
    }

    /// Same as [`CatalogCache::ordered`] with an explicit clock
    pub async fn ordered_at(
        &self,
        kind: CollectionKind,
        snapshot: &StoreSnapshot,
        now: DateTime<Utc>,
    ) -> Arc<Vec<FilmRecord>> {
        let Some(entry) = self.entry(kind) else {
            return snapshot.collection(kind).clone();
        };

        let mut entry = entry.lock().await;
        if entry.needs_rebuild(now, self.epoch, snapshot.version) {
            let source = snapshot.collection(kind);
            entry.ordered = Arc::new(shuffled(source, &mut rand::rng()));
            entry.last_shuffle = Some(now);
            entry.source_version = snapshot.version;
            info!(
                "🔀 Shuffled {}: {} items. Next shuffle at {}",
                kind,
                entry.ordered.len(),
                (now + self.epoch).to_rfc3339()
            );
        }
        entry.ordered.clone()
    }

    /// Forget every cached order so the next access reshuffles
    pub async fn invalidate(&self) {
        for kind in [CollectionKind::Short, CollectionKind::Long] {
            if let Some(entry) = self.entry(kind) {
                *entry.lock().await = ShuffleEntry::default();
            }
        }
        debug!("🗑️ Catalog cache invalidated");
    }

    /// When a collection was last shuffled, if ever
    pub async fn last_shuffle(&self, kind: CollectionKind) -> Option<DateTime<Utc>> {
        match self.entry(kind) {
            Some(entry) => entry.lock().await.last_shuffle,
            None => None,
        }
    }
}

/// Uniform random permutation of `items`; the input is left untouched
pub fn shuffled<R: Rng + ?Sized>(items: &[FilmRecord], rng: &mut R) -> Vec<FilmRecord> {
    let mut order = items.to_vec();
    order.shuffle(rng);
    order
}

/// `[skip, skip + page_size)` of `items`, empty when `skip` is past the end
pub fn page(items: &[FilmRecord], skip: usize, page_size: usize) -> &[FilmRecord] {
    let start = skip.min(items.len());
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn snapshot(version: u64, short: usize, long: usize) -> StoreSnapshot {
        let make = |prefix: &str, n: usize| {
            Arc::new(
                (0..n)
                    .map(|i| FilmRecord::new(format!("{}{}", prefix, i), format!("Film {}", i), "2000"))
                    .collect::<Vec<_>>(),
            )
        };
        StoreSnapshot {
            version,
            recent: make("r", 3),
            short: make("s", short),
            long: make("l", long),
            loaded_at: Utc::now(),
        }
    }

    fn sorted_ids(items: &[FilmRecord]) -> Vec<String> {
        let mut ids: Vec<String> = items.iter().map(|f| f.id.clone()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_shuffle_is_pure_permutation() {
        let source = snapshot(1, 50, 0).short;
        let before = source.as_ref().clone();
        let mut rng = StdRng::seed_from_u64(7);

        let order = shuffled(&source, &mut rng);

        assert_eq!(source.as_slice(), before.as_slice());
        assert_eq!(sorted_ids(&order), sorted_ids(&source));
    }

    #[test]
    fn test_page_bounds() {
        let items = snapshot(1, 5, 0).short;
        assert_eq!(page(&items, 0, 100).len(), 5);
        assert_eq!(page(&items, 4, 100).len(), 1);
        assert!(page(&items, 5, 100).is_empty());
        assert!(page(&items, 500, 100).is_empty());
        assert_eq!(page(&items, 1, 2).len(), 2);
        assert_eq!(page(&items, usize::MAX, usize::MAX).len(), 0);
    }

    #[tokio::test]
    async fn test_order_stable_within_epoch() {
        let cache = CatalogCache::new(std::time::Duration::from_secs(12 * 3600));
        let snap = snapshot(1, 200, 0);
        let t0 = Utc::now();

        let first = cache.ordered_at(CollectionKind::Short, &snap, t0).await;
        let later = cache
            .ordered_at(CollectionKind::Short, &snap, t0 + Duration::hours(12))
            .await;

        assert!(Arc::ptr_eq(&first, &later));
        assert_eq!(cache.last_shuffle(CollectionKind::Short).await, Some(t0));
    }

    #[tokio::test]
    async fn test_reshuffle_after_epoch() {
        let cache = CatalogCache::new(std::time::Duration::from_secs(12 * 3600));
        let snap = snapshot(1, 200, 0);
        let t0 = Utc::now();

        let first = cache.ordered_at(CollectionKind::Short, &snap, t0).await;
        let t1 = t0 + Duration::hours(12) + Duration::seconds(1);
        let second = cache.ordered_at(CollectionKind::Short, &snap, t1).await;

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(sorted_ids(&first), sorted_ids(&second));
        assert_eq!(cache.last_shuffle(CollectionKind::Short).await, Some(t1));
    }

    #[tokio::test]
    async fn test_new_snapshot_version_reshuffles() {
        let cache = CatalogCache::new(std::time::Duration::from_secs(12 * 3600));
        let t0 = Utc::now();

        let first = cache.ordered_at(CollectionKind::Long, &snapshot(1, 0, 10), t0).await;
        assert_eq!(first.len(), 10);

        let second = cache.ordered_at(CollectionKind::Long, &snapshot(2, 0, 12), t0).await;
        assert_eq!(second.len(), 12);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rebuild() {
        let cache = CatalogCache::new(std::time::Duration::from_secs(12 * 3600));
        let snap = snapshot(1, 20, 0);
        let t0 = Utc::now();

        let first = cache.ordered_at(CollectionKind::Short, &snap, t0).await;
        cache.invalidate().await;
        assert_eq!(cache.last_shuffle(CollectionKind::Short).await, None);

        let second = cache.ordered_at(CollectionKind::Short, &snap, t0).await;
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_recent_is_not_shuffled() {
        let cache = CatalogCache::new(std::time::Duration::from_secs(60));
        let snap = snapshot(1, 0, 0);

        let recent = cache.ordered(CollectionKind::Recent, &snap).await;
        assert!(Arc::ptr_eq(&recent, &snap.recent));
        assert_eq!(cache.last_shuffle(CollectionKind::Recent).await, None);
    }
}
