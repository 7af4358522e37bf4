//! Moves films that left the recent window into the short/long collections
//!
//! Everything here is pure: [`migrate`] takes the previous state and returns the
//! next one plus statistics. Persisting the result is the caller's job, see
//! [`crate::store::RecordStore::persist_migration`].

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::model::{CollectionKind, FilmRecord};

/// Default runtime boundary between the short and long collections
pub const RUNTIME_THRESHOLD_MINUTES: u32 = 120;

/// How to treat a departed film whose id already lives in the other bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossBucketPolicy {
    /// The existing placement wins and the incoming copy is dropped
    #[default]
    KeepExisting,
    /// The new classification wins and the id is removed from the other bucket
    Reclassify,
    /// No cross-bucket repair; an id may end up in both buckets
    AllowBoth,
}

/// Counts reported by a migration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStats {
    /// Films that left the recent window
    pub migrated: usize,
    /// Departed films routed to the short bucket (including unknown runtime)
    pub to_short: usize,
    /// Departed films routed to the long bucket
    pub to_long: usize,
    /// Departed films without runtime data, routed to short
    pub unknown_runtime: usize,
    /// Short collection size after the merge
    pub short_total: usize,
    /// Long collection size after the merge
    pub long_total: usize,
    pub short_duplicates_removed: usize,
    pub long_duplicates_removed: usize,
    /// Departed films that collided with an id in the other bucket
    pub cross_bucket_conflicts: usize,
}

impl MigrationStats {
    pub fn duplicates_removed(&self) -> usize {
        self.short_duplicates_removed + self.long_duplicates_removed
    }
}

/// Result of [`migrate`]
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    pub short: Vec<FilmRecord>,
    pub long: Vec<FilmRecord>,
    pub stats: MigrationStats,
}

impl MigrationOutcome {
    /// Whether anything departed; when false the collections are untouched and need no write
    pub fn has_changes(&self) -> bool {
        self.stats.migrated > 0
    }
}

/// Migration rules
#[derive(Debug, Clone, Copy)]
pub struct MigrationEngine {
    runtime_threshold: u32,
    cross_bucket_policy: CrossBucketPolicy,
}

impl Default for MigrationEngine {
    fn default() -> Self {
        Self::new(RUNTIME_THRESHOLD_MINUTES, CrossBucketPolicy::default())
    }
}

impl MigrationEngine {
    pub fn new(runtime_threshold: u32, cross_bucket_policy: CrossBucketPolicy) -> Self {
        Self {
            runtime_threshold,
            cross_bucket_policy,
        }
    }

    pub fn from_config(config: &crate::config::MigrationConfig) -> Self {
        Self::new(config.runtime_threshold_minutes, config.cross_bucket_policy)
    }

    /// Bucket a film belongs to; unknown runtime defaults to short
    pub fn classify(&self, film: &FilmRecord) -> CollectionKind {
        match film.known_runtime() {
            Some(minutes) if minutes >= self.runtime_threshold => CollectionKind::Long,
            _ => CollectionKind::Short,
        }
    }

    /// Merge films that left `previous_recent` into `short` and `long`
    pub fn migrate(
        &self,
        previous_recent: &[FilmRecord],
        new_recent: &[FilmRecord],
        short: &[FilmRecord],
        long: &[FilmRecord],
    ) -> MigrationOutcome {
        let departed = departed_films(previous_recent, new_recent);

        info!("🎬 Films to migrate: {}", departed.len());

        if departed.is_empty() {
            info!("   No changes detected - all films still in the recent window");
            return MigrationOutcome {
                short: short.to_vec(),
                long: long.to_vec(),
                stats: MigrationStats {
                    short_total: short.len(),
                    long_total: long.len(),
                    ..MigrationStats::default()
                },
            };
        }

        let mut stats = MigrationStats {
            migrated: departed.len(),
            ..MigrationStats::default()
        };

        let mut to_short = Vec::new();
        let mut to_long = Vec::new();

        for film in departed {
            if film.known_runtime().is_none() {
                stats.unknown_runtime += 1;
            }
            match self.classify(film) {
                CollectionKind::Long => to_long.push(film.clone()),
                _ => to_short.push(film.clone()),
            }
        }

        stats.to_short = to_short.len();
        stats.to_long = to_long.len();

        info!("   → Short (<{}min): {}", self.runtime_threshold, stats.to_short);
        info!("   → Long (≥{}min): {}", self.runtime_threshold, stats.to_long);
        if stats.unknown_runtime > 0 {
            warn!(
                "⚠️  No runtime data: {} (added to short by default)",
                stats.unknown_runtime
            );
        }

        let mut short_base = short.to_vec();
        let mut long_base = long.to_vec();

        match self.cross_bucket_policy {
            CrossBucketPolicy::AllowBoth => {}
            CrossBucketPolicy::KeepExisting => {
                let long_ids = id_set(long);
                let short_ids = id_set(short);
                let before = to_short.len() + to_long.len();
                to_short.retain(|film| !long_ids.contains(film.id.as_str()));
                to_long.retain(|film| !short_ids.contains(film.id.as_str()));
                stats.cross_bucket_conflicts = before - (to_short.len() + to_long.len());
            }
            CrossBucketPolicy::Reclassify => {
                let short_incoming = id_set(&to_short);
                let long_incoming = id_set(&to_long);
                let before = short_base.len() + long_base.len();
                long_base.retain(|film| !short_incoming.contains(film.id.as_str()));
                short_base.retain(|film| !long_incoming.contains(film.id.as_str()));
                stats.cross_bucket_conflicts = before - (short_base.len() + long_base.len());
            }
        }

        if stats.cross_bucket_conflicts > 0 {
            warn!(
                "⚠️  {} film(s) already present in the other collection ({:?})",
                stats.cross_bucket_conflicts, self.cross_bucket_policy
            );
        }

        short_base.extend(to_short);
        long_base.extend(to_long);

        let appended_short = short_base.len();
        let appended_long = long_base.len();

        let short = dedup_by_id(short_base);
        let long = dedup_by_id(long_base);

        stats.short_duplicates_removed = appended_short - short.len();
        stats.long_duplicates_removed = appended_long - long.len();
        stats.short_total = short.len();
        stats.long_total = long.len();

        info!(
            "🔍 Duplicates removed: short {}, long {}",
            stats.short_duplicates_removed, stats.long_duplicates_removed
        );
        debug!("Migration stats: {:?}", stats);

        MigrationOutcome { short, long, stats }
    }
}

/// Films present in `previous_recent` but absent from `new_recent`, in `previous_recent` order
pub fn departed_films<'a>(
    previous_recent: &'a [FilmRecord],
    new_recent: &[FilmRecord],
) -> Vec<&'a FilmRecord> {
    let current = id_set(new_recent);
    previous_recent
        .iter()
        .filter(|film| !current.contains(film.id.as_str()))
        .collect()
}

/// Drop later records whose id was already seen, keeping order
pub fn dedup_by_id(films: Vec<FilmRecord>) -> Vec<FilmRecord> {
    let mut seen = HashSet::with_capacity(films.len());
    films
        .into_iter()
        .filter(|film| seen.insert(film.id.clone()))
        .collect()
}

fn id_set(films: &[FilmRecord]) -> HashSet<&str> {
    films.iter().map(|film| film.id.as_str()).collect()
}

/// Migrate with the default threshold and policy
pub fn migrate(
    previous_recent: &[FilmRecord],
    new_recent: &[FilmRecord],
    short: &[FilmRecord],
    long: &[FilmRecord],
) -> MigrationOutcome {
    MigrationEngine::default().migrate(previous_recent, new_recent, short, long)
}
