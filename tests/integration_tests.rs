use std::collections::HashSet;
use tempfile::TempDir;
use tokio::fs;

use letterboxd_stremio::config::StorageConfig;
use letterboxd_stremio::migration::{migrate, CrossBucketPolicy, MigrationEngine};
use letterboxd_stremio::model::{CollectionKind, FilmRecord};
use letterboxd_stremio::pipeline::migrate_window;
use letterboxd_stremio::RecordStore;

fn film(id: &str, runtime: u32) -> FilmRecord {
    FilmRecord::new(id, format!("Film {}", id), "2010").with_runtime(runtime)
}

fn id_set(films: &[FilmRecord]) -> HashSet<String> {
    films.iter().map(|f| f.id.clone()).collect()
}

async fn store_in(dir: &TempDir) -> RecordStore {
    RecordStore::open(StorageConfig {
        data_dir: dir.path().to_path_buf(),
        ..StorageConfig::default()
    })
    .await
}

#[tokio::test]
async fn test_worked_example_through_storage() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir).await;
    let engine = MigrationEngine::default();

    store
        .write_collection(CollectionKind::Recent, &[film("A", 95), film("B", 130), film("C", 0)])
        .await
        .unwrap();
    store.write_collection(CollectionKind::Short, &[film("X", 80)]).await.unwrap();

    let new_recent = vec![film("D", 100), film("A", 95)];
    let (stats, counts) = migrate_window(&store, &engine, &new_recent, 10).await.unwrap();

    assert_eq!(stats.migrated, 2);
    assert_eq!(stats.to_short, 1);
    assert_eq!(stats.to_long, 1);
    assert_eq!(counts.recent, 2);

    let short = store.read_collection(CollectionKind::Short).await;
    let long = store.read_collection(CollectionKind::Long).await;
    let recent = store.read_collection(CollectionKind::Recent).await;
    assert_eq!(short.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), vec!["X", "C"]);
    assert_eq!(long.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(), vec!["B"]);
    assert_eq!(recent, new_recent);
}

#[tokio::test]
async fn test_rerunning_a_migration_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir).await;
    let engine = MigrationEngine::default();

    store
        .write_collection(CollectionKind::Recent, &[film("A", 95), film("B", 130)])
        .await
        .unwrap();
    let new_recent = vec![film("C", 100)];
    migrate_window(&store, &engine, &new_recent, 10).await.unwrap();
    let short_once = fs::read_to_string(temp_dir.path().join("films-short.json")).await.unwrap();
    let long_once = fs::read_to_string(temp_dir.path().join("films-long.json")).await.unwrap();

    // Simulate a crash before recent was replaced, then retry
    store
        .write_collection(CollectionKind::Recent, &[film("A", 95), film("B", 130)])
        .await
        .unwrap();
    let (stats, _) = migrate_window(&store, &engine, &new_recent, 10).await.unwrap();

    assert_eq!(stats.duplicates_removed(), 2);
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("films-short.json")).await.unwrap(),
        short_once
    );
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("films-long.json")).await.unwrap(),
        long_once
    );
}

#[tokio::test]
async fn test_full_overlap_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir).await;
    let engine = MigrationEngine::default();

    let window = vec![film("A", 95), film("B", 130)];
    store.write_collection(CollectionKind::Recent, &window).await.unwrap();

    let (stats, _) = migrate_window(&store, &engine, &window, 10).await.unwrap();

    assert_eq!(stats.migrated, 0);
    assert!(!temp_dir.path().join("films-short.json").exists());
    assert!(!temp_dir.path().join("films-long.json").exists());
}

#[test]
fn test_partition_is_complete() {
    let previous: Vec<FilmRecord> = (0..40u32).map(|i| film(&format!("tt{:07}", i), i * 7)).collect();
    let new_recent: Vec<FilmRecord> = previous.iter().skip(30).cloned().collect();
    let short = vec![film("tt9000001", 60)];
    let long = vec![film("tt9000002", 200)];

    let outcome = migrate(&previous, &new_recent, &short, &long);

    let departed = id_set(&previous[..30]);
    let short_ids = id_set(&outcome.short);
    let long_ids = id_set(&outcome.long);

    assert!(departed.iter().all(|id| short_ids.contains(id) || long_ids.contains(id)));
    assert!(short_ids.is_disjoint(&long_ids));
    assert!(outcome
        .short
        .iter()
        .filter(|f| departed.contains(&f.id))
        .all(|f| f.known_runtime().map_or(true, |m| m < 120)));
    assert!(outcome
        .long
        .iter()
        .filter(|f| departed.contains(&f.id))
        .all(|f| f.known_runtime().map_or(false, |m| m >= 120)));
}

#[test]
fn test_reclassify_moves_film_between_buckets() {
    let engine = MigrationEngine::new(120, CrossBucketPolicy::Reclassify);
    let outcome = engine.migrate(&[film("A", 150)], &[], &[film("A", 90), film("S", 80)], &[]);

    assert_eq!(id_set(&outcome.short), id_set(&[film("S", 80)]));
    assert_eq!(id_set(&outcome.long), id_set(&[film("A", 150)]));
    assert_eq!(outcome.stats.cross_bucket_conflicts, 1);
}

#[tokio::test]
async fn test_oversized_window_loses_no_films() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_in(&temp_dir).await;
    let engine = MigrationEngine::default();

    store
        .write_collection(CollectionKind::Recent, &[film("a", 90), film("b", 90), film("c", 150)])
        .await
        .unwrap();

    // Only the first three fit, so "c" leaves the window now
    let oversized = vec![film("d", 90), film("a", 90), film("b", 90), film("c", 150)];
    let (stats, counts) = migrate_window(&store, &engine, &oversized, 3).await.unwrap();
    assert_eq!(stats.migrated, 1);
    assert_eq!(counts.recent, 3);
    assert!(id_set(&store.read_collection(CollectionKind::Long).await).contains("c"));

    migrate_window(&store, &engine, &[film("x", 90), film("y", 90)], 2).await.unwrap();

    let mut all = id_set(&store.read_collection(CollectionKind::Recent).await);
    all.extend(id_set(&store.read_collection(CollectionKind::Short).await));
    all.extend(id_set(&store.read_collection(CollectionKind::Long).await));
    for id in ["a", "b", "c", "d", "x", "y"] {
        assert!(all.contains(id), "film {} missing from every collection", id);
    }
}
