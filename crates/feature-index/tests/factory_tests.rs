//! Dataset creation, index persistence and rebuild behaviour.

mod common;

use common::{profile, Scripted, ScriptedReader};
use feature_common::FeatureError;
use feature_index::{IndexConfig, PointDatasetFactory, ProfileArchiveReader, QueryWindow};
use std::fs;
use std::sync::Arc;
use storage::{DatasetId, HandleCache};
use test_utils::time::{hours, t0};
use test_utils::{create_profile_archive, ProfileFixture, TempWorkspace};

fn config(ws: &TempWorkspace) -> IndexConfig {
    IndexConfig {
        working_dir: ws.index_dir(),
        ..Default::default()
    }
}

/// A workspace with one scripted file per entry of `platforms`.
fn scripted_workspace(platforms: &[&str]) -> (TempWorkspace, ScriptedReader) {
    let ws = TempWorkspace::new();
    let mut reader = ScriptedReader::new();
    for (i, name) in platforms.iter().enumerate() {
        let path = ws.write_data_file(&format!("part{}.dat", i), "");
        reader = reader.with_file(
            path.to_string_lossy(),
            vec![
                Scripted::Ok(profile(name, i as f64, 0.0, t0())),
                Scripted::Ok(profile(name, i as f64, 1.0, hours(1))),
            ],
        );
    }
    (ws, reader)
}

#[test]
fn test_index_is_persisted_and_reused() {
    let (ws, reader) = scripted_workspace(&["float-1", "float-2"]);
    let stats = reader.stats.clone();
    let factory = PointDatasetFactory::new(config(&ws), reader).unwrap();

    let first = factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    assert_eq!(stats.scans(), 2);
    assert!(ws.index_dir().join("en4.index").is_file());

    let second = factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    assert_eq!(stats.scans(), 2);
    assert_eq!(first.feature_ids(), second.feature_ids());
    assert_eq!(first.extents(), second.extents());
    assert_eq!(first.variable_ids(), second.variable_ids());
}

#[test]
fn test_persisted_index_survives_restart() {
    let ws = TempWorkspace::new();
    ws.write_data_file(
        "a.jsonl",
        &create_profile_archive(&[
            ProfileFixture::new("float-1", 10.0, 10.0, t0()),
            ProfileFixture::new("float-2", 20.0, 20.0, t0()),
        ]),
    );
    let window = QueryWindow::unbounded().with_bbox(15.0, 15.0, 25.0, 25.0).unwrap();

    let before = {
        let factory = PointDatasetFactory::new(config(&ws), ProfileArchiveReader::new()).unwrap();
        let dataset = factory.create_dataset("en4", &ws.pattern("*.jsonl"), false).unwrap();
        dataset.query_nearest(&window, t0()).unwrap()
    };

    let factory = PointDatasetFactory::new(config(&ws), ProfileArchiveReader::new()).unwrap();
    let dataset = factory.create_dataset("en4", &ws.pattern("*.jsonl"), false).unwrap();
    let after = dataset.query_nearest(&window, t0()).unwrap();

    assert_eq!(before, after);
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].name, "float-2");
}

#[test]
fn test_changed_file_set_triggers_rebuild() {
    let ws = TempWorkspace::new();
    ws.write_data_file(
        "a.jsonl",
        &create_profile_archive(&[ProfileFixture::new("float-1", 0.0, 0.0, t0())]),
    );
    let factory = PointDatasetFactory::new(config(&ws), ProfileArchiveReader::new()).unwrap();

    let dataset = factory.create_dataset("en4", &ws.pattern("*.jsonl"), false).unwrap();
    assert_eq!(dataset.feature_count(), 1);

    ws.write_data_file(
        "b.jsonl",
        &create_profile_archive(&[ProfileFixture::new("float-2", 5.0, 5.0, t0())]),
    );
    let dataset = factory.create_dataset("en4", &ws.pattern("*.jsonl"), false).unwrap();
    assert_eq!(dataset.feature_count(), 2);
    assert_eq!(
        dataset.file_for("1:0").unwrap(),
        ws.data_dir().join("b.jsonl").as_path()
    );

    fs::remove_file(ws.data_dir().join("a.jsonl")).unwrap();
    let dataset = factory.create_dataset("en4", &ws.pattern("*.jsonl"), false).unwrap();
    assert_eq!(dataset.feature_count(), 1);
    let features = dataset
        .query_nearest(&QueryWindow::unbounded(), t0())
        .unwrap();
    assert_eq!(features[0].name, "float-2");
}

#[test]
fn test_force_refresh_rebuilds_and_reopens() {
    let (ws, reader) = scripted_workspace(&["float-1"]);
    let stats = reader.stats.clone();
    let factory = PointDatasetFactory::new(config(&ws), reader).unwrap();

    factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    assert_eq!(stats.scans(), 1);
    assert_eq!(stats.opens(), 1);

    let dataset = factory.create_dataset("en4", &ws.pattern("*.dat"), true).unwrap();
    assert_eq!(stats.scans(), 2);
    assert_eq!(stats.opens(), 2);
    assert_eq!(stats.closes(), 1);
    assert_eq!(dataset.feature_count(), 2);
}

#[test]
fn test_corrupt_index_is_rebuilt() {
    let (ws, reader) = scripted_workspace(&["float-1"]);
    let stats = reader.stats.clone();
    let factory = PointDatasetFactory::new(config(&ws), reader).unwrap();

    factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    let path = factory.store().path_for(&DatasetId::new("en4").unwrap());
    fs::write(&path, b"not an index").unwrap();

    let dataset = factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    assert_eq!(stats.scans(), 2);
    assert_eq!(dataset.feature_count(), 2);
}

#[test]
fn test_unwritable_store_is_not_fatal() {
    let (ws, reader) = scripted_workspace(&["float-1"]);
    let blocker = ws.root().join("blocker");
    fs::write(&blocker, b"").unwrap();
    let config = IndexConfig {
        working_dir: blocker,
        ..Default::default()
    };
    let factory = PointDatasetFactory::new(config, reader).unwrap();

    let dataset = factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    assert_eq!(dataset.feature_count(), 2);
}

#[test]
fn test_location_errors() {
    let (ws, reader) = scripted_workspace(&["float-1"]);
    let factory = PointDatasetFactory::new(config(&ws), reader).unwrap();

    assert!(matches!(
        factory.create_dataset("en4", &ws.pattern("*.missing"), false),
        Err(FeatureError::NoFiles(_))
    ));
    assert!(matches!(
        factory.create_dataset("en4", "relative/*.dat", false),
        Err(FeatureError::InvalidLocation(_))
    ));
    assert!(matches!(
        factory.create_dataset("../escape", &ws.pattern("*.dat"), false),
        Err(FeatureError::InvalidDatasetId(_))
    ));
}

#[test]
fn test_unreadable_files_are_skipped() {
    let (ws, reader) = scripted_workspace(&["float-1", "float-2"]);
    let broken = ws.data_dir().join("part0.dat");
    let reader = reader.with_unreadable(broken.to_string_lossy());
    let factory = PointDatasetFactory::new(config(&ws), reader).unwrap();

    let dataset = factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    assert_eq!(dataset.feature_ids(), vec!["1:0".to_string(), "1:1".to_string()]);
}

#[test]
fn test_partial_scan_is_not_persisted() {
    let (ws, reader) = scripted_workspace(&["float-1", "float-2"]);
    let broken = ws.data_dir().join("part1.dat");
    let flaky = reader.clone().with_unreadable(broken.to_string_lossy());
    let stats = reader.stats.clone();

    let factory = PointDatasetFactory::new(config(&ws), flaky).unwrap();
    let dataset = factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    assert_eq!(dataset.feature_count(), 2);
    assert_eq!(stats.scans(), 1);
    assert!(!ws.index_dir().join("en4.index").exists());

    // The file reads again; the next open rescans instead of reusing a
    // persisted partial index
    let factory = PointDatasetFactory::new(config(&ws), reader).unwrap();
    let dataset = factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    assert_eq!(dataset.feature_count(), 4);
    assert_eq!(stats.scans(), 3);
    assert!(ws.index_dir().join("en4.index").is_file());
}

#[test]
fn test_all_files_unreadable_is_an_error() {
    let (ws, reader) = scripted_workspace(&["float-1"]);
    let broken = ws.data_dir().join("part0.dat");
    let reader = reader.with_unreadable(broken.to_string_lossy());
    let factory = PointDatasetFactory::new(config(&ws), reader).unwrap();

    let err = factory
        .create_dataset("en4", &ws.pattern("*.dat"), false)
        .err()
        .expect("every file failed to open");
    assert!(err.is_data_reading());
    assert!(!ws.index_dir().join("en4.index").exists());
}

#[test]
fn test_concurrent_creation_builds_once() {
    let (ws, reader) = scripted_workspace(&["float-1", "float-2", "float-3"]);
    let stats = reader.stats.clone();
    let factory = Arc::new(PointDatasetFactory::new(config(&ws), reader).unwrap());
    let pattern = ws.pattern("*.dat");

    let counts: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let factory = factory.clone();
                let pattern = pattern.clone();
                s.spawn(move || {
                    factory
                        .create_dataset("en4", &pattern, false)
                        .unwrap()
                        .feature_count()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(counts.iter().all(|&c| c == 6));
    assert_eq!(stats.scans(), 3);
}

#[test]
fn test_concurrent_queries_share_handles() {
    let (ws, reader) = scripted_workspace(&["float-1", "float-2"]);
    let stats = reader.stats.clone();
    let factory = PointDatasetFactory::new(config(&ws), reader).unwrap();
    let dataset = factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let dataset = dataset.clone();
            s.spawn(move || {
                for _ in 0..10 {
                    let features = dataset
                        .query_nearest(&QueryWindow::unbounded(), t0())
                        .unwrap();
                    assert_eq!(features.len(), 2);
                }
            });
        }
    });

    // Both files stay resident; nothing is reopened
    assert_eq!(stats.opens(), 2);
    assert_eq!(stats.closes(), 0);
    assert!(factory.cache_stats().hits > 0);
}

#[test]
fn test_factories_can_share_a_handle_cache() {
    let (ws, reader) = scripted_workspace(&["float-1"]);
    let cache = Arc::new(HandleCache::new(4).unwrap());
    let factory = PointDatasetFactory::with_handle_cache(config(&ws), reader, cache.clone()).unwrap();

    factory.create_dataset("en4", &ws.pattern("*.dat"), false).unwrap();
    let location = ws.data_dir().join("part0.dat");
    assert!(cache.contains(&location.to_string_lossy()));
    assert!(Arc::ptr_eq(factory.handle_cache(), &cache));
}
