//! Snapshots of real computations persisted through both backends.

use std::collections::BTreeMap;

use arbor_core::{assoc, state, Computation, GraphSnapshot, Value};
use arbor_storage::{
    snapshot_to_stable, stable_to_snapshot, InMemoryStore, SnapshotStore, SqliteStore,
    VersionedGraph, MISSING_ID,
};

fn list_snapshot() -> GraphSnapshot {
    let items = Value::constant(BTreeMap::from([(1_u32, "a".to_string())]));
    let list = assoc(&items, |_key, label| {
        state(0_i32).sub(move |count| {
            let row = arbor_core::map2(&count, &label, |(n, _), label: &String| {
                format!("{label}: {n}")
            });
            Computation::return_(&row)
        })
    });
    GraphSnapshot::of_computation(&list).unwrap()
}

fn exercise(store: &mut dyn SnapshotStore) {
    let snapshot = list_snapshot();
    let stable = VersionedGraph::V2(snapshot_to_stable(&snapshot));
    let id = store.save_snapshot("list", &stable).unwrap();
    let loaded = store.load_snapshot(id).unwrap();
    assert_eq!(stable_to_snapshot(&loaded).unwrap(), snapshot);

    let old = store.save_snapshot("list-v1", &stable.to_version(1).unwrap()).unwrap();
    let upgraded = store.load_snapshot(old).unwrap();
    assert_eq!(upgraded.info.len(), snapshot.info.len());
    assert!(upgraded.info.values().all(|info| info.id == MISSING_ID));
    assert_eq!(store.list_snapshots().unwrap().len(), 2);
}

#[test]
fn in_memory_store_round_trips_snapshots() {
    exercise(&mut InMemoryStore::new());
}

#[test]
fn sqlite_store_round_trips_snapshots() {
    exercise(&mut SqliteStore::in_memory().unwrap());
}

#[test]
fn sqlite_snapshots_survive_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshots.db");
    let path = path.to_str().unwrap();
    let stable = VersionedGraph::V2(snapshot_to_stable(&list_snapshot()));

    let id = {
        let mut store = SqliteStore::new(path).unwrap();
        store.save_snapshot("persisted", &stable).unwrap()
    };
    let store = SqliteStore::new(path).unwrap();
    assert_eq!(store.load_versioned(id).unwrap(), stable);
    let summary = &store.list_snapshots().unwrap()[0];
    assert_eq!(summary.name, "persisted");
    assert_eq!(summary.version, 2);
    assert_eq!(store.find_by_hash(&summary.content_hash).unwrap(), Some(id));
}

#[test]
fn stored_paths_are_structural() {
    let stable = snapshot_to_stable(&list_snapshot());
    insta::assert_json_snapshot!(stable.tree.keys().collect::<Vec<_>>(), @r#"
    [
      "root.0",
      "root.1",
      "root.1.0",
      "root.1.1",
      "root.1.1.0",
      "root.1.1.0.0",
      "root.1.1.0.1"
    ]
    "#);
}
