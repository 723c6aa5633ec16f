//! Export a snapshot to a directory store and read it back

mod common;

use catchflow_engine::store::{CellWriter, FORMAT_VERSION};
use catchflow_engine::{
    build_snapshot, DirectoryStore, Error, GraphStore, LiveSnapshot, QueryConfig, Snapshot, TraversalMode,
    WatershedQueryEngine,
};
use catchflow_core::CRS;
use common::{init_tracing, params, plane};
use std::sync::Arc;

#[test]
fn export_import_preserves_records() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path()).unwrap();
    let source = plane().with_crs(CRS::from_epsg(32719));
    let original = build_snapshot(&source, &params(10)).unwrap();
    original.export(&store).unwrap();

    let reopened = DirectoryStore::open(dir.path()).unwrap();
    let imported = Snapshot::import(&reopened).unwrap();

    assert_eq!(imported.manifest(), original.manifest());
    assert_eq!(imported.manifest().crs, Some(CRS::from_epsg(32719)));
    assert_eq!(imported.segments(), original.segments());
    assert_eq!(imported.catchments(), original.catchments());
    let a: Vec<_> = original.cells().records().collect();
    let b: Vec<_> = imported.cells().records().collect();
    assert_eq!(a.len(), 100);
    assert_eq!(a, b);
    imported.validate().unwrap();
}

#[test]
fn imported_snapshot_answers_the_same() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path()).unwrap();
    let original = build_snapshot(&plane(), &params(10)).unwrap();
    original.export(&store).unwrap();

    let a = WatershedQueryEngine::new(Arc::new(LiveSnapshot::new(original)), QueryConfig::default());
    let b = WatershedQueryEngine::new(
        Arc::new(LiveSnapshot::new(Snapshot::import(&store).unwrap())),
        QueryConfig::default(),
    );
    let ra = a.query(5.0, 95.0, TraversalMode::Full).unwrap();
    let rb = b.query(5.0, 95.0, TraversalMode::Full).unwrap();
    assert_eq!(ra.catchment_ids, rb.catchment_ids);
    assert_eq!(ra.cell_count, rb.cell_count);
    assert_eq!(ra.histogram, rb.histogram);
    assert!((ra.area - rb.area).abs() < 1e-9);
}

#[test]
fn unknown_format_version_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path()).unwrap();
    build_snapshot(&plane(), &params(50)).unwrap().export(&store).unwrap();

    let mut manifest = store.manifest().unwrap();
    manifest.format_version = FORMAT_VERSION + 1;
    store.put_manifest(&manifest).unwrap();
    assert!(matches!(Snapshot::import(&store), Err(Error::Store(_))));
}

#[test]
fn inconsistent_cell_table_blocks_import() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryStore::create(dir.path()).unwrap();
    let snap = build_snapshot(&plane(), &params(50)).unwrap();
    snap.export(&store).unwrap();

    let mut writer = store.cell_writer().unwrap();
    for mut record in snap.cells().records() {
        if record.id == 0 {
            record.accumulation = 42;
        }
        writer.append(&record).unwrap();
    }
    writer.finish().unwrap();

    let err = Snapshot::import(&store).unwrap_err();
    assert!(matches!(err, Error::Core(catchflow_core::Error::Inconsistent(_))));
}

#[test]
fn missing_store_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(DirectoryStore::open(dir.path().join("absent")).is_err());
}
