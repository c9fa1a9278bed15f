use std::fs;

use dirbatch::batch::WorkUnit;
use dirbatch::discovery::{discover, MAVEN_MARKER};
use dirbatch::BatchError;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Helper function to lay out a batch root with some project directories
fn project_root() -> TempDir {
    let root = TempDir::new().expect("temp dir");
    for name in ["service-b", "service-a", "lib-core"] {
        let dir = root.path().join(name);
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join(MAVEN_MARKER), "<project/>").unwrap();
    }
    // a directory without a marker and a stray file with one
    fs::create_dir(root.path().join("docs")).unwrap();
    fs::write(root.path().join(MAVEN_MARKER), "<project/>").unwrap();
    root
}

#[test]
fn test_discovers_marked_directories_sorted() {
    let root = project_root();

    let units = discover(root.path(), MAVEN_MARKER).expect("discovery should succeed");

    assert_eq!(
        units,
        vec![
            WorkUnit::from("lib-core"),
            WorkUnit::from("service-a"),
            WorkUnit::from("service-b"),
        ]
    );
}

#[test]
fn test_custom_marker() {
    let root = project_root();
    fs::write(root.path().join("docs").join("Cargo.toml"), "[package]").unwrap();

    let units = discover(root.path(), "Cargo.toml").unwrap();

    assert_eq!(units, vec![WorkUnit::from("docs")]);
}

#[test]
fn test_empty_root_has_no_units() {
    let root = TempDir::new().unwrap();
    assert!(discover(root.path(), MAVEN_MARKER).unwrap().is_empty());
}

#[test]
fn test_missing_root_is_fatal() {
    let root = TempDir::new().unwrap();
    let missing = root.path().join("does-not-exist");

    let err = discover(&missing, MAVEN_MARKER).unwrap_err();

    match err {
        BatchError::Discovery { path, .. } => assert_eq!(path, missing),
        other => panic!("expected discovery error, got {other:?}"),
    }
}
