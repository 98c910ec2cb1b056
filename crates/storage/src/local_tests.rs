// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::io::Write as _;
use tempfile::tempdir;

#[test]
fn touch_creates_file_and_populates_stat() {
    let dir = tempdir().unwrap();
    let loc = LocalLocation::new(dir.path().join("a.txt"));
    loc.touch(false, false).unwrap();
    assert!(loc.exists().unwrap());
    assert_eq!(loc.size().unwrap(), 0);
}

#[test]
fn touch_without_exist_ok_rejects_existing_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, b"x").unwrap();
    let loc = LocalLocation::new(&path);
    assert!(matches!(
        loc.touch(false, false),
        Err(StorageError::AlreadyExists(_))
    ));
}

#[test]
fn delete_missing_ok_swallows_not_found() {
    let dir = tempdir().unwrap();
    let loc = LocalLocation::new(dir.path().join("missing"));
    assert!(loc.delete(true, false).is_ok());
    assert!(matches!(
        loc.delete(false, false),
        Err(StorageError::NotFound(_))
    ));
}

#[test]
fn rotate_renames_to_smallest_free_old_index() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("log.txt");
    std::fs::write(&path, b"gen0").unwrap();
    let loc = LocalLocation::new(&path);
    loc.rotate().unwrap();
    assert_eq!(
        std::fs::read_to_string(rotated_path(&path, 0)).unwrap(),
        "gen0"
    );
    assert!(!path.exists());

    std::fs::write(&path, b"gen1").unwrap();
    loc.rotate().unwrap();
    assert_eq!(
        std::fs::read_to_string(rotated_path(&path, 0)).unwrap(),
        "gen0"
    );
    assert_eq!(
        std::fs::read_to_string(rotated_path(&path, 1)).unwrap(),
        "gen1"
    );
    assert!(!path.exists());
}

#[test]
fn rotate_fails_when_absent() {
    let dir = tempdir().unwrap();
    let loc = LocalLocation::new(dir.path().join("missing"));
    assert!(matches!(loc.rotate(), Err(StorageError::NotFound(_))));
}

#[test]
fn copy_to_local_directory_recurses() {
    let src_dir = tempdir().unwrap();
    let dst_dir = tempdir().unwrap();
    std::fs::create_dir(src_dir.path().join("sub")).unwrap();
    std::fs::write(src_dir.path().join("sub/file.txt"), b"payload").unwrap();

    let src = LocalLocation::new(src_dir.path());
    let mut dst = LocalLocation::new(dst_dir.path().join("mirror"));
    src.copy_to(&mut dst).unwrap();

    assert_eq!(
        std::fs::read_to_string(dst_dir.path().join("mirror/sub/file.txt")).unwrap(),
        "payload"
    );
}

#[test]
fn join_loc_appends_segment() {
    let dir = tempdir().unwrap();
    let loc = LocalLocation::new(dir.path());
    let child = loc.join_loc("child.txt");
    assert_eq!(child.path(), dir.path().join("child.txt").to_str().unwrap());
}

#[test]
fn open_write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let loc = LocalLocation::new(dir.path().join("rw.txt"));
    {
        let mut stream = loc.open(OpenMode::Write).unwrap();
        stream.write_all(b"hello").unwrap();
    }
    assert_eq!(loc.read().unwrap(), b"hello");
}

#[test]
fn to_config_round_trips_path() {
    let dir = tempdir().unwrap();
    let loc = LocalLocation::new(dir.path().join("x"));
    match loc.to_config() {
        LocationConfig::LocalFilesystem(cfg) => {
            assert_eq!(cfg.path_ref, dir.path().join("x").to_string_lossy());
        }
        _ => panic!("expected local config"),
    }
}
