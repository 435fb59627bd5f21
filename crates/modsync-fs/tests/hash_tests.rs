use assert_fs::prelude::*;
use modsync_fs::{ContentHasher, Error, RetryPolicy};
use predicates::prelude::*;
use std::time::Duration;

#[test]
fn test_unchanged_file_hashes_identically() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("BepInEx/plugins/a.dll");
    file.write_binary(&[1, 2, 3, 4]).unwrap();

    let hasher = ContentHasher::new();
    let first = hasher.hash_file(file.path()).unwrap();
    let second = hasher.hash_file(file.path()).unwrap();

    assert_eq!(first, second);
    file.assert(predicate::path::is_file());
}

#[test]
fn test_hash_ignores_file_name_and_location() {
    let temp = assert_fs::TempDir::new().unwrap();
    let a = temp.child("client/a.dll");
    let b = temp.child("server/other/b.dll");
    a.write_str("same bytes").unwrap();
    b.write_str("same bytes").unwrap();

    let hasher = ContentHasher::new();
    assert_eq!(hasher.hash_file(a.path()).unwrap(), hasher.hash_file(b.path()).unwrap());
}

#[test]
fn test_large_file_tail_change_is_detected() {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("bundle.bin");
    let mut data = vec![0u8; 512 * 1024];
    file.write_binary(&data).unwrap();

    let hasher = ContentHasher::new();
    let before = hasher.hash_file(file.path()).unwrap();

    let last = data.len() - 1;
    data[last] = 1;
    file.write_binary(&data).unwrap();
    let after = hasher.hash_file(file.path()).unwrap();

    assert_ne!(before, after);
}

#[test]
fn test_missing_file_fails_without_retrying() {
    let temp = assert_fs::TempDir::new().unwrap();
    let hasher = ContentHasher::new().with_retry(RetryPolicy::fixed(5, Duration::from_secs(10)));

    let started = std::time::Instant::now();
    let result = hasher.hash_file(&temp.path().join("missing.dll"));

    assert!(matches!(result, Err(Error::Io { .. })));
    assert!(started.elapsed() < Duration::from_secs(5));
}
