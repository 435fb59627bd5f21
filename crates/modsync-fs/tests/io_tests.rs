use modsync_fs::{NormalizedPath, RobustnessConfig, io};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_write_atomic_creates_file_and_parents() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("ModSync_Data/PreviousSync.json"));

    io::write_atomic(&path, b"{}", RobustnessConfig::default()).unwrap();

    let content = fs::read_to_string(path.to_native()).unwrap();
    assert_eq!(content, "{}");
}

#[test]
fn test_write_atomic_overwrites_existing() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("state.json");
    fs::write(&file_path, "original").unwrap();

    let path = NormalizedPath::new(&file_path);
    io::write_atomic(&path, b"updated", RobustnessConfig::default()).unwrap();

    assert_eq!(fs::read_to_string(&file_path).unwrap(), "updated");
}

#[test]
fn test_write_atomic_leaves_no_temp_files() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("state.json"));

    io::write_atomic(&path, b"one", RobustnessConfig::default()).unwrap();
    io::write_atomic(&path, b"two", RobustnessConfig::default()).unwrap();

    let leftovers: Vec<_> = fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "found temp files: {:?}", leftovers);
}

#[test]
fn test_read_text_nonexistent_file() {
    let path = NormalizedPath::new("/nonexistent/file.txt");
    assert!(io::read_text(&path).is_err());
}

#[test]
fn test_copy_dir_all_copies_nested_tree() {
    let temp = TempDir::new().unwrap();
    let src = temp.path().join("src");
    fs::create_dir_all(src.join("plugins/empty")).unwrap();
    fs::write(src.join("plugins/a.dll"), "a").unwrap();
    fs::write(src.join("root.txt"), "r").unwrap();

    let dst = temp.path().join("dst");
    let copied = io::copy_dir_all(&src, &dst).unwrap();

    assert_eq!(copied, 2);
    assert_eq!(fs::read_to_string(dst.join("plugins/a.dll")).unwrap(), "a");
    assert!(dst.join("plugins/empty").is_dir());
}

#[test]
fn test_remove_dir_if_exists() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join("PendingUpdates/BepInEx");
    fs::create_dir_all(&dir).unwrap();

    assert!(io::remove_dir_if_exists(&temp.path().join("PendingUpdates")).unwrap());
    assert!(!temp.path().join("PendingUpdates").exists());
}
