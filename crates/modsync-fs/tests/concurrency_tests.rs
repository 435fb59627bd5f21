//! Concurrent access tests for write_atomic locking

use modsync_fs::{NormalizedPath, RobustnessConfig, io};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

#[test]
fn test_concurrent_writes_no_corruption() {
    let dir = tempdir().unwrap();
    let file_path = dir.path().join("PreviousSync.json");
    let path = Arc::new(NormalizedPath::new(&file_path));

    let num_threads = 8;
    let writes_per_thread = 10;
    let barrier = Arc::new(Barrier::new(num_threads));

    let handles: Vec<_> = (0..num_threads)
        .map(|thread_id| {
            let path = Arc::clone(&path);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                barrier.wait();
                for i in 0..writes_per_thread {
                    let content = format!("thread{}:write{}\n", thread_id, i);
                    // A write may time out on the lock; that is acceptable here.
                    let _ = io::write_atomic(&path, content.as_bytes(), RobustnessConfig::default());
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread should not panic");
    }

    let content = std::fs::read_to_string(&file_path).unwrap();
    assert!(content.starts_with("thread"));
    assert_eq!(content.matches("thread").count(), 1, "interleaved: {content}");
}

#[test]
fn test_lock_timeout_is_respected() {
    use fs2::FileExt;

    let dir = tempdir().unwrap();
    let file_path = dir.path().join("locked.json");
    let lock_path = dir.path().join("locked.json.lock");

    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .unwrap();
    lock_file.try_lock_exclusive().unwrap();

    let path = NormalizedPath::new(&file_path);
    let config = RobustnessConfig {
        lock_timeout: Duration::from_millis(200),
        enable_fsync: false,
    };

    let result = io::write_atomic(&path, b"content", config);
    drop(lock_file);

    assert!(result.is_err(), "Write should fail when lock is held");
    assert!(!file_path.exists());
}
