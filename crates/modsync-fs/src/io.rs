//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;

use crate::{Error, NormalizedPath, Result};

/// Knobs for lock acquisition and durability of atomic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobustnessConfig {
    /// How long to wait for the sidecar `.lock` file before giving up.
    pub lock_timeout: Duration,
    /// Whether to fsync the temp file before renaming it into place.
    pub enable_fsync: bool,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            enable_fsync: true,
        }
    }
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers observe either the old or the
/// new content, never a partial write. Writers are serialized through an
/// advisory lock on a sidecar `<file>.lock`.
pub fn write_atomic(path: &NormalizedPath, content: &[u8], config: RobustnessConfig) -> Result<()> {
    let native_path = path.to_native();
    ensure_parent(&native_path)?;

    let lock_path = sidecar(&native_path, "lock");
    let lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| Error::io(&lock_path, e))?;

    acquire_exclusive(&lock_file, config.lock_timeout)
        .map_err(|_| Error::LockFailed {
            path: native_path.clone(),
        })?;

    let result = write_via_temp(&native_path, content, config.enable_fsync);

    // Released on drop as well; unlocking explicitly keeps the window short.
    let _ = FileExt::unlock(&lock_file);
    result
}

/// Replace a file's content via temp-then-rename, without a lock sidecar.
///
/// Used for files written into a synced tree, where a stray `.lock` file
/// would itself show up as local content.
pub fn replace_file(path: &Path, content: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    write_via_temp(path, content, false)
}

/// Read text content from a file.
pub fn read_text(path: &NormalizedPath) -> Result<String> {
    let native_path = path.to_native();
    fs::read_to_string(&native_path).map_err(|e| Error::io(&native_path, e))
}

/// Recursively copy `src` into `dst`, creating `dst` and any missing parents.
///
/// Returns the number of regular files copied.
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    fs::create_dir_all(dst).map_err(|e| Error::io(dst, e))?;

    for entry in walkdir::WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            Error::io(path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| Error::InvalidPath {
                path: entry.path().display().to_string(),
                reason: "not under copy source".into(),
            })?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
        } else {
            ensure_parent(&target)?;
            fs::copy(entry.path(), &target).map_err(|e| Error::io(&target, e))?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Remove a directory tree if it exists.
///
/// Returns whether anything was removed.
pub fn remove_dir_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    Ok(())
}

fn sidecar(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

fn write_via_temp(path: &Path, content: &[u8], fsync: bool) -> Result<()> {
    // Same directory keeps the rename on one filesystem.
    let temp_name = format!(
        ".{}.{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    );
    let temp_path = path.with_file_name(&temp_name);

    let write = || -> std::io::Result<()> {
        let mut temp_file = File::create(&temp_path)?;
        temp_file.write_all(content)?;
        if fsync {
            temp_file.sync_all()?;
        }
        Ok(())
    };

    if let Err(e) = write() {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::io(path, e)
    })
}

fn acquire_exclusive(file: &File, timeout: Duration) -> std::io::Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => return Ok(()),
            Err(e) if Instant::now() >= deadline => return Err(e),
            Err(_) => std::thread::sleep(Duration::from_millis(10)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_appends_extension() {
        let path = Path::new("/data/PreviousSync.json");
        assert_eq!(sidecar(path, "lock"), Path::new("/data/PreviousSync.json.lock"));
    }

    #[test]
    fn replace_file_leaves_no_temp_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/plugin.dll");
        replace_file(&target, b"v1").unwrap();
        replace_file(&target, b"v2").unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"v2");
        let names: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn remove_missing_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove_dir_if_exists(&dir.path().join("absent")).unwrap());
    }
}
