//! Size-aware content fingerprints
//!
//! Small files are hashed in full. Files at or above the sampling threshold
//! are fingerprinted from their length plus three fixed-size samples taken
//! from the head, middle and tail, which keeps hashing a multi-gigabyte
//! bundle close to constant time. The question answered is "did this file
//! change", not "is this file authentic".
//!
//! The digest covers the bytes and the length only. Timestamps, permissions
//! and the host platform never enter it, so client and server agree on
//! byte-identical content.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result, RetryPolicy};

/// Files below this size are hashed in full.
pub const DEFAULT_SAMPLE_THRESHOLD: u64 = 128 * 1024;

/// Size of each sampled chunk for large files.
pub const DEFAULT_SAMPLE_SIZE: u64 = 16 * 1024;

/// Hex fingerprint of a file's content.
///
/// The empty fingerprint is reserved as the directory sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The sentinel used for directory-marker records.
    pub fn directory() -> Self {
        Self(String::new())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn is_directory_sentinel(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes [`Fingerprint`]s, retrying reads of files that are locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentHasher {
    sample_threshold: u64,
    sample_size: u64,
    retry: RetryPolicy,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self {
            sample_threshold: DEFAULT_SAMPLE_THRESHOLD,
            sample_size: DEFAULT_SAMPLE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the sampling parameters.
    ///
    /// `sample_size` is clamped so that it never exceeds `threshold`.
    pub fn with_sampling(mut self, threshold: u64, sample_size: u64) -> Self {
        self.sample_threshold = threshold.max(1);
        self.sample_size = sample_size.clamp(1, self.sample_threshold);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Fingerprint in-memory content exactly as [`hash_file`](Self::hash_file)
    /// would fingerprint the same bytes on disk.
    pub fn hash_bytes(&self, data: &[u8]) -> Fingerprint {
        let len = data.len() as u64;
        let mut hasher = Sha256::new();
        hasher.update(len.to_le_bytes());

        if len < self.sample_threshold {
            hasher.update(data);
        } else {
            for offset in self.sample_offsets(len) {
                let start = offset as usize;
                let end = (offset + self.sample_size) as usize;
                hasher.update(&data[start..end]);
            }
        }

        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    /// Fingerprint a regular file.
    ///
    /// Reads that fail because the file is busy are retried according to the
    /// configured [`RetryPolicy`]; once retries run out the failure is
    /// returned as [`Error::RetriesExhausted`].
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is a directory or cannot be read.
    pub fn hash_file(&self, path: &Path) -> Result<Fingerprint> {
        self.retry.retry_blocking(path, || self.hash_file_once(path))
    }

    fn hash_file_once(&self, path: &Path) -> Result<Fingerprint> {
        let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
        let metadata = file.metadata().map_err(|e| Error::io(path, e))?;
        if metadata.is_dir() {
            return Err(Error::InvalidPath {
                path: path.display().to_string(),
                reason: "directories are not hashed".into(),
            });
        }

        let len = metadata.len();
        let mut hasher = Sha256::new();
        hasher.update(len.to_le_bytes());

        if len < self.sample_threshold {
            let mut content = Vec::with_capacity(len as usize);
            file.read_to_end(&mut content)
                .map_err(|e| Error::io(path, e))?;
            // The file may have grown between stat and read.
            if content.len() as u64 != len {
                return Ok(self.hash_bytes(&content));
            }
            hasher.update(&content);
        } else {
            let mut sample = vec![0u8; self.sample_size as usize];
            for offset in self.sample_offsets(len) {
                file.seek(SeekFrom::Start(offset))
                    .map_err(|e| Error::io(path, e))?;
                file.read_exact(&mut sample)
                    .map_err(|e| Error::io(path, e))?;
                hasher.update(&sample);
            }
        }

        Ok(Fingerprint(format!("{:x}", hasher.finalize())))
    }

    /// Head, middle and tail sample offsets for a file of `len` bytes.
    fn sample_offsets(&self, len: u64) -> [u64; 3] {
        let last = len.saturating_sub(self.sample_size);
        [0, last / 2, last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_hasher() -> ContentHasher {
        ContentHasher::new()
            .with_sampling(64, 8)
            .with_retry(RetryPolicy::none())
    }

    #[test]
    fn hashing_is_deterministic() {
        let hasher = ContentHasher::new();
        assert_eq!(hasher.hash_bytes(b"plugin"), hasher.hash_bytes(b"plugin"));
    }

    #[test]
    fn different_content_different_fingerprint() {
        let hasher = ContentHasher::new();
        assert_ne!(hasher.hash_bytes(b"aaa"), hasher.hash_bytes(b"bbb"));
    }

    #[test]
    fn length_is_part_of_the_fingerprint() {
        let hasher = small_hasher();
        let short = vec![7u8; 100];
        let mut long = short.clone();
        long.insert(50, 7);
        // Same head and tail samples, different length.
        assert_ne!(hasher.hash_bytes(&short), hasher.hash_bytes(&long));
    }

    #[test]
    fn sampled_regions_affect_the_fingerprint() {
        let hasher = small_hasher();
        let base: Vec<u8> = (0..200u8).collect();
        let original = hasher.hash_bytes(&base);

        for offset in hasher.sample_offsets(base.len() as u64) {
            let mut changed = base.clone();
            changed[offset as usize] ^= 0xFF;
            assert_ne!(hasher.hash_bytes(&changed), original, "offset {offset}");
        }
    }

    #[test]
    fn unsampled_region_is_ignored_for_large_files() {
        let hasher = small_hasher();
        let base: Vec<u8> = (0..200u8).collect();
        let mut changed = base.clone();
        changed[20] ^= 0xFF;
        assert_eq!(hasher.hash_bytes(&base), hasher.hash_bytes(&changed));
    }

    #[test]
    fn file_and_bytes_agree() {
        let dir = tempfile::tempdir().unwrap();
        let hasher = small_hasher();
        for size in [0usize, 10, 63, 64, 65, 500] {
            let data: Vec<u8> = (0..size).map(|i| (i * 31 % 251) as u8).collect();
            let path = dir.path().join(format!("f{size}.bin"));
            std::fs::write(&path, &data).unwrap();
            assert_eq!(hasher.hash_file(&path).unwrap(), hasher.hash_bytes(&data), "size {size}");
        }
    }

    #[test]
    fn directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = small_hasher().hash_file(dir.path());
        assert!(result.is_err());
    }

    #[test]
    fn directory_sentinel_is_empty() {
        assert!(Fingerprint::directory().is_directory_sentinel());
        assert!(!ContentHasher::new().hash_bytes(b"").is_directory_sentinel());
    }
}
