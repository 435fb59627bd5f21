//! Counting-semaphore admission for units of work

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::TransferProgress;
use crate::{Error, Result};

/// Concurrent downloads per sync attempt.
pub const DOWNLOAD_CONCURRENCY: usize = 8;

/// Concurrent local file hashes.
pub const HASH_CONCURRENCY: usize = 1024;

/// Admits at most `capacity` units at a time.
///
/// Cloning shares the same permits and counters.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    progress: TransferProgress,
}

impl ConcurrencyLimiter {
    /// A limiter with `capacity` permits; zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            progress: TransferProgress::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn progress(&self) -> &TransferProgress {
        &self.progress
    }

    /// Wait for a permit. The unit counts as in flight until the guard drops.
    pub async fn acquire(&self) -> Result<UnitGuard> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::Cancelled)?;
        self.progress.unit_started();
        Ok(UnitGuard {
            _permit: permit,
            progress: self.progress.clone(),
        })
    }
}

/// Permit for one running unit of work.
#[derive(Debug)]
pub struct UnitGuard {
    _permit: OwnedSemaphorePermit,
    progress: TransferProgress,
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        self.progress.unit_finished();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guards_release_their_permit_on_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let _b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.progress().in_flight(), 2);

        drop(a);
        assert_eq!(limiter.progress().in_flight(), 1);
        let _c = limiter.acquire().await.unwrap();
        assert_eq!(limiter.progress().peak_in_flight(), 2);
    }

    #[test]
    fn zero_capacity_still_admits_one() {
        assert_eq!(ConcurrencyLimiter::new(0).capacity(), 1);
    }
}
