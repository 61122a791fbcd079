//! Cross-process throttle for engine calls.
//!
//! Every hook execution is a fresh process, so the "last call" marker lives
//! in a stamp file under the state directory instead of memory. The file
//! holds one number, the unix time in milliseconds of the most recently
//! reserved call slot.
//!
//! A caller takes an exclusive lock on a sibling `.lock` file, reserves its
//! slot (`max(now, last + interval)`), writes it back, and releases the lock
//! *before* sleeping. Concurrent processes therefore see each other's
//! reservations and queue one interval apart.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::cache::write_atomic;

/// Minimum-interval limiter backed by a stamp file.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    stamp: PathBuf,
    interval: Duration,
}

/// Exclusive hold on the limiter's lock file, released on drop.
struct StampLock {
    file: File,
}

impl Drop for StampLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

impl RateLimiter {
    pub fn new(stamp: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            stamp: stamp.into(),
            interval,
        }
    }

    /// Wait until at least `interval` has passed since the previous reserved
    /// slot, then record this call. Returns how long it waited.
    ///
    /// Lock, stamp read, or stamp write failures are logged and never block
    /// the call.
    pub async fn await_turn(&self) -> Duration {
        let limiter = self.clone();
        let wait = match tokio::task::spawn_blocking(move || limiter.reserve()).await {
            Ok((_, wait)) => wait,
            Err(e) => {
                warn!("Rate-limit reservation task failed: {e}");
                Duration::ZERO
            }
        };
        if !wait.is_zero() {
            debug!("Rate limit: waiting {}ms before engine call", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
        wait
    }

    /// Reserve the next slot under the lock. Returns the slot (unix millis)
    /// and how long until it arrives.
    fn reserve(&self) -> (u64, Duration) {
        let _lock = match self.lock() {
            Ok(lock) => Some(lock),
            Err(e) => {
                warn!("Failed to lock rate-limit stamp {}: {e}", self.stamp.display());
                None
            }
        };

        let now = unix_millis();
        let interval = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX);
        let slot = match self.read_stamp() {
            Some(last) => now.max(last.saturating_add(interval)),
            None => now,
        };
        if let Err(e) = self.write_stamp(slot) {
            warn!("Failed to record rate-limit stamp {}: {e}", self.stamp.display());
        }
        (slot, Duration::from_millis(slot.saturating_sub(now)))
    }

    fn lock(&self) -> io::Result<StampLock> {
        let path = self.stamp.with_extension("lock");
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)?;
        file.lock_exclusive()?;
        Ok(StampLock { file })
    }

    fn read_stamp(&self) -> Option<u64> {
        let text = fs::read_to_string(&self.stamp).ok()?;
        match text.trim().parse() {
            Ok(ms) => Some(ms),
            Err(_) => {
                warn!("Ignoring unparseable rate-limit stamp {:?}", text.trim());
                None
            }
        }
    }

    fn write_stamp(&self, millis: u64) -> io::Result<()> {
        let dir = self.stamp.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(dir)?;
        write_atomic(dir, &self.stamp, millis.to_string().as_bytes())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
