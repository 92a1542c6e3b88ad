use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

/// How long invalidation waits for another svnp process to finish writing.
const WAIT_TIMEOUT: Duration = Duration::from_secs(30);
const FIRST_RETRY: Duration = Duration::from_millis(5);
const MAX_RETRY: Duration = Duration::from_millis(200);

/// Exclusive advisory lock on one working copy's durable cache.
/// Unlocked on drop.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
}

impl CacheLock {
    /// Block until the lock is ours, giving up after 30 seconds.
    pub fn acquire(lock_path: &Path) -> io::Result<Self> {
        Self::acquire_with_timeout(lock_path, WAIT_TIMEOUT)
    }

    /// Block until the lock is ours. Fails with `ErrorKind::TimedOut` once
    /// `timeout` has passed.
    pub fn acquire_with_timeout(lock_path: &Path, timeout: Duration) -> io::Result<Self> {
        let file = open(lock_path)?;
        let deadline = Instant::now() + timeout;
        let mut retry = FIRST_RETRY;

        while !claim(&file)? {
            if Instant::now() >= deadline {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("{} still locked after {:?}", lock_path.display(), timeout),
                ));
            }
            thread::sleep(retry);
            retry = (retry * 2).min(MAX_RETRY);
        }
        Ok(Self { file })
    }

    /// Take the lock only if nobody holds it. Used for writes that may be skipped.
    pub fn try_acquire(lock_path: &Path) -> io::Result<Option<Self>> {
        let file = open(lock_path)?;
        Ok(claim(&file)?.then_some(Self { file }))
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn open(lock_path: &Path) -> io::Result<File> {
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
}

/// `Ok(false)` when another handle holds the lock.
fn claim(file: &File) -> io::Result<bool> {
    match file.try_lock_exclusive() {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}
