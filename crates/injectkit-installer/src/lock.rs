use std::fs::{File, OpenOptions, TryLockError};
use std::io;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_LOCK_MAX_WAIT: Duration = Duration::from_millis(10_000);

pub trait LockProbe {
    fn is_locked(&self, path: &Path) -> bool;
}

/// Considers a file locked while it cannot be opened and locked exclusively.
/// Not a guarantee: another process may grab the file right after a probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExclusiveOpenProbe;

impl LockProbe for ExclusiveOpenProbe {
    fn is_locked(&self, path: &Path) -> bool {
        let file = match open_exclusive(path) {
            Ok(file) => file,
            Err(err) if is_lock_violation(&err) => return true,
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "could not check whether file is in use; assuming it is free"
                );
                return false;
            }
        };

        match file.try_lock() {
            Ok(()) => false,
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Error(err)) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "could not lock file for probing; assuming it is free"
                );
                false
            }
        }
    }
}

#[cfg(windows)]
fn open_exclusive(path: &Path) -> io::Result<File> {
    use std::os::windows::fs::OpenOptionsExt;

    OpenOptions::new().read(true).share_mode(0).open(path)
}

#[cfg(not(windows))]
fn open_exclusive(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).open(path)
}

fn is_lock_violation(err: &io::Error) -> bool {
    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;

    cfg!(windows)
        && matches!(
            err.raw_os_error(),
            Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
        )
}

#[derive(Debug, Clone)]
pub struct FileLockWaiter<P = ExclusiveOpenProbe> {
    probe: P,
    poll_interval: Duration,
}

impl FileLockWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        Self::with_probe(ExclusiveOpenProbe, poll_interval)
    }
}

impl Default for FileLockWaiter {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_POLL_INTERVAL)
    }
}

impl<P: LockProbe> FileLockWaiter<P> {
    pub fn with_probe(probe: P, poll_interval: Duration) -> Self {
        Self {
            probe,
            poll_interval,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// `floor(max_wait / poll_interval)`.
    pub fn max_attempts(&self, max_wait: Duration) -> u64 {
        let interval = self.poll_interval.as_nanos().max(1);
        u64::try_from(max_wait.as_nanos() / interval).unwrap_or(u64::MAX)
    }

    /// Blocks the calling thread between probes. Returns false once the file
    /// has been seen locked `max_attempts` times.
    pub fn wait_for_unlock(&self, path: &Path, max_wait: Duration) -> bool {
        let max_attempts = self.max_attempts(max_wait);
        let mut attempts = 0_u64;

        while attempts < max_attempts && self.probe.is_locked(path) {
            attempts += 1;
            info!(
                "{} is in use. checks performed so far: {attempts} out of {max_attempts}. retrying",
                path.display()
            );
            thread::sleep(self.poll_interval);
        }

        let unlocked = attempts < max_attempts;
        debug!(path = %path.display(), attempts, unlocked, "finished waiting for file lock");
        unlocked
    }
}
