//! Scoped advisory file locks.
//!
//! [`FileLock`] owns the locked [`File`] and releases the lock when dropped,
//! so every exit path of a store operation (including `?` early returns)
//! unlocks the file.

use std::fs::File;
use std::io;
use std::ops::{Deref, DerefMut};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;

/// Delay between non-blocking attempts when waiting with a deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LockMode {
    Shared,
    Exclusive,
}

/// An advisory lock held on an open file for as long as the guard lives.
#[derive(Debug)]
pub(crate) struct FileLock {
    file: File,
    mode: LockMode,
}

impl FileLock {
    /// Take an exclusive lock, waiting until `deadline` (or forever when `None`).
    pub(crate) fn exclusive(file: File, deadline: Option<Instant>) -> io::Result<Self> {
        Self::acquire(file, LockMode::Exclusive, deadline)
    }

    /// Take a shared lock, waiting until `deadline` (or forever when `None`).
    pub(crate) fn shared(file: File, deadline: Option<Instant>) -> io::Result<Self> {
        Self::acquire(file, LockMode::Shared, deadline)
    }

    fn acquire(file: File, mode: LockMode, deadline: Option<Instant>) -> io::Result<Self> {
        match deadline {
            None => match mode {
                LockMode::Shared => FileExt::lock_shared(&file)?,
                LockMode::Exclusive => FileExt::lock_exclusive(&file)?,
            },
            Some(deadline) => poll_until(deadline, || {
                let attempt = match mode {
                    LockMode::Shared => FileExt::try_lock_shared(&file),
                    LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
                };
                match attempt {
                    Ok(()) => Ok(Some(())),
                    Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
                    Err(e) => Err(e),
                }
            })?,
        }
        Ok(Self { file, mode })
    }

    pub(crate) fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Deref for FileLock {
    type Target = File;

    fn deref(&self) -> &File {
        &self.file
    }
}

impl DerefMut for FileLock {
    fn deref_mut(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Retry `attempt` until it yields a value or `deadline` passes.
///
/// Fails with [`io::ErrorKind::TimedOut`] once the deadline is reached.
pub(crate) fn poll_until<T>(
    deadline: Instant,
    mut attempt: impl FnMut() -> io::Result<Option<T>>,
) -> io::Result<T> {
    loop {
        if let Some(value) = attempt()? {
            return Ok(value);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "lock wait deadline exceeded"));
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }
}
