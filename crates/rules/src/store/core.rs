//! Core [`RuleStore`] struct: file-backed routing rules with locked rewrites.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

use gateway_core::RoutingRulesConfig;
use tracing::{debug, info, warn};

use crate::rule::{RoutingRule, NAME_KEY};

use super::codec::{decode_rules, encode_rules, DecodeError};
use super::error::{Result, StoreError};
use super::lock::{poll_until, FileLock};

/// File-backed store for an ordered set of routing rules.
///
/// The backing file is a YAML document stream, one rule per document. The
/// store keeps no copy of the rules: every call goes to disk.
///
/// Readers take a shared advisory lock and writers an exclusive one, so
/// cooperating processes never observe a half-rewritten file. Within one
/// process, updates are additionally serialized through `writer` before the
/// file lock is requested.
#[derive(Debug)]
pub struct RuleStore {
    /// Rules file, created and populated outside the store.
    path: PathBuf,
    /// Serializes read-modify-write cycles between threads of this process.
    writer: Mutex<()>,
    /// Bound on lock waits. `None` blocks indefinitely.
    lock_timeout: Option<Duration>,
}

impl RuleStore {
    /// Create a store over `path`. No I/O happens until the first call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
            lock_timeout: None,
        }
    }

    /// Create a store from the routing rules section of the gateway config.
    pub fn from_config(config: &RoutingRulesConfig) -> Self {
        let store = Self::new(config.rules_config_path.clone());
        match config.lock_timeout() {
            Some(timeout) => store.with_lock_timeout(timeout),
            None => store,
        }
    }

    /// Fail with [`StoreError::LockTimeout`] instead of blocking past `timeout`.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout
    }

    /// Read every rule in the file, in document order.
    ///
    /// Either the complete rule set is returned or an error; never a prefix.
    pub fn list(&self) -> Result<Vec<RoutingRule>> {
        let deadline = self.deadline();
        let file = File::open(&self.path).map_err(|e| self.io_error(e))?;
        let mut lock = FileLock::shared(file, deadline).map_err(|e| self.lock_error(e))?;
        let content = read_all(&mut lock).map_err(|e| self.io_error(e))?;
        drop(lock);

        let rules = self.decode(&content)?;
        debug!(path = %self.path.display(), count = rules.len(), "listed routing rules");
        Ok(rules)
    }

    /// Replace every rule named `updated.name` and rewrite the file.
    ///
    /// The whole read, substitute, write cycle runs under the in-process
    /// writer mutex and an exclusive file lock. The new content is encoded in
    /// memory and decoded again before the file is touched, so a parse or
    /// encode failure leaves the file as it was. When no rule matches, the
    /// current rules are returned and the file is not rewritten.
    pub fn update_by_name(&self, updated: RoutingRule) -> Result<Vec<RoutingRule>> {
        if updated.name.is_empty() {
            return Err(StoreError::Validation(
                "routing rule name must not be empty".to_string(),
            ));
        }
        if updated.payload.contains_key(NAME_KEY) {
            return Err(StoreError::Validation(format!(
                "routing rule '{}' carries a second `name` key in its payload",
                updated.name
            )));
        }

        let deadline = self.deadline();
        let _writer = self.acquire_writer(deadline)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        let mut lock = FileLock::exclusive(file, deadline).map_err(|e| self.lock_error(e))?;
        debug!(path = %self.path.display(), mode = ?lock.mode(), "acquired routing rules lock");

        let content = read_all(&mut lock).map_err(|e| self.io_error(e))?;
        let current = self.decode(&content)?;

        let mut matched = 0usize;
        let rules: Vec<RoutingRule> = current
            .into_iter()
            .map(|rule| {
                if rule.name == updated.name {
                    matched += 1;
                    updated.clone()
                } else {
                    rule
                }
            })
            .collect();

        if matched == 0 {
            debug!(path = %self.path.display(), rule = %updated.name, "no routing rule matched, file left unchanged");
            return Ok(rules);
        }

        let encoded = encode_rules(&rules).map_err(|source| StoreError::Encode {
            path: self.path.clone(),
            source,
        })?;
        check_decodable(&self.path, &encoded)?;
        overwrite(&mut lock, encoded.as_bytes()).map_err(|e| self.io_error(e))?;

        info!(
            path = %self.path.display(),
            rule = %updated.name,
            matched,
            count = rules.len(),
            "rewrote routing rules"
        );
        Ok(rules)
    }

    fn deadline(&self) -> Option<Instant> {
        self.lock_timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Take the in-process writer mutex, honouring the lock deadline.
    ///
    /// A poisoned mutex guards no data, so it is simply taken over.
    fn acquire_writer(&self, deadline: Option<Instant>) -> Result<MutexGuard<'_, ()>> {
        let Some(deadline) = deadline else {
            return Ok(self.writer.lock().unwrap_or_else(PoisonError::into_inner));
        };
        poll_until(deadline, || match self.writer.try_lock() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::Poisoned(poisoned)) => Ok(Some(poisoned.into_inner())),
            Err(TryLockError::WouldBlock) => Ok(None),
        })
        .map_err(|e| self.lock_error(e))
    }

    fn decode(&self, content: &[u8]) -> Result<Vec<RoutingRule>> {
        decode_rules(content).map_err(|DecodeError { document, source }| StoreError::Parse {
            path: self.path.clone(),
            document,
            source,
        })
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn lock_error(&self, source: io::Error) -> StoreError {
        match (source.kind(), self.lock_timeout) {
            (io::ErrorKind::TimedOut, Some(timeout)) => {
                warn!(path = %self.path.display(), ?timeout, "timed out waiting for routing rules lock");
                StoreError::LockTimeout {
                    path: self.path.clone(),
                    timeout,
                }
            }
            _ => self.io_error(source),
        }
    }
}

/// Refuse to write a buffer that the store could not read back.
pub(super) fn check_decodable(path: &Path, encoded: &str) -> Result<()> {
    decode_rules(encoded.as_bytes())
        .map(drop)
        .map_err(|DecodeError { source, .. }| StoreError::Encode {
            path: path.to_path_buf(),
            source,
        })
}

fn read_all(file: &mut File) -> io::Result<Vec<u8>> {
    let mut content = Vec::new();
    file.read_to_end(&mut content)?;
    Ok(content)
}

/// Replace the file's content with `bytes` and flush it to disk.
fn overwrite(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(bytes)?;
    file.set_len(bytes.len() as u64)?;
    file.sync_all()
}
