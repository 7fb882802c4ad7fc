//! Crash-safe JSON documents guarded by a cross-process advisory lock.
//!
//! Every operation takes an exclusive lock on a sibling `<path>.lock` file, so
//! readers and writers of one document serialize across all processes sharing
//! the state directory. Writes go to a temp file in the same directory and are
//! renamed over the target, so readers only ever see a complete document.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{DevkitError, Result};

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What to do when a document exists but does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptStatePolicy {
    /// Log a warning and behave as if the document were absent.
    #[default]
    TreatAsEmpty,
    /// Surface [`DevkitError::CorruptState`].
    Fail,
}

#[derive(Debug, Clone)]
pub struct AtomicJsonStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    corrupt_policy: CorruptStatePolicy,
}

/// Held for the duration of one store operation; unlocks on drop.
struct LockGuard {
    file: File,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl AtomicJsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = OsString::from(path.as_os_str());
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            corrupt_policy: CorruptStatePolicy::default(),
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptStatePolicy) -> Self {
        self.corrupt_policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Read the document, or `default` if it does not exist.
    pub fn read<T: DeserializeOwned>(&self, default: T) -> Result<T> {
        let _guard = self.lock()?;
        self.read_locked(default)
    }

    /// Replace the document with `value`.
    pub fn write<T: Serialize>(&self, value: &T) -> Result<()> {
        let _guard = self.lock()?;
        self.write_locked(value)
    }

    /// Read, mutate and write back while holding the lock for the whole cycle.
    ///
    /// If `mutate` returns an error nothing is written.
    pub fn update<T, R, F>(&self, default: T, mutate: F) -> Result<R>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T) -> Result<R>,
    {
        let _guard = self.lock()?;
        let mut value = self.read_locked(default)?;
        let output = mutate(&mut value)?;
        self.write_locked(&value)?;
        Ok(output)
    }

    /// Write `seed()` if the document does not exist yet. Returns whether it wrote.
    pub fn initialize_with<T, F>(&self, seed: F) -> Result<bool>
    where
        T: Serialize,
        F: FnOnce() -> T,
    {
        let _guard = self.lock()?;
        if self.path.exists() {
            return Ok(false);
        }
        self.write_locked(&seed())?;
        Ok(true)
    }

    fn lock(&self) -> Result<LockGuard> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent)
            .map_err(|err| DevkitError::io("create directory", parent, err))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|err| DevkitError::io("open lock file", &self.lock_path, err))?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(LockGuard { file }),
                Err(err) if err.kind() == fs2::lock_contended_error().kind() => {
                    let waited = started.elapsed();
                    if waited >= self.lock_timeout {
                        warn!(lock = %self.lock_path.display(), waited_ms = waited.as_millis() as u64, "lock wait timed out");
                        return Err(DevkitError::LockTimeout {
                            path: self.lock_path.clone(),
                            timeout: self.lock_timeout,
                        });
                    }
                    thread::sleep(LOCK_POLL_INTERVAL.min(self.lock_timeout - waited));
                }
                Err(err) => return Err(DevkitError::io("lock", &self.lock_path, err)),
            }
        }
    }

    fn read_locked<T: DeserializeOwned>(&self, default: T) -> Result<T> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "state document missing, using default");
                return Ok(default);
            }
            Err(err) => return Err(DevkitError::io("read", &self.path, err)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(value),
            Err(source) => match self.corrupt_policy {
                CorruptStatePolicy::TreatAsEmpty => {
                    warn!(path = %self.path.display(), error = %source, "state document is corrupt, treating as empty");
                    Ok(default)
                }
                CorruptStatePolicy::Fail => Err(DevkitError::CorruptState {
                    path: self.path.clone(),
                    source,
                }),
            },
        }
    }

    fn write_locked<T: Serialize>(&self, value: &T) -> Result<()> {
        let parent = self.parent_dir();
        fs::create_dir_all(parent)
            .map_err(|err| DevkitError::io("create directory", parent, err))?;
        let prefix = self
            .path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("state"));

        // Dropping `tmp` on any early return removes the temp file.
        let mut tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|err| DevkitError::io("create temp file in", parent, err))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, value)?;
            writer
                .write_all(b"\n")
                .and_then(|()| writer.flush())
                .map_err(|err| DevkitError::io("write temp file for", &self.path, err))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|err| DevkitError::io("sync temp file for", &self.path, err))?;
        tmp.persist(&self.path)
            .map_err(|err| DevkitError::io("replace", &self.path, err.error))?;
        debug!(path = %self.path.display(), "state document written");
        Ok(())
    }

    fn parent_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }
}
