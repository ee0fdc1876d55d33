//! Persisted lockfile pinning resolution and integrity across runs.
//!
//! The lockfile maps the original spec string of each plugin reference to
//! the concrete URL that was fetched and the integrity digest of its bytes.
//! It is read once at startup and flushed once at the very end of a run
//! (read-merge-write, never incremental append), so a crash mid-run loses
//! at most that run's updates and never corrupts the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, FetchResult};

/// One pinned resolution: the URL actually fetched for a spec, and the
/// integrity digest of the fetched bytes.
///
/// Once written, the entry for a spec is authoritative: a re-run with the
/// same spec re-verifies against it instead of re-resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    /// Concrete URL the artifact was fetched from.
    pub resolved: String,
    /// Self-describing digest of the fetched bytes (`sha512-<base64>`).
    pub integrity: String,
}

/// In-memory lockfile with a single end-of-run flush.
///
/// Safe for concurrent workers: `get`/`put` go through an internal mutex.
/// Entries are kept in a `BTreeMap` so the flushed JSON is deterministically
/// ordered.
#[derive(Debug)]
pub struct Lockfile {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, LockEntry>>,
}

impl Lockfile {
    /// Load the lockfile at `path`, failing soft.
    ///
    /// A missing or unparsable file yields an empty mapping; the first run
    /// has no lockfile and that must never be fatal.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, LockEntry>>(&raw) {
                Ok(entries) => {
                    tracing::debug!(
                        path = %path.display(),
                        entries = entries.len(),
                        "loaded lockfile"
                    );
                    entries
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "lockfile is unparsable, starting from an empty one"
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    /// Look up the pinned entry for a spec string.
    pub fn get(&self, spec: &str) -> Option<LockEntry> {
        self.entries.lock().get(spec).cloned()
    }

    /// Stage an entry in memory. Durable only after [`flush`](Self::flush).
    pub fn put(&self, spec: impl Into<String>, entry: LockEntry) {
        self.entries.lock().insert(spec.into(), entry);
    }

    /// Number of staged entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Path this lockfile loads from and flushes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize the full mapping as pretty-printed JSON.
    ///
    /// Called exactly once per run, after every wave has finished, so
    /// successful resolutions persist even when a later reference failed.
    pub fn flush(&self) -> FetchResult<()> {
        let entries = self.entries.lock();
        let json = serde_json::to_string_pretty(&*entries).map_err(|e| {
            FetchError::ManifestInvalid {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })?;
        fs::write(&self.path, json).map_err(|e| FetchError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })?;
        tracing::debug!(
            path = %self.path.display(),
            entries = entries.len(),
            "flushed lockfile"
        );
        Ok(())
    }
}

/// Derive the lockfile path for a root manifest: a sibling file named
/// `theia-plugin-lock.json`.
pub fn lockfile_path(manifest_path: &Path) -> PathBuf {
    manifest_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("theia-plugin-lock.json")
}
