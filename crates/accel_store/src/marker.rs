//! Durable markers
//!
//! A marker is a single persistent slot that either exists (with some bytes)
//! or does not. The crash guard only cares about existence; the backend
//! preference stores a short token in it.

use crate::StoreError;
use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// A persistent flag that survives the process that wrote it.
///
/// Writes are atomic at the granularity of the whole marker: a reader sees
/// either the previous contents or the new ones.
pub trait DurableMarker {
    /// Whether the marker currently exists.
    fn exists(&self) -> bool;

    /// Reads up to `limit` bytes. `Ok(None)` means the marker is absent.
    fn read(&self, limit: usize) -> Result<Option<Vec<u8>>, StoreError>;

    /// Creates the marker, replacing any previous contents.
    fn write(&self, bytes: &[u8]) -> Result<(), StoreError>;

    /// Deletes the marker. Removing an absent marker succeeds.
    fn remove(&self) -> Result<(), StoreError>;
}

/// Marker backed by a single file at a host-supplied path.
#[derive(Debug, Clone)]
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DurableMarker for FileMarker {
    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn read(&self, limit: usize) -> Result<Option<Vec<u8>>, StoreError> {
        let file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut bytes = Vec::with_capacity(limit);
        file.take(limit as u64)
            .read_to_end(&mut bytes)
            .map_err(|source| StoreError::Read {
                path: self.path.clone(),
                source,
            })?;
        Ok(Some(bytes))
    }

    fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let to_error = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(to_error)?;
        }

        // Staged write plus rename: readers never observe a partial token.
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);
        fs::write(&staging, bytes).map_err(to_error)?;
        fs::rename(&staging, &self.path).map_err(to_error)
    }

    fn remove(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Remove {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    bytes: Option<Vec<u8>>,
    writes: usize,
    removes: usize,
    failing: bool,
}

/// Marker held in memory, shared between clones.
///
/// Stands in for a file when the host has nowhere to persist state, and lets
/// tests observe and sabotage marker traffic.
#[derive(Debug, Clone, Default)]
pub struct MemoryMarker {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryMarker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Number of successful removals so far.
    pub fn removes(&self) -> usize {
        self.state().removes
    }

    /// Makes every subsequent operation fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.state().failing = failing;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DurableMarker for MemoryMarker {
    fn exists(&self) -> bool {
        let state = self.state();
        !state.failing && state.bytes.is_some()
    }

    fn read(&self, limit: usize) -> Result<Option<Vec<u8>>, StoreError> {
        let state = self.state();
        if state.failing {
            return Err(StoreError::Unavailable);
        }
        Ok(state
            .bytes
            .as_ref()
            .map(|bytes| bytes[..bytes.len().min(limit)].to_vec()))
    }

    fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failing {
            return Err(StoreError::Unavailable);
        }
        state.bytes = Some(bytes.to_vec());
        state.writes += 1;
        Ok(())
    }

    fn remove(&self) -> Result<(), StoreError> {
        let mut state = self.state();
        if state.failing {
            return Err(StoreError::Unavailable);
        }
        state.bytes = None;
        state.removes += 1;
        Ok(())
    }
}
