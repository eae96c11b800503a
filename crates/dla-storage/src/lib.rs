//! File-backed checkpoint persistence for DLA history stores.
//!
//! A checkpoint is the whole [`History`] encoded with [`dla_core::codec`].
//! Saves write a sibling temp file, sync it, and rename it over the target, so
//! a reader only ever sees the previous complete checkpoint or the new one.

use dla_core::{History, HistoryError};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Storage error wrapper.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("checkpoint I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Summary of a completed save.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveReport {
    pub records: usize,
    pub bytes: usize,
    pub last_key: Option<u64>,
}

/// Single checkpoint file holding an entire history store.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Binds the store to `path`, creating missing parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            info!(dir = %parent.display(), "creating checkpoint directory");
            fs::create_dir_all(parent).map_err(|err| StorageError::io(parent, err))?;
        }
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Replaces the checkpoint with `history`.
    pub fn save(&self, history: &History) -> Result<SaveReport, StorageError> {
        let started = Instant::now();
        let bytes = history.serialize();
        let temp = self.temp_path();
        {
            let mut file = File::create(&temp).map_err(|err| StorageError::io(&temp, err))?;
            file.write_all(&bytes).map_err(|err| StorageError::io(&temp, err))?;
            file.sync_all().map_err(|err| StorageError::io(&temp, err))?;
        }
        fs::rename(&temp, &self.path).map_err(|err| StorageError::io(&self.path, err))?;

        let report = SaveReport {
            records: history.len(),
            bytes: bytes.len(),
            last_key: history.last_key(),
        };
        info!(
            path = %self.path.display(),
            records = report.records,
            bytes = report.bytes,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "saved checkpoint"
        );
        Ok(report)
    }

    /// Reads and fully validates the checkpoint.
    pub fn load(&self) -> Result<History, StorageError> {
        Self::read(&self.path)
    }

    /// Reads and validates the checkpoint at `path`; never creates directories.
    pub fn read(path: &Path) -> Result<History, StorageError> {
        let bytes = fs::read(path).map_err(|err| StorageError::io(path, err))?;
        let history = History::deserialize(&bytes)?;
        debug!(
            path = %path.display(),
            records = history.len(),
            "loaded checkpoint"
        );
        Ok(history)
    }

    /// Loads the checkpoint, or an empty history if none has been written yet.
    pub fn load_or_default(&self) -> Result<History, StorageError> {
        if self.exists() {
            self.load()
        } else {
            Ok(History::new())
        }
    }
}
