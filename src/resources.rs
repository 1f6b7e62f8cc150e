//! Scoped lifecycle management for temporary files.
//!
//! Every file fetched for a run is registered here, and a [`ResourceScope`]
//! guard wraps the run so registered files are deleted on every exit path
//! (normal completion, error return, or cancellation). Deletion is idempotent:
//! a file that is already gone is not an error.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::config::WorkerConfig;

#[derive(Debug, Error, Diagnostic)]
pub enum ResourceError {
    #[error("failed to prepare temp directory {path}: {source}")]
    #[diagnostic(code(vectorloom::resources::temp_dir))]
    TempDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to inspect {path}: {source}")]
    #[diagnostic(code(vectorloom::resources::inspect))]
    Inspect {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is {size} bytes, over the {limit}-byte limit")]
    #[diagnostic(code(vectorloom::resources::oversize))]
    Oversize { path: PathBuf, size: u64, limit: u64 },
}

/// Shared registry of temp files owned by the current process.
///
/// Cheap to clone; clones share the registry. Access goes through the
/// manager only; there is no other process-wide mutable state for files.
#[derive(Clone)]
pub struct ResourceManager {
    inner: Arc<ResourceInner>,
}

struct ResourceInner {
    temp_dir: PathBuf,
    max_file_size: u64,
    auto_cleanup: bool,
    files: Mutex<FxHashSet<PathBuf>>,
}

impl ResourceManager {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                temp_dir: config.temp_dir.clone(),
                max_file_size: config.max_temp_file_size,
                auto_cleanup: config.auto_cleanup_temp_files,
                files: Mutex::new(FxHashSet::default()),
            }),
        }
    }

    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.inner.temp_dir
    }

    #[must_use]
    pub fn max_file_size(&self) -> u64 {
        self.inner.max_file_size
    }

    /// Create the temp directory if needed and return its path.
    pub fn ensure_temp_dir(&self) -> Result<PathBuf, ResourceError> {
        std::fs::create_dir_all(&self.inner.temp_dir).map_err(|source| {
            ResourceError::TempDir {
                path: self.inner.temp_dir.clone(),
                source,
            }
        })?;
        Ok(self.inner.temp_dir.clone())
    }

    /// Track a temp file for cleanup.
    pub fn register_temp_file(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        tracing::debug!(path = %path.display(), "registered temp file");
        self.inner.files.lock().insert(path);
    }

    /// Stop tracking a file without deleting it. Returns whether it was
    /// tracked.
    pub fn unregister_temp_file(&self, path: &Path) -> bool {
        self.inner.files.lock().remove(path)
    }

    /// Delete one tracked file. Missing files count as cleaned.
    pub fn cleanup_file(&self, path: &Path) -> bool {
        self.unregister_temp_file(path);
        match std::fs::remove_file(path) {
            Ok(()) => true,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "temp file cleanup failed");
                false
            }
        }
    }

    /// Delete every tracked file; returns how many were cleaned.
    pub fn cleanup_all(&self) -> usize {
        let files: Vec<PathBuf> = self.inner.files.lock().drain().collect();
        let total = files.len();
        let cleaned = files.iter().filter(|p| self.cleanup_file(p)).count();
        if total > 0 {
            tracing::debug!(cleaned, total, "temp files cleaned");
        }
        cleaned
    }

    /// Number of currently tracked files.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.inner.files.lock().len()
    }

    /// Verify a file is within the configured size limit; returns its size.
    pub fn check_size(&self, path: &Path) -> Result<u64, ResourceError> {
        let meta = std::fs::metadata(path).map_err(|source| ResourceError::Inspect {
            path: path.to_path_buf(),
            source,
        })?;
        let size = meta.len();
        if size > self.inner.max_file_size {
            return Err(ResourceError::Oversize {
                path: path.to_path_buf(),
                size,
                limit: self.inner.max_file_size,
            });
        }
        Ok(size)
    }

    /// Open a cleanup scope. When the returned guard drops, on any exit
    /// path of the enclosing operation, all tracked files are cleaned.
    #[must_use]
    pub fn scope(&self) -> ResourceScope {
        ResourceScope {
            manager: self.clone(),
        }
    }
}

/// RAII guard returned by [`ResourceManager::scope`].
pub struct ResourceScope {
    manager: ResourceManager,
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        if self.manager.inner.auto_cleanup {
            self.manager.cleanup_all();
        }
    }
}
