//! File acquisition: resolving a document reference to a local file.
//!
//! A [`FileReference`] is either a bare filesystem path (validated and
//! returned unchanged) or a scheme-qualified remote reference, fetched into
//! a [`ResourceManager`]-tracked temp file by the [`ObjectFetcher`]
//! registered for the scheme. An HTTP(S) fetcher ships in this crate;
//! object-store schemes plug in their own.
//!
//! All failures are fatal to the current attempt. Retry policy, if any,
//! belongs to the external dispatcher.

mod http;

pub use http::HttpObjectFetcher;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::resources::{ResourceError, ResourceManager};
use crate::types::{FileReference, RemoteCredentials};

#[derive(Debug, Error, Diagnostic)]
pub enum FileError {
    #[error("object not found: {uri}")]
    #[diagnostic(code(vectorloom::files::not_found))]
    NotFound { uri: String },

    #[error("access to {uri} rejected")]
    #[diagnostic(code(vectorloom::files::access_denied))]
    AccessDenied { uri: String },

    #[error("network failure fetching {uri}: {message}")]
    #[diagnostic(code(vectorloom::files::network))]
    Network { uri: String, message: String },

    #[error("no fetcher registered for scheme '{scheme}'")]
    #[diagnostic(
        code(vectorloom::files::unsupported_scheme),
        help("register an ObjectFetcher for this scheme on the FileManager")
    )]
    UnsupportedScheme { scheme: String },

    #[error("{uri} exceeds the size limit ({size} > {limit} bytes)")]
    #[diagnostic(code(vectorloom::files::too_large))]
    TooLarge { uri: String, size: u64, limit: u64 },

    #[error("local i/o failure for {uri}: {message}")]
    #[diagnostic(code(vectorloom::files::io))]
    Io { uri: String, message: String },
}

/// Fetches a remote object into a local destination file.
///
/// One fetcher is registered per URI scheme. Implementations map their
/// backend's failure modes onto the [`FileError`] taxonomy: missing object,
/// rejected credentials, and transport failure are the three fatal cases
/// the orchestrator distinguishes.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(
        &self,
        reference: &FileReference,
        credentials: Option<&RemoteCredentials>,
        dest: &Path,
    ) -> Result<(), FileError>;
}

/// Resolves file references to local readable files.
pub struct FileManager {
    resources: ResourceManager,
    fetchers: FxHashMap<String, Arc<dyn ObjectFetcher>>,
}

impl FileManager {
    /// Build a manager with the HTTP(S) fetcher pre-registered.
    pub fn new(resources: ResourceManager) -> Self {
        let mut manager = Self {
            resources,
            fetchers: FxHashMap::default(),
        };
        let http = Arc::new(HttpObjectFetcher::new());
        manager.register_fetcher("http", http.clone());
        manager.register_fetcher("https", http);
        manager
    }

    /// Register (or replace) the fetcher for a URI scheme.
    pub fn register_fetcher(&mut self, scheme: impl Into<String>, fetcher: Arc<dyn ObjectFetcher>) {
        self.fetchers.insert(scheme.into(), fetcher);
    }

    /// Resolve a reference to a local path.
    ///
    /// Local references are validated (existence, size) and returned
    /// unchanged; remote references are fetched into a tracked temp file
    /// and size-checked after download.
    pub async fn resolve(
        &self,
        reference: &FileReference,
        credentials: Option<&RemoteCredentials>,
    ) -> Result<PathBuf, FileError> {
        match reference.scheme() {
            None => self.resolve_local(reference),
            Some(scheme) => self.fetch_remote(scheme, reference, credentials).await,
        }
    }

    fn resolve_local(&self, reference: &FileReference) -> Result<PathBuf, FileError> {
        let path = PathBuf::from(reference.local_path());
        if !path.exists() {
            return Err(FileError::NotFound {
                uri: reference.uri.clone(),
            });
        }
        self.check_size(&path, reference)?;
        tracing::debug!(path = %path.display(), "using local file");
        Ok(path)
    }

    async fn fetch_remote(
        &self,
        scheme: &str,
        reference: &FileReference,
        credentials: Option<&RemoteCredentials>,
    ) -> Result<PathBuf, FileError> {
        let fetcher = self
            .fetchers
            .get(scheme)
            .ok_or_else(|| FileError::UnsupportedScheme {
                scheme: scheme.to_string(),
            })?;

        let temp_dir = self
            .resources
            .ensure_temp_dir()
            .map_err(|err| io_error(reference, err))?;
        let dest = temp_dir.join(temp_file_name(reference));

        fetcher.fetch(reference, credentials, &dest).await?;
        self.resources.register_temp_file(&dest);

        if let Err(err) = self.check_size(&dest, reference) {
            self.resources.cleanup_file(&dest);
            return Err(err);
        }

        tracing::info!(
            uri = %reference.uri,
            dest = %dest.display(),
            "remote object fetched"
        );
        Ok(dest)
    }

    fn check_size(&self, path: &Path, reference: &FileReference) -> Result<(), FileError> {
        match self.resources.check_size(path) {
            Ok(_) => Ok(()),
            Err(ResourceError::Oversize { size, limit, .. }) => Err(FileError::TooLarge {
                uri: reference.uri.clone(),
                size,
                limit,
            }),
            Err(err) => Err(io_error(reference, err)),
        }
    }
}

fn io_error(reference: &FileReference, err: impl std::fmt::Display) -> FileError {
    FileError::Io {
        uri: reference.uri.clone(),
        message: err.to_string(),
    }
}

fn temp_file_name(reference: &FileReference) -> String {
    let ext = reference
        .uri
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && !ext.contains('/'));
    match ext {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;

    #[tokio::test]
    async fn local_file_resolves_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, "hello").unwrap();

        let rm = ResourceManager::new(&WorkerConfig::default().with_temp_dir(dir.path()));
        let fm = FileManager::new(rm);
        let reference = FileReference::new(file.to_string_lossy(), "txt");
        let resolved = fm.resolve(&reference, None).await.unwrap();
        assert_eq!(resolved, file);
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let rm = ResourceManager::new(&WorkerConfig::default().with_temp_dir(dir.path()));
        let fm = FileManager::new(rm);
        let reference = FileReference::new("/definitely/not/here.txt", "txt");
        assert!(matches!(
            fm.resolve(&reference, None).await,
            Err(FileError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_scheme_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let rm = ResourceManager::new(&WorkerConfig::default().with_temp_dir(dir.path()));
        let fm = FileManager::new(rm);
        let reference = FileReference::new("oss://bucket/key.txt", "txt");
        assert!(matches!(
            fm.resolve(&reference, None).await,
            Err(FileError::UnsupportedScheme { .. })
        ));
    }
}
