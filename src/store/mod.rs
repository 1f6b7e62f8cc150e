//! Vector stores behind a uniform capability interface.
//!
//! The orchestrator only ever sees the [`VectorStore`] trait: connect,
//! write rows, delete rows by filter. Backends are selected by the closed
//! [`BackendKind`] tag set through [`VectorStoreFactory`], which dispatches
//! to a registered [`VectorStoreConnector`] per backend; an unknown tag,
//! or a known tag with no registered connector, fails at construction time.
//!
//! `add_texts` is *not* required to be idempotent. The orchestrator keeps
//! writes safe by deleting all rows for a document id before a from-scratch
//! run, never re-submitting indices below the resume offset, and pruning
//! rows at/after the safe offset when a run ends paused or failed.
//!
//! The in-process [`EmbeddedVectorStore`] ships in this crate and is
//! registered by default; relational and clustered engines plug in their
//! own connectors.

mod embedded;

pub use embedded::{EmbeddedConnector, EmbeddedVectorStore, StoredRow};

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::types::VectorStoreDescriptor;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("unknown vector-store backend '{backend}'")]
    #[diagnostic(
        code(vectorloom::store::unknown_backend),
        help("supported backends: embedded, relational, clustered")
    )]
    UnknownBackend { backend: String },

    #[error("no connector registered for backend '{backend}'")]
    #[diagnostic(code(vectorloom::store::unregistered_backend))]
    UnregisteredBackend { backend: String },

    #[error("vector store connection failed: {message}")]
    #[diagnostic(code(vectorloom::store::connection))]
    Connection { message: String },

    #[error("texts, embeddings, and metadatas must have equal lengths")]
    #[diagnostic(code(vectorloom::store::shape))]
    ShapeMismatch,

    #[error("embedding width {actual} does not match collection dimension {expected}")]
    #[diagnostic(code(vectorloom::store::dimension))]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store write failed: {message}")]
    #[diagnostic(code(vectorloom::store::write))]
    Write { message: String },

    #[error("vector store delete failed: {message}")]
    #[diagnostic(code(vectorloom::store::delete))]
    Delete { message: String },

    #[error("vector store search failed: {message}")]
    #[diagnostic(code(vectorloom::store::search))]
    Search { message: String },
}

/// One similarity-search result.
#[derive(Clone, Debug)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: serde_json::Value,
    pub score: f32,
}

/// Writes and deletes chunk rows in one collection of one backend.
///
/// The connection is owned by the run that created it; live connections are
/// never shared across runs.
///
/// Filters are JSON objects of metadata equality matches; a value of the
/// form `{"$gte": n}` matches numerically greater-or-equal instead, which
/// is how the orchestrator prunes rows at/after a safe offset.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Establish/verify the connection. `false` means cleanly unreachable.
    async fn connect(&self) -> Result<bool, StoreError>;

    /// Insert rows; embeddings are computed by the caller. Returns row ids.
    async fn add_texts(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<serde_json::Value>,
    ) -> Result<Vec<String>, StoreError>;

    /// Delete rows matching the filter; returns how many were removed.
    async fn delete_where(&self, filter: &serde_json::Value) -> Result<u64, StoreError>;

    /// Cosine-similarity search, optionally filtered.
    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&serde_json::Value>,
    ) -> Result<Vec<SearchHit>, StoreError>;
}

/// Closed set of supported backend tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// In-process/local engine.
    Embedded,
    /// Relational-extension engine (pgvector-style).
    Relational,
    /// Clustered engine (milvus-style).
    Clustered,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Embedded => "embedded",
            BackendKind::Relational => "relational",
            BackendKind::Clustered => "clustered",
        }
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "embedded" => Ok(BackendKind::Embedded),
            "relational" => Ok(BackendKind::Relational),
            "clustered" => Ok(BackendKind::Clustered),
            other => Err(StoreError::UnknownBackend {
                backend: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Builds a [`VectorStore`] for one backend from a task descriptor.
#[async_trait]
pub trait VectorStoreConnector: Send + Sync {
    async fn open(
        &self,
        descriptor: &VectorStoreDescriptor,
    ) -> Result<Arc<dyn VectorStore>, StoreError>;
}

/// Dispatches descriptors to per-backend connectors.
pub struct VectorStoreFactory {
    connectors: FxHashMap<BackendKind, Arc<dyn VectorStoreConnector>>,
}

impl VectorStoreFactory {
    /// Empty factory with no connectors.
    pub fn new() -> Self {
        Self {
            connectors: FxHashMap::default(),
        }
    }

    /// Factory with the in-process embedded engine registered.
    pub fn with_defaults() -> Self {
        let mut factory = Self::new();
        factory.register(BackendKind::Embedded, Arc::new(EmbeddedConnector::new()));
        factory
    }

    /// Register (or replace) the connector for a backend.
    pub fn register(&mut self, backend: BackendKind, connector: Arc<dyn VectorStoreConnector>) {
        self.connectors.insert(backend, connector);
    }

    /// Build a store for a descriptor.
    ///
    /// An unknown tag and a known-but-unregistered backend both fail here,
    /// before any run-side effect.
    pub async fn create(
        &self,
        descriptor: &VectorStoreDescriptor,
    ) -> Result<Arc<dyn VectorStore>, StoreError> {
        let kind = BackendKind::from_str(&descriptor.backend)?;
        let connector =
            self.connectors
                .get(&kind)
                .ok_or_else(|| StoreError::UnregisteredBackend {
                    backend: kind.as_str().to_string(),
                })?;
        connector.open(descriptor).await
    }
}

impl Default for VectorStoreFactory {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Whether a metadata document matches a filter object.
///
/// Each filter key must match: plain values by equality, `{"$gte": n}` by
/// numeric greater-or-equal.
pub(crate) fn matches_filter(metadata: &serde_json::Value, filter: &serde_json::Value) -> bool {
    let Some(conditions) = filter.as_object() else {
        return true;
    };
    conditions.iter().all(|(key, expected)| {
        let actual = metadata.get(key);
        match expected.as_object().and_then(|obj| obj.get("$gte")) {
            Some(bound) => match (actual.and_then(|v| v.as_f64()), bound.as_f64()) {
                (Some(value), Some(bound)) => value >= bound,
                _ => false,
            },
            None => actual == Some(expected),
        }
    })
}
