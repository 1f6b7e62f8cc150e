//! Core identifiers and descriptor types for the ingestion pipeline.
//!
//! This module defines the vocabulary shared by every component: task and
//! document identifiers, the task lifecycle enum, and the descriptors that
//! tell a run where its file lives, how to chunk it, which embedding
//! provider to use, and which vector-store backend to write into.
//!
//! Descriptors are plain serde-friendly data. Interpreting them (and
//! rejecting unknown provider/backend tags) is the job of the factories in
//! [`crate::embed`] and [`crate::store`], which validate at construction
//! time rather than deferring to a mid-run failure.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an ingestion task.
///
/// A run moves `NotStarted → Pending → Processing` and ends in one of
/// `Processed`, `Failed`, `Paused`, or `Cancelled`. `Paused` tasks re-enter
/// `Pending` when the external dispatcher re-submits them with the persisted
/// offset; `Processed` and `Failed` are terminal for the run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    NotStarted,
    Pending,
    Processing,
    Paused,
    Processed,
    Failed,
    Cancelled,
}

impl TaskState {
    /// Encode into the persisted string form used in liveness records.
    #[must_use]
    pub fn encode(&self) -> &'static str {
        match self {
            TaskState::NotStarted => "not_started",
            TaskState::Pending => "pending",
            TaskState::Processing => "processing",
            TaskState::Paused => "paused",
            TaskState::Processed => "processed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }

    /// Decode a persisted string form; `None` for unrecognized input.
    pub fn decode(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(TaskState::NotStarted),
            "pending" => Some(TaskState::Pending),
            "processing" => Some(TaskState::Processing),
            "paused" => Some(TaskState::Paused),
            "processed" => Some(TaskState::Processed),
            "failed" => Some(TaskState::Failed),
            "cancelled" => Some(TaskState::Cancelled),
            _ => None,
        }
    }

    /// Returns `true` for states no further run activity can leave.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Processed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Unique identifier of one ingestion task (one dispatch attempt).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of the document a task ingests.
///
/// Chunk rows in the vector store are keyed by `(document id, chunk index)`;
/// all idempotence guarantees (fresh-start delete, resume-offset filtering,
/// pause-time pruning) are scoped to one document id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub i64);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the document's source file.
///
/// The `uri` is either a bare filesystem path (no scheme, resolved locally)
/// or a scheme-qualified remote reference (`https://…`, `oss://…`) handled
/// by the fetcher registered for that scheme in [`crate::files`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub uri: String,
    /// Declared content type ("txt", "md", …); drives parser dispatch.
    pub declared_type: String,
    /// Display name carried into chunk metadata; falls back to the uri.
    #[serde(default)]
    pub filename: Option<String>,
}

impl FileReference {
    pub fn new(uri: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            declared_type: declared_type.into(),
            filename: None,
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Remote scheme of the uri, if any. A bare path and `file://` are local.
    #[must_use]
    pub fn scheme(&self) -> Option<&str> {
        self.uri
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .filter(|scheme| *scheme != "file")
    }

    #[must_use]
    pub fn is_remote(&self) -> bool {
        self.scheme().is_some()
    }

    /// Filesystem path for a local reference (strips a `file://` prefix).
    #[must_use]
    pub fn local_path(&self) -> &str {
        self.uri.strip_prefix("file://").unwrap_or(&self.uri)
    }

    /// Source label recorded in chunk metadata.
    #[must_use]
    pub fn source_label(&self) -> &str {
        self.scheme().unwrap_or("local")
    }

    /// Name carried into chunk metadata.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.filename.as_deref().unwrap_or(&self.uri)
    }
}

/// Sliding-window chunking parameters.
///
/// Validity (`chunk_size > 0`, `overlap < chunk_size`) is enforced by the
/// orchestrator before any I/O and again by [`crate::parse::chunk`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ParseParams {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 100,
        }
    }
}

/// Which embedding provider and model a run uses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingDescriptor {
    /// Provider tag; must parse as a [`crate::embed::ProviderKind`].
    pub provider: String,
    pub model: String,
    /// Expected vector width; provider responses are checked against it.
    pub dimension: usize,
}

/// Which vector-store backend a run writes into.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStoreDescriptor {
    /// Backend tag; must parse as a [`crate::store::BackendKind`].
    pub backend: String,
    /// Backend-specific connection settings, passed through opaquely.
    #[serde(default)]
    pub connection: serde_json::Value,
    pub collection: String,
    pub dimension: usize,
    #[serde(default = "default_index_kind")]
    pub index_kind: String,
}

fn default_index_kind() -> String {
    "hnsw".to_string()
}

/// Credentials for fetching a remote object reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCredentials {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
}

/// Status values carried on progress callbacks to the system of record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Processing,
    Processed,
    Failed,
    Paused,
    Cancelled,
}

impl ProgressStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Processing => "processing",
            ProgressStatus::Processed => "processed",
            ProgressStatus::Failed => "failed",
            ProgressStatus::Paused => "paused",
            ProgressStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
