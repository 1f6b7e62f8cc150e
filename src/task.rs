//! The dispatcher-facing task descriptor.

use serde::{Deserialize, Serialize};

use crate::types::{
    DocumentId, EmbeddingDescriptor, FileReference, ParseParams, RemoteCredentials, TaskId,
    TaskState, VectorStoreDescriptor,
};

/// Everything one ingestion run needs, as handed over by the external
/// dispatcher.
///
/// Only `status`, `offset`, and `failure_reason` mutate after creation, and
/// only the [`DocumentProcessor`](crate::processor::DocumentProcessor)
/// mutates them. The offset is a *count of confirmed-stored chunks*: a task
/// re-dispatched with `offset = k` skips chunk indices `< k` entirely and
/// the final stored set is identical to a from-scratch run.
///
/// # Examples
///
/// ```
/// use vectorloom::task::IngestionTask;
/// use vectorloom::types::*;
///
/// let task = IngestionTask::new(
///     TaskId::new("task-1"),
///     DocumentId(42),
///     FileReference::new("/tmp/report.txt", "txt"),
///     ParseParams { chunk_size: 1000, overlap: 100 },
///     EmbeddingDescriptor {
///         provider: "openai".into(),
///         model: "text-embedding-3-small".into(),
///         dimension: 1536,
///     },
///     VectorStoreDescriptor {
///         backend: "embedded".into(),
///         connection: serde_json::Value::Null,
///         collection: "docs".into(),
///         dimension: 1536,
///         index_kind: "hnsw".into(),
///     },
/// );
/// assert_eq!(task.offset, 0);
/// assert_eq!(task.status, TaskState::NotStarted);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestionTask {
    pub task_id: TaskId,
    pub doc_id: DocumentId,
    pub file: FileReference,
    pub parse_params: ParseParams,
    pub embedding: EmbeddingDescriptor,
    pub vector_store: VectorStoreDescriptor,
    #[serde(default)]
    pub credentials: Option<RemoteCredentials>,
    /// Resume offset: number of chunks already confirmed stored.
    #[serde(default)]
    pub offset: usize,
    /// Total chunk count, filled in once a run has derived the sequence.
    #[serde(default)]
    pub chunk_count: Option<usize>,
    /// Worker-pool width for the embed+store step. `0` means "use the
    /// configured default".
    #[serde(default)]
    pub parallelism: usize,
    #[serde(default)]
    pub kb_id: Option<String>,
    #[serde(default)]
    pub upload_time: Option<String>,
    #[serde(default)]
    pub uploader_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: TaskState,
    #[serde(default)]
    pub failure_reason: Option<String>,
}

fn default_status() -> TaskState {
    TaskState::NotStarted
}

impl IngestionTask {
    pub fn new(
        task_id: TaskId,
        doc_id: DocumentId,
        file: FileReference,
        parse_params: ParseParams,
        embedding: EmbeddingDescriptor,
        vector_store: VectorStoreDescriptor,
    ) -> Self {
        Self {
            task_id,
            doc_id,
            file,
            parse_params,
            embedding,
            vector_store,
            credentials: None,
            offset: 0,
            chunk_count: None,
            parallelism: 0,
            kb_id: None,
            upload_time: None,
            uploader_id: None,
            status: TaskState::NotStarted,
            failure_reason: None,
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: RemoteCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    #[must_use]
    pub fn with_kb_id(mut self, kb_id: impl Into<String>) -> Self {
        self.kb_id = Some(kb_id.into());
        self
    }
}
