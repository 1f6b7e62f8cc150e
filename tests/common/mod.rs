//! Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::MockServer;
use serde_json::Value;

use vectorloom::config::WorkerConfig;
use vectorloom::context::WorkerContext;
use vectorloom::embed::{EmbedderFactory, ProviderKind, ProviderSettings};
use vectorloom::parse::ParserRegistry;
use vectorloom::progress::{ChannelProgressTransport, ProgressUpdate};
use vectorloom::state::{MemoryStateStore, TaskStateManager};
use vectorloom::store::{
    BackendKind, EmbeddedVectorStore, SearchHit, StoreError, VectorStore, VectorStoreConnector,
    VectorStoreFactory,
};
use vectorloom::task::IngestionTask;
use vectorloom::types::{
    DocumentId, EmbeddingDescriptor, FileReference, ParseParams, TaskId, VectorStoreDescriptor,
};

/// Embedding width used across the scenario suites.
pub const DIM: usize = 4;

/// Mock Ollama endpoint answering every `/api/embed` call with one
/// DIM-wide vector (the worker embeds one chunk per call).
pub async fn embed_mock() -> MockServer {
    let server = MockServer::start_async().await;
    let vector: Vec<f32> = (0..DIM).map(|i| (i as f32 + 1.0) / 10.0).collect();
    server
        .mock_async(move |when, then| {
            when.method(httpmock::Method::POST).path("/api/embed");
            then.status(200)
                .json_body(serde_json::json!({ "embeddings": [vector] }));
        })
        .await;
    server
}

/// Factory with only the ollama provider, pointed at a mock server.
pub fn ollama_embedders(base_url: &str) -> EmbedderFactory {
    let mut factory = EmbedderFactory::new();
    factory.configure(ProviderKind::Ollama, ProviderSettings::new(base_url));
    factory
}

/// Connector handing out one pre-built store, so tests keep a handle to the
/// rows a run writes.
pub struct FixedConnector {
    store: Arc<dyn VectorStore>,
}

impl FixedConnector {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl VectorStoreConnector for FixedConnector {
    async fn open(
        &self,
        _descriptor: &VectorStoreDescriptor,
    ) -> Result<Arc<dyn VectorStore>, StoreError> {
        Ok(self.store.clone())
    }
}

/// Per-index behavior injected into a run's store calls.
#[derive(Default)]
pub struct StoreScript {
    /// Sleep before handling the given chunk index.
    pub delays: HashMap<usize, Duration>,
    /// Fail `add_texts` for these chunk indices.
    pub fail_on: HashSet<usize>,
    /// After successfully storing this index, delete the task's liveness
    /// key (i.e. request cancellation mid-flight).
    pub cancel_after: Option<(usize, TaskId)>,
}

/// Store wrapper that follows a [`StoreScript`], then delegates to an
/// [`EmbeddedVectorStore`].
pub struct ScriptedStore {
    inner: EmbeddedVectorStore,
    script: StoreScript,
    state: TaskStateManager,
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn connect(&self) -> Result<bool, StoreError> {
        self.inner.connect().await
    }

    async fn add_texts(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<Value>,
    ) -> Result<Vec<String>, StoreError> {
        let index = metadatas
            .first()
            .and_then(|m| m.get("chunk_id"))
            .and_then(|v| v.as_u64())
            .map(|v| v as usize);
        if let Some(idx) = index {
            if let Some(delay) = self.script.delays.get(&idx) {
                tokio::time::sleep(*delay).await;
            }
            if self.script.fail_on.contains(&idx) {
                return Err(StoreError::Write {
                    message: format!("injected failure at chunk {idx}"),
                });
            }
        }
        let ids = self.inner.add_texts(texts, embeddings, metadatas).await?;
        if let (Some(idx), Some((after, task_id))) = (index, self.script.cancel_after.as_ref()) {
            if idx == *after {
                self.state.cancel(task_id).await.ok();
            }
        }
        Ok(ids)
    }

    async fn delete_where(&self, filter: &Value) -> Result<u64, StoreError> {
        self.inner.delete_where(filter).await
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        self.inner.search(query, top_k, filter).await
    }
}

/// Everything a lifecycle test needs to run and inspect one processor.
pub struct Harness {
    pub ctx: Arc<WorkerContext>,
    /// Handle onto the rows the scripted store writes.
    pub rows: EmbeddedVectorStore,
    pub state: TaskStateManager,
    pub progress_rx: flume::Receiver<ProgressUpdate>,
    _server: MockServer,
    _tmp: tempfile::TempDir,
}

pub async fn harness(script: StoreScript) -> Harness {
    harness_with_parsers(script, |_| ParserRegistry::new()).await
}

/// Like [`harness`], with a custom parser registry that may hold a handle
/// to the task-state manager (e.g. to cancel a task mid-parse).
pub async fn harness_with_parsers(
    script: StoreScript,
    make_parsers: impl FnOnce(&TaskStateManager) -> ParserRegistry,
) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let config = WorkerConfig::default()
        .with_temp_dir(tmp.path())
        .with_progress_report_interval(1);

    let shared_store = Arc::new(MemoryStateStore::new());
    let state = TaskStateManager::new(shared_store.clone(), &config);
    let parsers = make_parsers(&state);

    let rows = EmbeddedVectorStore::new("chunks", DIM);
    let scripted = Arc::new(ScriptedStore {
        inner: rows.clone(),
        script,
        state: state.clone(),
    });
    let mut stores = VectorStoreFactory::new();
    stores.register(BackendKind::Embedded, Arc::new(FixedConnector::new(scripted)));

    let server = embed_mock().await;
    let embedders = ollama_embedders(&server.base_url());

    let (tx, progress_rx) = flume::unbounded();
    let ctx = Arc::new(
        WorkerContext::new(config)
            .with_state_store(shared_store)
            .with_progress_transport(Arc::new(ChannelProgressTransport::new(tx)))
            .with_stores(stores)
            .with_embedders(embedders)
            .with_parsers(parsers),
    );

    Harness {
        ctx,
        rows,
        state,
        progress_rx,
        _server: server,
        _tmp: tmp,
    }
}

/// 2450 characters cycling the alphabet, so every chunk window is distinct.
pub fn scenario_text() -> String {
    cycled_text(2450)
}

pub fn cycled_text(len: usize) -> String {
    (0..len)
        .map(|i| char::from(b'a' + (i % 26) as u8))
        .collect()
}

/// Write `text` to `name` under the harness temp dir and return a task over
/// it: chunk_size 1000, overlap 100, embedded backend, mock ollama model.
pub fn write_doc(dir: &Path, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

pub fn task_for(id: &str, doc: i64, file: &Path) -> IngestionTask {
    IngestionTask::new(
        TaskId::new(id),
        DocumentId(doc),
        FileReference::new(file.to_string_lossy(), "txt"),
        ParseParams {
            chunk_size: 1000,
            overlap: 100,
        },
        EmbeddingDescriptor {
            provider: "ollama".into(),
            model: "mock-embed".into(),
            dimension: DIM,
        },
        VectorStoreDescriptor {
            backend: "embedded".into(),
            connection: Value::Null,
            collection: "chunks".into(),
            dimension: DIM,
            index_kind: "hnsw".into(),
        },
    )
}

/// Stored chunk indices for a document, ascending.
pub fn stored_indices(rows: &EmbeddedVectorStore, doc: i64) -> Vec<usize> {
    let mut indices: Vec<usize> = rows
        .snapshot()
        .iter()
        .filter(|row| row.metadata["doc_id"].as_i64() == Some(doc))
        .map(|row| row.metadata["chunk_id"].as_u64().unwrap() as usize)
        .collect();
    indices.sort_unstable();
    indices
}

/// Stored `(chunk index, chunk text)` pairs for a document, ascending.
pub fn stored_chunks(rows: &EmbeddedVectorStore, doc: i64) -> Vec<(usize, String)> {
    let mut chunks: Vec<(usize, String)> = rows
        .snapshot()
        .iter()
        .filter(|row| row.metadata["doc_id"].as_i64() == Some(doc))
        .map(|row| {
            (
                row.metadata["chunk_id"].as_u64().unwrap() as usize,
                row.text.clone(),
            )
        })
        .collect();
    chunks.sort_by_key(|(idx, _)| *idx);
    chunks
}

pub fn temp_dir_of(harness: &Harness) -> &Path {
    harness._tmp.path()
}
