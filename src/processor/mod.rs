//! The ingestion orchestrator.
//!
//! [`DocumentProcessor`] owns the run state machine
//! (`Pending → Processing → {Processed | Failed | Paused}`), the bounded
//! worker pool for the embed+store step, and the offset invariant. Lower
//! layers raise typed errors; only this module turns them into a task
//! status.
//!
//! # Concurrency shape
//!
//! One coordinator per run. Chunks are produced lazily and handed to
//! `parallelism` workers over a rendezvous channel, so production runs
//! ahead of the pool only far enough to keep it fed and "dispatched" always
//! means "a worker is holding it". Completions flow back over a second
//! channel to the coordinator, the single writer of the
//! [`OffsetTracker`]; workers never touch the offset.
//!
//! # Cancellation
//!
//! Cooperative and checkpoint-based: the liveness key is consulted before
//! scheduling each unit and after each completion. An in-flight embed/store
//! call always runs to completion; once a stop is observed the coordinator
//! drains in-flight work, prunes any rows that landed at/after the
//! contiguous watermark, and persists `Paused` with that watermark as the
//! resume offset.

mod watermark;

pub use watermark::OffsetTracker;

use std::sync::Arc;

use futures_util::future::join_all;
use miette::Diagnostic;
use thiserror::Error;

use crate::context::WorkerContext;
use crate::embed::{EmbedError, Embedder};
use crate::files::FileError;
use crate::parse::{self, ChunkError, ParseError, ParserRegistry};
use crate::state::{CancelCheck, StateError};
use crate::store::{StoreError, VectorStore};
use crate::task::IngestionTask;
use crate::types::{TaskId, TaskState};

#[derive(Debug, Error, Diagnostic)]
pub enum ProcessError {
    #[error("task validation failed: {reason}")]
    #[diagnostic(code(vectorloom::processor::validation))]
    Validation { reason: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Embed(#[from] EmbedError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    State(#[from] StateError),

    #[error("chunk {index} failed: {message}")]
    #[diagnostic(code(vectorloom::processor::chunk_failed))]
    ChunkFailed { index: usize, message: String },

    #[error("worker pool terminated unexpectedly")]
    #[diagnostic(code(vectorloom::processor::worker_pool))]
    WorkerPool,
}

/// Final accounting for one run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Terminal state the task reached.
    pub state: TaskState,
    /// Persisted resume offset (0 after a fully processed run).
    pub offset: usize,
    /// Total chunks the document derives to, when known.
    pub chunk_count: Option<usize>,
    /// Chunks confirmed stored by this run.
    pub processed: usize,
}

/// How a run ended, before terminal bookkeeping.
enum Outcome {
    Completed {
        chunk_count: usize,
        processed: usize,
    },
    Paused {
        offset: usize,
        chunk_count: Option<usize>,
        processed: usize,
    },
    Failed {
        offset: usize,
        chunk_count: Option<usize>,
        error: ProcessError,
    },
}

struct WorkItem {
    index: usize,
    text: String,
    metadata: serde_json::Value,
}

struct Completion {
    index: usize,
    result: Result<(), String>,
}

/// Orchestrates one document ingestion run end to end.
pub struct DocumentProcessor {
    ctx: Arc<WorkerContext>,
}

impl DocumentProcessor {
    pub fn new(ctx: Arc<WorkerContext>) -> Self {
        Self { ctx }
    }

    /// Run a task to a terminal state.
    ///
    /// Returns `Ok` for `Processed` *and* `Paused` (paused is a resumable
    /// outcome, not an error); returns the underlying [`ProcessError`] when
    /// the run ends `Failed`. In every case `task.status`, `task.offset`,
    /// and `task.failure_reason` reflect the terminal state, the liveness
    /// record is cleaned up, and the final progress callback has been
    /// attempted.
    #[tracing::instrument(
        skip(self, task),
        fields(task_id = %task.task_id, doc_id = %task.doc_id)
    )]
    pub async fn process(&self, task: &mut IngestionTask) -> Result<RunReport, ProcessError> {
        let _scope = self.ctx.resources.scope();

        task.status = TaskState::Pending;
        if let Err(err) = self
            .ctx
            .state
            .set_state(&task.task_id, TaskState::Pending, None)
            .await
        {
            let outcome = Outcome::Failed {
                offset: task.offset,
                chunk_count: None,
                error: ProcessError::State(err),
            };
            return self.finalize(task, outcome).await;
        }

        let outcome = match self.run(task).await {
            Ok(outcome) => outcome,
            // Errors reaching here precede any confirmed completion, so the
            // offset is left where the dispatch put it.
            Err(error) => Outcome::Failed {
                offset: task.offset,
                chunk_count: None,
                error,
            },
        };
        self.finalize(task, outcome).await
    }

    async fn run(&self, task: &IngestionTask) -> Result<Outcome, ProcessError> {
        self.validate(task)?;

        self.ctx
            .state
            .set_state(&task.task_id, TaskState::Processing, None)
            .await?;
        self.ctx.progress.notify_start(task.doc_id, task.offset).await;

        if self.checkpoint(&task.task_id).await.is_stop() {
            return Ok(Outcome::Paused {
                offset: task.offset,
                chunk_count: None,
                processed: 0,
            });
        }

        let local_path = self
            .ctx
            .files
            .resolve(&task.file, task.credentials.as_ref())
            .await?;

        if self.checkpoint(&task.task_id).await.is_stop() {
            return Ok(Outcome::Paused {
                offset: task.offset,
                chunk_count: None,
                processed: 0,
            });
        }

        let text = self
            .ctx
            .parsers
            .parse_to_text(&local_path, &task.file.declared_type)
            .await?;
        let stats = ParserRegistry::text_stats(&text);
        tracing::info!(
            chars = stats.chars,
            lines = stats.lines,
            words = stats.words,
            "document parsed"
        );

        let total = parse::estimate_chunk_count(
            &text,
            task.parse_params.chunk_size,
            task.parse_params.overlap,
        )?;

        let embedder = self.ctx.embedders.create(&task.embedding)?;
        let store = self.ctx.stores.create(&task.vector_store).await?;
        if !store.connect().await? {
            return Err(ProcessError::Store(StoreError::Connection {
                message: "vector store unreachable".to_string(),
            }));
        }

        if task.offset == 0 {
            // Fresh start: reclaim rows a previous attempt may have left.
            let removed = store
                .delete_where(&serde_json::json!({ "doc_id": task.doc_id.0 }))
                .await?;
            if removed > 0 {
                tracing::info!(removed, "cleared rows from a previous attempt");
            }
        }
        self.ctx
            .progress
            .notify_progress(task.doc_id, task.offset, total)
            .await;

        self.pump(task, &text, total, embedder, store).await
    }

    fn validate(&self, task: &IngestionTask) -> Result<(), ProcessError> {
        let params = task.parse_params;
        if params.chunk_size == 0 {
            return Err(ProcessError::Validation {
                reason: "chunk_size must be greater than zero".to_string(),
            });
        }
        if params.overlap >= params.chunk_size {
            return Err(ProcessError::Validation {
                reason: format!(
                    "overlap ({}) must be smaller than chunk_size ({})",
                    params.overlap, params.chunk_size
                ),
            });
        }
        if !self.ctx.parsers.supports(&task.file.declared_type) {
            return Err(ProcessError::Validation {
                reason: format!("unsupported document type '{}'", task.file.declared_type),
            });
        }
        Ok(())
    }

    /// Feed chunks to the worker pool and account completions.
    async fn pump(
        &self,
        task: &IngestionTask,
        text: &str,
        total: usize,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Result<Outcome, ProcessError> {
        let start_offset = task.offset;
        let parallelism = if task.parallelism > 0 {
            task.parallelism
        } else {
            self.ctx.config.default_parallelism
        };

        // Rendezvous: a send completes only when a worker takes the item,
        // so at most `parallelism` units are ever dispatched-not-complete.
        let (work_tx, work_rx) = flume::bounded::<WorkItem>(0);
        let (done_tx, done_rx) = flume::unbounded::<Completion>();

        let mut handles = Vec::with_capacity(parallelism);
        for worker in 0..parallelism {
            let work_rx = work_rx.clone();
            let done_tx = done_tx.clone();
            let embedder = embedder.clone();
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                while let Ok(item) = work_rx.recv_async().await {
                    let result = embed_and_store(embedder.as_ref(), store.as_ref(), &item).await;
                    let completion = Completion {
                        index: item.index,
                        result,
                    };
                    if done_tx.send_async(completion).await.is_err() {
                        break;
                    }
                }
                tracing::trace!(worker, "embed worker drained");
            }));
        }
        drop(work_rx);
        drop(done_tx);

        let mut tracker = OffsetTracker::new(start_offset);
        let mut last_reported = start_offset;
        let mut in_flight = 0usize;
        let mut cancelled = false;
        let mut failure: Option<ProcessError> = None;

        let chunks = parse::chunk(text, task.parse_params.chunk_size, task.parse_params.overlap)?;
        'feed: for (index, chunk_text) in chunks {
            if index < start_offset {
                continue; // confirmed stored by a previous run
            }
            if self.checkpoint(&task.task_id).await.is_stop() {
                cancelled = true;
                break 'feed;
            }
            if in_flight == parallelism {
                match done_rx.recv_async().await {
                    Ok(completion) => {
                        in_flight -= 1;
                        self.account(
                            task,
                            completion,
                            &mut tracker,
                            &mut last_reported,
                            total,
                            &mut cancelled,
                            &mut failure,
                        )
                        .await;
                        if cancelled || failure.is_some() {
                            break 'feed;
                        }
                    }
                    Err(_) => {
                        failure = Some(ProcessError::WorkerPool);
                        break 'feed;
                    }
                }
            }
            let metadata = chunk_metadata(task, index, &chunk_text);
            let item = WorkItem {
                index,
                text: chunk_text,
                metadata,
            };
            if work_tx.send_async(item).await.is_err() {
                failure = Some(ProcessError::WorkerPool);
                break 'feed;
            }
            in_flight += 1;
        }

        // Closing the work channel lets idle workers exit; dispatched units
        // always run to completion and are accounted below.
        drop(work_tx);
        while in_flight > 0 {
            match done_rx.recv_async().await {
                Ok(completion) => {
                    in_flight -= 1;
                    self.account(
                        task,
                        completion,
                        &mut tracker,
                        &mut last_reported,
                        total,
                        &mut cancelled,
                        &mut failure,
                    )
                    .await;
                }
                Err(_) => {
                    if failure.is_none() {
                        failure = Some(ProcessError::WorkerPool);
                    }
                    break;
                }
            }
        }
        join_all(handles).await;

        let offset = tracker.watermark();
        if let Some(error) = failure {
            self.prune_ahead(task, store.as_ref(), offset).await;
            return Ok(Outcome::Failed {
                offset,
                chunk_count: Some(total),
                error,
            });
        }
        if cancelled {
            self.prune_ahead(task, store.as_ref(), offset).await;
            return Ok(Outcome::Paused {
                offset,
                chunk_count: Some(total),
                processed: tracker.confirmed(),
            });
        }
        Ok(Outcome::Completed {
            chunk_count: total,
            processed: tracker.confirmed(),
        })
    }

    /// Fold one completion into the watermark; checkpoint afterwards.
    #[allow(clippy::too_many_arguments)]
    async fn account(
        &self,
        task: &IngestionTask,
        completion: Completion,
        tracker: &mut OffsetTracker,
        last_reported: &mut usize,
        total: usize,
        cancelled: &mut bool,
        failure: &mut Option<ProcessError>,
    ) {
        match completion.result {
            Ok(()) => {
                let watermark = tracker.confirm(completion.index);
                tracing::debug!(
                    index = completion.index,
                    watermark,
                    "chunk confirmed stored"
                );
                if watermark - *last_reported >= self.ctx.config.progress_report_interval {
                    *last_reported = watermark;
                    self.ctx
                        .progress
                        .notify_progress(task.doc_id, watermark, total)
                        .await;
                }
            }
            Err(message) => {
                tracing::error!(index = completion.index, error = %message, "chunk failed");
                if failure.is_none() {
                    *failure = Some(ProcessError::ChunkFailed {
                        index: completion.index,
                        message,
                    });
                }
            }
        }
        if !*cancelled && failure.is_none() && self.checkpoint(&task.task_id).await.is_stop() {
            *cancelled = true;
        }
    }

    /// Delete rows that completed out of order past the safe offset, so the
    /// stored set is exactly the contiguous range below it.
    async fn prune_ahead(&self, task: &IngestionTask, store: &dyn VectorStore, offset: usize) {
        let filter = serde_json::json!({
            "doc_id": task.doc_id.0,
            "chunk_id": { "$gte": offset },
        });
        match store.delete_where(&filter).await {
            Ok(removed) if removed > 0 => {
                tracing::info!(offset, removed, "pruned rows past the safe offset");
            }
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(offset, error = %err, "pruning past the safe offset failed");
            }
        }
    }

    async fn checkpoint(&self, task_id: &TaskId) -> CancelCheck {
        self.ctx.state.check_cancelled(task_id).await
    }

    /// Persist the terminal state, fire the final progress callback, update
    /// the task, and release the liveness record.
    async fn finalize(
        &self,
        task: &mut IngestionTask,
        outcome: Outcome,
    ) -> Result<RunReport, ProcessError> {
        let task_id = task.task_id.clone();
        let result = match outcome {
            Outcome::Completed {
                chunk_count,
                processed,
            } => {
                self.set_terminal_state(
                    &task_id,
                    TaskState::Processed,
                    serde_json::json!({ "chunk_count": chunk_count }),
                )
                .await;
                self.ctx
                    .progress
                    .notify_complete(task.doc_id, chunk_count)
                    .await;
                task.status = TaskState::Processed;
                task.offset = 0;
                task.chunk_count = Some(chunk_count);
                task.failure_reason = None;
                tracing::info!(chunk_count, processed, "document processed");
                Ok(RunReport {
                    state: TaskState::Processed,
                    offset: 0,
                    chunk_count: Some(chunk_count),
                    processed,
                })
            }
            Outcome::Paused {
                offset,
                chunk_count,
                processed,
            } => {
                self.set_terminal_state(
                    &task_id,
                    TaskState::Paused,
                    serde_json::json!({ "offset": offset }),
                )
                .await;
                self.ctx
                    .progress
                    .notify_paused(task.doc_id, offset, chunk_count)
                    .await;
                task.status = TaskState::Paused;
                task.offset = offset;
                task.chunk_count = chunk_count.or(task.chunk_count);
                tracing::warn!(offset, processed, "run paused by cancellation");
                Ok(RunReport {
                    state: TaskState::Paused,
                    offset,
                    chunk_count,
                    processed,
                })
            }
            Outcome::Failed {
                offset,
                chunk_count,
                error,
            } => {
                let reason = error.to_string();
                self.set_terminal_state(
                    &task_id,
                    TaskState::Failed,
                    serde_json::json!({ "error": reason, "offset": offset }),
                )
                .await;
                self.ctx
                    .progress
                    .notify_failed(task.doc_id, reason.clone(), offset, chunk_count, false)
                    .await;
                task.status = TaskState::Failed;
                task.offset = offset;
                task.chunk_count = chunk_count.or(task.chunk_count);
                tracing::error!(offset, reason = %reason, "run failed");
                task.failure_reason = Some(reason);
                Err(error)
            }
        };
        if let Err(err) = self.ctx.state.cleanup(&task_id).await {
            tracing::warn!(error = %err, "liveness cleanup failed");
        }
        result
    }

    async fn set_terminal_state(
        &self,
        task_id: &TaskId,
        state: TaskState,
        details: serde_json::Value,
    ) {
        if let Err(err) = self.ctx.state.set_state(task_id, state, Some(details)).await {
            tracing::warn!(state = %state, error = %err, "terminal state write failed");
        }
    }
}

async fn embed_and_store(
    embedder: &dyn Embedder,
    store: &dyn VectorStore,
    item: &WorkItem,
) -> Result<(), String> {
    let texts = vec![item.text.clone()];
    let vectors = embedder.embed(&texts).await.map_err(|e| e.to_string())?;
    store
        .add_texts(texts, vectors, vec![item.metadata.clone()])
        .await
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn chunk_metadata(task: &IngestionTask, index: usize, chunk_text: &str) -> serde_json::Value {
    serde_json::json!({
        "doc_id": task.doc_id.0,
        "chunk_id": index,
        "kb_id": task.kb_id,
        "filetype": task.file.declared_type,
        "length": chunk_text.chars().count(),
        "filename": task.file.display_name(),
        "upload_time": task.upload_time,
        "uploader_id": task.uploader_id,
        "source": task.file.source_label(),
        "chunk_size": task.parse_params.chunk_size,
        "overlap": task.parse_params.overlap,
        "embedding_model_name": task.embedding.model,
        "embedding_dim": task.embedding.dimension,
    })
}
