//! # Vectorloom: Resumable Document Ingestion
//!
//! Vectorloom ingests documents into searchable vector indexes: it fetches
//! a file, parses it to text, splits the text into overlapping chunks,
//! embeds each chunk, and writes chunk+vector rows into a pluggable vector
//! store, while tracking enough state that a run which is paused,
//! cancelled, or crashed mid-flight resumes without re-embedding stored
//! chunks or leaving gaps.
//!
//! ## Core Concepts
//!
//! - **Task**: one dispatch of one document, with chunking parameters,
//!   an embedding descriptor, a vector-store descriptor, and a resume
//!   offset ([`task::IngestionTask`])
//! - **Chunk**: a fixed-size character window with overlap, addressed by
//!   ordinal index; a pure function of `(text, chunk_size, overlap)` so the
//!   offset stays meaningful across restarts ([`parse::chunk`])
//! - **Offset**: the count of chunks confirmed stored (never merely
//!   dispatched), owned by a single-writer watermark
//!   ([`processor::OffsetTracker`])
//! - **Liveness**: one TTL-bound record per task in a shared ephemeral
//!   store; deleting it is how cancellation is requested ([`state`])
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use vectorloom::config::WorkerConfig;
//! use vectorloom::context::WorkerContext;
//! use vectorloom::processor::DocumentProcessor;
//! use vectorloom::task::IngestionTask;
//! use vectorloom::types::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = Arc::new(WorkerContext::new(WorkerConfig::from_env()));
//! let processor = DocumentProcessor::new(ctx.clone());
//!
//! let mut task = IngestionTask::new(
//!     TaskId::new("task-1"),
//!     DocumentId(42),
//!     FileReference::new("/data/report.txt", "txt"),
//!     ParseParams { chunk_size: 1000, overlap: 100 },
//!     EmbeddingDescriptor {
//!         provider: "ollama".into(),
//!         model: "nomic-embed-text".into(),
//!         dimension: 768,
//!     },
//!     VectorStoreDescriptor {
//!         backend: "embedded".into(),
//!         connection: serde_json::Value::Null,
//!         collection: "docs".into(),
//!         dimension: 768,
//!         index_kind: "hnsw".into(),
//!     },
//! );
//!
//! let report = processor.process(&mut task).await?;
//! println!("{} chunks stored, final state {}", report.processed, report.state);
//! # Ok(())
//! # }
//! ```
//!
//! ## Pause and Resume
//!
//! Cancellation is cooperative: deleting a task's liveness record (via
//! [`state::TaskStateManager::cancel`] or TTL expiry) is observed at the
//! next checkpoint, the run drains in-flight work, prunes rows past the
//! contiguous confirmed watermark, and lands in `Paused` with that
//! watermark as the offset. Re-dispatching the task with `offset = k`
//! processes exactly chunks `[k, total)` and yields a stored set identical
//! to a from-scratch run.
//!
//! ## Module Guide
//!
//! - [`task`] / [`types`] - Task descriptor and shared vocabulary
//! - [`parse`] - Parser registry, vision folding, deterministic chunking
//! - [`embed`] - Embedding providers behind a tag-dispatched factory
//! - [`store`] - Vector-store backends behind a tag-dispatched factory
//! - [`processor`] - The orchestrator, worker pool, and offset watermark
//! - [`state`] - TTL-bound task liveness records
//! - [`progress`] - Best-effort progress callbacks with bounded retry
//! - [`files`] / [`resources`] - File acquisition and temp-file scopes
//! - [`context`] / [`config`] - Explicit per-process wiring

pub mod config;
pub mod context;
pub mod embed;
pub mod files;
pub mod parse;
pub mod processor;
pub mod progress;
pub mod resources;
pub mod state;
pub mod store;
pub mod task;
pub mod telemetry;
pub mod types;
