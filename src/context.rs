//! Explicit per-process dependency wiring.
//!
//! One [`WorkerContext`] is constructed at startup and injected into every
//! [`DocumentProcessor`](crate::processor::DocumentProcessor). All shared
//! resources (the temp-file registry, the task-liveness store, the
//! factories) live here behind their managers; there is no ambient global
//! state to reach into, and [`shutdown`](WorkerContext::shutdown) releases
//! what the process still holds.

use std::sync::Arc;

use crate::config::WorkerConfig;
use crate::embed::EmbedderFactory;
use crate::files::FileManager;
use crate::parse::ParserRegistry;
use crate::progress::{HttpProgressTransport, ProgressManager, ProgressTransport};
use crate::resources::ResourceManager;
use crate::state::{MemoryStateStore, StateStore, TaskStateManager};
use crate::store::VectorStoreFactory;

/// The dependency graph one worker process runs on.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use vectorloom::config::WorkerConfig;
/// use vectorloom::context::WorkerContext;
/// use vectorloom::processor::DocumentProcessor;
///
/// # async fn example() {
/// let ctx = Arc::new(WorkerContext::new(WorkerConfig::from_env()));
/// let processor = DocumentProcessor::new(ctx.clone());
/// // ... process tasks ...
/// ctx.shutdown().await;
/// # }
/// ```
pub struct WorkerContext {
    pub config: WorkerConfig,
    pub resources: ResourceManager,
    pub files: FileManager,
    pub parsers: ParserRegistry,
    pub embedders: EmbedderFactory,
    pub stores: VectorStoreFactory,
    pub state: TaskStateManager,
    pub progress: ProgressManager,
}

impl WorkerContext {
    /// Context with the stock components: HTTP fetcher and progress
    /// transport, built-in parsers, env-configured embedder providers, the
    /// embedded vector-store connector, and a process-local liveness store.
    pub fn new(config: WorkerConfig) -> Self {
        let resources = ResourceManager::new(&config);
        let files = FileManager::new(resources.clone());
        let state = TaskStateManager::new(Arc::new(MemoryStateStore::new()), &config);
        let transport = Arc::new(HttpProgressTransport::new(
            config.callback_base_url.clone(),
            config.callback_timeout,
        ));
        let progress = ProgressManager::new(transport, &config);
        Self {
            resources,
            files,
            parsers: ParserRegistry::new(),
            embedders: EmbedderFactory::from_env(),
            stores: VectorStoreFactory::with_defaults(),
            state,
            progress,
            config,
        }
    }

    /// Swap the liveness store (e.g. for a shared deployment-wide store).
    #[must_use]
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.state = TaskStateManager::new(store, &self.config);
        self
    }

    /// Swap the progress delivery transport.
    #[must_use]
    pub fn with_progress_transport(mut self, transport: Arc<dyn ProgressTransport>) -> Self {
        self.progress = ProgressManager::new(transport, &self.config);
        self
    }

    #[must_use]
    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    #[must_use]
    pub fn with_embedders(mut self, embedders: EmbedderFactory) -> Self {
        self.embedders = embedders;
        self
    }

    #[must_use]
    pub fn with_stores(mut self, stores: VectorStoreFactory) -> Self {
        self.stores = stores;
        self
    }

    #[must_use]
    pub fn with_files(mut self, files: FileManager) -> Self {
        self.files = files;
        self
    }

    /// Release process-held resources (tracked temp files).
    pub async fn shutdown(&self) {
        let removed = self.resources.cleanup_all();
        tracing::info!(removed, "worker context shut down");
    }
}
