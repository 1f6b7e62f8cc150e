//! Task liveness and lifecycle-state records.
//!
//! Each running task owns one record in a shared ephemeral key-value store,
//! keyed `"<prefix>:<task_id>"` and bounded by a TTL so orphans from an
//! unclean process death self-expire. The record's *presence* is the
//! liveness signal: deleting it is how cancellation is requested, and
//! [`TaskStateManager::is_cancelled`] is defined as "the key is absent".
//!
//! Cancellation is observed cooperatively. [`check_cancelled`] returns a
//! [`CancelCheck`] the orchestrator consults at well-defined checkpoints;
//! it never aborts an operation from a deep call stack.
//!
//! [`check_cancelled`]: TaskStateManager::check_cancelled

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::config::WorkerConfig;
use crate::types::{TaskId, TaskState};

#[derive(Debug, Error, Diagnostic)]
pub enum StateError {
    #[error("state store operation failed: {message}")]
    #[diagnostic(code(vectorloom::state::store))]
    Store { message: String },

    #[error("state record for {task_id} is malformed: {message}")]
    #[diagnostic(code(vectorloom::state::malformed))]
    Malformed { task_id: String, message: String },
}

/// Shared ephemeral key-value store with per-key TTL.
///
/// Process-local by default ([`MemoryStateStore`]); deployments with more
/// than one worker process plug a shared store behind this trait.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StateError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StateError>;

    /// Delete a key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StateError>;

    async fn exists(&self, key: &str) -> Result<bool, StateError>;
}

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process [`StateStore`] with lazy TTL expiry.
#[derive(Clone, Default)]
pub struct MemoryStateStore {
    entries: Arc<RwLock<FxHashMap<String, Entry>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StateError> {
        self.entries.write().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let mut entries = self.entries.write();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StateError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, StateError> {
        self.get(key).await.map(|v| v.is_some())
    }
}

/// Result of a cooperative cancellation checkpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelCheck {
    Continue,
    /// The liveness key is gone; stop scheduling new work.
    Stop,
}

impl CancelCheck {
    #[must_use]
    pub fn is_stop(&self) -> bool {
        matches!(self, CancelCheck::Stop)
    }
}

/// Manages the one liveness/state record per task.
#[derive(Clone)]
pub struct TaskStateManager {
    store: Arc<dyn StateStore>,
    prefix: String,
    ttl: Duration,
}

impl TaskStateManager {
    pub fn new(store: Arc<dyn StateStore>, config: &WorkerConfig) -> Self {
        Self {
            store,
            prefix: config.state_key_prefix.clone(),
            ttl: config.state_ttl,
        }
    }

    fn key(&self, task_id: &TaskId) -> String {
        format!("{}:{}", self.prefix, task_id)
    }

    /// Write the task's current lifecycle state, refreshing the TTL.
    pub async fn set_state(
        &self,
        task_id: &TaskId,
        state: TaskState,
        details: Option<serde_json::Value>,
    ) -> Result<(), StateError> {
        let record = serde_json::json!({
            "state": state.encode(),
            "timestamp": Utc::now().to_rfc3339(),
            "details": details.unwrap_or_else(|| serde_json::json!({})),
        });
        self.store
            .put(&self.key(task_id), record.to_string(), self.ttl)
            .await?;
        tracing::debug!(task_id = %task_id, state = %state, "task state updated");
        Ok(())
    }

    /// Current lifecycle state, or `None` if the record is absent/expired.
    pub async fn get_state(&self, task_id: &TaskId) -> Result<Option<TaskState>, StateError> {
        let Some(raw) = self.store.get(&self.key(task_id)).await? else {
            return Ok(None);
        };
        let record: serde_json::Value =
            serde_json::from_str(&raw).map_err(|err| StateError::Malformed {
                task_id: task_id.to_string(),
                message: err.to_string(),
            })?;
        Ok(record
            .get("state")
            .and_then(|v| v.as_str())
            .and_then(TaskState::decode))
    }

    /// A task is cancelled when its liveness key is absent.
    ///
    /// A store failure reads as "not cancelled": a flaky store must not
    /// spuriously pause healthy runs.
    pub async fn is_cancelled(&self, task_id: &TaskId) -> bool {
        match self.store.exists(&self.key(task_id)).await {
            Ok(exists) => !exists,
            Err(err) => {
                tracing::error!(task_id = %task_id, error = %err, "liveness check failed");
                false
            }
        }
    }

    /// Request cancellation by deleting the liveness key. Idempotent;
    /// returns whether a key existed.
    pub async fn cancel(&self, task_id: &TaskId) -> Result<bool, StateError> {
        let existed = self.store.delete(&self.key(task_id)).await?;
        if existed {
            tracing::info!(task_id = %task_id, "task cancelled");
        } else {
            tracing::warn!(task_id = %task_id, "cancel requested for absent task");
        }
        Ok(existed)
    }

    /// Remove the record on the normal completion/failure path. Same delete
    /// as [`cancel`](Self::cancel), different intent.
    pub async fn cleanup(&self, task_id: &TaskId) -> Result<bool, StateError> {
        let existed = self.store.delete(&self.key(task_id)).await?;
        tracing::debug!(task_id = %task_id, existed, "task state cleaned up");
        Ok(existed)
    }

    /// Cooperative checkpoint: should the caller keep going?
    pub async fn check_cancelled(&self, task_id: &TaskId) -> CancelCheck {
        if self.is_cancelled(task_id).await {
            CancelCheck::Stop
        } else {
            CancelCheck::Continue
        }
    }
}
