//! Progress reporting to the external system of record.
//!
//! Delivery is best-effort, at-least-once: each update is pushed through a
//! [`ProgressTransport`] with exponential backoff and a bounded retry
//! budget, and a delivery that exhausts its retries is logged and dropped.
//! Progress-reporting failure never fails the ingestion itself. The
//! receiving endpoint is idempotent for repeated identical updates, so
//! over-delivery is harmless and under-delivery only delays the next
//! offset the dispatcher sees.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use miette::Diagnostic;
use rand::RngExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::WorkerConfig;
use crate::types::{DocumentId, ProgressStatus};

#[derive(Debug, Error, Diagnostic)]
pub enum ProgressError {
    #[error("progress callback returned status {status}")]
    #[diagnostic(code(vectorloom::progress::http))]
    Http { status: u16 },

    #[error("progress delivery failed: {message}")]
    #[diagnostic(code(vectorloom::progress::transport))]
    Transport { message: String },
}

/// One progress callback payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub document_id: DocumentId,
    pub status: ProgressStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Delivers one update to the system of record.
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    async fn deliver(&self, update: &ProgressUpdate) -> Result<(), ProgressError>;
}

/// POSTs updates to `{base}/api/docs/{doc_id}/ingest_progress`.
pub struct HttpProgressTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpProgressTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProgressTransport for HttpProgressTransport {
    async fn deliver(&self, update: &ProgressUpdate) -> Result<(), ProgressError> {
        let url = format!(
            "{}/api/docs/{}/ingest_progress",
            self.base_url.trim_end_matches('/'),
            update.document_id
        );
        let response = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(update)
            .send()
            .await
            .map_err(|err| ProgressError::Transport {
                message: err.to_string(),
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ProgressError::Http {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Forwards updates into a flume channel; used by tests and embedders that
/// consume progress in-process.
pub struct ChannelProgressTransport {
    tx: flume::Sender<ProgressUpdate>,
}

impl ChannelProgressTransport {
    pub fn new(tx: flume::Sender<ProgressUpdate>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ProgressTransport for ChannelProgressTransport {
    async fn deliver(&self, update: &ProgressUpdate) -> Result<(), ProgressError> {
        self.tx
            .send_async(update.clone())
            .await
            .map_err(|_| ProgressError::Transport {
                message: "progress channel closed".to_string(),
            })
    }
}

/// Retrying wrapper around a [`ProgressTransport`].
#[derive(Clone)]
pub struct ProgressManager {
    transport: Arc<dyn ProgressTransport>,
    retries: usize,
    base_delay: Duration,
}

impl ProgressManager {
    pub fn new(transport: Arc<dyn ProgressTransport>, config: &WorkerConfig) -> Self {
        Self {
            transport,
            retries: config.callback_retries,
            base_delay: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Deliver an update, retrying with backoff; logs and drops on
    /// exhaustion. Never returns an error to the caller.
    pub async fn report(&self, update: ProgressUpdate) {
        let mut attempt = 0usize;
        loop {
            match self.transport.deliver(&update).await {
                Ok(()) => {
                    tracing::debug!(
                        doc_id = %update.document_id,
                        status = %update.status,
                        offset = ?update.offset,
                        "progress delivered"
                    );
                    return;
                }
                Err(err) if attempt < self.retries => {
                    attempt += 1;
                    let delay = self.backoff(attempt);
                    tracing::debug!(
                        doc_id = %update.document_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "progress delivery retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    tracing::warn!(
                        doc_id = %update.document_id,
                        status = %update.status,
                        error = %err,
                        "progress delivery dropped after retries"
                    );
                    return;
                }
            }
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32 << attempt.min(4) as u32)
            .min(Duration::from_secs(10));
        exp.mul_f64(rand::rng().random_range(0.5..1.5))
    }

    /// Run started: status `processing`, offset at the resume point.
    pub async fn notify_start(&self, document_id: DocumentId, offset: usize) {
        self.report(ProgressUpdate {
            document_id,
            status: ProgressStatus::Processing,
            offset: Some(offset),
            chunk_count: None,
            failure_reason: None,
        })
        .await;
    }

    /// Mid-run offset advance.
    pub async fn notify_progress(
        &self,
        document_id: DocumentId,
        offset: usize,
        chunk_count: usize,
    ) {
        self.report(ProgressUpdate {
            document_id,
            status: ProgressStatus::Processing,
            offset: Some(offset),
            chunk_count: Some(chunk_count),
            failure_reason: None,
        })
        .await;
    }

    /// Run fully processed: offset resets to zero for the next dispatch.
    pub async fn notify_complete(&self, document_id: DocumentId, chunk_count: usize) {
        self.report(ProgressUpdate {
            document_id,
            status: ProgressStatus::Processed,
            offset: Some(0),
            chunk_count: Some(chunk_count),
            failure_reason: None,
        })
        .await;
    }

    /// Run paused at a resumable offset.
    pub async fn notify_paused(
        &self,
        document_id: DocumentId,
        offset: usize,
        chunk_count: Option<usize>,
    ) {
        self.report(ProgressUpdate {
            document_id,
            status: ProgressStatus::Paused,
            offset: Some(offset),
            chunk_count,
            failure_reason: None,
        })
        .await;
    }

    /// Run failed (or, when `cancelled`, revoked by the dispatcher).
    pub async fn notify_failed(
        &self,
        document_id: DocumentId,
        reason: impl Into<String>,
        offset: usize,
        chunk_count: Option<usize>,
        cancelled: bool,
    ) {
        let status = if cancelled {
            ProgressStatus::Cancelled
        } else {
            ProgressStatus::Failed
        };
        self.report(ProgressUpdate {
            document_id,
            status,
            offset: Some(offset),
            chunk_count,
            failure_reason: Some(reason.into()),
        })
        .await;
    }
}
