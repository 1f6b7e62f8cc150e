//! In-process vector store.
//!
//! A brute-force cosine engine over an in-memory table. It backs the test
//! suite and small single-process deployments; clones share the same table,
//! which is what lets a test hold a handle to the rows a run wrote.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use super::{
    SearchHit, StoreError, VectorStore, VectorStoreConnector, matches_filter,
};
use crate::types::VectorStoreDescriptor;

/// One stored chunk row.
#[derive(Clone, Debug)]
pub struct StoredRow {
    pub id: String,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: Value,
}

/// Brute-force in-memory vector store for one collection.
#[derive(Clone)]
pub struct EmbeddedVectorStore {
    collection: String,
    dimension: usize,
    rows: Arc<RwLock<Vec<StoredRow>>>,
}

impl EmbeddedVectorStore {
    pub fn new(collection: impl Into<String>, dimension: usize) -> Self {
        Self {
            collection: collection.into(),
            dimension,
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Copy of all rows, for inspection in tests and diagnostics.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StoredRow> {
        self.rows.read().clone()
    }
}

#[async_trait]
impl VectorStore for EmbeddedVectorStore {
    async fn connect(&self) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn add_texts(
        &self,
        texts: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<Value>,
    ) -> Result<Vec<String>, StoreError> {
        if texts.len() != embeddings.len() || texts.len() != metadatas.len() {
            return Err(StoreError::ShapeMismatch);
        }
        for embedding in &embeddings {
            if embedding.len() != self.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        let mut rows = self.rows.write();
        let mut ids = Vec::with_capacity(texts.len());
        for ((text, embedding), metadata) in texts
            .into_iter()
            .zip(embeddings.into_iter())
            .zip(metadatas.into_iter())
        {
            let id = Uuid::new_v4().to_string();
            rows.push(StoredRow {
                id: id.clone(),
                text,
                embedding,
                metadata,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn delete_where(&self, filter: &Value) -> Result<u64, StoreError> {
        let mut rows = self.rows.write();
        let before = rows.len();
        rows.retain(|row| !matches_filter(&row.metadata, filter));
        Ok((before - rows.len()) as u64)
    }

    async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filter: Option<&Value>,
    ) -> Result<Vec<SearchHit>, StoreError> {
        if query.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let rows = self.rows.read();
        let mut hits: Vec<SearchHit> = rows
            .iter()
            .filter(|row| filter.is_none_or(|f| matches_filter(&row.metadata, f)))
            .map(|row| SearchHit {
                id: row.id.clone(),
                text: row.text.clone(),
                metadata: row.metadata.clone(),
                score: cosine(query, &row.embedding),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Opens a fresh [`EmbeddedVectorStore`] per descriptor.
pub struct EmbeddedConnector;

impl EmbeddedConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmbeddedConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStoreConnector for EmbeddedConnector {
    async fn open(
        &self,
        descriptor: &VectorStoreDescriptor,
    ) -> Result<Arc<dyn VectorStore>, StoreError> {
        Ok(Arc::new(EmbeddedVectorStore::new(
            descriptor.collection.clone(),
            descriptor.dimension,
        )))
    }
}
