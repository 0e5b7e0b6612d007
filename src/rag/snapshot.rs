use anyhow::{Context, Result};
use std::path::Path;

use super::formatter::Document;
use crate::search::vector_index::constants::{META_DOCUMENTS, META_MODEL_ID};
use crate::search::{inspect_embeddings, DistanceMetric, Embedder, VectorIndex};

/// The corpus and its populated index, built once and then only read.
///
/// Position `i` in the index always refers to `documents[i]`.
#[derive(Debug, Clone)]
pub struct RagSnapshot {
    documents: Vec<Document>,
    index: VectorIndex,
}

impl RagSnapshot {
    /// Pairs an existing index with its documents. A count mismatch is not
    /// rejected here; it surfaces as a lookup failure on the query path.
    pub fn from_parts(documents: Vec<Document>, index: VectorIndex) -> Self {
        if documents.len() != index.len() {
            tracing::warn!(
                documents = documents.len(),
                vectors = index.len(),
                "snapshot index and corpus sizes differ"
            );
        }
        Self { documents, index }
    }

    /// Embeds every document and inserts the vectors in corpus order.
    pub fn build<E: Embedder + ?Sized>(
        documents: Vec<Document>,
        embedder: &E,
        metric: DistanceMetric,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(anyhow::anyhow!("Cannot build a retrieval snapshot from an empty corpus"));
        }

        tracing::info!(
            documents = documents.len(),
            model = embedder.model_id(),
            "embedding corpus"
        );
        let embeddings = embedder
            .embed(&documents)
            .context("Failed to generate embeddings for corpus")?;
        if embeddings.len() != documents.len() {
            return Err(anyhow::anyhow!(
                "Embedding count mismatch: {} documents, {} vectors",
                documents.len(),
                embeddings.len()
            ));
        }

        let dimension = embeddings[0].len();
        inspect_embeddings(&embeddings, dimension)?;

        let mut index = VectorIndex::new(dimension, metric)?;
        index.add(&embeddings)?;
        index.set_metadata(META_MODEL_ID, serde_json::json!(embedder.model_id()));
        index.set_metadata(META_DOCUMENTS, serde_json::json!(documents));
        tracing::info!(vectors = index.len(), dimension, %metric, "vector index populated");

        Ok(Self { documents, index })
    }

    /// Like [`RagSnapshot::build`], but reuses the index stored at `cache_path`
    /// when it was built by the same model, metric and corpus.
    pub fn build_cached<E: Embedder + ?Sized>(
        documents: Vec<Document>,
        embedder: &E,
        metric: DistanceMetric,
        cache_path: &Path,
    ) -> Result<Self> {
        if cache_path.exists() {
            match VectorIndex::load(cache_path) {
                Ok(index) if cache_matches(&index, embedder.model_id(), metric, &documents) => {
                    tracing::info!(
                        path = ?cache_path,
                        vectors = index.len(),
                        "reusing cached vector index"
                    );
                    return Ok(Self::from_parts(documents, index));
                }
                Ok(_) => {
                    tracing::info!(path = ?cache_path, "cached vector index is stale; rebuilding")
                }
                Err(e) => tracing::warn!(
                    path = ?cache_path,
                    error = %e,
                    "failed to load cached vector index; rebuilding"
                ),
            }
        }

        let snapshot = Self::build(documents, embedder, metric)?;
        snapshot
            .index
            .save(cache_path)
            .with_context(|| format!("Failed to write vector index cache to {:?}", cache_path))?;
        Ok(snapshot)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn document(&self, position: usize) -> Option<&Document> {
        self.documents.get(position)
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn cache_matches(
    index: &VectorIndex,
    model_id: &str,
    metric: DistanceMetric,
    documents: &[Document],
) -> bool {
    let meta = index.metadata();
    index.metric() == metric
        && index.len() == documents.len()
        && meta.get(META_MODEL_ID).and_then(|v| v.as_str()) == Some(model_id)
        && meta
            .get(META_DOCUMENTS)
            .and_then(|v| v.as_array())
            .is_some_and(|stored| {
                stored.len() == documents.len()
                    && stored.iter().zip(documents).all(|(s, d)| s.as_str() == Some(d.as_str()))
            })
}
