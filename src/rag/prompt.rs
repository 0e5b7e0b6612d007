use thiserror::Error;

use super::snapshot::RagSnapshot;
use crate::search::{Embedder, IndexError};

pub const DEFAULT_TOP_K: usize = 3;

/// A retrieved position with no document behind it. Always an index/corpus
/// mismatch, never a recoverable condition.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("retrieved position {position} has no document (corpus holds {documents})")]
pub struct LookupError {
    pub position: usize,
    pub documents: usize,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("failed to embed query: {0}")]
    Embedding(#[source] anyhow::Error),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// One document returned for a query, closest first.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument<'a> {
    pub position: usize,
    pub distance: f32,
    pub text: &'a str,
}

/// Builds retrieval-augmented prompts over a fixed snapshot.
pub struct PromptAssembler<'a, E: Embedder + ?Sized> {
    snapshot: &'a RagSnapshot,
    embedder: &'a E,
}

impl<'a, E: Embedder + ?Sized> PromptAssembler<'a, E> {
    pub fn new(snapshot: &'a RagSnapshot, embedder: &'a E) -> Self {
        Self { snapshot, embedder }
    }

    /// Embeds `query` and resolves the `top_k` nearest positions to documents.
    /// A query embedding with NaN or infinite components is rejected by the
    /// index before any distance is computed.
    pub fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedDocument<'a>>, RetrievalError> {
        let query_embedding = self
            .embedder
            .embed_one(query)
            .map_err(RetrievalError::Embedding)?;
        let hits = self.snapshot.index().search(&query_embedding, top_k)?;

        let snapshot = self.snapshot;
        hits.positions
            .iter()
            .zip(&hits.distances)
            .map(|(&position, &distance)| -> Result<RetrievedDocument<'a>, RetrievalError> {
                let text = snapshot.document(position).ok_or(LookupError {
                    position,
                    documents: snapshot.len(),
                })?;
                Ok(RetrievedDocument {
                    position,
                    distance,
                    text: text.as_str(),
                })
            })
            .collect()
    }

    /// Retrieves context for `query` and renders the final prompt.
    pub fn assemble(&self, query: &str, top_k: usize) -> Result<String, RetrievalError> {
        let retrieved = self.retrieve(query, top_k)?;
        for doc in &retrieved {
            tracing::debug!(position = doc.position, distance = doc.distance, "retrieved document");
        }
        let context: Vec<&str> = retrieved.iter().map(|d| d.text).collect();
        Ok(render_prompt(&context, query))
    }
}

/// `context` joined by blank lines, then the question and an open answer slot.
pub fn render_prompt(context: &[&str], query: &str) -> String {
    format!("{}\n\nQuestion: {}\nAnswer:", context.join("\n\n"), query)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::testing::FixedEmbedder;
    use crate::search::{DistanceMetric, VectorIndex};

    /// Six one-dimensional documents laid out so the query at 0.0 ranks
    /// positions 2, 0, 5 as its three nearest neighbours.
    fn ranked_snapshot() -> (RagSnapshot, FixedEmbedder) {
        let values = [1.0, 50.0, 0.0, 60.0, 70.0, 2.0];
        let documents: Vec<String> = (0..values.len()).map(|i| format!("Document {i}")).collect();
        let mut embedder = FixedEmbedder::new(vec![0.0]);
        for (doc, value) in documents.iter().zip(values) {
            embedder = embedder.with(doc, vec![value]);
        }
        let snapshot = RagSnapshot::build(documents, &embedder, DistanceMetric::Euclidean).unwrap();
        (snapshot, embedder)
    }

    #[test]
    fn test_assemble_orders_context_by_retrieval_rank() {
        let (snapshot, embedder) = ranked_snapshot();
        let assembler = PromptAssembler::new(&snapshot, &embedder);

        let prompt = assembler.assemble("Why is cost high?", 3).unwrap();
        assert_eq!(
            prompt,
            "Document 2\n\nDocument 0\n\nDocument 5\n\nQuestion: Why is cost high?\nAnswer:"
        );
    }

    #[test]
    fn test_retrieve_reports_positions_and_distances() {
        let (snapshot, embedder) = ranked_snapshot();
        let assembler = PromptAssembler::new(&snapshot, &embedder);

        let retrieved = assembler.retrieve("anything", DEFAULT_TOP_K).unwrap();
        let positions: Vec<usize> = retrieved.iter().map(|d| d.position).collect();
        let distances: Vec<f32> = retrieved.iter().map(|d| d.distance).collect();
        assert_eq!(positions, vec![2, 0, 5]);
        assert_eq!(distances, vec![0.0, 1.0, 2.0]);
        assert_eq!(retrieved[0].text, "Document 2");
    }

    #[test]
    fn test_unmapped_position_is_a_lookup_error() {
        let mut index = VectorIndex::new(1, DistanceMetric::Euclidean).unwrap();
        index.add(&[vec![5.0], vec![0.0]]).unwrap();
        // Index holds two vectors but only one document survived
        let snapshot = RagSnapshot::from_parts(vec!["only doc".to_string()], index);
        let embedder = FixedEmbedder::new(vec![0.0]);

        let err = PromptAssembler::new(&snapshot, &embedder)
            .assemble("q", 1)
            .unwrap_err();
        match err {
            RetrievalError::Lookup(e) => assert_eq!(e, LookupError { position: 1, documents: 1 }),
            other => panic!("expected lookup error, got {other:?}"),
        }
    }

    #[test]
    fn test_query_dimension_mismatch_is_an_index_error() {
        let (snapshot, _) = ranked_snapshot();
        let wrong = FixedEmbedder::new(vec![0.0, 0.0]);
        let err = PromptAssembler::new(&snapshot, &wrong).assemble("q", 3).unwrap_err();
        assert!(matches!(err, RetrievalError::Index(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_non_finite_query_embedding_is_rejected() {
        let (snapshot, _) = ranked_snapshot();
        let broken = FixedEmbedder::new(vec![-f32::NAN]);
        let err = PromptAssembler::new(&snapshot, &broken).retrieve("q", 3).unwrap_err();
        assert!(matches!(
            err,
            RetrievalError::Index(IndexError::NonFiniteQuery { component: 0 })
        ));
    }

    #[test]
    fn test_render_prompt_layout() {
        assert_eq!(render_prompt(&["a", "b"], "q?"), "a\n\nb\n\nQuestion: q?\nAnswer:");
        assert_eq!(render_prompt(&[], "q?"), "\n\nQuestion: q?\nAnswer:");
    }
}
