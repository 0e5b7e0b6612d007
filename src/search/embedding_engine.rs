use anyhow::Result;
use model2vec_rs::model::StaticModel;
use std::collections::HashSet;

pub const DEFAULT_EMBEDDING_MODEL_ID: &str = "minishlab/potion-base-32M";

/// Text to fixed-length vector. Deterministic for a given model.
pub trait Embedder {
    fn model_id(&self) -> &str;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                anyhow::anyhow!("Failed to generate embedding for single text: {}", text)
            })
    }
}

pub struct EmbeddingEngine {
    model: StaticModel,
    model_id: String,
    dimension: usize,
}

impl EmbeddingEngine {
    pub fn new(model_id: &str) -> Result<Self> {
        let model = StaticModel::from_pretrained(model_id, None, None, None)?;
        // model2vec does not expose the output width, so measure it once.
        let dimension = model
            .encode(&["dimension check".to_string()])
            .first()
            .map(Vec::len)
            .ok_or_else(|| anyhow::anyhow!("Embedding model '{}' produced no output", model_id))?;
        tracing::info!(model = model_id, dimension, "embedding model loaded");
        Ok(Self {
            model,
            model_id: model_id.to_string(),
            dimension,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

impl Embedder for EmbeddingEngine {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.model.encode(texts))
    }
}

/// Sanity checks a freshly encoded corpus. Wrong widths and NaN/Inf are fatal;
/// zero vectors and duplicates only degrade retrieval, so they are logged.
pub fn inspect_embeddings(embeddings: &[Vec<f32>], dimension: usize) -> Result<()> {
    let mut zero_vectors = 0;
    for (idx, emb) in embeddings.iter().enumerate() {
        if emb.len() != dimension {
            return Err(anyhow::anyhow!(
                "Embedding at index {} has incorrect dimension: {}. Expected: {}",
                idx,
                emb.len(),
                dimension
            ));
        }
        if emb.iter().any(|val| !val.is_finite()) {
            return Err(anyhow::anyhow!("Embedding at index {} contains NaN or Infinity", idx));
        }
        if emb.iter().all(|&val| val == 0.0) {
            zero_vectors += 1;
        }
    }
    if zero_vectors > 0 {
        tracing::warn!(zero_vectors, "found all-zero embeddings; retrieval may be unstable");
    }

    let mut unique = HashSet::new();
    let duplicates = embeddings
        .iter()
        .filter(|emb| !unique.insert(emb.iter().map(|f| f.to_bits()).collect::<Vec<u32>>()))
        .count();
    if duplicates > 0 {
        tracing::warn!(duplicates, total = embeddings.len(), "found duplicate embeddings");
    }
    Ok(())
}
