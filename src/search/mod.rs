pub mod embedding_engine;
pub mod vector_index;

pub use embedding_engine::{
    inspect_embeddings, Embedder, EmbeddingEngine, DEFAULT_EMBEDDING_MODEL_ID,
};
pub use vector_index::{DistanceMetric, IndexError, SearchResult, VectorIndex};
