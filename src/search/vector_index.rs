//! A flat, insertion-ordered nearest-neighbour index
#![forbid(unsafe_code)]

use base64::{engine::general_purpose, Engine as _};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Keys used in the index metadata map
pub mod constants {
    /// Identifier of the embedding model that produced the vectors
    pub const META_MODEL_ID: &str = "model_id";
    /// Text of every document the vectors were built from, in position order
    pub const META_DOCUMENTS: &str = "documents";
}

type Float = f32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Straight-line distance between raw vectors
    #[default]
    Euclidean,
    /// One minus cosine similarity
    Cosine,
}

impl DistanceMetric {
    fn distance(self, row: &[Float], row_norm: Float, query: &[Float], query_norm: Float) -> Float {
        match self {
            DistanceMetric::Euclidean => row
                .iter()
                .zip(query)
                .map(|(a, b)| (a - b) * (a - b))
                .sum::<Float>()
                .sqrt(),
            DistanceMetric::Cosine => {
                if row_norm == 0.0 || query_norm == 0.0 {
                    return 1.0;
                }
                1.0 - dot_product(row, query) / (row_norm * query_norm)
            }
        }
    }
}

impl std::fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DistanceMetric::Euclidean => write!(f, "euclidean"),
            DistanceMetric::Cosine => write!(f, "cosine"),
        }
    }
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding dimension must be greater than zero")]
    ZeroDimension,
    #[error("query vector contains a non-finite value at component {component}")]
    NonFiniteQuery { component: usize },
    #[error("index file {path:?} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("I/O error on index file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexStorage {
    embedding_dim: usize,
    metric: DistanceMetric,
    #[serde(with = "base64_floats")]
    matrix: Vec<Float>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    metadata: HashMap<String, serde_json::Value>,
}

mod base64_floats {
    use super::*;
    use bytemuck::cast_slice;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(vec: &[Float], serializer: S) -> Result<S::Ok, S::Error> {
        let bytes: &[u8] = cast_slice(vec);
        serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Float>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)?;
        if bytes.len() % std::mem::size_of::<Float>() != 0 {
            return Err(serde::de::Error::custom("matrix byte length is not a multiple of 4"));
        }
        Ok(bytes
            .chunks_exact(4)
            .map(|chunk| Float::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect())
    }
}

/// Results of a k-nearest-neighbour query, closest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    pub distances: Vec<Float>,
    pub positions: Vec<usize>,
}

impl SearchResult {
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[derive(Debug)]
struct ScoredPosition {
    distance: Float,
    position: usize,
}

impl PartialEq for ScoredPosition {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredPosition {}

impl PartialOrd for ScoredPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScoredPosition {
    // Max-heap on (distance, position): the worst candidate sits on top and is
    // evicted first. NaN of either sign ranks as infinitely far.
    fn cmp(&self, other: &Self) -> Ordering {
        rank_key(self.distance)
            .total_cmp(&rank_key(other.distance))
            .then(self.position.cmp(&other.position))
    }
}

fn rank_key(distance: Float) -> Float {
    if distance.is_nan() {
        Float::INFINITY
    } else {
        distance
    }
}

/// Vectors are stored row-major; row `i` is the vector added at position `i`.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    storage: IndexStorage,
    norms: Vec<Float>,
}

impl VectorIndex {
    pub fn new(embedding_dim: usize, metric: DistanceMetric) -> Result<Self, IndexError> {
        if embedding_dim == 0 {
            return Err(IndexError::ZeroDimension);
        }
        Ok(Self {
            storage: IndexStorage {
                embedding_dim,
                metric,
                matrix: Vec::new(),
                metadata: HashMap::new(),
            },
            norms: Vec::new(),
        })
    }

    pub fn dimension(&self) -> usize {
        self.storage.embedding_dim
    }

    pub fn metric(&self) -> DistanceMetric {
        self.storage.metric
    }

    /// Number of stored vectors
    pub fn len(&self) -> usize {
        self.norms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.norms.is_empty()
    }

    /// Appends vectors in order and returns the positions they were given.
    /// Either every vector is added or none is.
    pub fn add(&mut self, vectors: &[Vec<Float>]) -> Result<Range<usize>, IndexError> {
        let dim = self.dimension();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }

        let start = self.len();
        self.storage.matrix.reserve(vectors.len() * dim);
        for vector in vectors {
            self.storage.matrix.extend_from_slice(vector);
            self.norms.push(norm(vector));
        }
        Ok(start..self.len())
    }

    /// Returns the `min(k, len)` closest vectors, ties broken by lower position.
    pub fn search(&self, query: &[Float], k: usize) -> Result<SearchResult, IndexError> {
        let dim = self.dimension();
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        if let Some(component) = query.iter().position(|v| !v.is_finite()) {
            return Err(IndexError::NonFiniteQuery { component });
        }
        if k == 0 || self.is_empty() {
            return Ok(SearchResult::default());
        }

        let metric = self.metric();
        let query_norm = norm(query);
        let distances: Vec<Float> = self
            .storage
            .matrix
            .par_chunks_exact(dim)
            .zip(self.norms.par_iter())
            .map(|(row, &row_norm)| metric.distance(row, row_norm, query, query_norm))
            .collect();

        let mut heap = BinaryHeap::with_capacity(k + 1);
        for (position, distance) in distances.into_iter().enumerate() {
            heap.push(ScoredPosition { distance, position });
            if heap.len() > k {
                heap.pop();
            }
        }

        let (distances, positions): (Vec<Float>, Vec<usize>) = heap
            .into_sorted_vec()
            .into_iter()
            .map(|s| (s.distance, s.position))
            .unzip();
        Ok(SearchResult { distances, positions })
    }

    /// The stored vector at `position`
    pub fn vector(&self, position: usize) -> Option<&[Float]> {
        let dim = self.dimension();
        self.storage.matrix.get(position * dim..(position + 1) * dim)
    }

    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.storage.metadata
    }

    pub fn set_metadata(&mut self, key: &str, value: serde_json::Value) {
        self.storage.metadata.insert(key.to_string(), value);
    }

    /// Saves the index to disk
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let serialized = serde_json::to_string(&self.storage)?;
        fs::write(path, serialized).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads an index previously written by [`VectorIndex::save`].
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let contents = fs::read_to_string(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let storage: IndexStorage = serde_json::from_str(&contents)?;

        if storage.embedding_dim == 0 {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: "embedding dimension is zero".to_string(),
            });
        }
        if storage.matrix.len() % storage.embedding_dim != 0 {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "matrix size mismatch: {} values is not a multiple of dimension {}",
                    storage.matrix.len(),
                    storage.embedding_dim
                ),
            });
        }

        if let Some(offset) = storage.matrix.iter().position(|v| !v.is_finite()) {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: format!(
                    "non-finite value in vector {} at component {}",
                    offset / storage.embedding_dim,
                    offset % storage.embedding_dim
                ),
            });
        }

        let norms = storage
            .matrix
            .chunks_exact(storage.embedding_dim)
            .map(norm)
            .collect();
        Ok(Self { storage, norms })
    }
}

#[inline]
fn dot_product(vec1: &[Float], vec2: &[Float]) -> Float {
    vec1.iter().zip(vec2.iter()).map(|(a, b)| a * b).sum()
}

#[inline]
fn norm(vector: &[Float]) -> Float {
    dot_product(vector, vector).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use tempfile::NamedTempFile;

    fn generate_random_embeddings(count: usize, dim: usize) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(42);
        (0..count)
            .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect::<Vec<f32>>())
            .collect()
    }

    #[test]
    fn test_new_add_search() -> Result<(), IndexError> {
        let dim = 32;
        let mut index = VectorIndex::new(dim, DistanceMetric::Euclidean)?;

        let embeddings = generate_random_embeddings(100, dim);
        let positions = index.add(&embeddings)?;
        assert_eq!(positions, 0..100);
        assert_eq!(index.len(), 100);

        let results = index.search(&embeddings[0], 5)?;
        assert_eq!(results.len(), 5);
        // The closest item to embeddings[0] is itself
        assert_eq!(results.positions[0], 0);
        assert!(results.distances[0].abs() < 1e-6);
        assert!(results.distances.windows(2).all(|w| w[0] <= w[1]));
        Ok(())
    }

    #[test]
    fn test_every_vector_retrieves_itself() -> Result<(), IndexError> {
        let dim = 16;
        let embeddings = generate_random_embeddings(25, dim);
        for metric in [DistanceMetric::Euclidean, DistanceMetric::Cosine] {
            let mut index = VectorIndex::new(dim, metric)?;
            index.add(&embeddings)?;
            for (position, embedding) in embeddings.iter().enumerate() {
                let results = index.search(embedding, 1)?;
                assert_eq!(results.positions, vec![position], "metric {metric}");
                assert!(results.distances[0].abs() < 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn test_positions_follow_insertion_order() -> Result<(), IndexError> {
        let mut index = VectorIndex::new(2, DistanceMetric::Euclidean)?;
        for j in 0..4 {
            let assigned = index.add(&[vec![j as f32, 0.0]])?;
            assert_eq!(assigned, j..j + 1);
        }
        assert_eq!(index.add(&[vec![9.0, 9.0], vec![8.0, 8.0]])?, 4..6);
        assert_eq!(index.vector(5), Some(&[8.0, 8.0][..]));
        assert_eq!(index.vector(6), None);
        Ok(())
    }

    #[test]
    fn test_euclidean_distances_and_order() -> Result<(), IndexError> {
        let mut index = VectorIndex::new(2, DistanceMetric::Euclidean)?;
        index.add(&[vec![3.0, 4.0], vec![1.0, 0.0], vec![0.0, 2.0]])?;

        let results = index.search(&[0.0, 0.0], 3)?;
        assert_eq!(results.positions, vec![1, 2, 0]);
        assert_eq!(results.distances, vec![1.0, 2.0, 5.0]);
        Ok(())
    }

    #[test]
    fn test_ties_break_by_lower_position() -> Result<(), IndexError> {
        let mut index = VectorIndex::new(1, DistanceMetric::Euclidean)?;
        index.add(&[vec![5.0], vec![-1.0], vec![1.0], vec![-1.0]])?;

        let results = index.search(&[0.0], 3)?;
        assert_eq!(results.positions, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn test_cosine_ignores_magnitude() -> Result<(), IndexError> {
        let mut index = VectorIndex::new(2, DistanceMetric::Cosine)?;
        index.add(&[vec![10.0, 0.0], vec![0.1, 0.1], vec![0.0, 0.0]])?;

        let results = index.search(&[0.5, 0.5], 3)?;
        assert_eq!(results.positions, vec![1, 0, 2]);
        assert!(results.distances[0].abs() < 1e-6);
        // Zero vectors have no direction and sit at distance 1
        assert_eq!(results.distances[2], 1.0);
        Ok(())
    }

    #[test]
    fn test_k_larger_than_index_and_zero_k() -> Result<(), IndexError> {
        let mut index = VectorIndex::new(2, DistanceMetric::Euclidean)?;
        assert!(index.search(&[0.0, 0.0], 3)?.is_empty());

        index.add(&[vec![1.0, 1.0], vec![2.0, 2.0]])?;
        assert_eq!(index.search(&[0.0, 0.0], 10)?.len(), 2);
        assert!(index.search(&[0.0, 0.0], 0)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_dimension_validation() {
        let mut index = VectorIndex::new(3, DistanceMetric::Euclidean).unwrap();
        let err = index.add(&[vec![1.0, 2.0, 3.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 1 }));
        // Nothing from the rejected batch was stored
        assert_eq!(index.len(), 0);

        let err = index.search(&[1.0, 2.0], 1).unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { expected: 3, actual: 2 }));

        assert!(matches!(
            VectorIndex::new(0, DistanceMetric::Euclidean),
            Err(IndexError::ZeroDimension)
        ));
    }

    #[test]
    fn test_persistence_round_trip() -> Result<(), IndexError> {
        let temp_file = NamedTempFile::new().unwrap();
        let dim = 8;
        let embeddings = generate_random_embeddings(10, dim);

        let mut index = VectorIndex::new(dim, DistanceMetric::Cosine)?;
        index.add(&embeddings)?;
        index.set_metadata(constants::META_MODEL_ID, serde_json::json!("test-model"));
        index.save(temp_file.path())?;

        let loaded = VectorIndex::load(temp_file.path())?;
        assert_eq!(loaded.len(), 10);
        assert_eq!(loaded.dimension(), dim);
        assert_eq!(loaded.metric(), DistanceMetric::Cosine);
        assert_eq!(loaded.metadata()[constants::META_MODEL_ID], "test-model");
        assert_eq!(loaded.vector(3), index.vector(3));

        let results = loaded.search(&embeddings[5], 1)?;
        assert_eq!(results.positions, vec![5]);
        Ok(())
    }

    #[test]
    fn test_load_rejects_corrupt_matrix() {
        let temp_file = NamedTempFile::new().unwrap();

        // 1 float for a 2-dimensional index
        let corrupt = serde_json::json!({
            "embedding_dim": 2,
            "metric": "euclidean",
            "matrix": general_purpose::STANDARD.encode(1.0f32.to_ne_bytes()),
        });
        fs::write(temp_file.path(), corrupt.to_string()).unwrap();

        let err = VectorIndex::load(temp_file.path()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
        assert!(err.to_string().contains("matrix size mismatch"));
    }

    #[test]
    fn test_load_rejects_non_finite_values() {
        let temp_file = NamedTempFile::new().unwrap();
        let values: [f32; 4] = [0.5, 1.0, -f32::NAN, 2.0];
        let storage = serde_json::json!({
            "embedding_dim": 2,
            "metric": "euclidean",
            "matrix": general_purpose::STANDARD.encode(bytemuck::cast_slice::<f32, u8>(&values)),
        });
        fs::write(temp_file.path(), storage.to_string()).unwrap();

        let err = VectorIndex::load(temp_file.path()).unwrap_err();
        assert!(matches!(err, IndexError::Corrupt { .. }));
        assert!(err.to_string().contains("vector 1 at component 0"), "{err}");
    }

    #[test]
    fn test_negative_nan_never_outranks_exact_match() -> Result<(), IndexError> {
        let mut index = VectorIndex::new(1, DistanceMetric::Euclidean)?;
        index.add(&[vec![-f32::NAN], vec![0.0], vec![f32::NAN], vec![3.0]])?;

        let nearest = index.search(&[0.0], 1)?;
        assert_eq!(nearest.positions, vec![1]);
        assert_eq!(nearest.distances, vec![0.0]);

        // NaN rows only fill the slots left after every real distance
        let all = index.search(&[0.0], 4)?;
        assert_eq!(&all.positions[..2], &[1, 3]);
        assert_eq!(&all.positions[2..], &[0, 2]);
        Ok(())
    }

    #[test]
    fn test_search_rejects_non_finite_query() {
        let mut index = VectorIndex::new(2, DistanceMetric::Cosine).unwrap();
        index.add(&[vec![1.0, 0.0]]).unwrap();
        let err = index.search(&[0.0, Float::INFINITY], 1).unwrap_err();
        assert!(matches!(err, IndexError::NonFiniteQuery { component: 1 }));
        assert!(matches!(
            index.search(&[-f32::NAN, 0.0], 1),
            Err(IndexError::NonFiniteQuery { component: 0 })
        ));
    }

    #[test]
    fn test_load_rejects_invalid_base64() {
        let temp_file = NamedTempFile::new().unwrap();
        let invalid =
            r#"{"embedding_dim": 2, "metric": "euclidean", "matrix": "INVALID_BASE64!!"}"#;
        fs::write(temp_file.path(), invalid).unwrap();

        assert!(matches!(
            VectorIndex::load(temp_file.path()),
            Err(IndexError::Serialization(_))
        ));
    }

    #[test]
    fn test_scored_position_ordering_for_max_heap() {
        let mut heap = BinaryHeap::new();
        heap.push(ScoredPosition { distance: 0.8, position: 0 });
        heap.push(ScoredPosition { distance: 0.2, position: 1 });
        heap.push(ScoredPosition { distance: Float::NAN, position: 2 });
        heap.push(ScoredPosition { distance: 0.5, position: 3 });
        heap.push(ScoredPosition { distance: -Float::NAN, position: 4 });
        heap.push(ScoredPosition { distance: Float::INFINITY, position: 5 });

        // Keeping the 2 best evicts both NaNs and infinity first
        while heap.len() > 2 {
            heap.pop();
        }
        let kept: Vec<usize> = heap.into_sorted_vec().into_iter().map(|s| s.position).collect();
        assert_eq!(kept, vec![1, 3]);
    }
}
