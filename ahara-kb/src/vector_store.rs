//! Vector index over knowledge entry embeddings
//!
//! Small corpora are scanned exactly so results are reproducible; larger
//! ones go through an HNSW graph (cosine distance).

use hnsw_rs::prelude::*;
use tracing::debug;

use crate::embedder::cosine_similarity;
use crate::error::{KbError, Result};

/// Index tuning
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VectorIndexConfig {
    /// At or below this many vectors, search by exact scan
    pub exact_threshold: usize,
    /// HNSW max connections per node
    pub max_connections: usize,
    /// HNSW construction beam width
    pub ef_construction: usize,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            exact_threshold: 1024,
            max_connections: 16,
            ef_construction: 200,
        }
    }
}

/// Nearest neighbour hit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the vector in insertion order
    pub slot: usize,
    /// Cosine similarity clamped to [0, 1]
    pub similarity: f32,
}

/// Immutable vector index
pub struct VectorIndex {
    vectors: Vec<Vec<f32>>,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistCosine>>,
    indexed: usize,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("len", &self.vectors.len())
            .field("dimension", &self.dimension)
            .field("hnsw", &self.hnsw.is_some())
            .finish()
    }
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

impl VectorIndex {
    /// Build from vectors in slot order
    ///
    /// Zero vectors keep their slot but are never returned.
    pub fn build(vectors: Vec<Vec<f32>>, dimension: usize, config: &VectorIndexConfig) -> Result<Self> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(KbError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let indexed = vectors.iter().filter(|v| !is_zero(v)).count();
        let hnsw = if vectors.len() > config.exact_threshold {
            let max_layer = 16;
            let hnsw = Hnsw::new(
                config.max_connections,
                vectors.len(),
                max_layer,
                config.ef_construction,
                DistCosine,
            );
            let data: Vec<(&Vec<f32>, usize)> = vectors
                .iter()
                .enumerate()
                .filter(|(_, v)| !is_zero(v))
                .map(|(slot, v)| (v, slot))
                .collect();
            hnsw.parallel_insert(&data);
            debug!(vectors = data.len(), "Built HNSW graph");
            Some(hnsw)
        } else {
            None
        };

        Ok(Self {
            vectors,
            dimension,
            hnsw,
            indexed,
        })
    }

    /// Vector dimension
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of searchable vectors
    pub fn len(&self) -> usize {
        self.indexed
    }

    pub fn is_empty(&self) -> bool {
        self.indexed == 0
    }

    /// Stored vector for a slot
    pub fn vector(&self, slot: usize) -> Option<&[f32]> {
        self.vectors.get(slot).map(Vec::as_slice)
    }

    /// Up to `k` nearest vectors, most similar first, ties by slot
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(KbError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() || is_zero(query) {
            return Ok(Vec::new());
        }

        let mut hits: Vec<Neighbor> = match &self.hnsw {
            Some(hnsw) => {
                let ef_search = (k * 2).max(50);
                hnsw.search(query, k, ef_search)
                    .into_iter()
                    .filter(|n| n.d_id < self.vectors.len())
                    .map(|n| Neighbor {
                        slot: n.d_id,
                        similarity: (1.0 - n.distance).clamp(0.0, 1.0),
                    })
                    .collect()
            }
            None => self
                .vectors
                .iter()
                .enumerate()
                .filter(|(_, v)| !is_zero(v))
                .map(|(slot, v)| Neighbor {
                    slot,
                    similarity: cosine_similarity(query, v).clamp(0.0, 1.0),
                })
                .collect(),
        };

        hits.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.slot.cmp(&b.slot))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::{Embedder, HashingEmbedder};

    fn unit(dim: usize, i: usize) -> Vec<f32> {
        let mut v = vec![0.0; dim];
        v[i] = 1.0;
        v
    }

    #[test]
    fn test_exact_search_orders_by_similarity() {
        let index = VectorIndex::build(
            vec![unit(4, 0), unit(4, 1), vec![0.7071, 0.7071, 0.0, 0.0]],
            4,
            &VectorIndexConfig::default(),
        )
        .unwrap();
        let hits = index.search(&unit(4, 0), 2).unwrap();
        assert_eq!(hits[0].slot, 0);
        assert!((hits[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].slot, 2);
    }

    #[test]
    fn test_zero_vectors_skipped() {
        let index = VectorIndex::build(
            vec![vec![0.0; 3], unit(3, 2)],
            3,
            &VectorIndexConfig::default(),
        )
        .unwrap();
        assert_eq!(index.len(), 1);
        let hits = index.search(&unit(3, 2), 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slot, 1);
        assert!(index.search(&[0.0; 3], 5).unwrap().is_empty());
    }

    #[test]
    fn test_dimension_mismatch() {
        let index = VectorIndex::build(vec![unit(3, 0)], 3, &VectorIndexConfig::default()).unwrap();
        assert!(matches!(
            index.search(&[1.0, 0.0], 1),
            Err(KbError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(VectorIndex::build(vec![unit(2, 0)], 3, &VectorIndexConfig::default()).is_err());
    }

    #[test]
    fn test_hnsw_path_finds_exact_match() {
        let embedder = HashingEmbedder::new(64);
        let texts: Vec<String> = (0..40)
            .map(|i| format!("entry number{} topic{} alpha{}", i, i * 7, i * 13))
            .collect();
        let vectors = embedder.embed_batch(&texts);
        let config = VectorIndexConfig {
            exact_threshold: 8,
            ..Default::default()
        };
        let index = VectorIndex::build(vectors, 64, &config).unwrap();
        let hits = index.search(&embedder.embed(&texts[17]), 3).unwrap();
        assert_eq!(hits[0].slot, 17);
        assert!(hits[0].similarity > 0.99);
    }
}
