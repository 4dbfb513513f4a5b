//! Deterministic text embeddings
//!
//! Feature hashing: every token is hashed (FNV-1a) into a fixed number of
//! buckets, weighted by term frequency and a length-based IDF approximation,
//! then L2 normalized. No model files, identical output on every machine.

use std::collections::BTreeMap;

use ahara_core::knowledge::KnowledgeEntry;

/// Text to dense vector
pub trait Embedder: Send + Sync {
    /// Embed one text; the vector is L2 normalized or all zeros
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Output dimension
    fn dimension(&self) -> usize;

    /// Name for logs and stats
    fn name(&self) -> &str;

    /// Embed many texts
    fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    /// Default bucket count
    pub const DEFAULT_DIMENSION: usize = 512;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Hash a term into a bucket index using FNV-1a
    fn bucket(&self, term: &str) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % self.dimension as u64) as usize
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

/// Lowercase alphanumeric terms of two or more characters
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|s| s.chars().count() >= 2)
        .map(|s| s.to_lowercase())
        .collect()
}

impl Embedder for HashingEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return vec;
        }

        // BTreeMap keeps float accumulation order fixed
        let mut tf: BTreeMap<&str, f32> = BTreeMap::new();
        for tok in &tokens {
            *tf.entry(tok.as_str()).or_default() += 1.0;
        }

        let total = tokens.len() as f32;
        for (term, count) in tf {
            // Short terms are usually stopwords
            let idf = 1.0 + (term.chars().count() as f32).ln();
            vec[self.bucket(term)] += count / total * idf;
        }

        normalize(&mut vec);
        vec
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "feature-hashing"
    }
}

/// Scale to unit length; zero vectors stay zero
pub fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

/// Cosine similarity of two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na <= f32::EPSILON || nb <= f32::EPSILON {
        return 0.0;
    }
    dot / (na * nb)
}

/// Vector for a knowledge entry
///
/// The full indexed text blended with a heavier copy of the disorder name
/// and category, so name-like queries land on the right entry.
pub fn embed_entry(embedder: &dyn Embedder, entry: &KnowledgeEntry, name_weight: f32) -> Vec<f32> {
    let body = embedder.embed(&entry.indexed_text());
    let title = embedder.embed(&format!("{} {}", entry.disorder_name, entry.category));
    let mut vec: Vec<f32> = body
        .iter()
        .zip(&title)
        .map(|(b, t)| b + name_weight * t)
        .collect();
    normalize(&mut vec);
    vec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_returns_zero_vector() {
        let e = HashingEmbedder::new(128);
        let v = e.embed("  & 1 ");
        assert_eq!(v.len(), 128);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_output_is_normalized() {
        let e = HashingEmbedder::default();
        let v = e.embed("low glycemic index whole grains");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit norm, got {norm}");
    }

    #[test]
    fn test_deterministic_and_case_insensitive() {
        let e = HashingEmbedder::default();
        assert_eq!(e.embed("Diabetes Diet"), e.embed("diabetes diet"));
    }

    #[test]
    fn test_shared_terms_are_closer() {
        let e = HashingEmbedder::default();
        let q = e.embed("diabetes diet");
        let near = e.embed("diabetes mellitus blood sugar");
        let far = e.embed("kidney stones oxalate");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_entry_vector_favours_name() {
        let e = HashingEmbedder::default();
        let entry = KnowledgeEntry {
            entry_id: 1,
            category: "Renal".to_string(),
            disorder_name: "Chronic Kidney Disease".to_string(),
            definition_etiology: "Progressive loss of kidney function".to_string(),
            ..Default::default()
        };
        let v = embed_entry(&e, &entry, 1.0);
        let by_name = cosine_similarity(&v, &e.embed("chronic kidney disease"));
        let by_other = cosine_similarity(&v, &e.embed("progressive loss"));
        assert!(by_name > by_other);
    }
}
