use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use repolens_core::{RepoLensError, Result};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::info;

/// Batch size passed to the underlying model; tuneable, not observable.
const EMBED_BATCH_SIZE: usize = 64;

/// Produces unit-L2-normalized dense vectors of a fixed dimension, one row
/// per input document, rows in input order.
pub trait Embedder: Send + Sync {
    fn embed(&self, docs: &[String]) -> Result<Vec<Vec<f32>>>;
    fn dimension(&self) -> usize;
    fn model_name(&self) -> &str;
}

/// Local sentence-embedding model served by fastembed.
pub struct FastembedEmbedder {
    model: TextEmbedding,
    dimension: usize,
    name: String,
}

impl std::fmt::Debug for FastembedEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastembedEmbedder")
            .field("dimension", &self.dimension)
            .field("name", &self.name)
            .finish()
    }
}

impl FastembedEmbedder {
    pub fn new(model_name: &str) -> Result<Self> {
        let (model, dimension) = match model_name {
            "all-MiniLM-L6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            other => {
                return Err(RepoLensError::InvalidInput(format!(
                    "unsupported embedding model: {}",
                    other
                )))
            }
        };

        info!("loading embedding model {} (dimension {})", model_name, dimension);
        let model = TextEmbedding::try_new(
            InitOptions::new(model).with_show_download_progress(false),
        )
        .map_err(|e| RepoLensError::EmbedFailed(format!("model load: {}", e)))?;

        Ok(Self {
            model,
            dimension,
            name: model_name.to_string(),
        })
    }
}

impl Embedder for FastembedEmbedder {
    fn embed(&self, docs: &[String]) -> Result<Vec<Vec<f32>>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        let mut vectors = self
            .model
            .embed(docs.to_vec(), Some(EMBED_BATCH_SIZE))
            .map_err(|e| RepoLensError::EmbedFailed(e.to_string()))?;
        for vector in &mut vectors {
            l2_normalize(vector);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// Deterministic hashing embedder used by tests and offline smoke runs.
/// Token hashes are bucketed into a fixed-width vector; no model download,
/// stable across processes, same interface as the real thing.
pub struct DeterministicEmbedder {
    dimension: usize,
}

impl DeterministicEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for DeterministicEmbedder {
    fn embed(&self, docs: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = docs
            .iter()
            .map(|doc| {
                let mut vector = vec![0.0f32; self.dimension];
                for token in doc.split(|c: char| !c.is_alphanumeric()) {
                    if token.is_empty() {
                        continue;
                    }
                    let mut hasher = DefaultHasher::new();
                    token.to_ascii_lowercase().hash(&mut hasher);
                    let bucket = (hasher.finish() as usize) % self.dimension;
                    vector[bucket] += 1.0;
                }
                l2_normalize(&mut vector);
                vector
            })
            .collect();
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "deterministic-hash"
    }
}

pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_match_input_order_and_dimension() {
        let embedder = DeterministicEmbedder::new(32);
        let docs = vec!["alpha beta".to_string(), "gamma".to_string()];
        let vectors = embedder.embed(&docs).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 32));
        assert_ne!(vectors[0], vectors[1]);
    }

    #[test]
    fn embedding_is_stable_across_calls() {
        let embedder = DeterministicEmbedder::default();
        let doc = vec!["def hello(): return 'world'".to_string()];
        let first = embedder.embed(&doc).unwrap();
        let second = embedder.embed(&doc).unwrap();
        for (a, b) in first[0].iter().zip(second[0].iter()) {
            assert!((a - b).abs() <= 1e-6);
        }
    }

    #[test]
    fn vectors_are_unit_normalized() {
        let embedder = DeterministicEmbedder::default();
        let docs = vec!["one two three four".to_string()];
        let vectors = embedder.embed(&docs).unwrap();
        let norm: f32 = vectors[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_input_embeds_to_empty_output() {
        let embedder = DeterministicEmbedder::default();
        assert!(embedder.embed(&[]).unwrap().is_empty());
    }

    #[test]
    fn unknown_model_name_is_invalid_input() {
        let err = FastembedEmbedder::new("no-such-model").unwrap_err();
        assert_eq!(err.kind(), "InvalidInput");
    }
}
