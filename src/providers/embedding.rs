//! Embedding provider (§4.2) — a pure `encode(text) -> vector` function,
//! 384-dim, normalized for cosine distance. Loaded lazily on first use behind
//! a singleton guard so only the first caller pays the model-load cost,
//! mirroring `features/history.rs`'s `MemoryManager::embed_text` pattern in
//! this codebase.

use anyhow::{Context, Result};
use model2vec_rs::model::StaticModel;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::info;

pub const EMBEDDING_DIM: usize = 384;
/// Callers truncate single-shot inputs to this many characters before encoding (§4.2).
pub const SINGLE_SHOT_CHAR_LIMIT: usize = 1000;

pub struct EmbeddingProvider {
    model_name: String,
    model: OnceCell<Arc<StaticModel>>,
}

impl EmbeddingProvider {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            model: OnceCell::new(),
        }
    }

    async fn model(&self) -> Result<Arc<StaticModel>> {
        self.model
            .get_or_try_init(|| async {
                let name = self.model_name.clone();
                info!("embedding: loading model2vec model '{}'", name);
                tokio::task::spawn_blocking(move || {
                    StaticModel::from_pretrained(&name, None, None, None)
                        .map(Arc::new)
                        .map_err(|e| anyhow::anyhow!("failed to load embedding model '{}': {}", name, e))
                })
                .await
                .context("spawn_blocking for model load failed")?
            })
            .await
            .cloned()
    }

    /// Encode a single string, truncated to [`SINGLE_SHOT_CHAR_LIMIT`] chars by the caller's
    /// discretion — callers that need the full text embedded should chunk first.
    pub async fn encode_single(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.model().await?;
        let owned = text.chars().take(SINGLE_SHOT_CHAR_LIMIT).collect::<String>();
        tokio::task::spawn_blocking(move || model.encode_single(&owned))
            .await
            .context("spawn_blocking for single encode failed")
    }

    /// Batch-encode many strings in one blocking-thread call, avoiding a thread
    /// hop per item.
    pub async fn encode_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let model = self.model().await?;
        tokio::task::spawn_blocking(move || {
            texts.iter().map(|t| model.encode_single(t)).collect::<Vec<_>>()
        })
        .await
        .context("spawn_blocking for batch encode failed")
    }

    /// Best-effort startup warmup — failures are logged by the caller, never fatal.
    pub async fn warm(&self) -> Result<()> {
        self.model().await.map(|_| ())
    }
}

/// Cosine similarity between two equal-length vectors; `0.0` if either has zero
/// magnitude or the lengths differ. Shared by the embedding provider's callers
/// (extractive summary centroid scoring, vector-index re-ranking) so there is
/// exactly one definition of "similarity" in the crate.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

/// Guards a one-time warning if the configured dimensionality doesn't match
/// what the loaded model actually produces — §4.2 says dimensionality changes
/// require dropping and recreating the vector index, never a silent re-embed.
static DIM_MISMATCH_WARNED: OnceLock<()> = OnceLock::new();

pub fn warn_on_dim_mismatch(actual: usize) {
    if actual != EMBEDDING_DIM && DIM_MISMATCH_WARNED.set(()).is_ok() {
        tracing::warn!(
            "embedding: model produced {}-dim vectors, expected {} — the vector index must be dropped and recreated, not silently re-embedded",
            actual,
            EMBEDDING_DIM
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_identical_vectors_is_one() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn cosine_zero_magnitude_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
