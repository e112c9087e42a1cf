//! Text to embedding vectors.
//!
//! Encoders are external (Ollama) or deterministic test doubles behind [`Embedder`].
//! [`encode_normalized`] is the one place vectors are checked and unit-normalized
//! before they reach an index or a query.

use sb_core::error::AppError;

pub mod ollama_embed;

pub use ollama_embed::OllamaEmbedder;

pub trait Embedder: Send + Sync {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError>;

    fn embed_batch(&self, model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        inputs.iter().map(|s| self.embed(model, s)).collect()
    }
}

pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Embed `inputs` and return unit vectors of a single dimension.
///
/// Zero vectors are returned unchanged.
pub fn encode_normalized(
    embedder: &dyn Embedder,
    model: &str,
    inputs: &[String],
) -> Result<Vec<Vec<f32>>, AppError> {
    let mut vectors = embedder.embed_batch(model, inputs)?;
    if vectors.len() != inputs.len() {
        return Err(AppError::new(
            "AI_EMBEDDINGS_FAILED",
            "Encoder returned a different number of vectors than inputs",
        )
        .with_details(format!("inputs={}; vectors={}", inputs.len(), vectors.len())));
    }

    let dims = vectors.first().map(Vec::len).unwrap_or(0);
    for (i, v) in vectors.iter_mut().enumerate() {
        if v.is_empty() {
            return Err(AppError::new("AI_EMBEDDINGS_FAILED", "Encoder returned an empty vector")
                .with_details(format!("model={model}; input={i}")));
        }
        if v.len() != dims {
            return Err(AppError::new(
                "AI_DIMENSION_MISMATCH",
                "Encoder returned vectors of different dimensions",
            )
            .with_details(format!("model={model}; expected={dims}; got={}; input={i}", v.len())));
        }
        l2_normalize(v);
    }
    Ok(vectors)
}
