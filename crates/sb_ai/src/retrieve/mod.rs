use sb_core::error::AppError;

use crate::embeddings::{encode_normalized, Embedder};
use crate::index::{SearchHit, VectorIndex};

pub const MAX_TOP_K: usize = 50;

/// Rank the index's chunks against a free-text query.
///
/// `top_k` is clamped to `1..=50`. The query is encoded with `model`, which must
/// be the encoder the index was built with.
pub fn query_index(
    index: &VectorIndex,
    embedder: &dyn Embedder,
    model: &str,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchHit>, AppError> {
    let q = query.trim();
    if q.is_empty() {
        return Err(AppError::new(
            "AI_RETRIEVAL_FAILED",
            "Query must not be empty",
        ));
    }
    let top_k = top_k.clamp(1, MAX_TOP_K);

    if let Some(indexed) = index.model() {
        if indexed != model {
            return Err(AppError::new(
                "AI_INDEX_MODEL_MISMATCH",
                "Index was built with a different embedding model; re-ingest the document",
            )
            .with_details(format!("index_model={indexed}; query_model={model}")));
        }
    }
    if index.is_empty() {
        return Ok(Vec::new());
    }

    let mut encoded = encode_normalized(embedder, model, &[q.to_string()])?;
    let qv = encoded.pop().ok_or_else(|| {
        AppError::new("AI_RETRIEVAL_FAILED", "Encoder returned no query vector")
    })?;
    let hits = index.search(&qv, top_k)?;
    tracing::debug!(query_chars = q.chars().count(), hits = hits.len(), "retrieved chunks");
    Ok(hits)
}

/// First `max_chars` characters of the trimmed text, with `...` when cut.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let t = text.trim();
    if t.chars().count() <= max_chars {
        return t.to_string();
    }
    let mut s: String = t.chars().take(max_chars).collect();
    s.push_str("...");
    s
}
