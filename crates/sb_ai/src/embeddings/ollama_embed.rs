use std::time::Duration;

use sb_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::ollama::OllamaClient;

/// Inputs longer than this many bytes are cut at a char boundary before sending.
const MAX_INPUT_BYTES: usize = 12_000;

#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: OllamaClient,
}

impl OllamaEmbedder {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbeddingsResponse {
    embedding: Vec<f32>,
}

fn bounded(input: &str) -> &str {
    if input.len() <= MAX_INPUT_BYTES {
        return input;
    }
    let mut end = MAX_INPUT_BYTES;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    &input[..end]
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, model: &str, input: &str) -> Result<Vec<f32>, AppError> {
        let req = EmbeddingsRequest {
            model,
            prompt: bounded(input),
        };
        let v: EmbeddingsResponse = self.client.post_json(
            "/api/embeddings",
            &req,
            Duration::from_secs(10),
            "AI_EMBEDDINGS_FAILED",
        )?;
        if v.embedding.is_empty() {
            return Err(AppError::new(
                "AI_EMBEDDINGS_FAILED",
                "Embeddings response was empty",
            )
            .with_details(format!("model={model}")));
        }
        Ok(v.embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_inputs_are_cut_on_char_boundary() {
        let s = "é".repeat(MAX_INPUT_BYTES);
        let b = bounded(&s);
        assert!(b.len() <= MAX_INPUT_BYTES);
        assert!(b.chars().all(|c| c == 'é'));
        assert_eq!(bounded("short"), "short");
    }
}
