use std::time::Duration;

use sb_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Llm;
use crate::ollama::OllamaClient;

#[derive(Debug, Clone)]
pub struct OllamaLlm {
    client: OllamaClient,
}

impl OllamaLlm {
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl Llm for OllamaLlm {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError> {
        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
        };
        let v: GenerateResponse = self.client.post_json(
            "/api/generate",
            &req,
            Duration::from_secs(60),
            "AI_ANSWER_FAILED",
        )?;
        if v.response.trim().is_empty() {
            return Err(AppError::new("AI_ANSWER_FAILED", "Answer response was empty")
                .with_details(format!("model={model}")));
        }
        Ok(v.response)
    }
}
