use sb_core::error::AppError;

pub trait Llm: Send + Sync {
    fn generate(&self, model: &str, prompt: &str) -> Result<String, AppError>;
}

pub mod ollama_llm;

pub use ollama_llm::OllamaLlm;
