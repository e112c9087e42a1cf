pub mod answer;
pub mod embeddings;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod ollama;
pub mod retrieve;
pub mod session;
