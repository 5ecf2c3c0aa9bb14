// file: src/frameworks/genai/mod.rs
// description: google gemini clients for embeddings and generation
// reference: https://ai.google.dev/api

pub mod base;
pub mod embedding;
pub mod llm;

pub use base::{ApiKeyPool, GenAiClient, RetryPolicy};
pub use embedding::GeminiEmbeddingService;
pub use llm::GeminiLlmService;
