// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod adaptors;
pub mod config;
pub mod container;
pub mod entities;
pub mod error;
pub mod frameworks;
pub mod usecases;
pub mod utils;

pub use adaptors::elasticsearch::{ElasticsearchAdaptor, ElasticsearchClient};
pub use config::Config;
pub use container::Container;
pub use entities::{DocChunk, DoclingDocument, DoclingFile, DocumentPicture};
pub use error::{RagError, Result};
pub use frameworks::genai::{GeminiEmbeddingService, GeminiLlmService, GenAiClient};
pub use frameworks::telegram::{TelegramBotService, TelegramClient};
pub use usecases::agent::{AgentResponse, AgenticRagUseCase, ChatMessage};
pub use usecases::{
    ConversationalAgent, DocumentIndexingUseCase, DocumentRepository, DocumentSearchUseCase,
    EmbeddingService, LlmService, SearchOptions,
};
pub use utils::{HealthCheck, HealthReport, HealthStatus, OperationTimer, Validator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert!(usecases::agent::workflow_mermaid().starts_with("graph"));
    }
}
