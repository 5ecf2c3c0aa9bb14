// file: src/usecases/mod.rs
// description: application use cases and the service traits they depend on
// reference: internal module structure

pub mod agent;
pub mod document_indexing;
pub mod document_search;
pub mod dtos;
pub mod interfaces;

#[cfg(test)]
pub(crate) mod testing;

pub use document_indexing::DocumentIndexingUseCase;
pub use document_search::{DocumentSearchUseCase, SearchOptions};
pub use interfaces::{ConversationalAgent, DocumentRepository, EmbeddingService, LlmService};
