// file: src/usecases/agent/mod.rs
// description: agentic retrieval workflow and its message types
// reference: internal module structure

pub mod dtos;
pub mod prompts;
pub mod workflow;

pub use dtos::{AgentResponse, ChatMessage, MessageRole, StructuredAnswer};
pub use workflow::{AgenticRagUseCase, WorkflowNode, format_chunks, workflow_mermaid};
