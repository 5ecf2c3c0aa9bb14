// file: src/usecases/interfaces.rs
// description: service traits implemented by the elasticsearch adaptor and the genai clients
// reference: https://docs.rs/async-trait

use crate::entities::{DocChunk, DoclingDocument, DocumentPicture, DocumentTable, DocumentText};
use crate::error::Result;
use crate::usecases::agent::dtos::{AgentResponse, ChatMessage};
use crate::usecases::dtos::{
    BulkIndexResponse, DocumentBatch, GetDocumentResponse, IndexResponse, SearchRequest,
    SearchResponse,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Creates the index with its mapping when it does not exist yet.
    async fn initialize_indices(&self) -> Result<()>;

    async fn index_document(
        &self,
        document_id: &str,
        document: &DoclingDocument,
    ) -> Result<IndexResponse>;

    async fn index_chunk(&self, chunk_id: &str, chunk: &DocChunk) -> Result<IndexResponse>;

    async fn index_text(&self, text: &DocumentText) -> Result<IndexResponse>;

    async fn index_picture(&self, picture: &DocumentPicture) -> Result<IndexResponse>;

    async fn index_table(&self, table: &DocumentTable) -> Result<IndexResponse>;

    async fn get_document(&self, document_id: &str) -> Result<GetDocumentResponse>;

    async fn get_picture(
        &self,
        document_id: &str,
        picture_id: &str,
    ) -> Result<Option<DocumentPicture>>;

    async fn search_chunks(&self, request: &SearchRequest) -> Result<SearchResponse>;

    /// Matches document names and origin filenames; `request.vector` is ignored.
    async fn search_documents(&self, request: &SearchRequest) -> Result<SearchResponse>;

    async fn delete_document(&self, document_id: &str) -> Result<bool>;

    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool>;

    async fn bulk_index(&self, batch: &DocumentBatch) -> Result<BulkIndexResponse>;
}

#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed_content(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_content(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            crate::error::RagError::GenAi("embedding response was empty".to_string())
        })
    }

    fn dimensions(&self) -> usize;
}

/// Function declaration offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl FunctionCall {
    pub fn string_arg(&self, name: &str) -> Option<&str> {
        self.args.get(name).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub text: Option<String>,
    pub function_calls: Vec<FunctionCall>,
}

impl ToolResponse {
    pub fn has_function_call(&self) -> bool {
        !self.function_calls.is_empty()
    }
}

#[async_trait]
pub trait LlmService: Send + Sync {
    async fn generate_content(&self, prompt: &str) -> Result<String>;

    /// JSON output following `schema`; unparseable output comes back as `{"text": raw}`.
    async fn generate_structured_content(&self, prompt: &str, schema: &Value) -> Result<Value>;

    async fn generate_content_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<ToolResponse>;

    fn available_models(&self) -> Vec<String>;
}

/// Turns one user message into a reply. Failures become apology replies.
#[async_trait]
pub trait ConversationalAgent: Send + Sync {
    async fn process_message(
        &self,
        message: &str,
        chat_id: Option<&str>,
        history: &[ChatMessage],
    ) -> AgentResponse;
}
