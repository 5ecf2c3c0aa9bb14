// file: src/usecases/testing.rs
// description: in-memory fakes of the repository, embedding and llm services for unit tests
// reference: internal test support

use crate::entities::{
    DocChunk, DoclingDocument, DocumentPicture, DocumentTable, DocumentText, ElasticEntity,
};
use crate::error::{RagError, Result};
use crate::usecases::dtos::{
    BulkIndexResponse, DocumentBatch, GetDocumentResponse, IndexResponse, SearchHit,
    SearchRequest, SearchResponse,
};
use crate::usecases::interfaces::{
    DocumentRepository, EmbeddingService, LlmService, ToolDefinition, ToolResponse,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct InMemoryRepository {
    pub documents: Mutex<BTreeMap<String, DoclingDocument>>,
    pub chunks: Mutex<BTreeMap<String, DocChunk>>,
    pub pictures: Mutex<Vec<DocumentPicture>>,
    pub batches: Mutex<Vec<DocumentBatch>>,
    pub search_requests: Mutex<Vec<SearchRequest>>,
    pub fail_search: AtomicBool,
}

impl InMemoryRepository {
    pub fn with_chunks(chunks: Vec<DocChunk>) -> Self {
        let repository = Self::default();
        {
            let mut stored = repository.chunks.lock().unwrap();
            for chunk in chunks {
                stored.insert(chunk.chunk_id.clone().unwrap_or_default(), chunk);
            }
        }
        repository
    }

    pub fn last_search(&self) -> Option<SearchRequest> {
        self.search_requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryRepository {
    async fn initialize_indices(&self) -> Result<()> {
        Ok(())
    }

    async fn index_document(
        &self,
        document_id: &str,
        document: &DoclingDocument,
    ) -> Result<IndexResponse> {
        self.documents
            .lock()
            .unwrap()
            .insert(document_id.to_string(), document.clone());
        Ok(IndexResponse::ok(document_id, "Document created"))
    }

    async fn index_chunk(&self, chunk_id: &str, chunk: &DocChunk) -> Result<IndexResponse> {
        self.chunks
            .lock()
            .unwrap()
            .insert(chunk_id.to_string(), chunk.clone());
        Ok(IndexResponse::ok(chunk_id, "Chunk created"))
    }

    async fn index_text(&self, text: &DocumentText) -> Result<IndexResponse> {
        Ok(IndexResponse::ok(&text.text_id, "Text created"))
    }

    async fn index_picture(&self, picture: &DocumentPicture) -> Result<IndexResponse> {
        self.pictures.lock().unwrap().push(picture.clone());
        Ok(IndexResponse::ok(&picture.picture_id, "Picture created"))
    }

    async fn index_table(&self, table: &DocumentTable) -> Result<IndexResponse> {
        Ok(IndexResponse::ok(&table.table_id, "Table created"))
    }

    async fn get_document(&self, document_id: &str) -> Result<GetDocumentResponse> {
        let documents = self.documents.lock().unwrap();
        match documents.get(document_id) {
            Some(document) => Ok(GetDocumentResponse {
                document_id: document_id.to_string(),
                found: true,
                source: Some(document.to_elastic_data()?),
            }),
            None => Ok(GetDocumentResponse::not_found(document_id)),
        }
    }

    async fn get_picture(
        &self,
        document_id: &str,
        picture_id: &str,
    ) -> Result<Option<DocumentPicture>> {
        Ok(self
            .pictures
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.document_id == document_id && p.picture_id == picture_id)
            .cloned())
    }

    async fn search_chunks(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.search_requests.lock().unwrap().push(request.clone());
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(RagError::elasticsearch(Some(503), "search unavailable"));
        }

        let chunks = self.chunks.lock().unwrap();
        let hits = chunks
            .iter()
            .take(request.size)
            .map(|(id, chunk)| {
                Ok(SearchHit {
                    id: id.clone(),
                    score: Some(1.0),
                    source: chunk.to_elastic_data()?,
                    highlight: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SearchResponse {
            total: chunks.len() as u64,
            max_score: hits.first().and_then(|h| h.score),
            hits,
        })
    }

    async fn search_documents(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.search_requests.lock().unwrap().push(request.clone());
        let query = request.query.clone().unwrap_or_default();
        let documents = self.documents.lock().unwrap();
        let hits = documents
            .iter()
            .filter(|(_, doc)| doc.name.contains(&query))
            .map(|(id, doc)| {
                Ok(SearchHit {
                    id: id.clone(),
                    score: Some(1.0),
                    source: doc.to_elastic_data()?,
                    highlight: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(SearchResponse {
            total: hits.len() as u64,
            max_score: None,
            hits,
        })
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        Ok(self.documents.lock().unwrap().remove(document_id).is_some())
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool> {
        Ok(self.chunks.lock().unwrap().remove(chunk_id).is_some())
    }

    async fn bulk_index(&self, batch: &DocumentBatch) -> Result<BulkIndexResponse> {
        self.documents
            .lock()
            .unwrap()
            .insert(batch.document_id.clone(), batch.document.clone());
        {
            let mut chunks = self.chunks.lock().unwrap();
            for chunk in &batch.chunks {
                chunks.insert(chunk.chunk_id.clone().unwrap_or_default(), chunk.clone());
            }
        }
        self.pictures
            .lock()
            .unwrap()
            .extend(batch.pictures.iter().cloned());
        self.batches.lock().unwrap().push(batch.clone());

        Ok(BulkIndexResponse {
            document_id: batch.document_id.clone(),
            total_indexed: batch.entry_count(),
            errors: Vec::new(),
        })
    }
}

/// Vectors of `dimensions` copies of the text's char count.
pub struct FakeEmbedder {
    pub dimensions: usize,
    pub calls: Mutex<Vec<usize>>,
    pub fail: AtomicBool,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingService for FakeEmbedder {
    async fn embed_content(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.lock().unwrap().push(texts.len());
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::GenAi("embedding backend down".to_string()));
        }
        Ok(texts
            .iter()
            .map(|t| vec![t.chars().count() as f32; self.dimensions])
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Replays queued responses in order. An empty queue yields an error.
#[derive(Default)]
pub struct ScriptedLlm {
    pub texts: Mutex<VecDeque<String>>,
    pub tool_responses: Mutex<VecDeque<ToolResponse>>,
    pub structured: Mutex<VecDeque<Value>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn push_text(&self, text: &str) -> &Self {
        self.texts.lock().unwrap().push_back(text.to_string());
        self
    }

    pub fn push_tool_response(&self, response: ToolResponse) -> &Self {
        self.tool_responses.lock().unwrap().push_back(response);
        self
    }

    pub fn push_structured(&self, value: Value) -> &Self {
        self.structured.lock().unwrap().push_back(value);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn exhausted(kind: &str) -> RagError {
    RagError::GenAi(format!("no scripted {} response left", kind))
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn generate_content(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.texts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| exhausted("text"))
    }

    async fn generate_structured_content(&self, prompt: &str, _schema: &Value) -> Result<Value> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.structured
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| exhausted("structured"))
    }

    async fn generate_content_with_tools(
        &self,
        prompt: &str,
        _tools: &[ToolDefinition],
    ) -> Result<ToolResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.tool_responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| exhausted("tool"))
    }

    fn available_models(&self) -> Vec<String> {
        vec!["scripted".to_string()]
    }
}
