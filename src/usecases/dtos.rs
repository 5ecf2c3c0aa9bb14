// file: src/usecases/dtos.rs
// description: request and response types shared by indexing, search and the repository adaptor
// reference: https://www.elastic.co/guide/en/elasticsearch/reference/current/search-your-data.html

use crate::entities::{
    DocChunk, DoclingDocument, DocumentPicture, DocumentTable, DocumentText, ElasticEntity,
};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Outcome of indexing one entity. Failures are reported here, not as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexResponse {
    pub id: String,
    pub success: bool,
    pub message: Option<String>,
}

impl IndexResponse {
    pub fn ok(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failed(id: &str, message: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            success: false,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub vector: Option<Vec<f32>>,
    /// Field → value: arrays become `terms`, objects are used verbatim, scalars become `term`.
    pub filters: Option<Map<String, Value>>,
    pub size: usize,
    pub index_name: Option<String>,
}

impl SearchRequest {
    pub fn text(query: &str, size: usize) -> Self {
        Self {
            query: Some(query.to_string()),
            size,
            ..Self::default()
        }
    }

    pub fn vector(vector: Vec<f32>, size: usize) -> Self {
        Self {
            vector: Some(vector),
            size,
            ..Self::default()
        }
    }

    pub fn hybrid(query: &str, vector: Vec<f32>, size: usize) -> Self {
        Self {
            query: Some(query.to_string()),
            vector: Some(vector),
            size,
            ..Self::default()
        }
    }

    pub fn with_filters(mut self, filters: Map<String, Value>) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_index(mut self, index_name: &str) -> Self {
        self.index_name = Some(index_name.to_string());
        self
    }

    pub fn has_text(&self) -> bool {
        self.query.as_deref().is_some_and(|q| !q.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: Option<f64>,
    pub source: Value,
    pub highlight: Option<BTreeMap<String, Vec<String>>>,
}

impl SearchHit {
    /// Chunk stored in this hit; older chunks without `chunk_id` take the hit id.
    pub fn to_chunk(&self) -> Result<DocChunk> {
        let mut chunk = DocChunk::from_elastic_source(&self.source)?;
        if chunk.chunk_id.is_none() {
            chunk.chunk_id = Some(self.id.clone());
        }
        Ok(chunk)
    }

    pub fn highlights(&self, field: &str) -> &[String] {
        self.highlight
            .as_ref()
            .and_then(|h| h.get(field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub total: u64,
    pub max_score: Option<f64>,
}

impl SearchResponse {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Hits that decode as chunks, in ranking order.
    pub fn chunks(&self) -> Vec<DocChunk> {
        self.hits.iter().filter_map(|h| h.to_chunk().ok()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetDocumentResponse {
    pub document_id: String,
    pub found: bool,
    pub source: Option<Value>,
}

impl GetDocumentResponse {
    pub fn not_found(document_id: &str) -> Self {
        Self {
            document_id: document_id.to_string(),
            found: false,
            source: None,
        }
    }

    pub fn document(&self) -> Option<DoclingDocument> {
        self.source
            .as_ref()
            .and_then(|s| DoclingDocument::from_elastic_source(s).ok())
    }
}

/// Everything derived from one Docling file, written in a single bulk run.
#[derive(Debug, Clone)]
pub struct DocumentBatch {
    pub document_id: String,
    pub document: DoclingDocument,
    pub texts: Vec<DocumentText>,
    pub pictures: Vec<DocumentPicture>,
    pub tables: Vec<DocumentTable>,
    pub chunks: Vec<DocChunk>,
}

impl DocumentBatch {
    pub fn new(document_id: &str, document: DoclingDocument) -> Self {
        Self {
            document_id: document_id.to_string(),
            document,
            texts: Vec::new(),
            pictures: Vec::new(),
            tables: Vec::new(),
            chunks: Vec::new(),
        }
    }

    pub fn entry_count(&self) -> usize {
        1 + self.texts.len() + self.pictures.len() + self.tables.len() + self.chunks.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkIndexResponse {
    pub document_id: String,
    pub total_indexed: usize,
    pub errors: Vec<String>,
}

impl BulkIndexResponse {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}
