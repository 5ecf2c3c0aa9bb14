// file: src/usecases/document_search.rs
// description: text, vector and hybrid chunk search plus document lookups
// reference: https://www.elastic.co/guide/en/elasticsearch/reference/current/knn-search.html#_combine_approximate_knn_with_other_features

use crate::error::{RagError, Result};
use crate::usecases::dtos::{GetDocumentResponse, SearchRequest, SearchResponse};
use crate::usecases::interfaces::{DocumentRepository, EmbeddingService};
use crate::utils::Validator;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Falls back to the configured default size.
    pub size: Option<usize>,
    pub filters: Option<Map<String, Value>>,
    pub index_name: Option<String>,
}

impl SearchOptions {
    pub fn with_size(size: usize) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }
}

pub struct DocumentSearchUseCase {
    repository: Arc<dyn DocumentRepository>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    default_size: usize,
    max_size: usize,
}

impl DocumentSearchUseCase {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        embedder: Option<Arc<dyn EmbeddingService>>,
        default_size: usize,
        max_size: usize,
    ) -> Self {
        Self {
            repository,
            embedder,
            default_size,
            max_size,
        }
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    fn request(&self, options: SearchOptions) -> Result<SearchRequest> {
        let size = options.size.unwrap_or(self.default_size);
        Validator::validate_search_size(size, self.max_size)?;
        Ok(SearchRequest {
            size,
            filters: options.filters,
            index_name: options.index_name,
            ..SearchRequest::default()
        })
    }

    pub async fn search_chunks_by_text(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<SearchResponse> {
        Validator::validate_content_not_empty(query)?;
        let request = SearchRequest {
            query: Some(query.to_string()),
            ..self.request(options)?
        };
        self.repository.search_chunks(&request).await
    }

    pub async fn search_chunks_by_vector(
        &self,
        query_text: &str,
        options: SearchOptions,
    ) -> Result<SearchResponse> {
        let embedder = self.embedder.as_ref().ok_or_else(|| {
            RagError::EmbeddingUnavailable("vector search needs an embedding service".to_string())
        })?;
        Validator::validate_content_not_empty(query_text)?;

        let request = self.request(options)?;
        let vector = embedder.embed_single(query_text).await?;
        Validator::validate_vector(&vector, embedder.dimensions())?;
        debug!("Vector search with {} dimensions", vector.len());
        self.repository
            .search_chunks(&SearchRequest {
                vector: Some(vector),
                ..request
            })
            .await
    }

    /// Text and vector legs together; text only when no embedder is configured.
    pub async fn search_chunks_hybrid(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<SearchResponse> {
        let Some(embedder) = self.embedder.as_ref() else {
            warn!("No embedding service configured, falling back to text search");
            return self.search_chunks_by_text(query, options).await;
        };
        Validator::validate_content_not_empty(query)?;

        let request = self.request(options)?;
        let vector = embedder.embed_single(query).await?;
        Validator::validate_vector(&vector, embedder.dimensions())?;
        self.repository
            .search_chunks(&SearchRequest {
                query: Some(query.to_string()),
                vector: Some(vector),
                ..request
            })
            .await
    }

    pub async fn get_document(&self, document_id: &str) -> Result<GetDocumentResponse> {
        Validator::validate_document_id(document_id)?;
        self.repository.get_document(document_id).await
    }

    pub async fn search_documents(
        &self,
        query: &str,
        options: SearchOptions,
    ) -> Result<SearchResponse> {
        Validator::validate_content_not_empty(query)?;
        let request = SearchRequest {
            query: Some(query.to_string()),
            ..self.request(options)?
        };
        self.repository.search_documents(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{DocChunk, DocMeta, DoclingDocument};
    use crate::usecases::testing::{FakeEmbedder, InMemoryRepository};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn chunks() -> Vec<DocChunk> {
        (0..3)
            .map(|i| {
                let mut chunk = DocChunk::new(format!("text {}", i), DocMeta::default());
                chunk.chunk_id = Some(DocChunk::chunk_id_for("doc", i));
                chunk.document_id = Some("doc".to_string());
                chunk
            })
            .collect()
    }

    fn search(
        repository: Arc<InMemoryRepository>,
        embedder: Option<Arc<FakeEmbedder>>,
    ) -> DocumentSearchUseCase {
        DocumentSearchUseCase::new(
            repository,
            embedder.map(|e| e as Arc<dyn EmbeddingService>),
            10,
            100,
        )
    }

    #[tokio::test]
    async fn test_text_search_uses_default_size() {
        let repository = Arc::new(InMemoryRepository::with_chunks(chunks()));
        let response = search(repository.clone(), None)
            .search_chunks_by_text("text", SearchOptions::default())
            .await
            .unwrap();

        assert_eq!(response.hits.len(), 3);
        let request = repository.last_search().unwrap();
        assert_eq!(request.size, 10);
        assert_eq!(request.query.as_deref(), Some("text"));
        assert!(request.vector.is_none());
    }

    #[tokio::test]
    async fn test_size_over_limit_rejected() {
        let repository = Arc::new(InMemoryRepository::default());
        let result = search(repository.clone(), None)
            .search_chunks_by_text("text", SearchOptions::with_size(500))
            .await;
        assert!(matches!(result, Err(RagError::Validation(_))));
        assert!(repository.last_search().is_none());
    }

    #[tokio::test]
    async fn test_vector_search_requires_embedder() {
        let repository = Arc::new(InMemoryRepository::default());
        let result = search(repository, None)
            .search_chunks_by_vector("query", SearchOptions::default())
            .await;
        assert!(matches!(result, Err(RagError::EmbeddingUnavailable(_))));
    }

    #[tokio::test]
    async fn test_vector_search_sends_only_vector() {
        let repository = Arc::new(InMemoryRepository::with_chunks(chunks()));
        search(repository.clone(), Some(Arc::new(FakeEmbedder::new(2))))
            .search_chunks_by_vector("abc", SearchOptions::with_size(2))
            .await
            .unwrap();

        let request = repository.last_search().unwrap();
        assert_eq!(request.vector, Some(vec![3.0, 3.0]));
        assert!(request.query.is_none());
        assert_eq!(request.size, 2);
    }

    #[tokio::test]
    async fn test_hybrid_search_carries_both_legs_and_filters() {
        let repository = Arc::new(InMemoryRepository::with_chunks(chunks()));
        let mut filters = Map::new();
        filters.insert("chunk.document_id".to_string(), json!("doc"));

        search(repository.clone(), Some(Arc::new(FakeEmbedder::new(2))))
            .search_chunks_hybrid(
                "revenue",
                SearchOptions {
                    filters: Some(filters.clone()),
                    ..SearchOptions::default()
                },
            )
            .await
            .unwrap();

        let request = repository.last_search().unwrap();
        assert_eq!(request.query.as_deref(), Some("revenue"));
        assert_eq!(request.vector, Some(vec![7.0, 7.0]));
        assert_eq!(request.filters, Some(filters));
    }

    #[tokio::test]
    async fn test_hybrid_falls_back_to_text() {
        let repository = Arc::new(InMemoryRepository::with_chunks(chunks()));
        search(repository.clone(), None)
            .search_chunks_hybrid("revenue", SearchOptions::default())
            .await
            .unwrap();

        let request = repository.last_search().unwrap();
        assert!(request.vector.is_none());
        assert_eq!(request.query.as_deref(), Some("revenue"));
    }

    #[tokio::test]
    async fn test_document_lookup_and_search() {
        let repository = Arc::new(InMemoryRepository::default());
        repository
            .documents
            .lock()
            .unwrap()
            .insert("doc".to_string(), DoclingDocument::named("Annual Report"));
        let search = search(repository, None);

        let found = search.get_document("doc").await.unwrap();
        assert!(found.found);
        assert_eq!(found.document().unwrap().name, "Annual Report");
        assert!(!search.get_document("missing").await.unwrap().found);

        let response = search
            .search_documents("Annual", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(response.total, 1);
    }
}
