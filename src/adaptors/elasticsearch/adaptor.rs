// file: src/adaptors/elasticsearch/adaptor.rs
// description: document repository backed by a single elasticsearch index
// reference: https://www.elastic.co/guide/en/elasticsearch/reference/current/docs-bulk.html

use crate::adaptors::elasticsearch::client::{ElasticsearchClient, error_reason};
use crate::adaptors::elasticsearch::mapping::create_index_body;
use crate::adaptors::elasticsearch::query::{
    HighlightOptions, chunk_search_body, document_search_body, parse_search_response,
    picture_lookup_body,
};
use crate::config::ElasticsearchConfig;
use crate::entities::{
    DocChunk, DoclingDocument, DocumentPicture, DocumentTable, DocumentText, ElasticEntity,
};
use crate::error::{RagError, Result};
use crate::usecases::dtos::{
    BulkIndexResponse, DocumentBatch, GetDocumentResponse, IndexResponse, SearchRequest,
    SearchResponse,
};
use crate::usecases::interfaces::DocumentRepository;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct ElasticsearchAdaptor {
    client: Arc<ElasticsearchClient>,
    config: ElasticsearchConfig,
}

impl ElasticsearchAdaptor {
    pub fn new(client: Arc<ElasticsearchClient>, config: ElasticsearchConfig) -> Self {
        Self { client, config }
    }

    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    pub fn client(&self) -> &ElasticsearchClient {
        &self.client
    }

    fn highlight_options(&self) -> HighlightOptions {
        HighlightOptions {
            fragment_size: self.config.highlight_fragment_size,
            number_of_fragments: self.config.highlight_fragments,
        }
    }

    /// Writes one entity; Elasticsearch failures come back as `success = false`.
    async fn index_entity(&self, kind: &str, id: &str, source: Value) -> Result<IndexResponse> {
        let response = match self
            .client
            .put_document(&self.config.index_name, id, source)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Failed to index {} {}: {}", kind, id, e);
                return Ok(IndexResponse::failed(
                    id,
                    format!("Failed to index {}: {}", kind, e),
                ));
            }
        };

        if response.status == StatusCode::PAYLOAD_TOO_LARGE {
            warn!("{} {} rejected as too large", kind, id);
            return Ok(IndexResponse::failed(
                id,
                format!(
                    "{} is too large to index. Consider splitting it or raising http.max_content_length (HTTP 413)",
                    capitalize(kind)
                ),
            ));
        }

        if !response.is_success() {
            let reason = error_reason(&response.body);
            error!("Failed to index {} {}: {}", kind, id, reason);
            return Ok(IndexResponse::failed(
                id,
                format!(
                    "Failed to index {}: {} (HTTP {})",
                    kind,
                    reason,
                    response.status.as_u16()
                ),
            ));
        }

        let result = response
            .body
            .get("result")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        debug!("Indexed {} {}: {}", kind, id, result);

        let message = format!("{} {}", capitalize(kind), result);
        if matches!(result, "created" | "updated") {
            Ok(IndexResponse::ok(id, message))
        } else {
            Ok(IndexResponse::failed(id, message))
        }
    }

    async fn delete_entity(&self, kind: &str, id: &str) -> Result<bool> {
        let response = self
            .client
            .delete_document(&self.config.index_name, id)
            .await?;
        if response.status == StatusCode::NOT_FOUND {
            debug!("{} {} not found for deletion", kind, id);
            return Ok(false);
        }
        let body = response.into_result()?;
        let deleted = body.get("result").and_then(Value::as_str) == Some("deleted");
        info!("Deleted {} {}: {}", kind, id, deleted);
        Ok(deleted)
    }

    /// NDJSON action/source pairs for every entity in the batch.
    pub fn bulk_operations(&self, batch: &DocumentBatch) -> Result<Vec<(String, Value)>> {
        let mut operations = Vec::with_capacity(batch.entry_count());
        operations.push((batch.document_id.clone(), batch.document.to_elastic_data()?));

        for text in &batch.texts {
            operations.push((text.text_id.clone(), text.to_elastic_data()?));
        }
        for picture in &batch.pictures {
            operations.push((picture.picture_id.clone(), picture.to_elastic_data()?));
        }
        for table in &batch.tables {
            operations.push((table.table_id.clone(), table.to_elastic_data()?));
        }
        for (i, chunk) in batch.chunks.iter().enumerate() {
            let chunk_id = chunk
                .chunk_id
                .clone()
                .unwrap_or_else(|| DocChunk::chunk_id_for(&batch.document_id, i));
            let mut chunk = chunk.clone();
            chunk.chunk_id = Some(chunk_id.clone());
            if chunk.document_id.is_none() {
                chunk.document_id = Some(batch.document_id.clone());
            }
            operations.push((chunk_id, chunk.to_elastic_data()?));
        }

        Ok(operations)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn bulk_payload(index: &str, operations: &[(String, Value)]) -> String {
    let mut payload = String::new();
    for (id, source) in operations {
        payload.push_str(&json!({"index": {"_index": index, "_id": id}}).to_string());
        payload.push('\n');
        payload.push_str(&source.to_string());
        payload.push('\n');
    }
    payload
}

/// Counts successful items and collects per-item failures from a `_bulk` response.
pub fn summarize_bulk_response(body: &Value) -> (usize, Vec<String>) {
    let mut succeeded = 0;
    let mut errors = Vec::new();

    for item in body
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
    {
        let Some(result) = item.as_object().and_then(|o| o.values().next()) else {
            continue;
        };
        let status = result.get("status").and_then(Value::as_u64).unwrap_or(0);
        let id = result.get("_id").and_then(Value::as_str).unwrap_or("?");

        if (200..300).contains(&status) {
            succeeded += 1;
        } else {
            let reason = result
                .get("error")
                .map(|e| error_reason(&json!({ "error": e })))
                .unwrap_or_else(|| format!("HTTP {}", status));
            errors.push(format!("{}: {}", id, reason));
        }
    }

    (succeeded, errors)
}

#[async_trait]
impl DocumentRepository for ElasticsearchAdaptor {
    async fn initialize_indices(&self) -> Result<()> {
        let index = &self.config.index_name;
        if self.client.index_exists(index).await? {
            info!("Index {} already exists", index);
            return Ok(());
        }

        self.client
            .create_index(index, create_index_body(&self.config))
            .await?;
        info!(
            "Created index {} ({} vector dimensions)",
            index, self.config.vector_dimensions
        );
        Ok(())
    }

    async fn index_document(
        &self,
        document_id: &str,
        document: &DoclingDocument,
    ) -> Result<IndexResponse> {
        self.index_entity("document", document_id, document.to_elastic_data()?)
            .await
    }

    async fn index_chunk(&self, chunk_id: &str, chunk: &DocChunk) -> Result<IndexResponse> {
        let mut chunk = chunk.clone();
        if chunk.chunk_id.is_none() {
            chunk.chunk_id = Some(chunk_id.to_string());
        }
        self.index_entity("chunk", chunk_id, chunk.to_elastic_data()?)
            .await
    }

    async fn index_text(&self, text: &DocumentText) -> Result<IndexResponse> {
        self.index_entity("text", &text.text_id, text.to_elastic_data()?)
            .await
    }

    async fn index_picture(&self, picture: &DocumentPicture) -> Result<IndexResponse> {
        self.index_entity("picture", &picture.picture_id, picture.to_elastic_data()?)
            .await
    }

    async fn index_table(&self, table: &DocumentTable) -> Result<IndexResponse> {
        self.index_entity("table", &table.table_id, table.to_elastic_data()?)
            .await
    }

    async fn get_document(&self, document_id: &str) -> Result<GetDocumentResponse> {
        let response = self
            .client
            .get_document(&self.config.index_name, document_id)
            .await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(GetDocumentResponse::not_found(document_id));
        }

        let body = response.into_result()?;
        let found = body.get("found").and_then(Value::as_bool).unwrap_or(false);
        Ok(GetDocumentResponse {
            document_id: document_id.to_string(),
            found,
            source: if found { body.get("_source").cloned() } else { None },
        })
    }

    async fn get_picture(
        &self,
        document_id: &str,
        picture_id: &str,
    ) -> Result<Option<DocumentPicture>> {
        let body = self
            .client
            .search(
                &self.config.index_name,
                picture_lookup_body(document_id, picture_id),
            )
            .await?;
        let response = parse_search_response(&body)?;

        match response.hits.first() {
            Some(hit) => Ok(Some(DocumentPicture::from_elastic_source(&hit.source)?)),
            None => {
                debug!("Picture {} of {} not found", picture_id, document_id);
                Ok(None)
            }
        }
    }

    async fn search_chunks(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let index = request
            .index_name
            .as_deref()
            .unwrap_or(&self.config.index_name);
        let body = chunk_search_body(request, self.highlight_options())?;
        let response = parse_search_response(&self.client.search(index, body).await?)?;
        debug!(
            "Chunk search returned {} of {} hits",
            response.hits.len(),
            response.total
        );
        Ok(response)
    }

    async fn search_documents(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let index = request
            .index_name
            .as_deref()
            .unwrap_or(&self.config.index_name);
        let body = document_search_body(request)?;
        parse_search_response(&self.client.search(index, body).await?)
    }

    async fn delete_document(&self, document_id: &str) -> Result<bool> {
        self.delete_entity("document", document_id).await
    }

    async fn delete_chunk(&self, chunk_id: &str) -> Result<bool> {
        self.delete_entity("chunk", chunk_id).await
    }

    async fn bulk_index(&self, batch: &DocumentBatch) -> Result<BulkIndexResponse> {
        let operations = self.bulk_operations(batch)?;
        let mut response = BulkIndexResponse {
            document_id: batch.document_id.clone(),
            ..BulkIndexResponse::default()
        };

        for group in operations.chunks(self.config.bulk_batch_size.max(1)) {
            let payload = bulk_payload(&self.config.index_name, group);
            match self.client.bulk(payload).await {
                Ok(body) => {
                    let (succeeded, errors) = summarize_bulk_response(&body);
                    response.total_indexed += succeeded;
                    response.errors.extend(errors);
                }
                Err(RagError::Elasticsearch {
                    status: Some(413), ..
                }) => {
                    response.errors.push(format!(
                        "bulk request of {} entries is too large (HTTP 413)",
                        group.len()
                    ));
                }
                Err(e) => {
                    response
                        .errors
                        .push(format!("bulk request of {} entries failed: {}", group.len(), e));
                }
            }
        }

        info!(
            "Bulk indexed {} of {} entries for document {} ({} errors)",
            response.total_indexed,
            operations.len(),
            batch.document_id,
            response.errors.len()
        );
        Ok(response)
    }
}
