// file: src/usecases/document_indexing.rs
// description: indexes docling documents, their elements and embedded chunks
// reference: coordinates parsing, chunking, embedding and bulk writes

use crate::config::IndexingConfig;
use crate::entities::{DocChunk, DoclingDocument, DoclingFile, HierarchicalChunker};
use crate::error::{RagError, Result};
use crate::usecases::dtos::{BulkIndexResponse, DocumentBatch, IndexResponse};
use crate::usecases::interfaces::{DocumentRepository, EmbeddingService};
use crate::utils::ProgressTracker;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// A Docling export found under the indexing directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDocument {
    pub document_id: String,
    pub path: PathBuf,
}

pub struct DocumentIndexingUseCase {
    repository: Arc<dyn DocumentRepository>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    config: IndexingConfig,
}

impl DocumentIndexingUseCase {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        embedder: Option<Arc<dyn EmbeddingService>>,
        config: IndexingConfig,
    ) -> Self {
        Self {
            repository,
            embedder,
            config,
        }
    }

    pub async fn index_document(
        &self,
        document: &DoclingDocument,
        document_id: Option<&str>,
    ) -> Result<IndexResponse> {
        let document_id = document_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.repository.index_document(&document_id, document).await
    }

    /// Embeds the chunk first when it has no vector and embedding is requested.
    pub async fn index_chunk(
        &self,
        mut chunk: DocChunk,
        chunk_id: Option<&str>,
        generate_embedding: bool,
    ) -> Result<IndexResponse> {
        let chunk_id = chunk_id
            .map(str::to_string)
            .or_else(|| chunk.chunk_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if generate_embedding
            && chunk.vector.is_none()
            && let Some(embedder) = self.embedder.as_ref()
        {
            chunk.vector = Some(embedder.embed_single(&chunk.text).await?);
        }

        self.repository.index_chunk(&chunk_id, &chunk).await
    }

    /// Fills `vector` on every chunk, `embedding_batch_size` texts per request.
    pub async fn embed_chunks(&self, chunks: &mut [DocChunk]) -> Result<()> {
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(());
        };

        for batch in chunks.chunks_mut(self.config.embedding_batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder.embed_content(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(RagError::GenAi(format!(
                    "expected {} embeddings, received {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter_mut().zip(vectors) {
                chunk.vector = Some(vector);
            }
        }
        Ok(())
    }

    pub async fn bulk_index_document_with_chunks(
        &self,
        document: DoclingDocument,
        chunks: Vec<DocChunk>,
        document_id: Option<&str>,
        generate_embeddings: bool,
    ) -> Result<BulkIndexResponse> {
        let document_id = document_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut batch = DocumentBatch::new(&document_id, document);
        batch.chunks = chunks;
        self.index_batch(batch, generate_embeddings).await
    }

    /// Embeds the batch's chunks if asked to, then writes everything in one bulk run.
    pub async fn index_batch(
        &self,
        mut batch: DocumentBatch,
        generate_embeddings: bool,
    ) -> Result<BulkIndexResponse> {
        if generate_embeddings {
            self.embed_chunks(&mut batch.chunks).await?;
        }
        self.repository.bulk_index(&batch).await
    }

    pub async fn index_file(
        &self,
        document: &DiscoveredDocument,
        generate_embeddings: bool,
    ) -> Result<BulkIndexResponse> {
        let path = document.path.clone();
        let document_id = document.document_id.clone();
        let max_tokens = self.config.max_tokens;

        let batch = tokio::task::spawn_blocking(move || -> Result<DocumentBatch> {
            let file = DoclingFile::from_path(&path)?;
            Ok(build_batch(&file, &document_id, max_tokens))
        })
        .await
        .map_err(|e| RagError::Docling {
            file: document.path.display().to_string(),
            message: format!("parsing task failed: {}", e),
        })??;

        info!(
            "Generated {} chunks for document {}",
            batch.chunks.len(),
            batch.document_id
        );
        self.index_batch(batch, generate_embeddings).await
    }

    /// Indexes the first `*.json` of every subdirectory of `directory`.
    /// Per-document failures are logged and skipped.
    pub async fn bulk_index_from_directory(
        &self,
        directory: &Path,
        show_progress: bool,
    ) -> Result<Vec<BulkIndexResponse>> {
        if !directory.is_dir() {
            error!(
                "Indexing directory does not exist: {}",
                directory.display()
            );
            return Ok(Vec::new());
        }

        info!("Starting bulk indexing from directory: {}", directory.display());
        let documents = discover_documents(directory);
        if documents.is_empty() {
            warn!("No Docling JSON files found under {}", directory.display());
            return Ok(Vec::new());
        }

        let progress = ProgressTracker::new(documents.len(), show_progress);
        let generate_embeddings = self.config.generate_embeddings && self.embedder.is_some();
        let concurrency = self.config.parallel_documents.max(1);

        let responses: Vec<BulkIndexResponse> = stream::iter(documents.iter())
            .map(|document| {
                let progress = &progress;
                async move {
                    progress.set_message(document.document_id.clone());
                    match self.index_file(document, generate_embeddings).await {
                        Ok(response) => {
                            if response.is_success() {
                                info!(
                                    "Indexed document {}: {} items",
                                    response.document_id, response.total_indexed
                                );
                            } else {
                                warn!(
                                    "Errors during indexing of {}: {:?}",
                                    response.document_id, response.errors
                                );
                            }
                            progress.record_success(response.total_indexed);
                            Some(response)
                        }
                        Err(e) => {
                            error!("Failed to process {}: {}", document.path.display(), e);
                            progress.record_failure();
                            None
                        }
                    }
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|response| async move { response })
            .collect()
            .await;

        progress.finish();
        let stats = progress.stats();
        info!("Bulk indexing completed: {}", stats.summary());
        Ok(responses)
    }
}

/// Document record, elements and contextualized chunks for one parsed file.
pub fn build_batch(file: &DoclingFile, document_id: &str, max_tokens: usize) -> DocumentBatch {
    let mut batch = DocumentBatch::new(document_id, file.document.clone());
    batch.texts = file.document_texts(document_id);
    batch.pictures = file.document_pictures(document_id);
    batch.tables = file.document_tables(document_id);
    batch.chunks = HierarchicalChunker::new(max_tokens)
        .chunk(file)
        .into_iter()
        .enumerate()
        .map(|(i, draft)| draft.into_chunk(document_id, i))
        .collect();
    batch
}

/// One entry per subdirectory holding at least one `*.json`; the id is the file stem.
pub fn discover_documents(directory: &Path) -> Vec<DiscoveredDocument> {
    let subdirectories = WalkDir::new(directory)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir());

    let mut documents = Vec::new();
    for subdirectory in subdirectories {
        let json_files: Vec<PathBuf> = WalkDir::new(subdirectory.path())
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();

        let Some(first) = json_files.first() else {
            warn!(
                "No JSON file found in directory: {}",
                subdirectory.path().display()
            );
            continue;
        };
        if json_files.len() > 1 {
            warn!(
                "Multiple JSON files found in {}, processing the first one: {}",
                subdirectory.path().display(),
                first.display()
            );
        }

        let Some(stem) = first.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        debug!("Discovered {} at {}", stem, first.display());
        documents.push(DiscoveredDocument {
            document_id: stem,
            path: first.clone(),
        });
    }
    documents
}
