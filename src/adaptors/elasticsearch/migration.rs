// file: src/adaptors/elasticsearch/migration.rs
// description: backfills chunk.chunk_id on chunks indexed before the field existed
// reference: https://www.elastic.co/guide/en/elasticsearch/reference/current/scroll-api.html

use crate::adaptors::elasticsearch::adaptor::summarize_bulk_response;
use crate::adaptors::elasticsearch::client::ElasticsearchClient;
use crate::adaptors::elasticsearch::query::{
    all_chunks_query, chunks_missing_id_query, chunks_with_id_query,
};
use crate::error::Result;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SCROLL_KEEP_ALIVE: &str = "2m";

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub scroll_size: usize,
    pub batch_size: usize,
    pub pause_between_batches: Duration,
    pub dry_run: bool,
    pub verify: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            scroll_size: 1000,
            batch_size: 100,
            pause_between_batches: Duration::from_millis(100),
            dry_run: false,
            verify: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChunkIdCounts {
    pub total: u64,
    pub with_id: u64,
    pub without_id: u64,
}

impl ChunkIdCounts {
    pub fn is_complete(&self) -> bool {
        self.without_id == 0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationReport {
    pub before: ChunkIdCounts,
    pub found: usize,
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub after: Option<ChunkIdCounts>,
}

pub struct ChunkIdMigration {
    client: Arc<ElasticsearchClient>,
    index: String,
    options: MigrationOptions,
}

impl ChunkIdMigration {
    pub fn new(client: Arc<ElasticsearchClient>, index: &str, options: MigrationOptions) -> Self {
        Self {
            client,
            index: index.to_string(),
            options,
        }
    }

    pub async fn counts(&self) -> Result<ChunkIdCounts> {
        Ok(ChunkIdCounts {
            total: self.client.count(&self.index, all_chunks_query()).await?,
            with_id: self.client.count(&self.index, chunks_with_id_query()).await?,
            without_id: self
                .client
                .count(&self.index, chunks_missing_id_query())
                .await?,
        })
    }

    /// Ids of every chunk lacking `chunk.chunk_id`, collected with the scroll API.
    pub async fn chunks_without_id(&self) -> Result<Vec<String>> {
        let body = json!({
            "size": self.options.scroll_size,
            "_source": false,
            "query": chunks_missing_id_query()
        });

        let mut page = self
            .client
            .search_with_scroll(&self.index, body, SCROLL_KEEP_ALIVE)
            .await?;
        let mut ids = Vec::new();

        loop {
            let page_ids = hit_ids(&page);
            let scroll_id = page
                .get("_scroll_id")
                .and_then(Value::as_str)
                .map(str::to_string);

            if page_ids.is_empty() {
                if let Some(scroll_id) = scroll_id
                    && let Err(e) = self.client.clear_scroll(&scroll_id).await
                {
                    warn!("Failed to clear scroll: {}", e);
                }
                break;
            }
            ids.extend(page_ids);

            let Some(scroll_id) = scroll_id else {
                break;
            };
            page = self.client.scroll(&scroll_id, SCROLL_KEEP_ALIVE).await?;
        }

        Ok(ids)
    }

    pub async fn run(&self) -> Result<MigrationReport> {
        let mut report = MigrationReport {
            before: self.counts().await?,
            ..MigrationReport::default()
        };
        info!(
            "Chunks before migration: {} total, {} with id, {} without",
            report.before.total, report.before.with_id, report.before.without_id
        );

        if report.before.is_complete() {
            info!("All chunks already carry chunk_id, nothing to migrate");
            return Ok(report);
        }

        let ids = self.chunks_without_id().await?;
        report.found = ids.len();

        if self.options.dry_run {
            info!("Dry run: {} chunks would be updated", ids.len());
            return Ok(report);
        }

        let batches = ids.chunks(self.options.batch_size.max(1));
        let batch_count = batches.len();
        for (i, batch) in batches.enumerate() {
            match self.client.bulk(update_payload(&self.index, batch)).await {
                Ok(body) => {
                    let (succeeded, errors) = summarize_bulk_response(&body);
                    report.updated += succeeded;
                    report.failed += errors.len();
                    report.errors.extend(errors);
                }
                Err(e) => {
                    report.failed += batch.len();
                    report.errors.push(format!("batch {} failed: {}", i + 1, e));
                }
            }
            info!(
                "Processed batch {}/{}: {} updated, {} failed so far",
                i + 1,
                batch_count,
                report.updated,
                report.failed
            );

            if i + 1 < batch_count && !self.options.pause_between_batches.is_zero() {
                tokio::time::sleep(self.options.pause_between_batches).await;
            }
        }

        if self.options.verify {
            self.client.refresh(&self.index).await?;
            let after = self.counts().await?;
            if after.is_complete() {
                info!("Verification passed: all {} chunks have chunk_id", after.total);
            } else {
                warn!(
                    "Verification found {} chunks still without chunk_id",
                    after.without_id
                );
            }
            report.after = Some(after);
        }

        Ok(report)
    }
}

fn hit_ids(page: &Value) -> Vec<String> {
    page.pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|h| h.get("_id").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Partial updates setting `chunk.chunk_id` to the document `_id`.
pub fn update_payload(index: &str, ids: &[String]) -> String {
    let mut payload = String::new();
    for id in ids {
        payload.push_str(&json!({"update": {"_index": index, "_id": id}}).to_string());
        payload.push('\n');
        payload.push_str(&json!({"doc": {"chunk": {"chunk_id": id}}}).to_string());
        payload.push('\n');
    }
    payload
}
