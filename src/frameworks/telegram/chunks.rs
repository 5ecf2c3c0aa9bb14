// file: src/frameworks/telegram/chunks.rs
// description: per-user store of answer source chunks behind inline keyboard buttons
// reference: https://core.telegram.org/bots/api#inlinekeyboardbutton

use crate::entities::DocChunk;
use crate::frameworks::telegram::markdown::escape_markdown;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Telegram rejects `callback_data` longer than this many bytes.
pub const MAX_CALLBACK_DATA_BYTES: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
}

/// Key used as button payload: the chunk id itself when short enough, else a hash.
pub fn callback_key(chunk_id: &str) -> String {
    if chunk_id.len() <= MAX_CALLBACK_DATA_BYTES {
        return chunk_id.to_string();
    }
    let digest = format!("{:x}", Sha256::digest(chunk_id.as_bytes()));
    format!("chunk:{}", &digest[..16])
}

#[derive(Default)]
pub struct ChunkManager {
    user_chunks: RwLock<HashMap<String, HashMap<String, StoredChunk>>>,
}

impl ChunkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the used chunks found among `chunks` and returns `(callback key, chunk id)`
    /// pairs in `chunk_ids` order. Ids without a matching chunk are skipped.
    pub async fn store_chunks(
        &self,
        user_id: &str,
        chunk_ids: &[String],
        chunks: &[DocChunk],
    ) -> Vec<(String, String)> {
        let mut stored = Vec::new();
        let mut user_chunks = self.user_chunks.write().await;
        let entries = user_chunks.entry(user_id.to_string()).or_default();

        for chunk_id in chunk_ids {
            let Some(chunk) = chunks
                .iter()
                .find(|c| c.chunk_id.as_deref() == Some(chunk_id.as_str()))
            else {
                continue;
            };
            if stored.iter().any(|(_, id)| id == chunk_id) {
                continue;
            }

            let key = callback_key(chunk_id);
            entries.insert(
                key.clone(),
                StoredChunk {
                    chunk_id: chunk_id.clone(),
                    document_id: chunk.document_id.clone().unwrap_or_default(),
                    text: chunk.text.clone(),
                },
            );
            stored.push((key, chunk_id.clone()));
        }

        stored
    }

    pub async fn get_chunk(&self, user_id: &str, key: &str) -> Option<StoredChunk> {
        self.user_chunks
            .read()
            .await
            .get(user_id)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    pub async fn clear_user_chunks(&self, user_id: &str) -> bool {
        self.user_chunks.write().await.remove(user_id).is_some()
    }

    pub async fn user_chunk_ids(&self, user_id: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .user_chunks
            .read()
            .await
            .get(user_id)
            .map(|entries| entries.values().map(|c| c.chunk_id.clone()).collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }
}

/// Message body shown when a source button is pressed. The escaped content is
/// capped at `max_display_length` chars, never splitting an escape sequence.
pub fn format_chunk_content(chunk: &StoredChunk, max_display_length: usize) -> String {
    let mut content = String::new();
    let mut length = 0;
    let mut truncated = false;
    for c in chunk.text.chars() {
        let escaped = escape_markdown(c.encode_utf8(&mut [0; 4]));
        let width = escaped.chars().count();
        if length + width > max_display_length {
            truncated = true;
            break;
        }
        content.push_str(&escaped);
        length += width;
    }
    if truncated {
        content.push_str("...");
    }

    format!(
        "📄 *Document Chunk:* `{}`\n\n📋 *Document ID:* `{}`\n\n*Content:*\n{}",
        chunk.chunk_id, chunk.document_id, content
    )
}
