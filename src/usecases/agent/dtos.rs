// file: src/usecases/agent/dtos.rs
// description: chat messages and agent responses exchanged with the conversational layer
// reference: internal data contracts

use crate::entities::{DocChunk, DocumentPicture};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "User"),
            MessageRole::Assistant => write!(f, "Assistant"),
            MessageRole::System => write!(f, "System"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// `"User: ..."` / `"Assistant: ..."` line used in prompts.
    pub fn prompt_line(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

/// Shape requested from the model when generating the final answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredAnswer {
    pub answer: String,
    #[serde(default)]
    pub chunk_ids_used: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentResponse {
    pub content: String,
    /// Chunks the answer was generated from.
    pub retrieved_chunks: Vec<DocChunk>,
    pub chunk_ids_used: Vec<String>,
    pub pictures: Vec<DocumentPicture>,
    pub metadata: Map<String, Value>,
}

impl AgentResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn has_sources(&self) -> bool {
        !self.retrieved_chunks.is_empty()
    }
}
