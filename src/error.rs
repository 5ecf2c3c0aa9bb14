// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Elasticsearch error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Elasticsearch {
        status: Option<u16>,
        message: String,
    },

    #[error("GenAI error: {0}")]
    GenAi(String),

    #[error("Telegram error: {0}")]
    Telegram(String),

    #[error("Docling parsing error in {file}: {message}")]
    Docling { file: String, message: String },

    #[error("Embedding service not available: {0}")]
    EmbeddingUnavailable(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    pub fn elasticsearch(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Elasticsearch {
            status,
            message: message.into(),
        }
    }

    /// HTTP status carried by an Elasticsearch error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Elasticsearch { status, .. } => *status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elasticsearch_error_display() {
        let err = RagError::elasticsearch(Some(413), "payload too large");
        assert_eq!(
            err.to_string(),
            "Elasticsearch error (HTTP 413): payload too large"
        );

        let err = RagError::elasticsearch(None, "connection refused");
        assert_eq!(err.to_string(), "Elasticsearch error: connection refused");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(RagError::elasticsearch(Some(404), "missing").is_not_found());
        assert!(!RagError::elasticsearch(Some(500), "boom").is_not_found());
        assert!(!RagError::Validation("bad".to_string()).is_not_found());
    }
}
