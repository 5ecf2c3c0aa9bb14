// file: src/frameworks/genai/embedding.rs
// description: gemini batch embeddings behind the EmbeddingService trait
// reference: https://ai.google.dev/api/embeddings

use crate::config::GoogleGenAiConfig;
use crate::error::{RagError, Result};
use crate::frameworks::genai::base::GenAiClient;
use crate::usecases::interfaces::EmbeddingService;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Upper bound on requests in one `batchEmbedContents` call.
const MAX_BATCH_REQUESTS: usize = 100;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: String,
    content: EmbedContent<'a>,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

pub struct GeminiEmbeddingService {
    client: Arc<GenAiClient>,
    model: String,
    dimensions: usize,
}

impl GeminiEmbeddingService {
    pub fn new(client: Arc<GenAiClient>, config: &GoogleGenAiConfig) -> Self {
        Self {
            client,
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        }
    }

    fn batch_request<'a>(&self, texts: &'a [String]) -> BatchEmbedRequest<'a> {
        BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: EmbedContent {
                        parts: [EmbedPart { text }],
                    },
                    output_dimensionality: self.dimensions,
                })
                .collect(),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = self.batch_request(texts);
        let response: BatchEmbedResponse = self
            .client
            .post_model(&self.model, "batchEmbedContents", &request)
            .await?;

        if response.embeddings.len() != texts.len() {
            return Err(RagError::GenAi(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                response.embeddings.len()
            )));
        }

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }
}

#[async_trait]
impl EmbeddingService for GeminiEmbeddingService {
    async fn embed_content(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH_REQUESTS) {
            debug!(
                "Requesting {} embeddings from {} ({} dims)",
                batch.len(),
                self.model,
                self.dimensions
            );
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn service() -> GeminiEmbeddingService {
        let config = GoogleGenAiConfig {
            api_keys: vec!["test-key".to_string()],
            ..GoogleGenAiConfig::default()
        };
        GeminiEmbeddingService::new(Arc::new(GenAiClient::new(&config).unwrap()), &config)
    }

    #[test]
    fn test_batch_request_shape() {
        let service = service();
        let texts = vec!["first".to_string(), "second".to_string()];
        let body = serde_json::to_value(service.batch_request(&texts)).unwrap();

        assert_eq!(
            body["requests"][0],
            json!({
                "model": "models/gemini-embedding-001",
                "content": {"parts": [{"text": "first"}]},
                "outputDimensionality": 768
            })
        );
        assert_eq!(body["requests"][1]["content"]["parts"][0]["text"], json!("second"));
    }

    #[test]
    fn test_response_parsing() {
        let response: BatchEmbedResponse =
            serde_json::from_value(json!({"embeddings": [{"values": [0.1, 0.2]}, {}]})).unwrap();
        assert_eq!(response.embeddings[0].values, vec![0.1, 0.2]);
        assert!(response.embeddings[1].values.is_empty());
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_request() {
        let vectors = service().embed_content(&[]).await.unwrap();
        assert!(vectors.is_empty());
        assert_eq!(service().dimensions(), 768);
    }
}
