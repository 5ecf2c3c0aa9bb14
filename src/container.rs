// file: src/container.rs
// description: builds the concrete services and use cases from configuration
// reference: application bootstrap and orchestration

use crate::adaptors::elasticsearch::{
    ChunkIdMigration, ElasticsearchAdaptor, ElasticsearchClient, MigrationOptions,
};
use crate::config::Config;
use crate::error::{RagError, Result};
use crate::frameworks::genai::{GeminiEmbeddingService, GeminiLlmService, GenAiClient};
use crate::frameworks::telegram::{BotApi, TelegramBotService, TelegramClient};
use crate::usecases::agent::AgenticRagUseCase;
use crate::usecases::{
    DocumentIndexingUseCase, DocumentRepository, DocumentSearchUseCase, EmbeddingService,
    LlmService,
};
use crate::utils::{HealthCheck, HealthReport};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Shared services. Gemini services are absent when no API key is configured.
pub struct Container {
    config: Config,
    es_client: Arc<ElasticsearchClient>,
    repository: Arc<dyn DocumentRepository>,
    embedder: Option<Arc<dyn EmbeddingService>>,
    llm: Option<Arc<dyn LlmService>>,
}

impl Container {
    pub fn new(config: Config) -> Result<Self> {
        let es_client = Arc::new(ElasticsearchClient::new(&config.elasticsearch)?);
        let repository: Arc<dyn DocumentRepository> = Arc::new(ElasticsearchAdaptor::new(
            es_client.clone(),
            config.elasticsearch.clone(),
        ));

        let (embedder, llm) = if config.google_genai.api_keys.is_empty() {
            warn!("No Google GenAI API keys configured; embeddings and the agent are disabled");
            (None, None)
        } else {
            let genai = Arc::new(GenAiClient::new(&config.google_genai)?);
            info!("Google GenAI configured with {} API key(s)", genai.key_count());
            let embedder: Arc<dyn EmbeddingService> = Arc::new(GeminiEmbeddingService::new(
                genai.clone(),
                &config.google_genai,
            ));
            let llm: Arc<dyn LlmService> =
                Arc::new(GeminiLlmService::new(genai, config.agent_model()));
            (Some(embedder), Some(llm))
        };

        Ok(Self {
            config,
            es_client,
            repository,
            embedder,
            llm,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> Arc<dyn DocumentRepository> {
        self.repository.clone()
    }

    pub fn embedding_service(&self) -> Option<Arc<dyn EmbeddingService>> {
        self.embedder.clone()
    }

    pub fn llm_service(&self) -> Result<Arc<dyn LlmService>> {
        self.llm.clone().ok_or_else(|| {
            RagError::Config("google_genai.api_keys is required for generation".to_string())
        })
    }

    /// Indexing with embeddings switched off when `generate_embeddings` is false.
    pub fn indexing_use_case(&self, generate_embeddings: bool) -> DocumentIndexingUseCase {
        let mut config = self.config.indexing.clone();
        config.generate_embeddings = config.generate_embeddings && generate_embeddings;
        DocumentIndexingUseCase::new(self.repository(), self.embedding_service(), config)
    }

    pub fn search_use_case(&self) -> Arc<DocumentSearchUseCase> {
        Arc::new(DocumentSearchUseCase::new(
            self.repository(),
            self.embedding_service(),
            self.config.elasticsearch.default_search_size,
            self.config.elasticsearch.max_search_size,
        ))
    }

    pub fn agent(&self) -> Result<Arc<AgenticRagUseCase>> {
        Ok(Arc::new(AgenticRagUseCase::new(
            self.search_use_case(),
            self.repository(),
            self.llm_service()?,
            self.config.agent.clone(),
        )))
    }

    pub fn telegram_bot_service(&self) -> Result<TelegramBotService> {
        let api: Arc<dyn BotApi> = Arc::new(TelegramClient::new(&self.config.telegram)?);
        Ok(TelegramBotService::new(
            api,
            self.agent()?,
            &self.config.telegram,
        ))
    }

    pub fn chunk_id_migration(&self, options: MigrationOptions) -> ChunkIdMigration {
        ChunkIdMigration::new(
            self.es_client.clone(),
            &self.config.elasticsearch.index_name,
            options,
        )
    }

    /// Probes Elasticsearch and the index, GenAI key setup and the bot token.
    pub async fn health_check(&self) -> HealthReport {
        let mut checks = Vec::new();
        let index = &self.config.elasticsearch.index_name;

        let start = Instant::now();
        checks.push(match self.es_client.ping().await {
            Ok(_) => HealthCheck::healthy("elasticsearch", start.elapsed()),
            Err(e) => HealthCheck::unhealthy("elasticsearch", e.to_string(), start.elapsed()),
        });

        let start = Instant::now();
        checks.push(match self.es_client.index_exists(index).await {
            Ok(true) => HealthCheck::healthy("index", start.elapsed()),
            Ok(false) => HealthCheck::degraded(
                "index",
                format!("index '{}' does not exist, run init-index", index),
                start.elapsed(),
            ),
            Err(e) => HealthCheck::unhealthy("index", e.to_string(), start.elapsed()),
        });

        let start = Instant::now();
        checks.push(match self.llm.as_ref() {
            Some(llm) => {
                let mut check = HealthCheck::healthy("google_genai", start.elapsed());
                check.message = Some(format!(
                    "{} key(s), model {}, {} known models",
                    self.config.google_genai.api_keys.len(),
                    self.config.agent_model(),
                    llm.available_models().len()
                ));
                check
            }
            None => HealthCheck::degraded(
                "google_genai",
                "no API keys configured".to_string(),
                start.elapsed(),
            ),
        });

        let start = Instant::now();
        checks.push(match TelegramClient::new(&self.config.telegram) {
            Ok(client) => match client.get_me().await {
                Ok(_) => HealthCheck::healthy("telegram", start.elapsed()),
                Err(e) => HealthCheck::unhealthy("telegram", e.to_string(), start.elapsed()),
            },
            Err(_) => HealthCheck::degraded(
                "telegram",
                "bot token not configured".to_string(),
                start.elapsed(),
            ),
        });

        HealthReport::new(checks, env!("CARGO_PKG_VERSION"))
    }
}
