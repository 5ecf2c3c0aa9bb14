// file: src/config.rs
// description: application configuration management with yaml support
// reference: https://docs.rs/config

use crate::error::{RagError, Result};
use crate::utils::validation::Validator;
use dotenvy::dotenv;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const ENV_PREFIX: &str = "MULTIMODAL_RAG";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub elasticsearch: ElasticsearchConfig,
    pub google_genai: GoogleGenAiConfig,
    pub telegram: TelegramConfig,
    pub agent: AgentConfig,
    pub indexing: IndexingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ElasticsearchConfig {
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub verify_certs: bool,
    pub ca_certs: Option<PathBuf>,
    pub request_timeout_secs: u64,
    pub index_name: String,
    pub vector_dimensions: usize,
    pub shards: u32,
    pub replicas: u32,
    pub default_search_size: usize,
    pub max_search_size: usize,
    pub highlight_fragment_size: usize,
    pub highlight_fragments: usize,
    pub bulk_batch_size: usize,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["http://localhost:9200".to_string()],
            username: None,
            password: None,
            verify_certs: true,
            ca_certs: None,
            request_timeout_secs: 30,
            index_name: "multimodal_index".to_string(),
            vector_dimensions: 768,
            shards: 1,
            replicas: 0,
            default_search_size: 10,
            max_search_size: 100,
            highlight_fragment_size: 150,
            highlight_fragments: 3,
            bulk_batch_size: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GoogleGenAiConfig {
    /// A single key or a list of keys rotated on rate limits.
    #[serde(deserialize_with = "string_or_list")]
    pub api_keys: Vec<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub default_llm_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_backoff_secs: u64,
    pub max_key_cycles: u32,
    pub cycle_cooldown_secs: u64,
}

impl Default for GoogleGenAiConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            embedding_model: "gemini-embedding-001".to_string(),
            embedding_dimensions: 768,
            default_llm_model: "gemini-2.5-flash".to_string(),
            timeout_secs: 60,
            max_retries: 7,
            max_backoff_secs: 60,
            max_key_cycles: 2,
            cycle_cooldown_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub api_base_url: String,
    pub poll_timeout_secs: u64,
    pub max_message_length: usize,
    pub max_caption_length: usize,
    pub max_media_group_size: usize,
    pub max_conversation_length: usize,
    pub max_chunk_display_length: usize,
    pub message_delay_ms: u64,
    pub typing_interval_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_base_url: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
            max_message_length: 4096,
            max_caption_length: 1024,
            max_media_group_size: 10,
            max_conversation_length: 10,
            max_chunk_display_length: 3000,
            message_delay_ms: 500,
            typing_interval_secs: 4,
        }
    }
}

impl TelegramConfig {
    pub fn require_token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RagError::Config("telegram.bot_token is not set".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    pub llm_model: Option<String>,
    pub retrieval_size: usize,
    pub history_window: usize,
    pub decision_history: usize,
    pub max_rewrites: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            llm_model: None,
            retrieval_size: 10,
            history_window: 5,
            decision_history: 3,
            max_rewrites: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IndexingConfig {
    pub directory: PathBuf,
    pub max_tokens: usize,
    pub embedding_batch_size: usize,
    pub parallel_documents: usize,
    pub generate_embeddings: bool,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data/indexing"),
            max_tokens: 512,
            embedding_batch_size: 60,
            parallel_documents: 2,
            generate_embeddings: true,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

fn string_or_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let keys = match Option::<StringOrList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(StringOrList::One(key)) => key.split(',').map(str::to_string).collect(),
        Some(StringOrList::Many(keys)) => keys,
    };

    Ok(keys
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .collect())
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder
                .add_source(config::File::from(Path::new(DEFAULT_CONFIG_PATH)).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("elasticsearch.hosts")
                .with_list_parse_key("google_genai.api_keys")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| RagError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| RagError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        let es = &self.elasticsearch;

        if es.hosts.is_empty() {
            return Err(RagError::Config(
                "elasticsearch.hosts must contain at least one host".to_string(),
            ));
        }
        for host in &es.hosts {
            Validator::validate_url(host).map_err(|e| RagError::Config(e.to_string()))?;
        }

        if es.index_name.trim().is_empty() {
            return Err(RagError::Config(
                "elasticsearch.index_name must not be empty".to_string(),
            ));
        }

        if es.vector_dimensions == 0 {
            return Err(RagError::Config(
                "elasticsearch.vector_dimensions must be greater than 0".to_string(),
            ));
        }

        if !(1..=1000).contains(&es.max_search_size) {
            return Err(RagError::Config(
                "elasticsearch.max_search_size must be between 1 and 1000".to_string(),
            ));
        }

        if es.default_search_size == 0 || es.default_search_size > es.max_search_size {
            return Err(RagError::Config(format!(
                "elasticsearch.default_search_size must be between 1 and {}",
                es.max_search_size
            )));
        }

        if es.highlight_fragments == 0 || es.highlight_fragment_size == 0 {
            return Err(RagError::Config(
                "highlight fragment count and size must be greater than 0".to_string(),
            ));
        }

        Validator::validate_batch_size(es.bulk_batch_size)
            .map_err(|e| RagError::Config(e.to_string()))?;
        Validator::validate_batch_size(self.indexing.embedding_batch_size)
            .map_err(|e| RagError::Config(e.to_string()))?;

        if !self.google_genai.api_keys.is_empty()
            && self.google_genai.embedding_dimensions != es.vector_dimensions
        {
            return Err(RagError::Config(format!(
                "google_genai.embedding_dimensions ({}) must match elasticsearch.vector_dimensions ({})",
                self.google_genai.embedding_dimensions, es.vector_dimensions
            )));
        }

        if self.google_genai.max_retries == 0 || self.google_genai.max_key_cycles == 0 {
            return Err(RagError::Config(
                "google_genai.max_retries and max_key_cycles must be greater than 0".to_string(),
            ));
        }

        let tg = &self.telegram;
        if tg.max_message_length == 0 || tg.max_caption_length == 0 {
            return Err(RagError::Config(
                "telegram message limits must be greater than 0".to_string(),
            ));
        }
        if !(1..=10).contains(&tg.max_media_group_size) {
            return Err(RagError::Config(
                "telegram.max_media_group_size must be between 1 and 10".to_string(),
            ));
        }

        if self.indexing.max_tokens == 0 {
            return Err(RagError::Config(
                "indexing.max_tokens must be greater than 0".to_string(),
            ));
        }

        if self.indexing.parallel_documents == 0 {
            return Err(RagError::Config(
                "indexing.parallel_documents must be greater than 0".to_string(),
            ));
        }

        if self.agent.retrieval_size == 0 {
            return Err(RagError::Config(
                "agent.retrieval_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Model used by the agent, falling back to the GenAI default.
    pub fn agent_model(&self) -> &str {
        self.agent
            .llm_model
            .as_deref()
            .unwrap_or(&self.google_genai.default_llm_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.elasticsearch.index_name, "multimodal_index");
        assert_eq!(config.telegram.max_message_length, 4096);
        assert_eq!(config.telegram.max_caption_length, 1024);
        assert_eq!(config.agent_model(), "gemini-2.5-flash");
    }

    #[test]
    fn test_load_partial_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(
            &path,
            r#"
elasticsearch:
  hosts: ["http://es.local:9200"]
  index_name: docs_index
  vector_dimensions: 1536
google_genai:
  api_keys: single-key
  embedding_dimensions: 1536
telegram:
  bot_token: "123:abc"
agent:
  llm_model: gemini-1.5-pro
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.elasticsearch.index_name, "docs_index");
        assert_eq!(config.elasticsearch.vector_dimensions, 1536);
        assert_eq!(config.elasticsearch.highlight_fragments, 3);
        assert_eq!(config.google_genai.api_keys, vec!["single-key"]);
        assert_eq!(config.telegram.require_token().unwrap(), "123:abc");
        assert_eq!(config.agent_model(), "gemini-1.5-pro");
        assert_eq!(config.indexing.max_tokens, 512);
    }

    #[test]
    fn test_load_key_list() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.yaml");
        fs::write(
            &path,
            "google_genai:\n  api_keys:\n    - key-a\n    - \" key-b \"\n    - \"\"\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.google_genai.api_keys, vec!["key-a", "key-b"]);
    }

    #[test]
    fn test_invalid_search_sizes_rejected() {
        let mut config = Config::default_config();
        config.elasticsearch.default_search_size = 500;
        assert!(config.validate().is_err());

        let mut config = Config::default_config();
        config.elasticsearch.max_search_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_embedding_dimensions_must_match_index() {
        let mut config = Config::default_config();
        config.elasticsearch.vector_dimensions = 1536;
        assert!(config.validate().is_ok());

        config.google_genai.api_keys = vec!["key-a".to_string()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("embedding_dimensions (768)"));

        config.google_genai.embedding_dimensions = 1536;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_host_rejected() {
        let mut config = Config::default_config();
        config.elasticsearch.hosts = vec!["localhost:9200".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_token() {
        let config = Config::default_config();
        assert!(config.telegram.require_token().is_err());
    }
}
