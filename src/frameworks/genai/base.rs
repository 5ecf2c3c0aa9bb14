// file: src/frameworks/genai/base.rs
// description: gemini rest transport with api key rotation and retry backoff
// reference: https://ai.google.dev/api/rest

use crate::config::GoogleGenAiConfig;
use crate::error::{RagError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

lazy_static! {
    static ref SECONDS_PATTERN: Regex =
        Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(?:seconds?|secs?|s)\b").expect("valid regex");
    static ref RETRY_DELAY_PATTERN: Regex =
        Regex::new(r"(?i)retry[_\s]*delay[:\s]*(\d+(?:\.\d+)?)").expect("valid regex");
}

const RATE_LIMIT_TERMS: &[&str] = &[
    "rate limit",
    "quota",
    "429",
    "too many requests",
    "resource_exhausted",
];

pub fn is_rate_limit_error(message: &str) -> bool {
    let message = message.to_lowercase();
    RATE_LIMIT_TERMS.iter().any(|term| message.contains(term))
}

/// Server-suggested wait in seconds, if the error text carries one.
pub fn parse_retry_delay(message: &str) -> Option<f64> {
    SECONDS_PATTERN
        .captures(message)
        .or_else(|| RETRY_DELAY_PATTERN.captures(message))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries per key after the first attempt.
    pub max_retries: u32,
    pub max_backoff: Duration,
    /// Full passes over the key list before giving up.
    pub max_key_cycles: u32,
    pub cycle_cooldown: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &GoogleGenAiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            max_key_cycles: config.max_key_cycles.max(1),
            cycle_cooldown: Duration::from_secs(config.cycle_cooldown_secs),
        }
    }

    /// Suggested delay when present, else `2^attempt` seconds, both capped at `max_backoff`.
    pub fn backoff(&self, attempt: u32, message: &str) -> Duration {
        let delay = match parse_retry_delay(message) {
            Some(secs) if secs.is_finite() && secs >= 0.0 => Duration::from_secs_f64(secs),
            _ => Duration::from_secs(2u64.saturating_pow(attempt)),
        };
        delay.min(self.max_backoff)
    }
}

/// Round-robin pool of API keys shared by every request of a client.
#[derive(Debug)]
pub struct ApiKeyPool {
    keys: Vec<String>,
    current: AtomicUsize,
}

impl ApiKeyPool {
    pub fn new(keys: Vec<String>) -> Result<Self> {
        if keys.is_empty() {
            return Err(RagError::Config(
                "google_genai.api_keys must contain at least one key".to_string(),
            ));
        }
        Ok(Self {
            keys,
            current: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current.load(Ordering::SeqCst) % self.keys.len()
    }

    pub fn key(&self, index: usize) -> &str {
        &self.keys[index % self.keys.len()]
    }

    /// Moves to the next key and returns its index.
    pub fn advance(&self) -> usize {
        let next = (self.current_index() + 1) % self.keys.len();
        self.current.store(next, Ordering::SeqCst);
        info!("Switched to API key index {}", next);
        next
    }
}

pub struct GenAiClient {
    http: Client,
    base_url: String,
    keys: ApiKeyPool,
    policy: RetryPolicy,
}

impl GenAiClient {
    pub fn new(config: &GoogleGenAiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_parts(
            http,
            &config.base_url,
            ApiKeyPool::new(config.api_keys.clone())?,
            RetryPolicy::from_config(config),
        ))
    }

    pub fn with_parts(http: Client, base_url: &str, keys: ApiKeyPool, policy: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            keys,
            policy,
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Runs `call` with the current key, retrying and rotating keys per the policy.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let rotations = self.keys.len() * self.policy.max_key_cycles as usize;

        for rotation in 0..rotations {
            let key_index = self.keys.current_index();
            let key = self.keys.key(key_index).to_string();
            debug!("Trying {} with API key index {}", operation, key_index);

            for attempt in 0..=self.policy.max_retries {
                match call(key.clone()).await {
                    Ok(value) => {
                        debug!("{} succeeded with API key index {}", operation, key_index);
                        return Ok(value);
                    }
                    Err(e) => {
                        let message = e.to_string();
                        if is_rate_limit_error(&message) {
                            warn!(
                                "Rate limit on {} with API key index {}, switching key",
                                operation, key_index
                            );
                            break;
                        }
                        if attempt == self.policy.max_retries {
                            error!(
                                "{} failed after {} attempts with API key index {}: {}",
                                operation,
                                attempt + 1,
                                key_index,
                                message
                            );
                            break;
                        }
                        let delay = self.policy.backoff(attempt, &message);
                        warn!(
                            "{} failed (attempt {}/{}), retrying in {:.1}s: {}",
                            operation,
                            attempt + 1,
                            self.policy.max_retries + 1,
                            delay.as_secs_f64(),
                            message
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }

            if rotation + 1 == rotations {
                break;
            }
            if self.keys.advance() == 0 && !self.policy.cycle_cooldown.is_zero() {
                warn!(
                    "Cycled through all API keys, waiting {}s before continuing",
                    self.policy.cycle_cooldown.as_secs()
                );
                tokio::time::sleep(self.policy.cycle_cooldown).await;
            }
        }

        Err(RagError::GenAi(format!(
            "Failed to execute {} after trying all {} available API keys",
            operation,
            self.keys.len()
        )))
    }

    /// `POST {base}/models/{model}:{method}` with retries.
    pub async fn post_model<B, R>(&self, model: &str, method: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/models/{}:{}", self.base_url, model, method);
        let operation = format!("{} ({})", method, model);

        self.execute(&operation, |key| {
            let request = self
                .http
                .post(&url)
                .header("x-goog-api-key", key)
                .json(body);
            async move {
                let response = request.send().await?;
                let status = response.status();
                if !status.is_success() {
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(RagError::GenAi(format!(
                        "request failed with status {}: {}",
                        status, error_text
                    )));
                }
                response.json::<R>().await.map_err(|e| {
                    RagError::GenAi(format!("Failed to parse Gemini response: {}", e))
                })
            }
        })
        .await
    }
}
