// file: src/adaptors/elasticsearch/client.rs
// description: minimal elasticsearch rest client with host failover and basic auth
// reference: https://www.elastic.co/guide/en/elasticsearch/reference/current/rest-apis.html

use crate::config::ElasticsearchConfig;
use crate::error::{RagError, Result};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(Value),
    /// Newline-delimited JSON for `_bulk`.
    NdJson(String),
}

#[derive(Debug, Clone)]
pub struct EsResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl EsResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn into_result(self) -> Result<Value> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(RagError::elasticsearch(
                Some(self.status.as_u16()),
                error_reason(&self.body),
            ))
        }
    }
}

/// Best-effort human readable reason from an error body.
pub fn error_reason(body: &Value) -> String {
    match body.get("error") {
        Some(Value::Object(err)) => {
            let kind = err.get("type").and_then(Value::as_str).unwrap_or("error");
            let reason = err
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("no reason given");
            format!("{}: {}", kind, reason)
        }
        Some(Value::String(reason)) => reason.clone(),
        _ => match body {
            Value::String(text) if !text.is_empty() => text.clone(),
            Value::Null => "empty response".to_string(),
            other => other.to_string(),
        },
    }
}

pub struct ElasticsearchClient {
    http: Client,
    hosts: Vec<String>,
    username: Option<String>,
    password: Option<String>,
    next_host: AtomicUsize,
}

impl ElasticsearchClient {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(!config.verify_certs);

        if let Some(ca_path) = config.ca_certs.as_ref() {
            let pem = std::fs::read(ca_path).map_err(|e| {
                RagError::Config(format!(
                    "Failed to read CA certificate {}: {}",
                    ca_path.display(),
                    e
                ))
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| RagError::Config(format!("Invalid CA certificate: {}", e)))?;
            builder = builder.add_root_certificate(certificate);
        }

        let http = builder
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let hosts = config
            .hosts
            .iter()
            .map(|h| h.trim_end_matches('/').to_string())
            .collect::<Vec<_>>();
        if hosts.is_empty() {
            return Err(RagError::Config(
                "No Elasticsearch hosts configured".to_string(),
            ));
        }

        info!("Elasticsearch client configured for {}", hosts.join(", "));

        Ok(Self {
            http,
            hosts,
            username: config.username.clone(),
            password: config.password.clone(),
            next_host: AtomicUsize::new(0),
        })
    }

    /// Sends the request, moving on to the next host on transport errors.
    /// HTTP error statuses are returned as responses, not errors.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<RequestBody>,
    ) -> Result<EsResponse> {
        let start = self.next_host.load(Ordering::Relaxed);
        let mut last_error = None;

        for offset in 0..self.hosts.len() {
            let host_index = (start + offset) % self.hosts.len();
            let url = format!("{}/{}", self.hosts[host_index], path.trim_start_matches('/'));
            debug!("{} {}", method, url);

            let mut request = self.http.request(method.clone(), &url);
            if let Some(username) = self.username.as_deref() {
                request = request.basic_auth(username, self.password.as_deref());
            }
            request = match body.as_ref() {
                Some(RequestBody::Json(value)) => request.json(value),
                Some(RequestBody::NdJson(payload)) => request
                    .header("Content-Type", "application/x-ndjson")
                    .body(payload.clone()),
                None => request,
            };

            match request.send().await {
                Ok(response) => {
                    self.next_host.store(host_index, Ordering::Relaxed);
                    let status = response.status();
                    let text = response.text().await?;
                    let body = if text.is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_str(&text).unwrap_or(Value::String(text))
                    };
                    return Ok(EsResponse { status, body });
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!("Elasticsearch host {} unreachable: {}", self.hosts[host_index], e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RagError::elasticsearch(
            None,
            format!(
                "all hosts unreachable: {}",
                last_error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no hosts".to_string())
            ),
        ))
    }

    pub async fn ping(&self) -> Result<Value> {
        self.execute(Method::GET, "/", None).await?.into_result()
    }

    pub async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self.execute(Method::HEAD, index, None).await?;
        match response.status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => response.into_result().map(|_| false),
        }
    }

    pub async fn create_index(&self, index: &str, body: Value) -> Result<()> {
        self.execute(Method::PUT, index, Some(RequestBody::Json(body)))
            .await?
            .into_result()
            .map(|_| ())
    }

    pub async fn put_document(&self, index: &str, id: &str, source: Value) -> Result<EsResponse> {
        self.execute(
            Method::PUT,
            &format!("{}/_doc/{}", index, encode_id(id)),
            Some(RequestBody::Json(source)),
        )
        .await
    }

    pub async fn get_document(&self, index: &str, id: &str) -> Result<EsResponse> {
        self.execute(
            Method::GET,
            &format!("{}/_doc/{}", index, encode_id(id)),
            None,
        )
        .await
    }

    pub async fn delete_document(&self, index: &str, id: &str) -> Result<EsResponse> {
        self.execute(
            Method::DELETE,
            &format!("{}/_doc/{}", index, encode_id(id)),
            None,
        )
        .await
    }

    pub async fn search(&self, index: &str, body: Value) -> Result<Value> {
        self.execute(
            Method::POST,
            &format!("{}/_search", index),
            Some(RequestBody::Json(body)),
        )
        .await?
        .into_result()
    }

    pub async fn search_with_scroll(
        &self,
        index: &str,
        body: Value,
        keep_alive: &str,
    ) -> Result<Value> {
        self.execute(
            Method::POST,
            &format!("{}/_search?scroll={}", index, keep_alive),
            Some(RequestBody::Json(body)),
        )
        .await?
        .into_result()
    }

    pub async fn scroll(&self, scroll_id: &str, keep_alive: &str) -> Result<Value> {
        self.execute(
            Method::POST,
            "_search/scroll",
            Some(RequestBody::Json(
                json!({"scroll": keep_alive, "scroll_id": scroll_id}),
            )),
        )
        .await?
        .into_result()
    }

    pub async fn clear_scroll(&self, scroll_id: &str) -> Result<()> {
        self.execute(
            Method::DELETE,
            "_search/scroll",
            Some(RequestBody::Json(json!({"scroll_id": scroll_id}))),
        )
        .await?
        .into_result()
        .map(|_| ())
    }

    pub async fn count(&self, index: &str, query: Value) -> Result<u64> {
        let body = self
            .execute(
                Method::POST,
                &format!("{}/_count", index),
                Some(RequestBody::Json(json!({ "query": query }))),
            )
            .await?
            .into_result()?;
        Ok(body.get("count").and_then(Value::as_u64).unwrap_or(0))
    }

    pub async fn bulk(&self, payload: String) -> Result<Value> {
        self.execute(Method::POST, "_bulk", Some(RequestBody::NdJson(payload)))
            .await?
            .into_result()
    }

    pub async fn refresh(&self, index: &str) -> Result<()> {
        self.execute(Method::POST, &format!("{}/_refresh", index), None)
            .await?
            .into_result()
            .map(|_| ())
    }
}

/// Percent-encodes characters that would break the `_doc/{id}` path segment.
pub fn encode_id(id: &str) -> String {
    let mut encoded = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}
