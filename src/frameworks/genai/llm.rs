// file: src/frameworks/genai/llm.rs
// description: gemini text generation, json output and function calling behind LlmService
// reference: https://ai.google.dev/api/generate-content

use crate::error::{RagError, Result};
use crate::frameworks::genai::base::GenAiClient;
use crate::usecases::interfaces::{FunctionCall, LlmService, ToolDefinition, ToolResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

const AVAILABLE_MODELS: &[&str] = &["gemini-2.5-flash", "gemini-1.5-pro", "gemini-1.5-flash"];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    role: &'static str,
    parts: [RequestPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

impl<'a> GenerateRequest<'a> {
    fn prompt(text: &'a str) -> Self {
        Self {
            contents: [RequestContent {
                role: "user",
                parts: [RequestPart { text }],
            }],
            tools: Vec::new(),
            generation_config: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    function_call: Option<FunctionCall>,
}

impl GenerateResponse {
    fn parts(&self) -> &[ResponsePart] {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or(&[])
    }

    fn text(&self) -> Option<String> {
        let text = self
            .parts()
            .iter()
            .filter_map(|p| p.text.as_deref())
            .collect::<String>();
        (!text.is_empty()).then_some(text)
    }

    fn into_tool_response(self) -> ToolResponse {
        let text = self.text();
        let function_calls = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.function_call).collect())
            .unwrap_or_default();
        ToolResponse {
            text,
            function_calls,
        }
    }
}

/// Appends the schema instructions used for JSON-mode prompts.
pub fn structured_prompt(prompt: &str, schema: &Value) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "{}\n\nPlease respond with a JSON object that follows this schema:\n{}\n\nEnsure your response is valid JSON and follows the schema exactly.",
        prompt, schema
    )
}

/// Parses model output as JSON, tolerating a markdown code fence. Falls back to `{"text": raw}`.
pub fn parse_structured_output(raw: &str) -> Value {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    serde_json::from_str(unfenced).unwrap_or_else(|e| {
        warn!("Model returned invalid JSON ({}), wrapping raw text", e);
        json!({ "text": raw })
    })
}

fn function_declarations(tools: &[ToolDefinition]) -> Value {
    json!({
        "functionDeclarations": tools
            .iter()
            .map(|t| json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters
            }))
            .collect::<Vec<_>>()
    })
}

pub struct GeminiLlmService {
    client: Arc<GenAiClient>,
    model: String,
}

impl GeminiLlmService {
    pub fn new(client: Arc<GenAiClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse> {
        let response: GenerateResponse = self
            .client
            .post_model(&self.model, "generateContent", request)
            .await?;
        if let Some(reason) = response.candidates.first().and_then(|c| c.finish_reason.as_deref())
        {
            debug!("{} finished with {}", self.model, reason);
        }
        Ok(response)
    }
}

#[async_trait]
impl LlmService for GeminiLlmService {
    async fn generate_content(&self, prompt: &str) -> Result<String> {
        let response = self.generate(&GenerateRequest::prompt(prompt)).await?;
        response
            .text()
            .ok_or_else(|| RagError::GenAi(format!("{} returned no text", self.model)))
    }

    async fn generate_structured_content(&self, prompt: &str, schema: &Value) -> Result<Value> {
        let full_prompt = structured_prompt(prompt, schema);
        let mut request = GenerateRequest::prompt(&full_prompt);
        request.generation_config = Some(json!({"responseMimeType": "application/json"}));

        let response = self.generate(&request).await?;
        Ok(parse_structured_output(
            &response.text().unwrap_or_default(),
        ))
    }

    async fn generate_content_with_tools(
        &self,
        prompt: &str,
        tools: &[ToolDefinition],
    ) -> Result<ToolResponse> {
        let mut request = GenerateRequest::prompt(prompt);
        if !tools.is_empty() {
            request.tools = vec![function_declarations(tools)];
        }
        let response = self.generate(&request).await?.into_tool_response();
        debug!(
            "{} returned {} function call(s)",
            self.model,
            response.function_calls.len()
        );
        Ok(response)
    }

    fn available_models(&self) -> Vec<String> {
        AVAILABLE_MODELS.iter().map(|m| m.to_string()).collect()
    }
}
