// file: src/usecases/agent/workflow.rs
// description: decide, retrieve, grade, rewrite and answer loop over the document index
// reference: https://langchain-ai.github.io/langgraph/tutorials/rag/langgraph_agentic_rag/

use crate::config::AgentConfig;
use crate::entities::{DocChunk, DocumentPicture};
use crate::error::{RagError, Result};
use crate::usecases::agent::dtos::{AgentResponse, ChatMessage, StructuredAnswer};
use crate::usecases::agent::prompts::{self, RETRIEVE_TOOL_NAME};
use crate::usecases::document_search::{DocumentSearchUseCase, SearchOptions};
use crate::usecases::interfaces::{ConversationalAgent, DocumentRepository, LlmService};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const PROCESSING_ERROR_MESSAGE: &str =
    "I apologize, but I encountered an error while processing your request.";
pub const GENERATION_ERROR_MESSAGE: &str =
    "I apologize, but I couldn't generate an answer based on the retrieved information.";
pub const NO_DOCUMENTS_MESSAGE: &str = "No relevant documents found for the query.";
const DEFAULT_DIRECT_REPLY: &str = "I'll help you with that.";
const MISSING_ANSWER: &str = "I couldn't generate an answer.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowNode {
    Start,
    GenerateQueryOrRespond,
    Retrieve,
    GradeDocuments,
    RewriteQuestion,
    GenerateAnswer,
    End,
}

impl WorkflowNode {
    pub fn name(self) -> &'static str {
        match self {
            WorkflowNode::Start => "__start__",
            WorkflowNode::GenerateQueryOrRespond => "generate_query_or_respond",
            WorkflowNode::Retrieve => "retrieve",
            WorkflowNode::GradeDocuments => "grade_documents",
            WorkflowNode::RewriteQuestion => "rewrite_question",
            WorkflowNode::GenerateAnswer => "generate_answer",
            WorkflowNode::End => "__end__",
        }
    }
}

impl fmt::Display for WorkflowNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Graph edges; `true` marks a conditional edge. Grading is the routing
/// function on the edges leaving `retrieve`, so it is not a node of its own.
const EDGES: &[(WorkflowNode, WorkflowNode, bool)] = &[
    (WorkflowNode::Start, WorkflowNode::GenerateQueryOrRespond, false),
    (WorkflowNode::GenerateQueryOrRespond, WorkflowNode::Retrieve, true),
    (WorkflowNode::GenerateQueryOrRespond, WorkflowNode::End, true),
    (WorkflowNode::Retrieve, WorkflowNode::GenerateAnswer, true),
    (WorkflowNode::Retrieve, WorkflowNode::RewriteQuestion, true),
    (WorkflowNode::RewriteQuestion, WorkflowNode::GenerateQueryOrRespond, false),
    (WorkflowNode::GenerateAnswer, WorkflowNode::End, false),
];

/// Mermaid flowchart of the workflow.
pub fn workflow_mermaid() -> String {
    let nodes = [
        WorkflowNode::Start,
        WorkflowNode::GenerateQueryOrRespond,
        WorkflowNode::Retrieve,
        WorkflowNode::RewriteQuestion,
        WorkflowNode::GenerateAnswer,
        WorkflowNode::End,
    ];

    let mut lines = vec!["graph TD;".to_string()];
    for node in nodes {
        lines.push(match node {
            WorkflowNode::Start => format!("\t{0}([<p>{0}</p>]):::first", node),
            WorkflowNode::End => format!("\t{0}([<p>{0}</p>]):::last", node),
            _ => format!("\t{0}({0})", node),
        });
    }
    for (from, to, conditional) in EDGES {
        let arrow = if *conditional { "-.->" } else { "-->" };
        lines.push(format!("\t{} {} {};", from, arrow, to));
    }
    lines.push("\tclassDef default fill:#f2f0ff,line-height:1.2".to_string());
    lines.push("\tclassDef first fill-opacity:0".to_string());
    lines.push("\tclassDef last fill:#bfb6fc".to_string());
    lines.join("\n")
}

/// `[CHUNK_ID: id]` blocks handed to the grader and the answer prompt.
pub fn format_chunks(chunks: &[DocChunk]) -> String {
    if chunks.is_empty() {
        return NO_DOCUMENTS_MESSAGE.to_string();
    }

    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let chunk_id = chunk.chunk_id.as_deref().unwrap_or("unknown");
            let headings = chunk.headings();
            if headings.is_empty() {
                format!("[CHUNK_ID: {}]\nDocument {}:\n{}", chunk_id, i + 1, chunk.text)
            } else {
                format!(
                    "[CHUNK_ID: {}]\nDocument {} (Headings: {}):\n{}",
                    chunk_id,
                    i + 1,
                    headings.join(", "),
                    chunk.text
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

enum Decision {
    Retrieve(String),
    Respond(String),
}

struct WorkflowState {
    /// Windowed history plus the current user message.
    messages: Vec<ChatMessage>,
    question: String,
    current_query: String,
    retrieved: Vec<DocChunk>,
    context: String,
    rewrites: usize,
    steps: Vec<WorkflowNode>,
    reply: Option<String>,
    answer: Option<StructuredAnswer>,
}

impl WorkflowState {
    fn history_text(&self, last: usize) -> String {
        let skip = self.messages.len().saturating_sub(last);
        self.messages[skip..]
            .iter()
            .map(ChatMessage::prompt_line)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct AgenticRagUseCase {
    search: Arc<DocumentSearchUseCase>,
    repository: Arc<dyn DocumentRepository>,
    llm: Arc<dyn LlmService>,
    config: AgentConfig,
}

impl AgenticRagUseCase {
    pub fn new(
        search: Arc<DocumentSearchUseCase>,
        repository: Arc<dyn DocumentRepository>,
        llm: Arc<dyn LlmService>,
        config: AgentConfig,
    ) -> Self {
        Self {
            search,
            repository,
            llm,
            config,
        }
    }

    async fn generate_query_or_respond(&self, state: &WorkflowState) -> Decision {
        let prompt = prompts::query_or_respond(
            &state.history_text(self.config.decision_history),
            &state.current_query,
        );

        match self
            .llm
            .generate_content_with_tools(&prompt, &[prompts::retriever_tool()])
            .await
        {
            Ok(response) => {
                if let Some(call) = response
                    .function_calls
                    .iter()
                    .find(|c| c.name == RETRIEVE_TOOL_NAME)
                {
                    let query = call
                        .string_arg("query")
                        .filter(|q| !q.trim().is_empty())
                        .unwrap_or(state.current_query.as_str());
                    return Decision::Retrieve(query.to_string());
                }
                Decision::Respond(
                    response
                        .text
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| DEFAULT_DIRECT_REPLY.to_string()),
                )
            }
            Err(e) => {
                error!("Error deciding whether to retrieve: {}", e);
                Decision::Respond(PROCESSING_ERROR_MESSAGE.to_string())
            }
        }
    }

    async fn retrieve(&self, state: &mut WorkflowState, query: &str) {
        info!("Retrieving documents for '{}'", query);
        match self
            .search
            .search_chunks_hybrid(query, SearchOptions::with_size(self.config.retrieval_size))
            .await
        {
            Ok(response) => {
                state.retrieved = response.chunks();
                state.context = format_chunks(&state.retrieved);
                debug!("Retrieved {} chunks", state.retrieved.len());
            }
            Err(e) => {
                error!("Error in {} tool: {}", RETRIEVE_TOOL_NAME, e);
                state.retrieved.clear();
                state.context = format!("Error retrieving documents: {}", e);
            }
        }
    }

    async fn grade_documents(&self, state: &WorkflowState) -> WorkflowNode {
        if state.rewrites >= self.config.max_rewrites {
            info!(
                "Reached {} rewrites, answering from current context",
                state.rewrites
            );
            return WorkflowNode::GenerateAnswer;
        }

        let prompt = prompts::document_grading(&state.context, &state.question);
        match self.llm.generate_content(&prompt).await {
            Ok(grade) if grade.to_lowercase().contains("yes") => WorkflowNode::GenerateAnswer,
            Ok(grade) => {
                debug!("Documents graded not relevant: {}", grade.trim());
                WorkflowNode::RewriteQuestion
            }
            Err(e) => {
                error!("Error grading documents: {}", e);
                WorkflowNode::RewriteQuestion
            }
        }
    }

    async fn rewrite_question(&self, state: &mut WorkflowState) {
        state.rewrites += 1;
        match self
            .llm
            .generate_content(&prompts::query_rewrite(&state.question))
            .await
        {
            Ok(rewritten) if !rewritten.trim().is_empty() => {
                info!("Rewrote question as '{}'", rewritten.trim());
                state.current_query = rewritten.trim().to_string();
            }
            Ok(_) => state.current_query = state.question.clone(),
            Err(e) => {
                error!("Error rewriting question: {}", e);
                state.current_query = state.question.clone();
            }
        }
    }

    async fn generate_answer(&self, state: &mut WorkflowState) {
        let prompt =
            prompts::answer_generation(&state.history_text(usize::MAX), &state.context);

        match self
            .llm
            .generate_structured_content(&prompt, &prompts::answer_schema())
            .await
        {
            Ok(value) => state.answer = Some(parse_answer(&value)),
            Err(e) => {
                error!("Error generating answer: {}", e);
                state.reply = Some(GENERATION_ERROR_MESSAGE.to_string());
            }
        }
    }

    async fn pictures_for(&self, chunks: &[DocChunk]) -> Vec<DocumentPicture> {
        let mut seen = HashSet::new();
        let mut pictures = Vec::new();

        for chunk in chunks {
            let Some(document_id) = chunk.document_id.as_deref() else {
                continue;
            };
            for picture_id in chunk.picture_ids() {
                if !seen.insert(picture_id.clone()) {
                    continue;
                }
                match self.repository.get_picture(document_id, &picture_id).await {
                    Ok(Some(picture)) => pictures.push(picture),
                    Ok(None) => debug!("Picture {} not indexed", picture_id),
                    Err(e) => warn!("Failed to fetch picture {}: {}", picture_id, e),
                }
            }
        }
        pictures
    }

    async fn run(&self, message: &str, history: &[ChatMessage]) -> Result<AgentResponse> {
        if message.trim().is_empty() {
            return Err(RagError::Agent("message is empty".to_string()));
        }

        let skip = history.len().saturating_sub(self.config.history_window);
        let mut messages = history[skip..].to_vec();
        messages.push(ChatMessage::user(message));

        let mut state = WorkflowState {
            messages,
            question: message.to_string(),
            current_query: message.to_string(),
            retrieved: Vec::new(),
            context: String::new(),
            rewrites: 0,
            steps: Vec::new(),
            reply: None,
            answer: None,
        };
        let mut retrieval_query = None;

        let mut node = WorkflowNode::GenerateQueryOrRespond;
        while node != WorkflowNode::End {
            state.steps.push(node);
            node = match node {
                WorkflowNode::Start | WorkflowNode::GenerateQueryOrRespond => {
                    match self.generate_query_or_respond(&state).await {
                        Decision::Retrieve(query) => {
                            retrieval_query = Some(query);
                            WorkflowNode::Retrieve
                        }
                        Decision::Respond(text) => {
                            state.reply = Some(text);
                            WorkflowNode::End
                        }
                    }
                }
                WorkflowNode::Retrieve => {
                    let query = retrieval_query
                        .clone()
                        .unwrap_or_else(|| state.current_query.clone());
                    self.retrieve(&mut state, &query).await;
                    WorkflowNode::GradeDocuments
                }
                WorkflowNode::GradeDocuments => self.grade_documents(&state).await,
                WorkflowNode::RewriteQuestion => {
                    self.rewrite_question(&mut state).await;
                    WorkflowNode::GenerateQueryOrRespond
                }
                WorkflowNode::GenerateAnswer => {
                    self.generate_answer(&mut state).await;
                    WorkflowNode::End
                }
                WorkflowNode::End => WorkflowNode::End,
            };
        }

        let mut metadata = Map::new();
        metadata.insert("workflow_steps".to_string(), json!(state.steps.len()));
        metadata.insert(
            "steps".to_string(),
            json!(state.steps.iter().map(|s| s.name()).collect::<Vec<_>>()),
        );
        metadata.insert("rewrites".to_string(), json!(state.rewrites));
        if let Some(query) = retrieval_query.as_ref() {
            metadata.insert("retrieval_query".to_string(), json!(query));
        }

        let Some(answer) = state.answer else {
            return Ok(AgentResponse {
                content: state.reply.unwrap_or_else(|| PROCESSING_ERROR_MESSAGE.to_string()),
                metadata,
                ..AgentResponse::default()
            });
        };

        let used: Vec<DocChunk> = if answer.chunk_ids_used.is_empty() {
            state.retrieved.clone()
        } else {
            answer
                .chunk_ids_used
                .iter()
                .filter_map(|id| {
                    state
                        .retrieved
                        .iter()
                        .find(|c| c.chunk_id.as_deref() == Some(id.as_str()))
                        .cloned()
                })
                .collect()
        };
        let chunk_ids_used = used.iter().filter_map(|c| c.chunk_id.clone()).collect();
        let pictures = self.pictures_for(&used).await;

        Ok(AgentResponse {
            content: answer.answer,
            retrieved_chunks: used,
            chunk_ids_used,
            pictures,
            metadata,
        })
    }
}

fn parse_answer(value: &Value) -> StructuredAnswer {
    let answer = value
        .get("answer")
        .or_else(|| value.get("text"))
        .and_then(Value::as_str)
        .filter(|a| !a.trim().is_empty())
        .unwrap_or(MISSING_ANSWER)
        .to_string();
    let chunk_ids_used = value
        .get("chunk_ids_used")
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    StructuredAnswer {
        answer,
        chunk_ids_used,
    }
}

#[async_trait]
impl ConversationalAgent for AgenticRagUseCase {
    async fn process_message(
        &self,
        message: &str,
        chat_id: Option<&str>,
        history: &[ChatMessage],
    ) -> AgentResponse {
        match self.run(message, history).await {
            Ok(mut response) => {
                if let Some(chat_id) = chat_id {
                    response
                        .metadata
                        .insert("chat_id".to_string(), json!(chat_id));
                }
                response
            }
            Err(e) => {
                error!("Error processing message: {}", e);
                let mut metadata = Map::new();
                metadata.insert("error".to_string(), json!(e.to_string()));
                AgentResponse {
                    content: PROCESSING_ERROR_MESSAGE.to_string(),
                    metadata,
                    ..AgentResponse::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{DocItemRef, DocMeta, DocumentPicture};
    use crate::usecases::interfaces::{EmbeddingService, FunctionCall, ToolResponse};
    use crate::usecases::testing::{FakeEmbedder, InMemoryRepository, ScriptedLlm};
    use pretty_assertions::assert_eq;

    fn chunk(id: &str, text: &str, with_picture: bool) -> DocChunk {
        let mut meta = DocMeta {
            headings: Some(vec!["Report".to_string()]),
            ..DocMeta::default()
        };
        if with_picture {
            meta.doc_items.push(DocItemRef {
                self_ref: "#/pictures/0".to_string(),
                label: "picture".to_string(),
                prov: Vec::new(),
            });
        }
        let mut chunk = DocChunk::new(text, meta);
        chunk.chunk_id = Some(id.to_string());
        chunk.document_id = Some("doc".to_string());
        chunk
    }

    fn picture() -> DocumentPicture {
        serde_json::from_value(json!({"picture_id": "doc_picture_0", "document_id": "doc"})).unwrap()
    }

    fn retrieve_call(query: &str) -> ToolResponse {
        ToolResponse {
            text: None,
            function_calls: vec![FunctionCall {
                name: RETRIEVE_TOOL_NAME.to_string(),
                args: json!({ "query": query }),
            }],
        }
    }

    fn agent(
        repository: Arc<InMemoryRepository>,
        llm: Arc<ScriptedLlm>,
        max_rewrites: usize,
    ) -> AgenticRagUseCase {
        let embedder: Arc<dyn EmbeddingService> = Arc::new(FakeEmbedder::new(2));
        let search = Arc::new(DocumentSearchUseCase::new(
            repository.clone(),
            Some(embedder),
            10,
            100,
        ));
        AgenticRagUseCase::new(
            search,
            repository,
            llm,
            AgentConfig {
                max_rewrites,
                ..AgentConfig::default()
            },
        )
    }

    #[test]
    fn test_format_chunks() {
        let formatted = format_chunks(&[chunk("doc_chunk_0", "Revenue grew.", false)]);
        assert_eq!(
            formatted,
            "[CHUNK_ID: doc_chunk_0]\nDocument 1 (Headings: Report):\nRevenue grew."
        );
        assert_eq!(format_chunks(&[]), NO_DOCUMENTS_MESSAGE);
    }

    #[test]
    fn test_mermaid_graph() {
        let graph = workflow_mermaid();
        assert!(graph.starts_with("graph TD;"));
        assert!(graph.contains("\t__start__ --> generate_query_or_respond;"));
        assert!(graph.contains("\tretrieve -.-> rewrite_question;"));
        assert!(graph.contains("\trewrite_question --> generate_query_or_respond;"));
        assert!(graph.contains("\tgenerate_answer --> __end__;"));
    }

    #[test]
    fn test_parse_answer_fallbacks() {
        assert_eq!(
            parse_answer(&json!({"text": "raw output"})).answer,
            "raw output"
        );
        assert_eq!(parse_answer(&json!({})).answer, MISSING_ANSWER);
        assert_eq!(
            parse_answer(&json!({"answer": "a", "chunk_ids_used": ["x", 1]})).chunk_ids_used,
            vec!["x".to_string()]
        );
    }

    #[tokio::test]
    async fn test_direct_response_skips_retrieval() {
        let repository = Arc::new(InMemoryRepository::default());
        let llm = Arc::new(ScriptedLlm::default());
        llm.push_tool_response(ToolResponse {
            text: Some("Hello there!".to_string()),
            function_calls: Vec::new(),
        });

        let response = agent(repository.clone(), llm, 2)
            .process_message("hi", Some("42"), &[])
            .await;

        assert_eq!(response.content, "Hello there!");
        assert!(!response.has_sources());
        assert_eq!(response.metadata["workflow_steps"], json!(1));
        assert_eq!(response.metadata["chat_id"], json!("42"));
        assert!(repository.last_search().is_none());
    }

    #[tokio::test]
    async fn test_retrieval_answer_with_pictures() {
        let repository = Arc::new(InMemoryRepository::with_chunks(vec![
            chunk("doc_chunk_0", "Revenue grew 10%.", true),
            chunk("doc_chunk_1", "Costs fell.", false),
        ]));
        repository.pictures.lock().unwrap().push(picture());

        let llm = Arc::new(ScriptedLlm::default());
        llm.push_tool_response(retrieve_call("revenue growth"))
            .push_text("yes")
            .push_structured(json!({"answer": "Revenue grew 10%.", "chunk_ids_used": ["doc_chunk_0", "made_up"]}));

        let response = agent(repository.clone(), llm.clone(), 2)
            .process_message("How did revenue change?", None, &[])
            .await;

        assert_eq!(response.content, "Revenue grew 10%.");
        assert_eq!(response.chunk_ids_used, vec!["doc_chunk_0".to_string()]);
        assert_eq!(response.retrieved_chunks.len(), 1);
        assert_eq!(response.pictures.len(), 1);
        assert_eq!(response.pictures[0].picture_id, "doc_picture_0");
        assert_eq!(
            response.metadata["steps"],
            json!(["generate_query_or_respond", "retrieve", "grade_documents", "generate_answer"])
        );

        let search = repository.last_search().unwrap();
        assert_eq!(search.query.as_deref(), Some("revenue growth"));
        assert!(search.vector.is_some());

        let prompts = llm.prompts();
        assert!(prompts[1].contains("[CHUNK_ID: doc_chunk_0]"));
        assert!(prompts[2].contains("User: How did revenue change?"));
    }

    #[tokio::test]
    async fn test_empty_chunk_ids_use_all_retrieved() {
        let repository = Arc::new(InMemoryRepository::with_chunks(vec![
            chunk("doc_chunk_0", "a", false),
            chunk("doc_chunk_1", "b", false),
        ]));
        let llm = Arc::new(ScriptedLlm::default());
        llm.push_tool_response(retrieve_call("q"))
            .push_text("Yes.")
            .push_structured(json!({"answer": "done", "chunk_ids_used": []}));

        let response = agent(repository, llm, 2)
            .process_message("q", None, &[])
            .await;

        assert_eq!(response.retrieved_chunks.len(), 2);
        assert_eq!(
            response.chunk_ids_used,
            vec!["doc_chunk_0".to_string(), "doc_chunk_1".to_string()]
        );
    }

    #[tokio::test]
    async fn test_rewrites_are_bounded() {
        let repository = Arc::new(InMemoryRepository::with_chunks(vec![chunk(
            "doc_chunk_0",
            "unrelated",
            false,
        )]));
        let llm = Arc::new(ScriptedLlm::default());
        llm.push_tool_response(retrieve_call("first"))
            .push_text("no")
            .push_text("better query")
            .push_tool_response(retrieve_call("better query"))
            .push_structured(json!({"answer": "I don't know.", "chunk_ids_used": []}));

        let response = agent(repository, llm.clone(), 1)
            .process_message("vague question", None, &[])
            .await;

        assert_eq!(response.content, "I don't know.");
        assert_eq!(response.metadata["rewrites"], json!(1));
        assert_eq!(response.metadata["retrieval_query"], json!("better query"));
        let prompts = llm.prompts();
        assert!(prompts[3].contains("Current user message: better query"));
        assert_eq!(prompts.len(), 5);
    }

    #[tokio::test]
    async fn test_history_is_windowed() {
        let repository = Arc::new(InMemoryRepository::default());
        let llm = Arc::new(ScriptedLlm::default());
        llm.push_tool_response(ToolResponse {
            text: Some("ok".to_string()),
            function_calls: Vec::new(),
        });
        let history: Vec<ChatMessage> = (0..8)
            .map(|i| ChatMessage::user(format!("old message {}", i)))
            .collect();

        agent(repository, llm.clone(), 2)
            .process_message("now", None, &history)
            .await;

        let prompt = &llm.prompts()[0];
        assert!(!prompt.contains("old message 5"));
        assert!(prompt.contains("User: old message 6\nUser: old message 7\nUser: now"));
    }

    #[tokio::test]
    async fn test_search_failure_still_answers() {
        let repository = Arc::new(InMemoryRepository::default());
        repository
            .fail_search
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let llm = Arc::new(ScriptedLlm::default());
        llm.push_tool_response(retrieve_call("q"))
            .push_structured(json!({"answer": "I don't know.", "chunk_ids_used": []}));

        let response = agent(repository, llm.clone(), 0)
            .process_message("q", None, &[])
            .await;

        assert_eq!(response.content, "I don't know.");
        assert!(llm.prompts()[1].contains("Error retrieving documents"));
    }

    #[tokio::test]
    async fn test_llm_failures_produce_apologies() {
        let repository = Arc::new(InMemoryRepository::default());
        let llm = Arc::new(ScriptedLlm::default());
        let response = agent(repository.clone(), llm, 2)
            .process_message("hello", None, &[])
            .await;
        assert_eq!(response.content, PROCESSING_ERROR_MESSAGE);

        let llm = Arc::new(ScriptedLlm::default());
        llm.push_tool_response(retrieve_call("q")).push_text("yes");
        let response = agent(repository.clone(), llm, 2)
            .process_message("q", None, &[])
            .await;
        assert_eq!(response.content, GENERATION_ERROR_MESSAGE);

        let response = agent(repository, Arc::new(ScriptedLlm::default()), 2)
            .process_message("   ", None, &[])
            .await;
        assert_eq!(response.content, PROCESSING_ERROR_MESSAGE);
        assert!(response.metadata.contains_key("error"));
    }
}
