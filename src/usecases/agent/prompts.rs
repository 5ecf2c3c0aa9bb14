// file: src/usecases/agent/prompts.rs
// description: prompt templates, retriever tool declaration and answer schema
// reference: https://ai.google.dev/gemini-api/docs/function-calling

use crate::usecases::interfaces::ToolDefinition;
use serde_json::{Value, json};

pub const RETRIEVE_TOOL_NAME: &str = "retrieve_documents";

pub fn query_or_respond(conversation_history: &str, current_message: &str) -> String {
    format!(
        "You are an intelligent assistant that can either respond directly to users or search for information when needed.

Conversation history:
{conversation_history}

Current user message: {current_message}

If the user's question requires specific information that you don't have or is about document content, use the retrieve_documents tool to search for relevant information.
If the user's question is a general greeting, conversation, or something you can answer without additional context, respond directly.

Available tools:
- retrieve_documents: Search for relevant documents and information"
    )
}

pub fn document_grading(context: &str, question: &str) -> String {
    format!(
        "You are a grader assessing relevance of retrieved document content to a user question.

Retrieved content: {context}

User question: {question}

If the content contains information related to the user question, respond with 'yes'.
If the content is not relevant or doesn't contain useful information, respond with 'no'.

Respond with only 'yes' or 'no'."
    )
}

pub fn query_rewrite(original_query: &str) -> String {
    format!(
        "Look at the input and try to reason about the underlying semantic intent and meaning.

Original query: {original_query}

Formulate an improved query that would be better for searching and finding relevant information:"
    )
}

pub fn answer_generation(history: &str, context: &str) -> String {
    format!(
        "You are a conversational chatbot for question-answering tasks. Use the following retrieved context to interact with user.

If you don't know the answer based on the context, just say that you don't know.
Keep the answer concise and informative.
When you use information from a chunk, list its id (shown as [CHUNK_ID: ...]) in chunk_ids_used.

Context: {context}

Conversation History: {history}
"
    )
}

pub fn retriever_tool() -> ToolDefinition {
    ToolDefinition {
        name: RETRIEVE_TOOL_NAME.to_string(),
        description: "Search and return information from the document repository.".to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query for retrieving relevant documents"
                }
            },
            "required": ["query"]
        }),
    }
}

pub fn answer_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "answer": {
                "type": "string",
                "description": "The main answer content"
            },
            "chunk_ids_used": {
                "type": "array",
                "items": {"type": "string"},
                "description": "List of chunk IDs used to generate this answer"
            }
        },
        "required": ["answer", "chunk_ids_used"]
    })
}
