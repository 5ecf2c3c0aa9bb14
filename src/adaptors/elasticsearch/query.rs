// file: src/adaptors/elasticsearch/query.rs
// description: search request bodies for chunks, documents and pictures, and response parsing
// reference: https://www.elastic.co/guide/en/elasticsearch/reference/current/knn-search.html

use crate::error::{RagError, Result};
use crate::usecases::dtos::{SearchHit, SearchRequest, SearchResponse};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

pub const CHUNK_TEXT_FIELD: &str = "chunk.text";
pub const CHUNK_HEADINGS_FIELD: &str = "chunk.meta.headings";
pub const CHUNK_VECTOR_FIELD: &str = "chunk.vector";

/// Candidates examined per returned neighbour.
const KNN_CANDIDATE_FACTOR: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightOptions {
    pub fragment_size: usize,
    pub number_of_fragments: usize,
}

impl Default for HighlightOptions {
    fn default() -> Self {
        Self {
            fragment_size: 150,
            number_of_fragments: 3,
        }
    }
}

/// Objects pass through as query clauses, arrays become `terms`, anything else `term`.
pub fn build_filters(filters: &Map<String, Value>) -> Vec<Value> {
    filters
        .iter()
        .map(|(field, value)| match value {
            Value::Object(_) => json!({ field: value }),
            Value::Array(_) => json!({"terms": { field: value }}),
            _ => json!({"term": { field: value }}),
        })
        .collect()
}

fn exists(field: &str) -> Value {
    json!({"exists": {"field": field}})
}

fn text_query(query: &str, filters: &[Value]) -> Value {
    let mut bool_query = json!({
        "must": [exists("chunk")],
        "should": [
            {"match": {CHUNK_TEXT_FIELD: {"query": query, "boost": 1.0}}},
            {"match": {CHUNK_HEADINGS_FIELD: {"query": query, "boost": 1.5}}}
        ],
        "minimum_should_match": 1
    });
    if !filters.is_empty() {
        bool_query["filter"] = json!(filters);
    }
    json!({"bool": bool_query})
}

fn knn_query(vector: &[f32], size: usize, filters: &[Value]) -> Value {
    let filter = if filters.is_empty() {
        exists("chunk")
    } else {
        let mut must = vec![exists("chunk")];
        must.extend(filters.iter().cloned());
        json!({"bool": {"must": must}})
    };

    json!({
        "field": CHUNK_VECTOR_FIELD,
        "query_vector": vector,
        "k": size,
        "num_candidates": size * KNN_CANDIDATE_FACTOR,
        "filter": filter
    })
}

/// Text → bool query, vector → kNN, both → query and kNN scored together.
pub fn chunk_search_body(request: &SearchRequest, highlight: HighlightOptions) -> Result<Value> {
    let filters = request
        .filters
        .as_ref()
        .map(build_filters)
        .unwrap_or_default();
    let vector = request.vector.as_deref().filter(|v| !v.is_empty());

    if !request.has_text() && vector.is_none() {
        return Err(RagError::Validation(
            "search request needs a query, a vector or both".to_string(),
        ));
    }

    let mut body = json!({
        "size": request.size,
        "_source": {"excludes": [CHUNK_VECTOR_FIELD]}
    });

    if let Some(query) = request.query.as_deref().filter(|_| request.has_text()) {
        body["query"] = text_query(query, &filters);
        body["highlight"] = json!({
            "pre_tags": ["<em>"],
            "post_tags": ["</em>"],
            "fields": {
                CHUNK_TEXT_FIELD: {
                    "fragment_size": highlight.fragment_size,
                    "number_of_fragments": highlight.number_of_fragments
                }
            }
        });
    }

    if let Some(vector) = vector {
        body["knn"] = knn_query(vector, request.size, &filters);
    }

    Ok(body)
}

pub fn document_search_body(request: &SearchRequest) -> Result<Value> {
    let query = request
        .query
        .as_deref()
        .filter(|_| request.has_text())
        .ok_or_else(|| RagError::Validation("document search needs a query".to_string()))?;

    let mut bool_query = json!({
        "must": [
            exists("document"),
            {
                "bool": {
                    "should": [
                        {"match": {"document.name": {"query": query, "boost": 2.0}}},
                        {"match": {"document.origin.filename": {"query": query, "boost": 1.5}}}
                    ],
                    "minimum_should_match": 1
                }
            }
        ]
    });
    if let Some(filters) = request.filters.as_ref() {
        bool_query["filter"] = json!(build_filters(filters));
    }

    Ok(json!({
        "size": request.size,
        "query": {"bool": bool_query},
        "highlight": {
            "fields": {
                "document.name": {"fragment_size": 150, "number_of_fragments": 1},
                "document.origin.filename": {"fragment_size": 150, "number_of_fragments": 1}
            }
        }
    }))
}

pub fn picture_lookup_body(document_id: &str, picture_id: &str) -> Value {
    json!({
        "size": 1,
        "query": {
            "bool": {
                "must": [
                    exists("picture"),
                    {"term": {"picture.document_id": document_id}},
                    {"term": {"picture.picture_id": picture_id}}
                ]
            }
        }
    })
}

/// Chunks written before `chunk.chunk_id` existed.
pub fn chunks_missing_id_query() -> Value {
    json!({
        "bool": {
            "must": [exists("chunk")],
            "must_not": [exists("chunk.chunk_id")]
        }
    })
}

pub fn chunks_with_id_query() -> Value {
    json!({
        "bool": {
            "must": [exists("chunk"), exists("chunk.chunk_id")]
        }
    })
}

pub fn all_chunks_query() -> Value {
    exists("chunk")
}

pub fn parse_search_response(body: &Value) -> Result<SearchResponse> {
    let hits_obj = body
        .get("hits")
        .ok_or_else(|| RagError::elasticsearch(None, "search response has no 'hits'"))?;

    // `total` is an object since 7.x and a bare number before
    let total = match hits_obj.get("total") {
        Some(Value::Object(t)) => t.get("value").and_then(Value::as_u64).unwrap_or(0),
        Some(v) => v.as_u64().unwrap_or(0),
        None => 0,
    };

    let hits = hits_obj
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().map(parse_hit).collect())
        .unwrap_or_default();

    Ok(SearchResponse {
        hits,
        total,
        max_score: hits_obj.get("max_score").and_then(Value::as_f64),
    })
}

fn parse_hit(hit: &Value) -> SearchHit {
    let highlight = hit.get("highlight").and_then(Value::as_object).map(|h| {
        h.iter()
            .map(|(field, fragments)| {
                let fragments = fragments
                    .as_array()
                    .map(|f| {
                        f.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                (field.clone(), fragments)
            })
            .collect::<BTreeMap<String, Vec<String>>>()
    });

    SearchHit {
        id: hit
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        score: hit.get("_score").and_then(Value::as_f64),
        source: hit.get("_source").cloned().unwrap_or(Value::Null),
        highlight,
    }
}
