// file: src/adaptors/elasticsearch/mapping.rs
// description: settings and field mapping of the shared multimodal index
// reference: https://www.elastic.co/guide/en/elasticsearch/reference/current/mapping.html

use crate::config::ElasticsearchConfig;
use serde_json::{Value, json};

pub const KEYWORD_IGNORE_ABOVE: u32 = 256;

/// Full-text field with an exact-match `keyword` sub-field.
fn text_with_keyword() -> Value {
    json!({
        "type": "text",
        "analyzer": "standard",
        "fields": {
            "keyword": {"type": "keyword", "ignore_above": KEYWORD_IGNORE_ABOVE}
        }
    })
}

fn standard_text() -> Value {
    json!({"type": "text", "analyzer": "standard"})
}

fn keyword() -> Value {
    json!({"type": "keyword"})
}

fn disabled_object() -> Value {
    json!({"type": "object", "enabled": false})
}

fn origin() -> Value {
    json!({
        "properties": {
            "mimetype": keyword(),
            "binary_hash": {"type": "unsigned_long"},
            "filename": standard_text()
        }
    })
}

/// Picture and table entities share everything except their payload field.
fn element_properties(id_field: &str, payload_field: &str) -> Value {
    json!({
        "properties": {
            id_field: keyword(),
            "document_id": keyword(),
            "label": keyword(),
            "captions": standard_text(),
            "references": keyword(),
            "footnotes": keyword(),
            "parent_ref": keyword(),
            "children_refs": keyword(),
            "prov": disabled_object(),
            payload_field: disabled_object(),
            "annotations": disabled_object()
        }
    })
}

pub fn index_mappings(vector_dimensions: usize) -> Value {
    json!({
        "properties": {
            "document": {
                "properties": {
                    "schema_name": keyword(),
                    "version": keyword(),
                    "name": standard_text(),
                    "origin": origin(),
                    "furniture": disabled_object(),
                    "body": disabled_object(),
                    "groups": disabled_object(),
                    "texts": disabled_object(),
                    "pictures": disabled_object(),
                    "tables": disabled_object(),
                    "key_value_items": disabled_object(),
                    "form_items": disabled_object(),
                    "pages": disabled_object()
                }
            },
            "chunk": {
                "properties": {
                    "chunk_id": keyword(),
                    "text": text_with_keyword(),
                    "meta": {
                        "properties": {
                            "schema_name": keyword(),
                            "version": keyword(),
                            "headings": standard_text(),
                            "origin": origin(),
                            "doc_items": disabled_object()
                        }
                    },
                    "vector": {
                        "type": "dense_vector",
                        "dims": vector_dimensions,
                        "index": true,
                        "similarity": "cosine"
                    },
                    "document_id": keyword()
                }
            },
            "text": {
                "properties": {
                    "text_id": keyword(),
                    "document_id": keyword(),
                    "text": text_with_keyword(),
                    "label": keyword(),
                    "level": {"type": "integer"},
                    "orig": standard_text(),
                    "parent_ref": keyword(),
                    "children_refs": keyword(),
                    "prov": disabled_object()
                }
            },
            "picture": element_properties("picture_id", "image"),
            "table": element_properties("table_id", "data")
        }
    })
}

pub fn index_settings(config: &ElasticsearchConfig) -> Value {
    json!({
        "number_of_shards": config.shards,
        "number_of_replicas": config.replicas,
        "analysis": {
            "analyzer": {
                "multimodal_analyzer": {
                    "type": "standard",
                    "stopwords": "_english_"
                }
            }
        }
    })
}

/// Body for `PUT /{index}`.
pub fn create_index_body(config: &ElasticsearchConfig) -> Value {
    json!({
        "settings": index_settings(config),
        "mappings": index_mappings(config.vector_dimensions)
    })
}
