// file: src/entities/docling.rs
// description: parsing of docling json exports into document, element and tree nodes
// reference: https://github.com/docling-project/docling-core

use crate::entities::document::{
    DoclingDocument, DocumentOrigin, DocumentPicture, DocumentTable, DocumentText, ElementKind,
    ImageData, Provenance, TableData, element_id,
};
use crate::error::{RagError, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RefItem {
    #[serde(rename = "$ref")]
    pub cref: String,
}

/// One node of the Docling tree: body, group, text, picture or table.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DoclingNode {
    pub self_ref: String,
    pub parent: Option<RefItem>,
    pub children: Vec<RefItem>,
    pub content_layer: Option<String>,
    pub label: String,
    pub text: Option<String>,
    pub orig: Option<String>,
    pub level: Option<u32>,
    pub prov: Vec<Provenance>,
    pub captions: Vec<RefItem>,
    pub references: Vec<RefItem>,
    pub footnotes: Vec<RefItem>,
    pub image: Option<ImageData>,
    pub annotations: Vec<Value>,
    pub data: Option<TableData>,
}

impl DoclingNode {
    pub fn is_furniture(&self) -> bool {
        self.content_layer.as_deref() == Some("furniture")
            || matches!(self.label.as_str(), "page_header" | "page_footer")
    }

    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRef {
    Body,
    Group(usize),
    Text(usize),
    Picture(usize),
    Table(usize),
    Other,
}

impl NodeRef {
    pub fn parse(cref: &str) -> Self {
        let mut parts = cref.trim_start_matches("#/").splitn(2, '/');
        let kind = parts.next().unwrap_or_default();
        let index = parts.next().and_then(|i| i.parse::<usize>().ok());

        match (kind, index) {
            ("body", None) => NodeRef::Body,
            ("groups", Some(i)) => NodeRef::Group(i),
            ("texts", Some(i)) => NodeRef::Text(i),
            ("pictures", Some(i)) => NodeRef::Picture(i),
            ("tables", Some(i)) => NodeRef::Table(i),
            _ => NodeRef::Other,
        }
    }
}

/// A parsed Docling export: the document record plus its element arrays.
#[derive(Debug, Clone)]
pub struct DoclingFile {
    pub document: DoclingDocument,
    pub body: DoclingNode,
    pub groups: Vec<DoclingNode>,
    pub texts: Vec<DoclingNode>,
    pub pictures: Vec<DoclingNode>,
    pub tables: Vec<DoclingNode>,
}

fn take_field<T: for<'de> Deserialize<'de> + Default>(
    root: &mut Map<String, Value>,
    key: &str,
    file: &str,
) -> Result<T> {
    match root.remove(key) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|e| RagError::Docling {
            file: file.to_string(),
            message: format!("invalid '{}': {}", key, e),
        }),
    }
}

impl DoclingFile {
    pub fn from_json_str(content: &str, file: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content).map_err(|e| RagError::Docling {
            file: file.to_string(),
            message: e.to_string(),
        })?;

        let Value::Object(mut root) = value else {
            return Err(RagError::Docling {
                file: file.to_string(),
                message: "top-level value is not an object".to_string(),
            });
        };

        let body_value = root.get("body").cloned().unwrap_or(Value::Null);
        let groups_value: Vec<Value> = take_field(&mut root, "groups", file)?;

        let body: DoclingNode = if body_value.is_null() {
            DoclingNode::default()
        } else {
            serde_json::from_value(body_value.clone()).map_err(|e| RagError::Docling {
                file: file.to_string(),
                message: format!("invalid 'body': {}", e),
            })?
        };

        let groups = groups_value
            .iter()
            .cloned()
            .map(serde_json::from_value)
            .collect::<std::result::Result<Vec<DoclingNode>, _>>()
            .map_err(|e| RagError::Docling {
                file: file.to_string(),
                message: format!("invalid 'groups': {}", e),
            })?;

        let texts: Vec<DoclingNode> = take_field(&mut root, "texts", file)?;
        let pictures: Vec<DoclingNode> = take_field(&mut root, "pictures", file)?;
        let tables: Vec<DoclingNode> = take_field(&mut root, "tables", file)?;
        let origin: Option<DocumentOrigin> = take_field(&mut root, "origin", file)?;

        let string_field = |root: &Map<String, Value>, key: &str| {
            root.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let document = DoclingDocument {
            schema_name: string_field(&root, "schema_name"),
            version: string_field(&root, "version"),
            name: string_field(&root, "name"),
            origin,
            furniture: root.remove("furniture").unwrap_or(Value::Null),
            body: body_value,
            groups: groups_value,
            key_value_items: take_field(&mut root, "key_value_items", file)?,
            form_items: take_field(&mut root, "form_items", file)?,
            pages: take_field(&mut root, "pages", file)?,
        };

        debug!(
            "Parsed Docling document '{}': {} texts, {} pictures, {} tables",
            document.name,
            texts.len(),
            pictures.len(),
            tables.len()
        );

        Ok(Self {
            document,
            body,
            groups,
            texts,
            pictures,
            tables,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content, &path.display().to_string())
    }

    pub fn node(&self, node_ref: NodeRef) -> Option<&DoclingNode> {
        match node_ref {
            NodeRef::Body => Some(&self.body),
            NodeRef::Group(i) => self.groups.get(i),
            NodeRef::Text(i) => self.texts.get(i),
            NodeRef::Picture(i) => self.pictures.get(i),
            NodeRef::Table(i) => self.tables.get(i),
            NodeRef::Other => None,
        }
    }

    /// Text behind a `$ref`, for captions and footnotes.
    pub fn resolve_text(&self, item: &RefItem) -> Option<&str> {
        match NodeRef::parse(&item.cref) {
            NodeRef::Text(i) => self.texts.get(i).map(DoclingNode::text),
            _ => None,
        }
    }

    pub fn document_texts(&self, document_id: &str) -> Vec<DocumentText> {
        self.texts
            .iter()
            .enumerate()
            .map(|(i, node)| DocumentText {
                text_id: element_id(document_id, ElementKind::Text, i),
                document_id: document_id.to_string(),
                text: node.text().to_string(),
                label: if node.label.is_empty() {
                    "text".to_string()
                } else {
                    node.label.clone()
                },
                level: node.level,
                prov: node.prov.clone(),
                orig: node.orig.clone(),
                parent_ref: node.parent.as_ref().map(|p| p.cref.clone()),
                children_refs: refs(&node.children),
            })
            .collect()
    }

    pub fn document_pictures(&self, document_id: &str) -> Vec<DocumentPicture> {
        self.pictures
            .iter()
            .enumerate()
            .map(|(i, node)| DocumentPicture {
                picture_id: element_id(document_id, ElementKind::Picture, i),
                document_id: document_id.to_string(),
                label: if node.label.is_empty() {
                    "picture".to_string()
                } else {
                    node.label.clone()
                },
                prov: node.prov.clone(),
                image: node.image.clone(),
                captions: refs(&node.captions),
                references: refs(&node.references),
                footnotes: refs(&node.footnotes),
                annotations: node.annotations.clone(),
                parent_ref: node.parent.as_ref().map(|p| p.cref.clone()),
                children_refs: refs(&node.children),
            })
            .collect()
    }

    pub fn document_tables(&self, document_id: &str) -> Vec<DocumentTable> {
        self.tables
            .iter()
            .enumerate()
            .map(|(i, node)| DocumentTable {
                table_id: element_id(document_id, ElementKind::Table, i),
                document_id: document_id.to_string(),
                label: if node.label.is_empty() {
                    "table".to_string()
                } else {
                    node.label.clone()
                },
                prov: node.prov.clone(),
                data: node.data.clone(),
                captions: refs(&node.captions),
                references: refs(&node.references),
                footnotes: refs(&node.footnotes),
                annotations: node.annotations.clone(),
                parent_ref: node.parent.as_ref().map(|p| p.cref.clone()),
                children_refs: refs(&node.children),
            })
            .collect()
    }
}

fn refs(items: &[RefItem]) -> Vec<String> {
    items.iter().map(|r| r.cref.clone()).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    /// Small Docling export with a title, two sections, a captioned picture and a table.
    pub(crate) fn sample_docling_json() -> Value {
        json!({
            "schema_name": "DoclingDocument",
            "version": "1.3.0",
            "name": "report",
            "origin": {"mimetype": "application/pdf", "binary_hash": 42, "filename": "report.pdf"},
            "furniture": {"self_ref": "#/furniture", "children": [], "label": "unspecified"},
            "body": {
                "self_ref": "#/body",
                "children": [
                    {"$ref": "#/texts/0"},
                    {"$ref": "#/texts/1"},
                    {"$ref": "#/texts/2"},
                    {"$ref": "#/groups/0"},
                    {"$ref": "#/pictures/0"},
                    {"$ref": "#/texts/6"},
                    {"$ref": "#/tables/0"}
                ],
                "label": "unspecified"
            },
            "groups": [
                {
                    "self_ref": "#/groups/0",
                    "parent": {"$ref": "#/body"},
                    "children": [{"$ref": "#/texts/3"}, {"$ref": "#/texts/4"}],
                    "label": "list",
                    "name": "list"
                }
            ],
            "texts": [
                {"self_ref": "#/texts/0", "parent": {"$ref": "#/body"}, "label": "title", "text": "Annual Report",
                 "prov": [{"page_no": 1, "bbox": {"l": 10.0, "t": 20.0, "r": 200.0, "b": 40.0, "coord_origin": "BOTTOMLEFT"}, "charspan": [0, 13]}]},
                {"self_ref": "#/texts/1", "parent": {"$ref": "#/body"}, "label": "section_header", "level": 1, "text": "Overview"},
                {"self_ref": "#/texts/2", "parent": {"$ref": "#/body"}, "label": "text", "text": "Revenue grew strongly this year."},
                {"self_ref": "#/texts/3", "parent": {"$ref": "#/groups/0"}, "label": "list_item", "text": "New markets opened."},
                {"self_ref": "#/texts/4", "parent": {"$ref": "#/groups/0"}, "label": "list_item", "text": "Costs were reduced."},
                {"self_ref": "#/texts/5", "parent": {"$ref": "#/pictures/0"}, "label": "caption", "text": "Figure 1: Revenue by quarter"},
                {"self_ref": "#/texts/6", "parent": {"$ref": "#/body"}, "label": "section_header", "level": 1, "text": "Details"},
                {"self_ref": "#/texts/7", "parent": {"$ref": "#/body"}, "label": "page_footer", "content_layer": "furniture", "text": "Page 1"}
            ],
            "pictures": [
                {
                    "self_ref": "#/pictures/0",
                    "parent": {"$ref": "#/body"},
                    "children": [{"$ref": "#/texts/5"}],
                    "label": "picture",
                    "captions": [{"$ref": "#/texts/5"}],
                    "image": {"mimetype": "image/png", "dpi": 144, "size": {"width": 640.0, "height": 480.0}, "uri": "data:image/png;base64,aGVsbG8="},
                    "annotations": []
                }
            ],
            "tables": [
                {
                    "self_ref": "#/tables/0",
                    "parent": {"$ref": "#/body"},
                    "label": "table",
                    "captions": [],
                    "data": {
                        "table_cells": [
                            {"text": "Quarter", "start_row_offset_idx": 0, "start_col_offset_idx": 0, "column_header": true},
                            {"text": "Revenue", "start_row_offset_idx": 0, "start_col_offset_idx": 1, "column_header": true},
                            {"text": "Q1", "start_row_offset_idx": 1, "start_col_offset_idx": 0},
                            {"text": "10", "start_row_offset_idx": 1, "start_col_offset_idx": 1}
                        ],
                        "num_rows": 2,
                        "num_cols": 2
                    }
                }
            ],
            "key_value_items": [],
            "form_items": [],
            "pages": {"1": {"size": {"width": 612.0, "height": 792.0}, "page_no": 1}}
        })
    }

    pub(crate) fn sample_docling() -> DoclingFile {
        DoclingFile::from_json_str(&sample_docling_json().to_string(), "report.json").unwrap()
    }

    #[test]
    fn test_parse_document_record() {
        let file = sample_docling();
        assert_eq!(file.document.name, "report");
        assert_eq!(file.document.version, "1.3.0");
        assert_eq!(file.document.origin.as_ref().unwrap().binary_hash, 42);
        assert!(file.document.pages.contains_key("1"));
        assert_eq!(file.body.children.len(), 7);
        assert_eq!(file.groups.len(), 1);
        assert_eq!(file.texts.len(), 8);
    }

    #[test]
    fn test_node_ref_parsing() {
        assert_eq!(NodeRef::parse("#/body"), NodeRef::Body);
        assert_eq!(NodeRef::parse("#/texts/12"), NodeRef::Text(12));
        assert_eq!(NodeRef::parse("#/pictures/0"), NodeRef::Picture(0));
        assert_eq!(NodeRef::parse("#/tables/x"), NodeRef::Other);
        assert_eq!(NodeRef::parse("#/furniture"), NodeRef::Other);
    }

    #[test]
    fn test_element_entities() {
        let file = sample_docling();

        let texts = file.document_texts("report");
        assert_eq!(texts[0].text_id, "report_text_0");
        assert_eq!(texts[0].label, "title");
        assert_eq!(texts[0].prov[0].bbox.right, 200.0);
        assert_eq!(texts[3].parent_ref.as_deref(), Some("#/groups/0"));

        let pictures = file.document_pictures("report");
        assert_eq!(pictures.len(), 1);
        assert_eq!(pictures[0].picture_id, "report_picture_0");
        assert_eq!(pictures[0].captions, vec!["#/texts/5".to_string()]);
        assert_eq!(pictures[0].image.as_ref().unwrap().dpi, 144);

        let tables = file.document_tables("report");
        assert_eq!(tables[0].table_id, "report_table_0");
        assert_eq!(
            tables[0].data.as_ref().unwrap().to_text(),
            "Quarter | Revenue\nQ1 | 10"
        );
    }

    #[test]
    fn test_caption_resolution() {
        let file = sample_docling();
        let caption = &file.pictures[0].captions[0];
        assert_eq!(file.resolve_text(caption), Some("Figure 1: Revenue by quarter"));
    }

    #[test]
    fn test_invalid_json_reports_file() {
        let err = DoclingFile::from_json_str("[1, 2]", "broken.json").unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }
}
