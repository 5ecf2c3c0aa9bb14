// file: src/entities/document.rs
// description: document, element and chunk entities with their elasticsearch source layout
// reference: https://docling-project.github.io/docling/concepts/docling_document/

use crate::error::{RagError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

pub const DOC_META_SCHEMA: &str = "docling_core.transforms.chunker.DocMeta";
pub const DOC_META_VERSION: &str = "1.0.0";

/// An entity stored in the shared index under a single top-level field.
pub trait ElasticEntity: Serialize + DeserializeOwned {
    /// Top-level field holding the entity in `_source`.
    const FIELD: &'static str;

    fn to_elastic_data(&self) -> Result<Value> {
        Ok(json!({ Self::FIELD: serde_json::to_value(self)? }))
    }

    fn from_elastic_source(source: &Value) -> Result<Self> {
        let inner = source.get(Self::FIELD).ok_or_else(|| {
            RagError::elasticsearch(None, format!("hit has no '{}' field", Self::FIELD))
        })?;
        Ok(serde_json::from_value(inner.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentOrigin {
    pub mimetype: String,
    pub binary_hash: u64,
    pub filename: String,
}

fn default_coord_origin() -> String {
    "TOPLEFT".to_string()
}

/// Accepts both `left/top/right/bottom` and Docling's `l/t/r/b`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(alias = "l", default)]
    pub left: f64,
    #[serde(alias = "t", default)]
    pub top: f64,
    #[serde(alias = "r", default)]
    pub right: f64,
    #[serde(alias = "b", default)]
    pub bottom: f64,
    #[serde(default = "default_coord_origin")]
    pub coord_origin: String,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: 0.0,
            bottom: 0.0,
            coord_origin: default_coord_origin(),
        }
    }
}

fn default_page_no() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default = "default_page_no")]
    pub page_no: u32,
    #[serde(default)]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub charspan: [usize; 2],
}

fn default_text_label() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentText {
    pub text_id: String,
    pub document_id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_text_label")]
    pub label: String,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub prov: Vec<Provenance>,
    #[serde(default)]
    pub orig: Option<String>,
    #[serde(default)]
    pub parent_ref: Option<String>,
    #[serde(default)]
    pub children_refs: Vec<String>,
}

impl ElasticEntity for DocumentText {
    const FIELD: &'static str = "text";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
}

fn default_image_mimetype() -> String {
    "image/png".to_string()
}

fn default_dpi() -> u32 {
    72
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(default = "default_image_mimetype")]
    pub mimetype: String,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default)]
    pub size: ImageSize,
    /// Usually a `data:image/...;base64,` URI.
    #[serde(default)]
    pub uri: String,
}

impl ImageData {
    pub fn is_data_uri(&self) -> bool {
        self.uri.starts_with("data:image/")
    }
}

fn default_picture_label() -> String {
    "picture".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentPicture {
    pub picture_id: String,
    pub document_id: String,
    #[serde(default = "default_picture_label")]
    pub label: String,
    #[serde(default)]
    pub prov: Vec<Provenance>,
    #[serde(default)]
    pub image: Option<ImageData>,
    #[serde(default)]
    pub captions: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub footnotes: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Value>,
    #[serde(default)]
    pub parent_ref: Option<String>,
    #[serde(default)]
    pub children_refs: Vec<String>,
}

impl ElasticEntity for DocumentPicture {
    const FIELD: &'static str = "picture";
}

fn default_span() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default = "default_span")]
    pub row_span: u32,
    #[serde(default = "default_span")]
    pub col_span: u32,
    #[serde(default)]
    pub start_row_offset_idx: u32,
    #[serde(default)]
    pub end_row_offset_idx: u32,
    #[serde(default)]
    pub start_col_offset_idx: u32,
    #[serde(default)]
    pub end_col_offset_idx: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub column_header: bool,
    #[serde(default)]
    pub row_header: bool,
    #[serde(default)]
    pub row_section: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
    #[serde(default)]
    pub num_rows: u32,
    #[serde(default)]
    pub num_cols: u32,
    #[serde(default)]
    pub grid: Vec<Vec<TableCell>>,
}

impl TableData {
    /// Rows of cell texts; spanned cells appear once per row.
    pub fn rows(&self) -> Vec<Vec<String>> {
        if !self.grid.is_empty() {
            return self
                .grid
                .iter()
                .map(|row| {
                    let mut texts = Vec::with_capacity(row.len());
                    let mut last_col = None;
                    for cell in row {
                        if last_col == Some(cell.start_col_offset_idx) {
                            continue;
                        }
                        last_col = Some(cell.start_col_offset_idx);
                        texts.push(cell.text.trim().to_string());
                    }
                    texts
                })
                .collect();
        }

        let mut cells: Vec<&TableCell> = self.table_cells.iter().collect();
        cells.sort_by_key(|c| (c.start_row_offset_idx, c.start_col_offset_idx));

        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut current_row = None;
        for cell in cells {
            if current_row != Some(cell.start_row_offset_idx) {
                rows.push(Vec::new());
                current_row = Some(cell.start_row_offset_idx);
            }
            if let Some(row) = rows.last_mut() {
                row.push(cell.text.trim().to_string());
            }
        }
        rows
    }

    /// One line per row, cells joined with " | ".
    pub fn to_text(&self) -> String {
        self.rows()
            .into_iter()
            .filter(|row| row.iter().any(|c| !c.is_empty()))
            .map(|row| row.join(" | "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn default_table_label() -> String {
    "table".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentTable {
    pub table_id: String,
    pub document_id: String,
    #[serde(default = "default_table_label")]
    pub label: String,
    #[serde(default)]
    pub prov: Vec<Provenance>,
    #[serde(default)]
    pub data: Option<TableData>,
    #[serde(default)]
    pub captions: Vec<String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub footnotes: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<Value>,
    #[serde(default)]
    pub parent_ref: Option<String>,
    #[serde(default)]
    pub children_refs: Vec<String>,
}

impl ElasticEntity for DocumentTable {
    const FIELD: &'static str = "table";
}

/// Document-level record. Texts, pictures and tables are stored as their own entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoclingDocument {
    #[serde(default)]
    pub schema_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub origin: Option<DocumentOrigin>,
    #[serde(default)]
    pub furniture: Value,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub groups: Vec<Value>,
    #[serde(default)]
    pub key_value_items: Vec<Value>,
    #[serde(default)]
    pub form_items: Vec<Value>,
    #[serde(default)]
    pub pages: Map<String, Value>,
}

impl DoclingDocument {
    pub fn named(name: &str) -> Self {
        Self {
            schema_name: "DoclingDocument".to_string(),
            version: "1.0.0".to_string(),
            name: name.to_string(),
            origin: None,
            furniture: Value::Null,
            body: Value::Null,
            groups: Vec::new(),
            key_value_items: Vec::new(),
            form_items: Vec::new(),
            pages: Map::new(),
        }
    }
}

impl ElasticEntity for DoclingDocument {
    const FIELD: &'static str = "document";
}

/// Back-reference from a chunk to the Docling element it was built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocItemRef {
    #[serde(default)]
    pub self_ref: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub prov: Vec<Provenance>,
}

impl DocItemRef {
    pub fn is_picture(&self) -> bool {
        self.label == "picture" || self.self_ref.starts_with("#/pictures/")
    }

    /// Position of the element in the Docling `pictures` array.
    pub fn picture_index(&self) -> Option<usize> {
        self.self_ref.strip_prefix("#/pictures/")?.parse().ok()
    }
}

fn default_meta_schema() -> String {
    DOC_META_SCHEMA.to_string()
}

fn default_meta_version() -> String {
    DOC_META_VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMeta {
    #[serde(default = "default_meta_schema")]
    pub schema_name: String,
    #[serde(default = "default_meta_version")]
    pub version: String,
    #[serde(default)]
    pub doc_items: Vec<DocItemRef>,
    #[serde(default)]
    pub headings: Option<Vec<String>>,
    #[serde(default)]
    pub origin: Option<DocumentOrigin>,
}

impl Default for DocMeta {
    fn default() -> Self {
        Self {
            schema_name: default_meta_schema(),
            version: default_meta_version(),
            doc_items: Vec::new(),
            headings: None,
            origin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub meta: DocMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

impl ElasticEntity for DocChunk {
    const FIELD: &'static str = "chunk";
}

impl DocChunk {
    pub fn new(text: impl Into<String>, meta: DocMeta) -> Self {
        Self {
            chunk_id: None,
            text: text.into(),
            meta,
            document_id: None,
            vector: None,
        }
    }

    pub fn chunk_id_for(document_id: &str, index: usize) -> String {
        format!("{}_chunk_{}", document_id, index)
    }

    pub fn headings(&self) -> &[String] {
        self.meta.headings.as_deref().unwrap_or(&[])
    }

    /// Ids of picture entities referenced by this chunk's doc items.
    pub fn picture_ids(&self) -> Vec<String> {
        let Some(document_id) = self.document_id.as_deref() else {
            return Vec::new();
        };

        self.meta
            .doc_items
            .iter()
            .filter(|item| item.is_picture())
            .filter_map(DocItemRef::picture_index)
            .map(|index| element_id(document_id, ElementKind::Picture, index))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Text,
    Picture,
    Table,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ElementKind::Text => "text",
            ElementKind::Picture => "picture",
            ElementKind::Table => "table",
        }
    }
}

pub fn element_id(document_id: &str, kind: ElementKind, index: usize) -> String {
    format!("{}_{}_{}", document_id, kind.as_str(), index)
}
