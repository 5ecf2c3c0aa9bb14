// file: src/entities/mod.rs
// description: domain entities, docling parsing and chunking
// reference: internal module structure

pub mod chunker;
pub mod docling;
pub mod document;

pub use chunker::{ChunkDraft, HierarchicalChunker};
pub use docling::{DoclingFile, DoclingNode, NodeRef};
pub use document::{
    BoundingBox, DocChunk, DocItemRef, DocMeta, DoclingDocument, DocumentOrigin, DocumentPicture,
    DocumentTable, DocumentText, ElasticEntity, ElementKind, ImageData, ImageSize, Provenance,
    TableCell, TableData, element_id,
};
