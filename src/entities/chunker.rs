// file: src/entities/chunker.rs
// description: heading-aware chunking of docling documents with a token budget
// reference: https://docling-project.github.io/docling/concepts/chunking/

use crate::entities::docling::{DoclingFile, DoclingNode, NodeRef, RefItem};
use crate::entities::document::{DocChunk, DocItemRef, DocMeta};
use std::collections::HashSet;
use tracing::debug;

/// Chunk text and metadata before ids and vectors are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkDraft {
    pub text: String,
    pub meta: DocMeta,
}

impl ChunkDraft {
    /// Headings on their own lines followed by the chunk text.
    pub fn contextualize(&self) -> String {
        contextualize(self.meta.headings.as_deref().unwrap_or(&[]), &self.text)
    }

    pub fn into_chunk(self, document_id: &str, index: usize) -> DocChunk {
        let text = self.contextualize();
        DocChunk {
            chunk_id: Some(DocChunk::chunk_id_for(document_id, index)),
            text,
            meta: self.meta,
            document_id: Some(document_id.to_string()),
            vector: None,
        }
    }
}

pub fn contextualize(headings: &[String], text: &str) -> String {
    if headings.is_empty() {
        return text.to_string();
    }
    let mut parts: Vec<&str> = headings.iter().map(String::as_str).collect();
    parts.push(text);
    parts.join("\n")
}

pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

#[derive(Debug, Clone)]
pub struct HierarchicalChunker {
    max_tokens: usize,
}

impl HierarchicalChunker {
    pub fn new(max_tokens: usize) -> Self {
        Self {
            max_tokens: max_tokens.max(1),
        }
    }

    pub fn chunk(&self, file: &DoclingFile) -> Vec<ChunkDraft> {
        let mut builder = ChunkBuilder {
            file,
            max_tokens: self.max_tokens,
            headings: Vec::new(),
            texts: Vec::new(),
            items: Vec::new(),
            tokens: 0,
            orphan_items: Vec::new(),
            consumed: HashSet::new(),
            visited: HashSet::new(),
            drafts: Vec::new(),
        };

        builder.walk(&RefItem {
            cref: "#/body".to_string(),
        });
        builder.finish();

        debug!(
            "Chunked '{}' into {} chunks (max {} tokens)",
            file.document.name,
            builder.drafts.len(),
            self.max_tokens
        );
        builder.drafts
    }
}

struct ChunkBuilder<'a> {
    file: &'a DoclingFile,
    max_tokens: usize,
    headings: Vec<(u32, String)>,
    texts: Vec<String>,
    items: Vec<DocItemRef>,
    tokens: usize,
    /// Items seen while no text was pending, attached to the next chunk.
    orphan_items: Vec<DocItemRef>,
    /// Caption texts already emitted with their picture or table.
    consumed: HashSet<String>,
    visited: HashSet<String>,
    drafts: Vec<ChunkDraft>,
}

impl ChunkBuilder<'_> {
    fn walk(&mut self, item: &RefItem) {
        let node_ref = NodeRef::parse(&item.cref);
        let Some(node) = self.file.node(node_ref) else {
            return;
        };
        if !self.visited.insert(item.cref.clone()) || node.is_furniture() {
            return;
        }

        match node_ref {
            NodeRef::Text(_) => {
                if self.consumed.contains(&node.self_ref) {
                    return;
                }
                self.visit_text(node);
            }
            NodeRef::Picture(_) => self.visit_picture(node),
            NodeRef::Table(_) => self.visit_table(node),
            NodeRef::Body | NodeRef::Group(_) | NodeRef::Other => {}
        }

        for child in &node.children {
            self.walk(child);
        }
    }

    fn visit_text(&mut self, node: &DoclingNode) {
        let text = node.text().trim();
        if text.is_empty() {
            return;
        }

        match node.label.as_str() {
            "title" => self.set_heading(0, text),
            "section_header" => self.set_heading(node.level.unwrap_or(1), text),
            _ => self.add_block(text, doc_item(node)),
        }
    }

    fn visit_picture(&mut self, node: &DoclingNode) {
        let caption = self.caption_text(node);
        let mut item = doc_item(node);
        if item.label.is_empty() {
            item.label = "picture".to_string();
        }

        if caption.is_empty() {
            if self.texts.is_empty() {
                self.orphan_items.push(item);
            } else {
                self.items.push(item);
            }
        } else {
            self.add_block(&caption, item);
        }
    }

    fn visit_table(&mut self, node: &DoclingNode) {
        let caption = self.caption_text(node);
        let table_text = node.data.as_ref().map(|d| d.to_text()).unwrap_or_default();
        let text = [caption, table_text]
            .into_iter()
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        if !text.is_empty() {
            self.add_block(&text, doc_item(node));
        }
    }

    fn caption_text(&mut self, node: &DoclingNode) -> String {
        let mut parts = Vec::new();
        for caption in &node.captions {
            if let Some(text) = self.file.resolve_text(caption) {
                self.consumed.insert(caption.cref.clone());
                if !text.trim().is_empty() {
                    parts.push(text.trim().to_string());
                }
            }
        }
        parts.join("\n")
    }

    fn set_heading(&mut self, level: u32, text: &str) {
        self.flush();
        self.headings.retain(|(l, _)| *l < level);
        self.headings.push((level, text.to_string()));
    }

    fn budget(&self) -> usize {
        let heading_tokens: usize = self.headings.iter().map(|(_, h)| count_tokens(h)).sum();
        self.max_tokens.saturating_sub(heading_tokens).max(1)
    }

    fn add_block(&mut self, text: &str, item: DocItemRef) {
        let budget = self.budget();
        let tokens = count_tokens(text);

        if tokens > budget {
            self.flush();
            let words: Vec<&str> = text.split_whitespace().collect();
            for window in words.chunks(budget) {
                self.texts.push(window.join(" "));
                self.items.push(item.clone());
                self.tokens = window.len();
                self.flush();
            }
            return;
        }

        if self.tokens + tokens > budget {
            self.flush();
        }

        self.texts.push(text.to_string());
        self.items.push(item);
        self.tokens += tokens;
    }

    fn flush(&mut self) {
        if self.texts.is_empty() {
            self.orphan_items.append(&mut self.items);
            return;
        }

        let mut doc_items = std::mem::take(&mut self.orphan_items);
        doc_items.append(&mut self.items);

        let mut items_seen = HashSet::new();
        doc_items.retain(|item| items_seen.insert(item.self_ref.clone()));

        let headings: Vec<String> = self.headings.iter().map(|(_, h)| h.clone()).collect();
        self.drafts.push(ChunkDraft {
            text: std::mem::take(&mut self.texts).join("\n"),
            meta: DocMeta {
                doc_items,
                headings: if headings.is_empty() {
                    None
                } else {
                    Some(headings)
                },
                origin: self.file.document.origin.clone(),
                ..DocMeta::default()
            },
        });
        self.tokens = 0;
    }

    fn finish(&mut self) {
        self.flush();
        if self.orphan_items.is_empty() {
            return;
        }
        let orphans = std::mem::take(&mut self.orphan_items);
        if let Some(last) = self.drafts.last_mut() {
            last.meta.doc_items.extend(orphans);
        }
    }
}

fn doc_item(node: &DoclingNode) -> DocItemRef {
    DocItemRef {
        self_ref: node.self_ref.clone(),
        label: node.label.clone(),
        prov: node.prov.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::docling::tests::{sample_docling, sample_docling_json};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_contextualize() {
        assert_eq!(contextualize(&[], "body"), "body");
        assert_eq!(
            contextualize(&["A".to_string(), "B".to_string()], "body"),
            "A\nB\nbody"
        );
    }

    #[test]
    fn test_chunks_follow_sections() {
        let drafts = HierarchicalChunker::new(512).chunk(&sample_docling());
        assert_eq!(drafts.len(), 2);

        let overview = &drafts[0];
        assert_eq!(
            overview.meta.headings,
            Some(vec!["Annual Report".to_string(), "Overview".to_string()])
        );
        assert_eq!(
            overview.text,
            "Revenue grew strongly this year.\nNew markets opened.\nCosts were reduced.\nFigure 1: Revenue by quarter"
        );
        assert!(
            overview
                .meta
                .doc_items
                .iter()
                .any(|item| item.self_ref == "#/pictures/0" && item.is_picture())
        );

        let details = &drafts[1];
        assert_eq!(
            details.meta.headings,
            Some(vec!["Annual Report".to_string(), "Details".to_string()])
        );
        assert_eq!(details.text, "Quarter | Revenue\nQ1 | 10");
    }

    #[test]
    fn test_furniture_and_captions_not_duplicated() {
        let drafts = HierarchicalChunker::new(512).chunk(&sample_docling());
        let all_text: String = drafts.iter().map(|d| d.text.clone()).collect();
        assert!(!all_text.contains("Page 1"));
        assert_eq!(all_text.matches("Figure 1").count(), 1);
    }

    #[test]
    fn test_token_budget_splits_chunks() {
        let mut json = sample_docling_json();
        json["texts"][2]["text"] = json!("one two three four five six seven eight nine ten");
        let file = DoclingFile::from_json_str(&json.to_string(), "long.json").unwrap();

        // "Annual Report" + "Overview" take 3 of the 6 tokens
        let drafts = HierarchicalChunker::new(6).chunk(&file);
        let overview: Vec<&ChunkDraft> = drafts
            .iter()
            .filter(|d| d.meta.headings.as_ref().is_some_and(|h| h[1] == "Overview"))
            .collect();

        assert_eq!(overview[0].text, "one two three");
        assert_eq!(overview[1].text, "four five six");
        assert!(
            drafts
                .iter()
                .all(|d| count_tokens(&d.contextualize()) <= 6 || count_tokens(&d.text) == 1)
        );
    }

    #[test]
    fn test_into_chunk_assigns_ids() {
        let drafts = HierarchicalChunker::new(512).chunk(&sample_docling());
        let chunk = drafts[1].clone().into_chunk("report", 1);
        assert_eq!(chunk.chunk_id.as_deref(), Some("report_chunk_1"));
        assert_eq!(chunk.document_id.as_deref(), Some("report"));
        assert_eq!(chunk.text, "Annual Report\nDetails\nQuarter | Revenue\nQ1 | 10");
        assert_eq!(chunk.meta.origin.as_ref().unwrap().filename, "report.pdf");
    }
}
