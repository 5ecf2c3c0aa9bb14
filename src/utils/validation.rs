// file: src/utils/validation.rs
// description: input validation for identifiers, search sizes and paths
// reference: input validation patterns

use crate::error::{RagError, Result};
use std::path::Path;

/// Elasticsearch rejects `_id` values longer than this many bytes.
pub const MAX_DOCUMENT_ID_BYTES: usize = 512;

pub struct Validator;

impl Validator {
    pub fn validate_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(RagError::Validation(format!(
                "Directory does not exist: {}",
                path.display()
            )));
        }

        if !path.is_dir() {
            return Err(RagError::Validation(format!(
                "Path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    pub fn validate_json_extension(path: &Path) -> Result<()> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(()),
            _ => Err(RagError::Validation(format!(
                "File is not a JSON file: {}",
                path.display()
            ))),
        }
    }

    pub fn validate_content_not_empty(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(RagError::Validation("Content is empty".to_string()));
        }
        Ok(())
    }

    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(RagError::Validation(format!("Invalid URL format: {}", url)));
        }
        Ok(())
    }

    pub fn validate_batch_size(size: usize) -> Result<()> {
        if size == 0 {
            return Err(RagError::Validation(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if size > 10000 {
            return Err(RagError::Validation(
                "Batch size too large (max 10000)".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_search_size(size: usize, max_size: usize) -> Result<()> {
        if size == 0 || size > max_size {
            return Err(RagError::Validation(format!(
                "Search size must be between 1 and {} (got {})",
                max_size, size
            )));
        }
        Ok(())
    }

    pub fn validate_document_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(RagError::Validation("Document id is empty".to_string()));
        }

        if id.len() > MAX_DOCUMENT_ID_BYTES {
            return Err(RagError::Validation(format!(
                "Document id exceeds {} bytes",
                MAX_DOCUMENT_ID_BYTES
            )));
        }

        Ok(())
    }

    pub fn validate_vector(vector: &[f32], dimensions: usize) -> Result<()> {
        if vector.len() != dimensions {
            return Err(RagError::Validation(format!(
                "Vector has {} dimensions, index expects {}",
                vector.len(),
                dimensions
            )));
        }

        if vector.iter().any(|v| !v.is_finite()) {
            return Err(RagError::Validation(
                "Vector contains non-finite values".to_string(),
            ));
        }

        Ok(())
    }

    /// Cuts on a char boundary and appends "..." when the text is longer than `max_chars`.
    pub fn truncate_text(text: &str, max_chars: usize) -> String {
        match text.char_indices().nth(max_chars) {
            None => text.to_string(),
            Some((idx, _)) => format!("{}...", &text[..idx]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_directory() {
        let temp = TempDir::new().unwrap();
        assert!(Validator::validate_directory(temp.path()).is_ok());
        assert!(Validator::validate_directory(Path::new("/nonexistent")).is_err());

        let file = temp.path().join("doc.json");
        std::fs::write(&file, "{}").unwrap();
        assert!(Validator::validate_directory(&file).is_err());
    }

    #[test]
    fn test_validate_json_extension() {
        assert!(Validator::validate_json_extension(Path::new("doc.json")).is_ok());
        assert!(Validator::validate_json_extension(Path::new("DOC.JSON")).is_ok());
        assert!(Validator::validate_json_extension(Path::new("doc.md")).is_err());
    }

    #[test]
    fn test_validate_url() {
        assert!(Validator::validate_url("https://example.com").is_ok());
        assert!(Validator::validate_url("http://localhost:9200").is_ok());
        assert!(Validator::validate_url("localhost:9200").is_err());
    }

    #[test]
    fn test_validate_search_size() {
        assert!(Validator::validate_search_size(10, 100).is_ok());
        assert!(Validator::validate_search_size(100, 100).is_ok());
        assert!(Validator::validate_search_size(0, 100).is_err());
        assert!(Validator::validate_search_size(101, 100).is_err());
    }

    #[test]
    fn test_validate_document_id() {
        assert!(Validator::validate_document_id("report_2024").is_ok());
        assert!(Validator::validate_document_id("  ").is_err());
        assert!(Validator::validate_document_id(&"x".repeat(513)).is_err());
    }

    #[test]
    fn test_validate_vector() {
        assert!(Validator::validate_vector(&[0.1, 0.2], 2).is_ok());
        assert!(Validator::validate_vector(&[0.1], 2).is_err());
        assert!(Validator::validate_vector(&[f32::NAN, 0.2], 2).is_err());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(Validator::truncate_text("short", 10), "short");
        assert_eq!(
            Validator::truncate_text("this is a very long text", 10),
            "this is a ..."
        );
        assert_eq!(Validator::truncate_text("ééééé", 2), "éé...");
    }
}
