//! Plain text and Markdown loader.

use async_trait::async_trait;
use ragwatch_core::{ContentMetadataInfo, DocumentLoader, ExtractedContent, LoadError};
use std::path::Path;
use tokio::fs;
use tracing::debug;

/// Loader for UTF-8 text files.
pub struct TextLoader;

impl TextLoader {
    /// Create a new text loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for TextLoader {
    fn supported_extensions(&self) -> &[&str] {
        &["txt", "text", "md", "markdown"]
    }

    async fn load(&self, path: &Path) -> Result<ExtractedContent, LoadError> {
        let bytes = fs::read(path).await?;
        let text = String::from_utf8(bytes)
            .map_err(|e| LoadError::Parse(format!("{} is not UTF-8: {e}", path.display())))?;

        let is_markdown = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_lowercase().as_str(), "md" | "markdown"));

        let (format, title) = if is_markdown {
            ("markdown", markdown_title(&text))
        } else {
            ("text", None)
        };
        debug!("Loaded {} ({} bytes, {})", path.display(), text.len(), format);

        Ok(ExtractedContent {
            text,
            metadata: ContentMetadataInfo {
                title,
                format: Some(format.to_string()),
                page_count: None,
            },
        })
    }
}

/// First level-one heading, if any.
fn markdown_title(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_accepts_text_and_markdown() {
        let loader = TextLoader::new();
        assert!(loader.accepts(Path::new("/test/file.txt")));
        assert!(loader.accepts(Path::new("/test/README.md")));
        assert!(loader.accepts(Path::new("/test/notes.markdown")));
        assert!(loader.accepts(Path::new("/test/FILE.TXT")));
    }

    #[test]
    fn test_rejects_other_formats() {
        let loader = TextLoader::new();
        assert!(!loader.accepts(Path::new("/test/report.docx")));
        assert!(!loader.accepts(Path::new("/test/image.png")));
        assert!(!loader.accepts(Path::new("/test/file_without_extension")));
    }

    #[tokio::test]
    async fn test_load_plain_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "Hello, world!").unwrap();

        let content = TextLoader::new().load(&path).await.unwrap();
        assert_eq!(content.text, "Hello, world!");
        assert_eq!(content.metadata.format.as_deref(), Some("text"));
        assert!(content.metadata.title.is_none());
    }

    #[tokio::test]
    async fn test_load_markdown_title() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("guide.md");
        std::fs::write(&path, "Intro line\n\n# Install Guide\n\nSteps.").unwrap();

        let content = TextLoader::new().load(&path).await.unwrap();
        assert_eq!(content.metadata.format.as_deref(), Some("markdown"));
        assert_eq!(content.metadata.title.as_deref(), Some("Install Guide"));
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let err = TextLoader::new().load(&path).await.unwrap_err();
        assert!(matches!(err, LoadError::Parse(_)));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let err = TextLoader::new()
            .load(Path::new("/nonexistent/ragwatch/file.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
    }

    #[test]
    fn test_markdown_title_ignores_subheadings() {
        assert_eq!(markdown_title("## Sub\ntext"), None);
        assert_eq!(markdown_title("#   \n# Real"), Some("Real".to_string()));
    }
}
