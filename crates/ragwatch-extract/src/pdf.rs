//! PDF loader backed by `pdf-extract`.

use async_trait::async_trait;
use ragwatch_core::{ContentMetadataInfo, DocumentLoader, ExtractedContent, LoadError};
use std::path::Path;
use tracing::debug;

/// Loader for PDF files.
pub struct PdfLoader;

impl PdfLoader {
    /// Create a new PDF loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentLoader for PdfLoader {
    fn supported_extensions(&self) -> &[&str] {
        &["pdf"]
    }

    async fn load(&self, path: &Path) -> Result<ExtractedContent, LoadError> {
        debug!("Loading PDF: {:?}", path);
        let bytes = tokio::fs::read(path).await?;

        // pdf-extract is synchronous and CPU-bound
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| LoadError::Parse(format!("PDF task failed: {e}")))?
        .map_err(|e| LoadError::Parse(format!("{}: {e}", path.display())))?;

        let page_count = page_count(&text);
        Ok(ExtractedContent {
            text,
            metadata: ContentMetadataInfo {
                title: None,
                format: Some("pdf".to_string()),
                page_count: Some(page_count),
            },
        })
    }
}

/// Pages are separated by form feeds in `pdf-extract` output.
fn page_count(text: &str) -> u32 {
    text.matches('\x0C').count() as u32 + 1
}
