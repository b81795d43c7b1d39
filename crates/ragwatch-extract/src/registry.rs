//! Loader registry routing paths to document loaders.

use async_trait::async_trait;
use ragwatch_core::{DocumentLoader, ExtractedContent, LoadError};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::{PdfLoader, TextLoader};

/// Registry of document loaders, consulted in registration order.
pub struct LoaderRegistry {
    loaders: Vec<(String, Arc<dyn DocumentLoader>)>,
}

impl LoaderRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
        }
    }

    /// Registry with the text and PDF loaders.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("text", TextLoader::new());
        registry.register("pdf", PdfLoader::new());
        registry
    }

    /// Register a loader.
    pub fn register<L: DocumentLoader + 'static>(&mut self, name: &str, loader: L) {
        self.loaders.push((name.to_string(), Arc::new(loader)));
    }

    /// The loader that handles `path`, if any.
    #[must_use]
    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn DocumentLoader>> {
        self.loaders
            .iter()
            .find(|(_, loader)| loader.accepts(path))
            .map(|(_, loader)| Arc::clone(loader))
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl DocumentLoader for LoaderRegistry {
    fn supported_extensions(&self) -> &[&str] {
        &[]
    }

    fn accepts(&self, path: &Path) -> bool {
        self.get_for_file(path).is_some()
    }

    async fn load(&self, path: &Path) -> Result<ExtractedContent, LoadError> {
        let Some((name, loader)) = self.loaders.iter().find(|(_, l)| l.accepts(path)) else {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            return Err(LoadError::UnsupportedFormat(format!(
                "{} ({})",
                path.display(),
                mime
            )));
        };
        debug!("Routing {:?} to {} loader", path, name);
        loader.load(path).await
    }
}
