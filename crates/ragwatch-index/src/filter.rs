//! Path filtering for the scanner and the watcher queue.

use std::path::{Path, PathBuf};
use tracing::warn;

/// Decides which paths are ingested.
#[derive(Debug, Clone)]
pub struct PathFilter {
    /// Lowercase extensions without the dot
    extensions: Vec<String>,
    /// Simple glob patterns (`**/x/**`, `*.ext`, or substrings)
    exclude: Vec<String>,
}

impl PathFilter {
    /// Create a filter from an extension allow-list and exclude patterns.
    pub fn new<E, X>(extensions: E, exclude: X) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        X: IntoIterator,
        X::Item: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            exclude: exclude.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether a file at `path` should be ingested.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        if is_hidden(path) || self.is_excluded(path) {
            return false;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
    }

    /// Whether `path` matches an exclude pattern.
    #[must_use]
    pub fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude.iter().any(|pattern| {
            if pattern.contains("**") {
                let parts: Vec<&str> = pattern.split("**").collect();
                if parts.len() == 2 {
                    let prefix = parts[0].trim_matches('/');
                    let suffix = parts[1].trim_matches('/');
                    (prefix.is_empty() || path_str.contains(prefix))
                        && (suffix.is_empty() || path_str.contains(suffix))
                } else {
                    false
                }
            } else if pattern.starts_with('*') {
                path_str.ends_with(pattern.trim_start_matches('*'))
            } else {
                path_str.contains(pattern.trim_matches('*'))
            }
        })
    }

    /// Every accepted file under `root`, sorted. Blocking.
    #[must_use]
    pub fn scan(&self, root: &Path) -> Vec<PathBuf> {
        let mut found = Vec::new();
        self.visit_dir(root, &mut found);
        found.sort();
        found
    }

    fn visit_dir(&self, dir: &Path, found: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!("Cannot read directory {:?}: {}", dir, e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if is_hidden(&path) || self.is_excluded(&path) {
                continue;
            }
            if path.is_dir() {
                self.visit_dir(&path, found);
            } else if path.is_file() && self.accepts(&path) {
                found.push(path);
            }
        }
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(["txt", "md", "markdown", "pdf"], Vec::<String>::new())
    }
}

/// Dotfiles and dot-directories are never ingested.
pub(crate) fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_extensions() {
        let filter = PathFilter::default();
        assert!(filter.accepts(Path::new("/docs/a.txt")));
        assert!(filter.accepts(Path::new("/docs/B.MD")));
        assert!(filter.accepts(Path::new("/docs/c.pdf")));
        assert!(!filter.accepts(Path::new("/docs/d.docx")));
        assert!(!filter.accepts(Path::new("/docs/noext")));
    }

    #[test]
    fn test_hidden_files_rejected() {
        let filter = PathFilter::default();
        assert!(!filter.accepts(Path::new("/docs/.draft.txt")));
    }

    #[test]
    fn test_exclude_patterns() {
        let filter = PathFilter::new(["txt"], ["**/archive/**", "*.bak.txt", "tmp"]);
        assert!(filter.is_excluded(Path::new("/docs/archive/old.txt")));
        assert!(filter.is_excluded(Path::new("/docs/notes.bak.txt")));
        assert!(filter.is_excluded(Path::new("/docs/tmp/x.txt")));
        assert!(!filter.is_excluded(Path::new("/docs/current.txt")));
        assert!(!filter.accepts(Path::new("/docs/archive/old.txt")));
    }

    #[test]
    fn test_extensions_normalized() {
        let filter = PathFilter::new([".TXT"], Vec::<String>::new());
        assert!(filter.accepts(Path::new("/a/b.txt")));
    }

    #[test]
    fn test_scan_skips_hidden_and_excluded() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("sub")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::create_dir_all(root.join("archive")).unwrap();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::write(root.join("sub/b.md"), "b").unwrap();
        std::fs::write(root.join("sub/c.docx"), "c").unwrap();
        std::fs::write(root.join(".git/d.txt"), "d").unwrap();
        std::fs::write(root.join("archive/e.txt"), "e").unwrap();

        let filter = PathFilter::new(["txt", "md"], ["**/archive/**"]);
        let found = filter.scan(root);
        assert_eq!(found, vec![root.join("a.txt"), root.join("sub/b.md")]);
    }
}
