//! Source file discovery and content fingerprinting.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

use crate::config::DiscoveryConfig;
use crate::errors::{DoxError, DoxResult};
use crate::models::Language;

/// Walks a source root and returns candidate files.
///
/// A path is a candidate when it is a regular file, its extension is in the
/// allow-set and none of its components (relative to the root) is in the
/// ignore-set. Entries are visited in file-name order so repeated walks of an
/// unchanged tree yield the same sequence.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    allowed_extensions: BTreeSet<String>,
    ignored_segments: Arc<BTreeSet<String>>,
}

impl FileDiscovery {
    pub fn new(config: &DiscoveryConfig) -> Self {
        Self {
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            ignored_segments: Arc::new(config.ignored_path_segments.clone()),
        }
    }

    /// Collect at most `max_files` candidates under `root`.
    ///
    /// Only an unreadable root is an error; unreadable entries below it are
    /// skipped.
    pub fn discover(&self, root: &Path, max_files: usize) -> DoxResult<Vec<PathBuf>> {
        if let Err(e) = std::fs::read_dir(root) {
            return Err(DoxError::DiscoveryRoot {
                path: root.to_path_buf(),
                message: e.to_string(),
            });
        }

        let mut files = Vec::new();
        if max_files == 0 {
            return Ok(files);
        }

        let ignored = Arc::clone(&self.ignored_segments);
        let walker = WalkBuilder::new(root)
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                entry.depth() == 0
                    || !entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| ignored.contains(name))
            })
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    tracing::debug!(error = %err, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|ft| ft.is_file()) {
                continue;
            }
            if !self.is_allowed(entry.path()) {
                continue;
            }
            files.push(entry.into_path());
            if files.len() >= max_files {
                tracing::debug!(max_files, "file ceiling reached, stopping discovery");
                break;
            }
        }

        tracing::debug!(root = %root.display(), count = files.len(), "discovery finished");
        Ok(files)
    }

    fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.allowed_extensions.contains(&ext.to_ascii_lowercase()))
    }
}

/// Restrict a discovered list to one language, preserving order.
pub fn select(files: &[PathBuf], language: Language) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|f| detect_language(f) == Some(language))
        .cloned()
        .collect()
}

pub fn detect_language(path: &Path) -> Option<Language> {
    Language::from_path(path)
}

/// SHA-256 hex digest of a byte slice.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 hex digest of a file's current content.
pub fn compute_content_hash(path: &Path) -> DoxResult<String> {
    let data = std::fs::read(path)?;
    Ok(content_hash(&data))
}
