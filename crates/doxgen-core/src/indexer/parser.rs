//! Structural parser: file bytes to a language-tagged element list.
//!
//! Every file goes through the same gate before any extractor sees it: size
//! limit, byte-order mark removal, UTF-8 validation, and a full tree-sitter
//! parse. A tree containing any error or missing node is rejected as a
//! syntax error, so extractors only ever walk clean trees and a file either
//! yields all of its elements or none.

use std::path::Path;

use serde::Serialize;
use tree_sitter::Node;

use super::languages::{self, Extraction};
use super::symbols::children;
use crate::config::ParserConfig;
use crate::errors::{DoxError, DoxResult};
use crate::models::{Language, ParseError, ParseResult, ParsedFile};

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Longest source excerpt quoted in a syntax diagnostic.
const DIAGNOSTIC_EXCERPT: usize = 40;

#[derive(Debug, Clone)]
pub struct StructuralParser {
    max_file_size: u64,
}

impl StructuralParser {
    pub fn new(config: &ParserConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
        }
    }

    /// Extract one file. Never returns a partial element list.
    pub fn extract(&self, path: &Path) -> ParseResult {
        self.try_extract(path).map_err(|err| failure(path, err))
    }

    /// Extract content already read from `path`.
    pub fn extract_bytes(&self, path: &Path, bytes: &[u8]) -> ParseResult {
        language_of(path)
            .and_then(|(language, ext)| self.parse_source(path, language, ext, bytes))
            .map_err(|err| failure(path, err))
    }

    /// Read `path` unless its on-disk size already exceeds the limit.
    pub fn read_source(&self, path: &Path) -> DoxResult<Vec<u8>> {
        let size = std::fs::metadata(path)?.len();
        if size > self.max_file_size {
            return Err(DoxError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }
        Ok(std::fs::read(path)?)
    }

    fn try_extract(&self, path: &Path) -> DoxResult<ParsedFile> {
        let (language, ext) = language_of(path)?;
        let bytes = self.read_source(path)?;
        self.parse_source(path, language, ext, &bytes)
    }

    /// Parse in-memory content as if it were read from `path`.
    pub fn parse_source(
        &self,
        path: &Path,
        language: Language,
        ext: &str,
        bytes: &[u8],
    ) -> DoxResult<ParsedFile> {
        let size = bytes.len() as u64;
        if size > self.max_file_size {
            return Err(DoxError::FileTooLarge {
                size,
                limit: self.max_file_size,
            });
        }

        let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        if let Err(e) = std::str::from_utf8(bytes) {
            return Err(DoxError::Decode(format!(
                "invalid UTF-8 at byte {}",
                e.valid_up_to()
            )));
        }

        let mut parser = tree_sitter::Parser::new();
        parser
            .set_language(&languages::grammar(language, ext))
            .map_err(|e| DoxError::UnsupportedLanguage(format!("{language}: {e}")))?;
        let tree = parser.parse(bytes, None).ok_or_else(|| DoxError::Syntax {
            line: 1,
            column: 1,
            message: "parser produced no tree".to_string(),
        })?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(first_error(root, bytes));
        }

        let Extraction { elements, imports } = languages::extract(language, &tree, bytes);
        tracing::debug!(
            file = %path.display(),
            %language,
            elements = elements.len(),
            imports = imports.len(),
            "extracted"
        );
        Ok(ParsedFile {
            file: path.to_path_buf(),
            language,
            elements,
            imports,
        })
    }
}

fn language_of(path: &Path) -> DoxResult<(Language, &str)> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let language = Language::from_extension(ext).ok_or_else(|| {
        DoxError::UnsupportedLanguage(if ext.is_empty() {
            "<no extension>".to_string()
        } else {
            ext.to_string()
        })
    })?;
    Ok((language, ext))
}

fn failure(path: &Path, err: DoxError) -> ParseError {
    if err.is_unsupported() {
        tracing::debug!(file = %path.display(), error = %err, "no extractor for file");
    } else {
        tracing::debug!(file = %path.display(), error = %err, "extraction failed");
    }
    ParseError::from_error(path, &err)
}

/// Diagnostic for the first error or missing node in document order.
fn first_error(root: Node, source: &[u8]) -> DoxError {
    let node = find_error(root).unwrap_or(root);
    let pos = node.start_position();
    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else if node.is_error() {
        let text = String::from_utf8_lossy(&source[node.byte_range()]);
        let excerpt: String = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(DIAGNOSTIC_EXCERPT)
            .collect();
        if excerpt.is_empty() {
            "unexpected end of input".to_string()
        } else {
            format!("unexpected `{excerpt}`")
        }
    } else {
        "invalid syntax".to_string()
    };
    DoxError::Syntax {
        line: pos.row + 1,
        column: pos.column + 1,
        message,
    }
}

fn find_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    children(node).into_iter().find_map(find_error)
}

// ---------------------------------------------------------------------------
// Capability report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LanguageCapability {
    pub language: Language,
    pub extensions: Vec<&'static str>,
    pub available: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CapabilityReport {
    pub all_available: bool,
    pub abi_version: usize,
    pub languages: Vec<LanguageCapability>,
}

/// Check that every language's grammar loads into this build's tree-sitter
/// runtime.
pub fn capability_report() -> CapabilityReport {
    let languages: Vec<LanguageCapability> = Language::ALL
        .iter()
        .map(|&language| {
            let mut parser = tree_sitter::Parser::new();
            let loaded = language
                .extensions()
                .iter()
                .try_for_each(|ext| parser.set_language(&languages::grammar(language, ext)));
            let (available, reason) = match loaded {
                Ok(()) => (true, "ok".to_string()),
                Err(e) => (false, e.to_string()),
            };
            LanguageCapability {
                language,
                extensions: language.extensions(),
                available,
                reason,
            }
        })
        .collect();
    CapabilityReport {
        all_available: languages.iter().all(|l| l.available),
        abi_version: tree_sitter::LANGUAGE_VERSION,
        languages,
    }
}
