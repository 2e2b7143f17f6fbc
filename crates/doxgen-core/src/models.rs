//! Shared typed models used across discovery, extraction, caching and the
//! pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::DoxError;

// ---------------------------------------------------------------------------
// Metadata keys
// ---------------------------------------------------------------------------

/// Ordered parameter names of a function.
pub const META_PARAMS: &str = "params";
/// Decorator / annotation / attribute names.
pub const META_DECORATORS: &str = "decorators";
/// Whether a function is declared async.
pub const META_IS_ASYNC: &str = "is_async";
/// Ordered method names of a type.
pub const META_METHODS: &str = "methods";
/// Ordered base / parent names of a type.
pub const META_BASES: &str = "bases";
/// Go method receiver, e.g. `*Server`.
pub const META_RECEIVER: &str = "receiver";
/// Enclosing scope of an out-of-line definition, e.g. `Widget` in `Widget::draw`.
pub const META_SCOPE: &str = "scope";

// ---------------------------------------------------------------------------
// 1. Language
// ---------------------------------------------------------------------------

/// Closed set of languages the structural parser understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Rust,
    Java,
    C,
    Cpp,
}

const LANGUAGE_BY_EXTENSION: &[(&str, Language)] = &[
    ("py", Language::Python),
    ("pyw", Language::Python),
    ("js", Language::JavaScript),
    ("jsx", Language::JavaScript),
    ("mjs", Language::JavaScript),
    ("cjs", Language::JavaScript),
    ("ts", Language::TypeScript),
    ("tsx", Language::TypeScript),
    ("go", Language::Go),
    ("rs", Language::Rust),
    ("java", Language::Java),
    ("c", Language::C),
    ("h", Language::C),
    ("cpp", Language::Cpp),
    ("cc", Language::Cpp),
    ("cxx", Language::Cpp),
    ("hpp", Language::Cpp),
    ("hh", Language::Cpp),
    ("hxx", Language::Cpp),
];

impl Language {
    pub const ALL: [Language; 8] = [
        Language::Python,
        Language::JavaScript,
        Language::TypeScript,
        Language::Go,
        Language::Rust,
        Language::Java,
        Language::C,
        Language::Cpp,
    ];

    /// Map a bare extension (no leading dot, any case) to a language tag.
    pub fn from_extension(ext: &str) -> Option<Language> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        LANGUAGE_BY_EXTENSION
            .iter()
            .find(|(e, _)| *e == ext)
            .map(|(_, lang)| *lang)
    }

    /// Language of a path, judged by its extension only.
    pub fn from_path(path: &Path) -> Option<Language> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Language::from_extension)
    }

    /// All extensions mapped to this language.
    pub fn extensions(self) -> Vec<&'static str> {
        LANGUAGE_BY_EXTENSION
            .iter()
            .filter(|(_, lang)| *lang == self)
            .map(|(e, _)| *e)
            .collect()
    }

    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// 2. CodeElement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Function,
    /// Class, struct, interface, trait and other record-like constructs.
    Type,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementKind::Function => f.write_str("function"),
            ElementKind::Type => f.write_str("type"),
        }
    }
}

/// One extracted function-like or type-like construct.
///
/// `line_start` is the 1-based line of the defining token (the name when the
/// construct has one). Metadata is insertion-ordered so serialized output is
/// stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeElement {
    pub name: String,
    pub kind: ElementKind,
    pub line_start: usize,
    pub line_end: Option<usize>,
    pub signature: Option<String>,
    pub doc_comment: Option<String>,
    pub language: Language,
    pub metadata: IndexMap<String, Value>,
}

impl CodeElement {
    pub fn new(name: impl Into<String>, kind: ElementKind, language: Language, line_start: usize) -> Self {
        let name = name.into();
        Self {
            name: if name.is_empty() {
                "anonymous".to_string()
            } else {
                name
            },
            kind,
            line_start: line_start.max(1),
            line_end: None,
            signature: None,
            doc_comment: None,
            language,
            metadata: IndexMap::new(),
        }
    }

    pub fn set_list(&mut self, key: &str, values: Vec<String>) {
        self.metadata.insert(
            key.to_string(),
            Value::Array(values.into_iter().map(Value::String).collect()),
        );
    }

    pub fn push_to_list(&mut self, key: &str, value: impl Into<String>) {
        let entry = self
            .metadata
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = entry {
            items.push(Value::String(value.into()));
        }
    }

    pub fn set_flag(&mut self, key: &str, value: bool) {
        self.metadata.insert(key.to_string(), Value::Bool(value));
    }

    pub fn set_text(&mut self, key: &str, value: impl Into<String>) {
        self.metadata
            .insert(key.to_string(), Value::String(value.into()));
    }

    /// String items of a list-valued metadata entry, empty when absent.
    pub fn list(&self, key: &str) -> Vec<&str> {
        match self.metadata.get(key) {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn params(&self) -> Vec<&str> {
        self.list(META_PARAMS)
    }

    pub fn decorators(&self) -> Vec<&str> {
        self.list(META_DECORATORS)
    }

    pub fn methods(&self) -> Vec<&str> {
        self.list(META_METHODS)
    }

    pub fn bases(&self) -> Vec<&str> {
        self.list(META_BASES)
    }

    pub fn is_async(&self) -> bool {
        matches!(self.metadata.get(META_IS_ASYNC), Some(Value::Bool(true)))
    }
}

// ---------------------------------------------------------------------------
// 3. Imports and parse results
// ---------------------------------------------------------------------------

/// An import-like reference (`import`, `use`, `#include`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRef {
    pub target: String,
    pub line: usize,
}

/// Successful extraction of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub file: PathBuf,
    pub language: Language,
    pub elements: Vec<CodeElement>,
    pub imports: Vec<ImportRef>,
}

impl ParsedFile {
    /// A file with zero elements is a valid result, not an error.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn functions(&self) -> impl Iterator<Item = &CodeElement> {
        self.elements
            .iter()
            .filter(|e| e.kind == ElementKind::Function)
    }

    pub fn types(&self) -> impl Iterator<Item = &CodeElement> {
        self.elements.iter().filter(|e| e.kind == ElementKind::Type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseErrorKind {
    UnsupportedLanguage,
    Syntax,
    Decode,
    FileTooLarge,
    Io,
}

/// Failed extraction of one file. Never accompanied by elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseError {
    pub file: PathBuf,
    pub kind: ParseErrorKind,
    pub error: String,
}

impl ParseError {
    pub fn from_error(file: &Path, err: &DoxError) -> Self {
        let kind = match err {
            DoxError::UnsupportedLanguage(_) => ParseErrorKind::UnsupportedLanguage,
            DoxError::Syntax { .. } => ParseErrorKind::Syntax,
            DoxError::Decode(_) => ParseErrorKind::Decode,
            DoxError::FileTooLarge { .. } => ParseErrorKind::FileTooLarge,
            _ => ParseErrorKind::Io,
        };
        Self {
            file: file.to_path_buf(),
            kind,
            error: err.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.file.display(), self.error)
    }
}

/// Per-file extraction outcome: all elements or an error, never both.
pub type ParseResult = Result<ParsedFile, ParseError>;

// ---------------------------------------------------------------------------
// 4. Run statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Generate,
    Render,
    Cache,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Extract => "extract",
            Stage::Generate => "generate",
            Stage::Render => "render",
            Stage::Cache => "cache",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum FileStatus {
    Cached,
    Processed { elements: usize },
    Empty,
    Error { stage: Stage },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: PathBuf,
    pub stage: Stage,
    pub message: String,
}

/// Statistics of one pipeline run. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: usize,
    pub cached: usize,
    pub empty: usize,
    pub errors: usize,
    /// Elements extracted from processed files.
    pub elements: usize,
    pub generation_failures: usize,
    pub statuses: BTreeMap<PathBuf, FileStatus>,
    pub failures: Vec<FileError>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
}

impl RunStats {
    /// Record the final status of one file. A file is only ever recorded once
    /// per run; a repeated record replaces the earlier one and fixes counts.
    pub fn record(&mut self, path: PathBuf, status: FileStatus) {
        if let Some(previous) = self.statuses.insert(path, status) {
            self.adjust(previous, false);
        }
        self.adjust(status, true);
    }

    fn adjust(&mut self, status: FileStatus, add: bool) {
        fn bump(counter: &mut usize, add: bool) {
            if add {
                *counter += 1;
            } else {
                *counter = counter.saturating_sub(1);
            }
        }
        match status {
            FileStatus::Cached => bump(&mut self.cached, add),
            FileStatus::Empty => bump(&mut self.empty, add),
            FileStatus::Error { .. } => bump(&mut self.errors, add),
            FileStatus::Processed { elements } => {
                bump(&mut self.processed, add);
                if add {
                    self.elements += elements;
                } else {
                    self.elements = self.elements.saturating_sub(elements);
                }
            }
        }
    }

    pub fn push_failure(&mut self, path: &Path, stage: Stage, message: impl Into<String>) {
        self.failures.push(FileError {
            path: path.to_path_buf(),
            stage,
            message: message.into(),
        });
    }

    /// Put the failure list in a deterministic order regardless of worker
    /// scheduling.
    pub fn sort_failures(&mut self) {
        self.failures
            .sort_by(|a, b| a.path.cmp(&b.path).then(a.stage.cmp(&b.stage)));
    }

    pub fn status_of(&self, path: &Path) -> Option<FileStatus> {
        self.statuses.get(path).copied()
    }

    pub fn files_seen(&self) -> usize {
        self.statuses.len()
    }

    /// Human-readable run summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} files: {} processed, {} cached, {} empty, {} errors ({} elements documented, {} ms)",
            self.files_seen(),
            self.processed,
            self.cached,
            self.empty,
            self.errors,
            self.elements,
            self.elapsed_ms,
        );
        if self.generation_failures > 0 {
            out.push_str(&format!(
                "\n{} elements fell back to placeholder text",
                self.generation_failures
            ));
        }
        if self.cancelled {
            out.push_str("\nrun cancelled before all files were processed");
        }
        for failure in &self.failures {
            out.push_str(&format!(
                "\n  [{}] {}: {}",
                failure.stage,
                failure.path.display(),
                failure.message
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_extension() {
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension(".TSX"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("h"), Some(Language::C));
        assert_eq!(Language::from_extension("hpp"), Some(Language::Cpp));
        assert_eq!(Language::from_extension("rb"), None);
    }

    #[test]
    fn test_language_extensions_roundtrip() {
        for lang in Language::ALL {
            for ext in lang.extensions() {
                assert_eq!(Language::from_extension(ext), Some(lang));
            }
        }
    }

    #[test]
    fn test_unnamed_element_is_anonymous() {
        let el = CodeElement::new("", ElementKind::Function, Language::JavaScript, 0);
        assert_eq!(el.name, "anonymous");
        assert_eq!(el.line_start, 1);
    }

    #[test]
    fn test_metadata_accessors() {
        let mut el = CodeElement::new("f", ElementKind::Function, Language::Python, 3);
        el.set_list(META_PARAMS, vec!["a".into(), "b".into()]);
        el.push_to_list(META_DECORATORS, "staticmethod");
        el.set_flag(META_IS_ASYNC, true);
        assert_eq!(el.params(), vec!["a", "b"]);
        assert_eq!(el.decorators(), vec!["staticmethod"]);
        assert!(el.is_async());
        assert!(el.methods().is_empty());
    }

    #[test]
    fn test_run_stats_record_replaces() {
        let mut stats = RunStats::default();
        stats.record(PathBuf::from("a.py"), FileStatus::Processed { elements: 3 });
        stats.record(PathBuf::from("b.py"), FileStatus::Empty);
        stats.record(PathBuf::from("a.py"), FileStatus::Error { stage: Stage::Render });
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.elements, 0);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.files_seen(), 2);
    }

    #[test]
    fn test_summary_lists_failures() {
        let mut stats = RunStats::default();
        stats.record(PathBuf::from("bad.py"), FileStatus::Error { stage: Stage::Extract });
        stats.push_failure(Path::new("bad.py"), Stage::Extract, "syntax error");
        let summary = stats.summary();
        assert!(summary.contains("1 errors"));
        assert!(summary.contains("[extract] bad.py: syntax error"));
    }
}
