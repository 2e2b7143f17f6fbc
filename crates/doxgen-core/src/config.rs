//! Run configuration.
//!
//! A `DoxConfig` value is built once (defaults, or `.doxgen.yml` in the source
//! root) and handed explicitly to discovery, the parser, the cache and the
//! pipeline.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DoxError, DoxResult};

/// File name looked up in the source root when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = ".doxgen.yml";

const DEFAULT_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "java", "cpp", "c", "h", "hpp", "go", "rs", "rb", "php",
];

const DEFAULT_IGNORED_SEGMENTS: &[&str] = &[
    "__pycache__",
    "node_modules",
    ".git",
    "venv",
    ".venv",
    "dist",
    "build",
    ".pytest_cache",
    ".mypy_cache",
    "target",
    ".doxgen",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DoxConfig {
    pub discovery: DiscoveryConfig,
    pub parser: ParserConfig,
    pub generator: GeneratorConfig,
    pub output: OutputConfig,
    pub pipeline: PipelineConfig,
    pub cache: CacheConfig,
}

impl DoxConfig {
    /// Load configuration from the given YAML file.
    pub fn load(path: &Path) -> DoxResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DoxError::Config(format!("cannot read {}: {e}", path.display())))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&content)
            .map_err(|e| DoxError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Resolve the configuration for a source root: an explicit file wins,
    /// then `<root>/.doxgen.yml`, then defaults.
    pub fn resolve(source_root: &Path, explicit: Option<&Path>) -> DoxResult<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate = source_root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            tracing::debug!(path = %candidate.display(), "loading project config");
            Self::load(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}

/// Discovery allow-set and ignore rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Extensions without the leading dot.
    pub allowed_extensions: BTreeSet<String>,
    /// A path is skipped when any of its components equals one of these.
    pub ignored_path_segments: BTreeSet<String>,
    pub max_files: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            ignored_path_segments: DEFAULT_IGNORED_SEGMENTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_files: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Files above this many bytes are rejected before parsing.
    pub max_file_size: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_file_size: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    Template,
    Ollama,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub backend: GeneratorBackend,
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Only the first N elements of a file are documented; 0 means all.
    pub max_elements_per_file: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::Template,
            model: "deepseek-coder:1.3b".to_string(),
            base_url: "http://localhost:11434".to_string(),
            max_tokens: 200,
            timeout_secs: 60,
            max_elements_per_file: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Defaults to the source directory name when unset.
    pub site_name: Option<String>,
    pub theme: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            site_name: None,
            theme: "material".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir_name: String,
    pub file_name: String,
}

impl CacheConfig {
    pub fn store_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.dir_name).join(&self.file_name)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir_name: ".doxgen".to_string(),
            file_name: "cache.db".to_string(),
        }
    }
}
