//! doxgen-core: source discovery, structural extraction, incremental caching
//! and documentation site generation.

pub mod config;
pub mod errors;
pub mod generate;
pub mod indexer;
pub mod models;
pub mod render;
pub mod store;

pub use config::DoxConfig;
pub use errors::{DoxError, DoxResult};
pub use generate::{DocGenerator, Generation};
pub use indexer::pipeline::Pipeline;
pub use models::{CodeElement, ElementKind, Language, ParseResult, RunStats};
pub use render::{ModulePage, SiteRenderer};
