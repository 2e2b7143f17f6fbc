//! Pipeline orchestration with Rayon-based parallelism.
//!
//! One run discovers the candidate files once, then processes each file on a
//! bounded worker pool: fingerprint, cache check, extraction, generation,
//! rendering and finally `mark_processed`. Every per-file failure is recorded
//! in the returned [`RunStats`]; only an unreadable source root aborts a run.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::prelude::*;

use crate::config::DoxConfig;
use crate::errors::DoxResult;
use crate::generate::{self, fallback_doc, DocGenerator, Generation};
use crate::indexer::filesystem::{content_hash, FileDiscovery};
use crate::indexer::parser::StructuralParser;
use crate::indexer::symbols::module_name;
use crate::models::{FileStatus, RunStats, Stage};
use crate::render::{MkDocsRenderer, ModulePage, SiteRenderer};
use crate::store::cache::IncrementalCache;

pub struct Pipeline {
    config: DoxConfig,
    discovery: FileDiscovery,
    parser: StructuralParser,
    generator: Box<dyn DocGenerator>,
    renderer: Mutex<Box<dyn SiteRenderer>>,
    cancel: Arc<AtomicBool>,
}

/// Per-run state shared by all workers.
struct RunContext<'a> {
    source: &'a Path,
    cache: &'a IncrementalCache,
    incremental: bool,
}

/// Outcome of one file, merged into [`RunStats`] after the pool finishes.
struct FileReport {
    path: PathBuf,
    status: FileStatus,
    failures: Vec<(Stage, String)>,
    generation_failures: usize,
}

impl FileReport {
    fn new(path: PathBuf, status: FileStatus) -> Self {
        Self {
            path,
            status,
            failures: Vec::new(),
            generation_failures: 0,
        }
    }

    fn error(path: PathBuf, stage: Stage, message: impl Into<String>) -> Self {
        let mut report = Self::new(path, FileStatus::Error { stage });
        report.failures.push((stage, message.into()));
        report
    }
}

impl Pipeline {
    pub fn new(
        config: DoxConfig,
        generator: Box<dyn DocGenerator>,
        renderer: Box<dyn SiteRenderer>,
    ) -> Self {
        Self {
            discovery: FileDiscovery::new(&config.discovery),
            parser: StructuralParser::new(&config.parser),
            generator,
            renderer: Mutex::new(renderer),
            cancel: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Pipeline with the configured generator and an MkDocs site under
    /// `output`. The site is named after `source` unless configured.
    pub fn for_site(config: DoxConfig, source: &Path, output: &Path) -> DoxResult<Self> {
        let generator = generate::from_config(&config.generator)?;
        let site_name = config.output.site_name.clone().unwrap_or_else(|| {
            source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Documentation".to_string())
        });
        let renderer = MkDocsRenderer::new(output, site_name, config.output.theme.clone());
        Ok(Self::new(config, generator, Box::new(renderer)))
    }

    /// Raising this flag stops the run between files. Files already in
    /// flight complete normally.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &DoxConfig {
        &self.config
    }

    /// Document up to `max_files` files under `source` into `output`.
    ///
    /// With `incremental = false` every file is processed, but the cache is
    /// still updated for the next incremental run.
    pub fn run(
        &self,
        source: &Path,
        output: &Path,
        max_files: usize,
        incremental: bool,
    ) -> DoxResult<RunStats> {
        let started = Instant::now();
        let files = self.discovery.discover(source, max_files)?;
        let cache = IncrementalCache::open(&self.config.cache, source, output);
        tracing::info!(
            source = %source.display(),
            files = files.len(),
            incremental,
            persistent_cache = cache.is_persistent(),
            "run started"
        );

        let run = RunContext {
            source,
            cache: &cache,
            incremental,
        };
        // A single worker processes files in discovery order on this thread.
        let workers = self.config.pipeline.workers.max(1);
        let pool = if workers > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => Some(pool),
                Err(e) => {
                    tracing::warn!(error = %e, "worker pool unavailable, processing sequentially");
                    None
                }
            }
        } else {
            None
        };
        let reports: Vec<Option<FileReport>> = match pool {
            Some(pool) => pool.install(|| {
                files
                    .par_iter()
                    .map(|path| self.process_file(&run, path))
                    .collect()
            }),
            None => files.iter().map(|path| self.process_file(&run, path)).collect(),
        };

        let mut stats = RunStats::default();
        for report in &reports {
            let Some(report) = report else {
                stats.cancelled = true;
                continue;
            };
            stats.record(report.path.clone(), report.status);
            stats.generation_failures += report.generation_failures;
            for (stage, message) in &report.failures {
                stats.push_failure(&report.path, *stage, message.clone());
            }
        }

        if let Err(e) = self.renderer.lock().finalize() {
            tracing::warn!(error = %e, "site finalization failed");
            stats.push_failure(output, Stage::Render, e.to_string());
        }

        stats.sort_failures();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            processed = stats.processed,
            cached = stats.cached,
            empty = stats.empty,
            errors = stats.errors,
            cancelled = stats.cancelled,
            elapsed_ms = stats.elapsed_ms,
            "run finished"
        );
        Ok(stats)
    }

    /// `None` when the run was cancelled before this file started.
    fn process_file(&self, run: &RunContext, path: &Path) -> Option<FileReport> {
        if self.cancel.load(Ordering::SeqCst) {
            return None;
        }
        let rel = path.strip_prefix(run.source).unwrap_or(path).to_path_buf();

        let bytes = match self.parser.read_source(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::info!(file = %rel.display(), error = %e, "skipping file");
                return Some(FileReport::error(rel, Stage::Extract, e.to_string()));
            }
        };
        // Fingerprint of exactly the bytes that get extracted.
        let fingerprint = content_hash(&bytes);
        if run.incremental && !run.cache.needs_update_with(path, &fingerprint) {
            tracing::debug!(file = %rel.display(), "cache hit");
            let mut report = FileReport::new(rel, FileStatus::Cached);
            let has_page = run.cache.entry(path).is_some_and(|entry| entry.has_artifact);
            if has_page {
                let name = module_name(path, run.source);
                if let Err(e) = self.renderer.lock().register_existing(&name, &report.path) {
                    report.failures.push((Stage::Render, e.to_string()));
                }
            }
            return Some(report);
        }

        let parsed = match self.parser.extract_bytes(path, &bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::info!(file = %rel.display(), error = %e.error, "skipping file");
                return Some(FileReport::error(rel, Stage::Extract, e.error));
            }
        };
        if parsed.is_empty() {
            let mut report = FileReport::new(rel, FileStatus::Empty);
            if let Err(e) = run.cache.mark_empty_as(path, &fingerprint) {
                report.failures.push((Stage::Cache, e.to_string()));
            }
            return Some(report);
        }

        let mut elements = parsed.elements;
        let limit = self.config.generator.max_elements_per_file;
        if limit > 0 && elements.len() > limit {
            elements.truncate(limit);
        }

        let mut failures = Vec::new();
        let mut generation_failures = 0;
        let docs: Vec<String> = elements
            .iter()
            .map(|element| match self.generator.generate_doc(element) {
                Generation::Ok(text) => text,
                Generation::Failed(reason) => {
                    tracing::warn!(
                        file = %rel.display(),
                        element = %element.name,
                        generator = self.generator.name(),
                        %reason,
                        "generation failed, using fallback text"
                    );
                    generation_failures += 1;
                    failures.push((Stage::Generate, format!("{}: {reason}", element.name)));
                    fallback_doc(element)
                }
            })
            .collect();

        let page = ModulePage {
            name: module_name(path, run.source),
            path: rel.clone(),
            elements,
            docs,
        };
        let rendered = self.renderer.lock().add_module(&page);

        let mut report = FileReport::new(
            rel,
            FileStatus::Processed {
                elements: page.elements.len(),
            },
        );
        report.generation_failures = generation_failures;
        report.failures = failures;

        if let Err(e) = rendered {
            report.status = FileStatus::Error {
                stage: Stage::Render,
            };
            report.failures.push((Stage::Render, e.to_string()));
            return Some(report);
        }
        if generation_failures == 0 {
            if let Err(e) = run.cache.mark_processed_as(path, &fingerprint) {
                report.failures.push((Stage::Cache, e.to_string()));
            }
        }
        Some(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DoxError;
    use crate::generate::TemplateGenerator;
    use crate::models::CodeElement;
    use std::fs;

    struct FailingGenerator;

    impl DocGenerator for FailingGenerator {
        fn name(&self) -> &str {
            "failing"
        }

        fn generate_doc(&self, _element: &CodeElement) -> Generation {
            Generation::Failed("timed out".to_string())
        }
    }

    /// Records pages; optionally rejects every page.
    struct RecordingRenderer {
        pages: Arc<Mutex<Vec<ModulePage>>>,
        finalized: Arc<AtomicBool>,
        reject: bool,
    }

    impl SiteRenderer for RecordingRenderer {
        fn add_module(&mut self, page: &ModulePage) -> DoxResult<()> {
            if self.reject {
                return Err(DoxError::Render("disk full".to_string()));
            }
            self.pages.lock().push(page.clone());
            Ok(())
        }

        fn register_existing(&mut self, _name: &str, _path: &Path) -> DoxResult<()> {
            Ok(())
        }

        fn finalize(&mut self) -> DoxResult<()> {
            self.finalized.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn recording(
        reject: bool,
    ) -> (Box<dyn SiteRenderer>, Arc<Mutex<Vec<ModulePage>>>, Arc<AtomicBool>) {
        let pages = Arc::new(Mutex::new(Vec::new()));
        let finalized = Arc::new(AtomicBool::new(false));
        let renderer = RecordingRenderer {
            pages: Arc::clone(&pages),
            finalized: Arc::clone(&finalized),
            reject,
        };
        (Box::new(renderer), pages, finalized)
    }

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/calc.py"),
            "def add(a, b):\n    return a + b\n\n\ndef sub(a, b):\n    return a - b\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_generation_failure_uses_fallback_and_skips_cache() {
        let dir = project();
        let out = dir.path().join("site");
        let (renderer, pages, finalized) = recording(false);
        let pipeline = Pipeline::new(DoxConfig::default(), Box::new(FailingGenerator), renderer);

        let stats = pipeline.run(dir.path(), &out, 10, true).unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.generation_failures, 2);
        assert_eq!(stats.failures.len(), 2);
        assert!(stats.failures.iter().all(|f| f.stage == Stage::Generate));
        assert!(finalized.load(Ordering::SeqCst));

        let pages = pages.lock();
        assert_eq!(pages[0].name, "src.calc.py");
        assert!(pages[0].docs[0].contains("could not be generated"));

        let cache = IncrementalCache::open(&DoxConfig::default().cache, dir.path(), &out);
        assert_eq!(cache.tracked_count(), 0);
    }

    #[test]
    fn test_render_failure_is_recorded_not_fatal() {
        let dir = project();
        let out = dir.path().join("site");
        let (renderer, _, _) = recording(true);
        let pipeline = Pipeline::new(DoxConfig::default(), Box::new(TemplateGenerator), renderer);

        let stats = pipeline.run(dir.path(), &out, 10, true).unwrap();
        assert_eq!(stats.errors, 1);
        assert_eq!(
            stats.status_of(Path::new("src/calc.py")),
            Some(FileStatus::Error { stage: Stage::Render })
        );
        assert_eq!(stats.failures[0].message, "Render error: disk full");
    }

    #[test]
    fn test_max_elements_per_file_limits_pages() {
        let dir = project();
        let mut config = DoxConfig::default();
        config.generator.max_elements_per_file = 1;
        let (renderer, pages, _) = recording(false);
        let pipeline = Pipeline::new(config, Box::new(TemplateGenerator), renderer);

        let stats = pipeline
            .run(dir.path(), &dir.path().join("site"), 10, false)
            .unwrap();
        assert_eq!(stats.elements, 1);
        assert_eq!(pages.lock()[0].elements[0].name, "add");
    }

    #[test]
    fn test_oversized_file_is_rejected_before_extraction() {
        let dir = project();
        let mut config = DoxConfig::default();
        config.parser.max_file_size = 8;
        let (renderer, pages, _) = recording(false);
        let pipeline = Pipeline::new(config, Box::new(TemplateGenerator), renderer);

        let stats = pipeline.run(dir.path(), &dir.path().join("site"), 10, true).unwrap();
        assert_eq!(
            stats.status_of(Path::new("src/calc.py")),
            Some(FileStatus::Error { stage: Stage::Extract })
        );
        assert!(stats.failures[0].message.starts_with("file too large"));
        assert!(pages.lock().is_empty());
    }

    #[test]
    fn test_unreadable_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let (renderer, _, finalized) = recording(false);
        let pipeline = Pipeline::new(DoxConfig::default(), Box::new(TemplateGenerator), renderer);
        let err = pipeline
            .run(&dir.path().join("missing"), &dir.path().join("site"), 10, true)
            .unwrap_err();
        assert!(matches!(err, DoxError::DiscoveryRoot { .. }));
        assert!(!finalized.load(Ordering::SeqCst));
    }
}
