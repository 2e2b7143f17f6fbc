//! Site rendering: module pages plus the navigation artifacts emitted once
//! at the end of a run.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::errors::{DoxError, DoxResult};
use crate::indexer::symbols::page_stem;
use crate::models::{CodeElement, META_RECEIVER, META_SCOPE};

/// Everything the renderer needs to write one module page. `docs[i]` is the
/// generated text for `elements[i]`.
#[derive(Debug, Clone)]
pub struct ModulePage {
    /// Dotted module name, e.g. `app.api.routes.py`.
    pub name: String,
    /// Source path relative to the source root.
    pub path: PathBuf,
    pub elements: Vec<CodeElement>,
    pub docs: Vec<String>,
}

pub trait SiteRenderer: Send {
    fn add_module(&mut self, page: &ModulePage) -> DoxResult<()>;

    /// A module whose page from an earlier run is still current. It is not
    /// rewritten but stays in the site navigation.
    fn register_existing(&mut self, name: &str, path: &Path) -> DoxResult<()>;

    /// Called exactly once after every module has been added.
    fn finalize(&mut self) -> DoxResult<()>;
}

// ---------------------------------------------------------------------------
// MkDocs
// ---------------------------------------------------------------------------

/// Writes a MkDocs project: one page per module under `docs/api/`, laid out
/// like the source tree, then `docs/index.md` and `mkdocs.yml` on finalize.
#[derive(Debug)]
pub struct MkDocsRenderer {
    output: PathBuf,
    site_name: String,
    theme: String,
    /// page path relative to `docs/` -> module name
    modules: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct MkDocsConfig<'a> {
    site_name: &'a str,
    theme: Theme<'a>,
    nav: Vec<IndexMap<String, NavEntry>>,
}

#[derive(Serialize)]
struct Theme<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(untagged)]
enum NavEntry {
    Page(String),
    Section(Vec<IndexMap<String, NavEntry>>),
}

impl MkDocsRenderer {
    pub fn new(output: &Path, site_name: impl Into<String>, theme: impl Into<String>) -> Self {
        Self {
            output: output.to_path_buf(),
            site_name: site_name.into(),
            theme: theme.into(),
            modules: BTreeMap::new(),
        }
    }

    pub fn docs_dir(&self) -> PathBuf {
        self.output.join("docs")
    }

    /// Modules known so far, in page order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.values().map(String::as_str)
    }

    fn nav(&self) -> Vec<IndexMap<String, NavEntry>> {
        let mut home = IndexMap::new();
        home.insert("Home".to_string(), NavEntry::Page("index.md".to_string()));
        let mut nav = vec![home];

        if !self.modules.is_empty() {
            let pages = self
                .modules
                .iter()
                .map(|(page, name)| {
                    let mut entry = IndexMap::new();
                    entry.insert(name.clone(), NavEntry::Page(page.clone()));
                    entry
                })
                .collect();
            let mut api = IndexMap::new();
            api.insert("API Reference".to_string(), NavEntry::Section(pages));
            nav.push(api);
        }
        nav
    }

    fn index_page(&self) -> String {
        let mut md = format!("# {}\n\nDocumentation for {}.\n", self.site_name, self.site_name);
        if !self.modules.is_empty() {
            md.push_str("\n## Modules\n\n");
            for (page, name) in &self.modules {
                let _ = writeln!(md, "- [{name}]({page})");
            }
        }
        md
    }
}

impl SiteRenderer for MkDocsRenderer {
    fn add_module(&mut self, page: &ModulePage) -> DoxResult<()> {
        let relative = page_path(&page.path);
        write_file(&self.docs_dir().join(&relative), &module_markdown(page))?;
        tracing::debug!(module = %page.name, elements = page.elements.len(), "module page written");
        self.modules.insert(relative, page.name.clone());
        Ok(())
    }

    fn register_existing(&mut self, name: &str, path: &Path) -> DoxResult<()> {
        self.modules.insert(page_path(path), name.to_string());
        Ok(())
    }

    fn finalize(&mut self) -> DoxResult<()> {
        write_file(&self.docs_dir().join("index.md"), &self.index_page())?;

        let config = MkDocsConfig {
            site_name: &self.site_name,
            theme: Theme { name: &self.theme },
            nav: self.nav(),
        };
        let yaml = serde_yaml::to_string(&config)?;
        write_file(&self.output.join("mkdocs.yml"), &yaml)?;

        tracing::info!(
            output = %self.output.display(),
            modules = self.modules.len(),
            "site finalized"
        );
        Ok(())
    }
}

/// Page of the source file at `source` (relative to the source root), relative
/// to `docs/`: `src/app/api.py` is documented at `api/src/app/api.py.md`.
pub fn page_path(source: &Path) -> String {
    format!("api/{}.md", page_stem(source, Path::new("")))
}

/// Markdown for one module page.
pub fn module_markdown(page: &ModulePage) -> String {
    let mut md = format!("# {}\n\nSource: `{}`\n", page.name, page.path.display());

    for (i, element) in page.elements.iter().enumerate() {
        md.push('\n');
        let _ = writeln!(md, "## `{}`\n", element.name);

        let location = match element.line_end {
            Some(end) if end > element.line_start => {
                format!("lines {}-{}", element.line_start, end)
            }
            _ => format!("line {}", element.line_start),
        };
        let async_marker = if element.is_async() { "async " } else { "" };
        let _ = writeln!(md, "*{async_marker}{}*, {location}\n", element.kind);

        if let Some(signature) = &element.signature {
            let _ = writeln!(md, "```{}\n{signature}\n```\n", element.language);
        }

        if let Some(doc) = page.docs.get(i).filter(|d| !d.trim().is_empty()) {
            let _ = writeln!(md, "{}\n", doc.trim_end());
        }

        if let Some(comment) = &element.doc_comment {
            md.push_str("**Source comment:**\n\n");
            for line in comment.lines() {
                if line.is_empty() {
                    md.push_str(">\n");
                } else {
                    let _ = writeln!(md, "> {line}");
                }
            }
            md.push('\n');
        }

        for (label, values) in [
            ("Parameters", element.params()),
            ("Decorators", element.decorators()),
            ("Bases", element.bases()),
            ("Methods", element.methods()),
        ] {
            if !values.is_empty() {
                let listed: Vec<String> = values.iter().map(|v| format!("`{v}`")).collect();
                let _ = writeln!(md, "- **{label}:** {}", listed.join(", "));
            }
        }
        for (label, key) in [("Receiver", META_RECEIVER), ("Scope", META_SCOPE)] {
            if let Some(value) = element.metadata.get(key).and_then(|v| v.as_str()) {
                let _ = writeln!(md, "- **{label}:** `{value}`");
            }
        }
    }
    md
}

fn write_file(path: &Path, content: &str) -> DoxResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DoxError::Render(format!("cannot create {}: {e}", parent.display())))?;
    }
    std::fs::write(path, content)
        .map_err(|e| DoxError::Render(format!("cannot write {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ElementKind, Language, META_BASES, META_PARAMS};
    use std::fs;

    fn page() -> ModulePage {
        let mut add = CodeElement::new("add", ElementKind::Function, Language::Python, 3);
        add.line_end = Some(5);
        add.signature = Some("def add(a, b)".to_string());
        add.doc_comment = Some("Add two numbers.\n\nReturns the sum.".to_string());
        add.set_list(META_PARAMS, vec!["a".into(), "b".into()]);

        let mut shape = CodeElement::new("Circle", ElementKind::Type, Language::Python, 8);
        shape.set_list(META_BASES, vec!["Shape".into()]);

        ModulePage {
            name: "pkg.calc".to_string(),
            path: PathBuf::from("pkg/calc.py"),
            elements: vec![add, shape],
            docs: vec!["Adds things.".to_string(), "A circle.".to_string()],
        }
    }

    #[test]
    fn test_module_markdown_layout() {
        let md = module_markdown(&page());
        assert!(md.starts_with("# pkg.calc\n\nSource: `pkg/calc.py`\n"));
        assert!(md.contains("## `add`\n\n*function*, lines 3-5\n"));
        assert!(md.contains("```python\ndef add(a, b)\n```"));
        assert!(md.contains("Adds things."));
        assert!(md.contains("> Add two numbers.\n>\n> Returns the sum."));
        assert!(md.contains("- **Parameters:** `a`, `b`"));
        assert!(md.contains("*type*, line 8"));
        assert!(md.contains("- **Bases:** `Shape`"));
    }

    #[test]
    fn test_add_module_writes_page() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = MkDocsRenderer::new(dir.path(), "demo", "material");
        renderer.add_module(&page()).unwrap();
        let written = fs::read_to_string(dir.path().join("docs/api/pkg/calc.py.md")).unwrap();
        assert!(written.contains("## `Circle`"));
        assert_eq!(renderer.module_names().collect::<Vec<_>>(), vec!["pkg.calc"]);
    }

    #[test]
    fn test_finalize_writes_sorted_nav() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = MkDocsRenderer::new(dir.path(), "demo", "readthedocs");
        let mut second = page();
        second.name = "zeta.py".to_string();
        second.path = PathBuf::from("zeta.py");
        renderer.add_module(&second).unwrap();
        renderer.add_module(&page()).unwrap();
        renderer.finalize().unwrap();

        let yaml = fs::read_to_string(dir.path().join("mkdocs.yml")).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(value["site_name"].as_str(), Some("demo"));
        assert_eq!(value["theme"]["name"].as_str(), Some("readthedocs"));
        let api = &value["nav"][1]["API Reference"];
        assert_eq!(api[0]["pkg.calc"].as_str(), Some("api/pkg/calc.py.md"));
        assert_eq!(api[1]["zeta.py"].as_str(), Some("api/zeta.py.md"));

        let index = fs::read_to_string(dir.path().join("docs/index.md")).unwrap();
        assert!(index.starts_with("# demo"));
        assert!(index.contains("- [pkg.calc](api/pkg/calc.py.md)"));
    }

    #[test]
    fn test_same_stem_modules_get_separate_pages() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = MkDocsRenderer::new(dir.path(), "demo", "material");
        let mut source = page();
        source.name = "util.c".to_string();
        source.path = PathBuf::from("util.c");
        source.elements.truncate(1);
        let mut header = page();
        header.name = "util.h".to_string();
        header.path = PathBuf::from("util.h");
        header.elements.remove(0);
        renderer.add_module(&source).unwrap();
        renderer.add_module(&header).unwrap();

        let c_page = fs::read_to_string(dir.path().join("docs/api/util.c.md")).unwrap();
        let h_page = fs::read_to_string(dir.path().join("docs/api/util.h.md")).unwrap();
        assert!(c_page.contains("## `add`"));
        assert!(h_page.contains("## `Circle`"));
        assert_eq!(renderer.module_names().collect::<Vec<_>>(), vec!["util.c", "util.h"]);
    }

    #[test]
    fn test_registered_modules_stay_in_nav() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = MkDocsRenderer::new(dir.path(), "demo", "material");
        renderer
            .register_existing("pkg.calc.py", Path::new("pkg/calc.py"))
            .unwrap();
        renderer.finalize().unwrap();

        assert!(!dir.path().join("docs/api/pkg/calc.py.md").exists());
        let yaml = fs::read_to_string(dir.path().join("mkdocs.yml")).unwrap();
        let value: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            value["nav"][1]["API Reference"][0]["pkg.calc.py"].as_str(),
            Some("api/pkg/calc.py.md")
        );
        let index = fs::read_to_string(dir.path().join("docs/index.md")).unwrap();
        assert!(index.contains("## Modules"));
    }

    #[test]
    fn test_finalize_without_modules() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = MkDocsRenderer::new(dir.path(), "empty", "material");
        renderer.finalize().unwrap();
        let yaml = fs::read_to_string(dir.path().join("mkdocs.yml")).unwrap();
        assert!(!yaml.contains("API Reference"));
        assert!(dir.path().join("docs/index.md").is_file());
    }
}
