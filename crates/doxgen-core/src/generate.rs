//! Documentation text generation.
//!
//! The pipeline only sees [`DocGenerator`]: one call per element, answered
//! with an explicit [`Generation`] outcome. Failures never escape as errors;
//! the pipeline substitutes [`fallback_doc`] and moves on.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::config::{GeneratorBackend, GeneratorConfig};
use crate::errors::{DoxError, DoxResult};
use crate::models::{CodeElement, ElementKind, Language};

/// Outcome of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Generation {
    Ok(String),
    Failed(String),
}

pub trait DocGenerator: Send + Sync {
    fn name(&self) -> &str;

    fn generate_doc(&self, element: &CodeElement) -> Generation;
}

/// Build the generator selected by the configuration.
pub fn from_config(config: &GeneratorConfig) -> DoxResult<Box<dyn DocGenerator>> {
    match config.backend {
        GeneratorBackend::Template => Ok(Box::new(TemplateGenerator)),
        GeneratorBackend::Ollama => Ok(Box::new(OllamaGenerator::new(config)?)),
    }
}

/// Deterministic text used when generation fails.
pub fn fallback_doc(element: &CodeElement) -> String {
    format!(
        "Documentation for {} `{}` (line {}) could not be generated.",
        element.kind, element.name, element.line_start
    )
}

// ---------------------------------------------------------------------------
// Template generator
// ---------------------------------------------------------------------------

/// Offline generator producing language-flavoured boilerplate from the
/// element's name and parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

impl DocGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    fn generate_doc(&self, element: &CodeElement) -> Generation {
        Generation::Ok(match element.kind {
            ElementKind::Type => type_template(element),
            ElementKind::Function => function_template(element),
        })
    }
}

fn function_template(element: &CodeElement) -> String {
    let params = element.params();
    let name = &element.name;
    match element.language {
        Language::JavaScript | Language::TypeScript => {
            let mut doc = String::from("Processes data and returns a result.\n");
            if params.is_empty() {
                doc.push_str("\n@returns {any} Processed result");
            } else {
                doc.push('\n');
                for p in &params {
                    doc.push_str(&format!("@param {p} - Input parameter\n"));
                }
                doc.push_str("@returns {any} Processed result");
            }
            doc
        }
        Language::Python => {
            let args = if params.is_empty() {
                "    None".to_string()
            } else {
                params
                    .iter()
                    .map(|p| format!("    {p}: Input parameter."))
                    .collect::<Vec<_>>()
                    .join("\n")
            };
            format!(
                "Performs operations on the given inputs.\n\nArgs:\n{args}\n\nReturns:\n    Processed result or None."
            )
        }
        Language::Go => format!(
            "{name} performs the required operation.\nTakes {} parameters and returns a result.",
            params.len()
        ),
        _ => format!(
            "Function {name} with {} parameters.\nPerforms the required operation and returns a result.",
            params.len()
        ),
    }
}

fn type_template(element: &CodeElement) -> String {
    let mut doc = format!("`{}` type.", element.name);
    let bases = element.bases();
    if !bases.is_empty() {
        doc.push_str(&format!(" Extends {}.", bases.join(", ")));
    }
    let methods = element.methods();
    if !methods.is_empty() {
        doc.push_str(&format!(" Provides {} methods.", methods.len()));
    }
    doc
}

// ---------------------------------------------------------------------------
// Ollama generator
// ---------------------------------------------------------------------------

/// Generator backed by a local Ollama server's `/api/generate` endpoint.
pub struct OllamaGenerator {
    base_url: String,
    model: String,
    max_tokens: u32,
    client: reqwest::blocking::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GeneratorConfig) -> DoxResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| DoxError::Generation(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn request(&self, prompt: &str) -> DoxResult<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "num_predict": self.max_tokens },
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| DoxError::Generation(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(DoxError::Generation(format!(
                "Ollama returned status {}",
                response.status()
            )));
        }

        let json: serde_json::Value = response
            .json()
            .map_err(|e| DoxError::Generation(format!("Ollama response parse error: {e}")))?;

        json.get("response")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| DoxError::Generation("missing 'response' field".into()))
    }
}

impl DocGenerator for OllamaGenerator {
    fn name(&self) -> &str {
        "ollama"
    }

    fn generate_doc(&self, element: &CodeElement) -> Generation {
        match self.request(&build_prompt(element)) {
            Ok(raw) => {
                let cleaned = clean_response(&raw);
                if cleaned.is_empty() {
                    Generation::Failed("empty response".to_string())
                } else {
                    Generation::Ok(cleaned)
                }
            }
            Err(e) => Generation::Failed(e.to_string()),
        }
    }
}

pub fn build_prompt(element: &CodeElement) -> String {
    let what = match element.kind {
        ElementKind::Function => "function",
        ElementKind::Type => "type",
    };
    let mut prompt = format!(
        "Write concise {} documentation for the {what} '{}'",
        element.language, element.name
    );
    if let Some(sig) = &element.signature {
        prompt.push_str(&format!(" with signature `{sig}`"));
    }
    let params = element.params();
    if !params.is_empty() {
        prompt.push_str(&format!(" and parameters [{}]", params.join(", ")));
    }
    prompt.push_str(".\nMaximum 3 sentences for the description.\n");
    if let Some(doc) = &element.doc_comment {
        prompt.push_str(&format!("Existing comment:\n{doc}\n"));
    }
    prompt.push_str("Generate the documentation text only (no code, no definition):\n");
    prompt
}

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*```[\w+-]*\s*$").expect("valid regex"));

static DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:async\s+)?(?:def|function|func|fn|class|pub\s+fn)\s+\w")
        .expect("valid regex")
});

/// Strip markdown fences, docstring quotes and any echoed definition from a
/// model response.
pub fn clean_response(raw: &str) -> String {
    let without_fences = FENCE_RE.replace_all(raw, "");
    let mut text: &str = &without_fences;

    if let Some(start) = text.find("\"\"\"") {
        let after = &text[start + 3..];
        text = match after.find("\"\"\"") {
            Some(end) => &after[..end],
            None => after,
        };
    }
    if let Some(m) = DEFINITION_RE.find(text) {
        text = &text[..m.start()];
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::META_PARAMS;

    fn function(name: &str, language: Language, params: &[&str]) -> CodeElement {
        let mut el = CodeElement::new(name, ElementKind::Function, language, 1);
        el.set_list(META_PARAMS, params.iter().map(|p| p.to_string()).collect());
        el
    }

    #[test]
    fn test_template_is_deterministic_and_language_aware() {
        let py = function("add", Language::Python, &["a", "b"]);
        let first = TemplateGenerator.generate_doc(&py);
        assert_eq!(first, TemplateGenerator.generate_doc(&py));
        match first {
            Generation::Ok(text) => {
                assert!(text.contains("Args:"));
                assert!(text.contains("    a: Input parameter."));
            }
            Generation::Failed(reason) => panic!("template failed: {reason}"),
        }

        let go = function("Serve", Language::Go, &["ctx"]);
        assert_eq!(
            TemplateGenerator.generate_doc(&go),
            Generation::Ok(
                "Serve performs the required operation.\nTakes 1 parameters and returns a result."
                    .to_string()
            )
        );
    }

    #[test]
    fn test_fallback_names_element() {
        let el = function("parse", Language::Rust, &[]);
        assert_eq!(
            fallback_doc(&el),
            "Documentation for function `parse` (line 1) could not be generated."
        );
    }

    #[test]
    fn test_clean_response_strips_quotes_and_definitions() {
        let raw = "```python\n\"\"\"\nAdds two numbers.\n\nArgs:\n    a: first\n\"\"\"\ndef add(a, b):\n```";
        assert_eq!(clean_response(raw), "Adds two numbers.\n\nArgs:\n    a: first");
        assert_eq!(clean_response("Returns x.\nfunction x() {}"), "Returns x.");
        assert_eq!(clean_response("   \n"), "");
    }

    #[test]
    fn test_prompt_mentions_signature_and_params() {
        let mut el = function("add", Language::Python, &["a", "b"]);
        el.signature = Some("add(a, b)".to_string());
        let prompt = build_prompt(&el);
        assert!(prompt.contains("python documentation for the function 'add'"));
        assert!(prompt.contains("`add(a, b)`"));
        assert!(prompt.contains("[a, b]"));
    }

    #[test]
    fn test_unreachable_server_is_a_failed_generation() {
        let config = GeneratorConfig {
            backend: GeneratorBackend::Ollama,
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 2,
            ..GeneratorConfig::default()
        };
        let generator = OllamaGenerator::new(&config).unwrap();
        let el = function("add", Language::Python, &[]);
        assert!(matches!(generator.generate_doc(&el), Generation::Failed(_)));
    }

    #[test]
    fn test_from_config_selects_backend() {
        let template = from_config(&GeneratorConfig::default()).unwrap();
        assert_eq!(template.name(), "template");
        let ollama = from_config(&GeneratorConfig {
            backend: GeneratorBackend::Ollama,
            ..GeneratorConfig::default()
        })
        .unwrap();
        assert_eq!(ollama.name(), "ollama");
    }
}
