//! Per-language structural extractors.
//!
//! The language set is closed: every `Language` variant maps to exactly one
//! grammar and one extraction function. Adding a language means adding a
//! variant, a grammar arm and an `extract` arm here.

pub mod c_family;
pub mod go;
pub mod java;
pub mod javascript;
pub mod python;
pub mod rust;

use tree_sitter::Tree;

use crate::models::{CodeElement, ImportRef, Language};

/// Elements (in source order) and imports found in one syntax tree.
#[derive(Debug, Default)]
pub struct Extraction {
    pub elements: Vec<CodeElement>,
    pub imports: Vec<ImportRef>,
}

/// Grammar for a language; `ext` selects the TSX dialect for `.tsx` files.
pub fn grammar(language: Language, ext: &str) -> tree_sitter::Language {
    match language {
        Language::Python => tree_sitter_python::LANGUAGE.into(),
        Language::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        Language::TypeScript if ext.eq_ignore_ascii_case("tsx") => {
            tree_sitter_typescript::LANGUAGE_TSX.into()
        }
        Language::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        Language::Go => tree_sitter_go::LANGUAGE.into(),
        Language::Rust => tree_sitter_rust::LANGUAGE.into(),
        Language::Java => tree_sitter_java::LANGUAGE.into(),
        Language::C => tree_sitter_c::LANGUAGE.into(),
        Language::Cpp => tree_sitter_cpp::LANGUAGE.into(),
    }
}

/// Run the extractor for `language` over an error-free tree.
pub fn extract(language: Language, tree: &Tree, source: &[u8]) -> Extraction {
    match language {
        Language::Python => python::extract(tree, source),
        Language::JavaScript | Language::TypeScript => {
            javascript::extract(tree, source, language)
        }
        Language::Go => go::extract(tree, source),
        Language::Rust => rust::extract(tree, source),
        Language::Java => java::extract(tree, source),
        Language::C | Language::Cpp => c_family::extract(tree, source, language),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Parse `src` with the grammar for `language`, assert it is clean, and
    /// extract.
    pub fn run(language: Language, ext: &str, src: &str) -> Extraction {
        let mut parser = tree_sitter::Parser::new();
        parser.set_language(&grammar(language, ext)).unwrap();
        let tree = parser.parse(src.as_bytes(), None).unwrap();
        assert!(
            !tree.root_node().has_error(),
            "fixture does not parse cleanly: {}",
            tree.root_node().to_sexp()
        );
        extract(language, &tree, src.as_bytes())
    }

    #[test]
    fn test_every_language_has_a_loadable_grammar() {
        for lang in Language::ALL {
            for ext in lang.extensions() {
                let mut parser = tree_sitter::Parser::new();
                assert!(parser.set_language(&grammar(lang, ext)).is_ok(), "{lang} {ext}");
            }
        }
    }

    #[test]
    fn test_empty_source_yields_nothing() {
        for lang in Language::ALL {
            let out = run(lang, lang.extensions()[0], "");
            assert!(out.elements.is_empty());
            assert!(out.imports.is_empty());
        }
    }
}
