//! Rust extraction.
//!
//! Methods and implemented traits are declared in `impl` blocks away from the
//! type, so they are gathered during the walk and attached to the matching
//! struct, enum or union afterwards.

use tree_sitter::{Node, Tree};

use super::Extraction;
use crate::indexer::symbols::{
    decorator_name, doc_comment_before, element_for, field_text, has_child_kind, header_text,
    is_comment, line_of, named_children, node_text,
};
use crate::models::{
    CodeElement, ElementKind, ImportRef, Language, META_BASES, META_DECORATORS, META_IS_ASYNC,
    META_METHODS, META_PARAMS,
};

const RECORD_KINDS: &[&str] = &["struct_item", "enum_item", "union_item"];

struct ImplBlock {
    target: String,
    trait_name: Option<String>,
    methods: Vec<String>,
}

#[derive(Default)]
struct Walk {
    out: Extraction,
    records: Vec<usize>,
    impls: Vec<ImplBlock>,
}

pub fn extract(tree: &Tree, source: &[u8]) -> Extraction {
    let mut walk = Walk::default();
    visit(tree.root_node(), source, &mut walk);
    attach_impls(&mut walk);
    walk.out
}

fn visit(node: Node, source: &[u8], walk: &mut Walk) {
    match node.kind() {
        "function_item" | "function_signature_item" => {
            if let Some(el) = function_element(node, source) {
                walk.out.elements.push(el);
            }
        }
        kind if RECORD_KINDS.contains(&kind) => {
            if let Some(el) = type_element(node, source, Vec::new(), Vec::new()) {
                walk.records.push(walk.out.elements.len());
                walk.out.elements.push(el);
            }
        }
        "trait_item" => {
            let methods = node
                .child_by_field_name("body")
                .map(|b| fn_names(b, source))
                .unwrap_or_default();
            let supertraits = node
                .child_by_field_name("bounds")
                .map(|b| {
                    named_children(b)
                        .into_iter()
                        .filter(|t| t.kind() != "lifetime" && !is_comment(*t))
                        .map(|t| node_text(t, source))
                        .collect()
                })
                .unwrap_or_default();
            if let Some(el) = type_element(node, source, methods, supertraits) {
                walk.out.elements.push(el);
            }
        }
        "impl_item" => {
            if let Some(target) = field_text(node, "type", source) {
                walk.impls.push(ImplBlock {
                    target: type_base(&target).to_string(),
                    trait_name: field_text(node, "trait", source),
                    methods: node
                        .child_by_field_name("body")
                        .map(|b| fn_names(b, source))
                        .unwrap_or_default(),
                });
            }
        }
        "use_declaration" => {
            if let Some(target) = field_text(node, "argument", source) {
                walk.out.imports.push(ImportRef {
                    target,
                    line: line_of(node),
                });
            }
        }
        _ => {}
    }

    for child in named_children(node) {
        visit(child, source, walk);
    }
}

fn function_element(node: Node, source: &[u8]) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Function, Language::Rust);

    el.signature = Some(header_text(node, node.child_by_field_name("body"), source));
    el.doc_comment = rust_doc(node, source);

    let params = node
        .child_by_field_name("parameters")
        .map(|p| {
            named_children(p)
                .into_iter()
                .filter_map(|param| match param.kind() {
                    "self_parameter" => Some("self".to_string()),
                    "parameter" => field_text(param, "pattern", source),
                    "variadic_parameter" => Some("...".to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let is_async = named_children(node)
        .into_iter()
        .any(|c| c.kind() == "function_modifiers" && has_child_kind(c, "async"));

    el.set_list(META_PARAMS, params);
    el.set_list(META_DECORATORS, attributes(node, source));
    el.set_flag(META_IS_ASYNC, is_async);
    Some(el)
}

fn type_element(
    node: Node,
    source: &[u8],
    methods: Vec<String>,
    bases: Vec<String>,
) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Type, Language::Rust);
    el.signature = Some(header_text(node, node.child_by_field_name("body"), source));
    el.doc_comment = rust_doc(node, source);
    el.set_list(META_METHODS, methods);
    el.set_list(META_BASES, bases);
    el.set_list(META_DECORATORS, attributes(node, source));
    Some(el)
}

fn fn_names(body: Node, source: &[u8]) -> Vec<String> {
    named_children(body)
        .into_iter()
        .filter(|c| matches!(c.kind(), "function_item" | "function_signature_item"))
        .filter_map(|f| field_text(f, "name", source))
        .collect()
}

/// Outer attributes directly above an item, in source order.
fn attributes(node: Node, source: &[u8]) -> Vec<String> {
    let mut found = Vec::new();
    let mut current = node.prev_sibling();
    while let Some(sibling) = current {
        match sibling.kind() {
            "attribute_item" => found.push(decorator_name(&node_text(sibling, source))),
            _ if is_comment(sibling) => {}
            _ => break,
        }
        current = sibling.prev_sibling();
    }
    found.reverse();
    found
}

fn is_doc_comment(text: &str) -> bool {
    (text.starts_with("///") && !text.starts_with("////"))
        || (text.starts_with("/**") && !text.starts_with("/***") && text != "/**/")
}

fn rust_doc(node: Node, source: &[u8]) -> Option<String> {
    doc_comment_before(node, source, &["attribute_item"], is_doc_comment)
}

/// `&'a mut crate::Stack<T>` becomes `Stack`.
fn type_base(text: &str) -> &str {
    let head = text.split('<').next().unwrap_or(text);
    let head = head.rsplit("::").next().unwrap_or(head);
    head.trim_start_matches('&')
        .split_whitespace()
        .last()
        .unwrap_or("")
}

fn attach_impls(walk: &mut Walk) {
    for &idx in &walk.records {
        let owner = walk.out.elements[idx].name.clone();
        let mut methods = Vec::new();
        let mut bases: Vec<String> = Vec::new();
        for block in walk.impls.iter().filter(|b| b.target == owner) {
            methods.extend(block.methods.iter().cloned());
            if let Some(t) = &block.trait_name {
                if !bases.contains(t) {
                    bases.push(t.clone());
                }
            }
        }
        let el = &mut walk.out.elements[idx];
        el.set_list(META_METHODS, methods);
        el.set_list(META_BASES, bases);
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::run;
    use super::type_base;
    use crate::models::{ElementKind, Language};

    const SRC: &str = r#"use std::fmt;
use crate::models::{Language, CodeElement};

/// A point in space.
#[derive(Debug, Clone)]
pub struct Point {
    x: i32,
    y: i32,
}

// not a doc comment
pub enum Shape {
    Circle(Point),
}

pub trait Area: fmt::Debug + Send {
    fn area(&self) -> f64;
}

impl Point {
    /// Creates a point.
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl Area for Point {
    fn area(&self) -> f64 {
        0.0
    }
}

#[tokio::main]
async fn main() {}
"#;

    #[test]
    fn test_elements_in_source_order() {
        let out = run(Language::Rust, "rs", SRC);
        let names: Vec<(&str, ElementKind, usize)> = out
            .elements
            .iter()
            .map(|e| (e.name.as_str(), e.kind, e.line_start))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Point", ElementKind::Type, 6),
                ("Shape", ElementKind::Type, 12),
                ("Area", ElementKind::Type, 16),
                ("area", ElementKind::Function, 17),
                ("new", ElementKind::Function, 22),
                ("area", ElementKind::Function, 28),
                ("main", ElementKind::Function, 34),
            ]
        );
    }

    #[test]
    fn test_struct_gets_impl_methods_and_traits() {
        let out = run(Language::Rust, "rs", SRC);
        let point = &out.elements[0];
        assert_eq!(point.methods(), vec!["new", "area"]);
        assert_eq!(point.bases(), vec!["Area"]);
        assert_eq!(point.decorators(), vec!["derive"]);
        assert_eq!(point.doc_comment.as_deref(), Some("/// A point in space."));
        assert_eq!(point.signature.as_deref(), Some("pub struct Point"));
        assert_eq!(point.line_end, Some(9));
    }

    #[test]
    fn test_plain_comment_is_not_doc() {
        let out = run(Language::Rust, "rs", SRC);
        assert_eq!(out.elements[1].doc_comment, None);
        assert!(out.elements[1].methods().is_empty());
    }

    #[test]
    fn test_trait_supertraits_and_methods() {
        let out = run(Language::Rust, "rs", SRC);
        let area = &out.elements[2];
        assert_eq!(area.bases(), vec!["fmt::Debug", "Send"]);
        assert_eq!(area.methods(), vec!["area"]);
        assert_eq!(
            out.elements[3].signature.as_deref(),
            Some("fn area(&self) -> f64")
        );
        assert_eq!(out.elements[3].params(), vec!["self"]);
    }

    #[test]
    fn test_function_details() {
        let out = run(Language::Rust, "rs", SRC);
        let new = &out.elements[4];
        assert_eq!(new.doc_comment.as_deref(), Some("/// Creates a point."));
        assert_eq!(new.params(), vec!["x", "y"]);
        assert_eq!(
            new.signature.as_deref(),
            Some("pub fn new(x: i32, y: i32) -> Self")
        );

        let main = &out.elements[6];
        assert!(main.is_async());
        assert_eq!(main.decorators(), vec!["tokio::main"]);
    }

    #[test]
    fn test_use_declarations() {
        let out = run(Language::Rust, "rs", SRC);
        let targets: Vec<&str> = out.imports.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["std::fmt", "crate::models::{Language, CodeElement}"]);
    }

    #[test]
    fn test_type_base() {
        assert_eq!(type_base("Stack<T>"), "Stack");
        assert_eq!(type_base("crate::geo::Point"), "Point");
        assert_eq!(type_base("&'a mut Buffer"), "Buffer");
    }
}
