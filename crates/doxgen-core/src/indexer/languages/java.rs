//! Java extraction: classes, interfaces, enums and records as types; methods
//! and constructors as functions.

use tree_sitter::{Node, Tree};

use super::Extraction;
use crate::indexer::symbols::{
    decorator_name, doc_comment_before, element_for, field_text, is_comment, line_of,
    named_children, node_text, text_between,
};
use crate::models::{
    CodeElement, ElementKind, ImportRef, Language, META_BASES, META_DECORATORS, META_IS_ASYNC,
    META_METHODS, META_PARAMS,
};

const TYPE_KINDS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
];

const HERITAGE_KINDS: &[&str] = &["superclass", "super_interfaces", "extends_interfaces"];

pub fn extract(tree: &Tree, source: &[u8]) -> Extraction {
    let mut out = Extraction::default();
    visit(tree.root_node(), source, &mut out);
    out
}

fn visit(node: Node, source: &[u8], out: &mut Extraction) {
    match node.kind() {
        "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
            if let Some(el) = method_element(node, source) {
                out.elements.push(el);
            }
        }
        kind if TYPE_KINDS.contains(&kind) => {
            if let Some(el) = type_element(node, source) {
                out.elements.push(el);
            }
        }
        "import_declaration" => {
            let text = node_text(node, source);
            let target = text
                .trim()
                .trim_start_matches("import")
                .trim()
                .trim_start_matches("static ")
                .trim_end_matches(';')
                .trim()
                .to_string();
            out.imports.push(ImportRef {
                target,
                line: line_of(node),
            });
        }
        _ => {}
    }

    for child in named_children(node) {
        visit(child, source, out);
    }
}

fn method_element(node: Node, source: &[u8]) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Function, Language::Java);

    // signature starts after modifiers and annotations
    let start = node
        .child_by_field_name("type_parameters")
        .or_else(|| node.child_by_field_name("type"))
        .unwrap_or(name_node);
    let end = node
        .child_by_field_name("body")
        .map(|b| b.start_byte())
        .unwrap_or_else(|| node.end_byte());
    el.signature = Some(text_between(start.start_byte(), end, source));
    el.doc_comment = doc_comment_before(node, source, &[], |_| true);

    let params = node
        .child_by_field_name("parameters")
        .map(|p| {
            named_children(p)
                .into_iter()
                .filter_map(|param| param_name(param, source))
                .collect()
        })
        .unwrap_or_default();
    el.set_list(META_PARAMS, params);
    el.set_list(META_DECORATORS, annotations(node, source));
    el.set_flag(META_IS_ASYNC, false);
    Some(el)
}

fn param_name(param: Node, source: &[u8]) -> Option<String> {
    match param.kind() {
        "formal_parameter" => field_text(param, "name", source),
        "spread_parameter" => {
            let children = named_children(param);
            children
                .iter()
                .find(|c| c.kind() == "variable_declarator")
                .and_then(|d| field_text(*d, "name", source))
                .or_else(|| {
                    children
                        .iter()
                        .rev()
                        .find(|c| c.kind() == "identifier")
                        .map(|c| node_text(*c, source))
                })
        }
        _ => None,
    }
}

fn type_element(node: Node, source: &[u8]) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Type, Language::Java);
    let body = node.child_by_field_name("body");

    let start = named_children(node)
        .into_iter()
        .next()
        .filter(|first| first.kind() == "modifiers")
        .map(|m| m.end_byte())
        .unwrap_or_else(|| node.start_byte());
    let end = body.map(|b| b.start_byte()).unwrap_or_else(|| node.end_byte());
    el.signature = Some(text_between(start, end, source));
    el.doc_comment = doc_comment_before(node, source, &[], |_| true);

    let bases: Vec<String> = named_children(node)
        .into_iter()
        .filter(|c| HERITAGE_KINDS.contains(&c.kind()))
        .flat_map(|clause| types_in(clause, source))
        .collect();

    el.set_list(META_METHODS, body.map(|b| method_names(b, source)).unwrap_or_default());
    el.set_list(META_BASES, bases);
    el.set_list(META_DECORATORS, annotations(node, source));
    Some(el)
}

fn types_in(clause: Node, source: &[u8]) -> Vec<String> {
    let mut types = Vec::new();
    for child in named_children(clause) {
        if child.kind() == "type_list" {
            types.extend(
                named_children(child)
                    .into_iter()
                    .filter(|t| !is_comment(*t))
                    .map(|t| node_text(t, source)),
            );
        } else if !is_comment(child) {
            types.push(node_text(child, source));
        }
    }
    types
}

/// Methods declared directly in a type body; enum bodies keep theirs in a
/// nested declarations block.
fn method_names(body: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    for member in named_children(body) {
        match member.kind() {
            "method_declaration" | "constructor_declaration" | "compact_constructor_declaration" => {
                if let Some(name) = field_text(member, "name", source) {
                    names.push(name);
                }
            }
            "enum_body_declarations" => names.extend(method_names(member, source)),
            _ => {}
        }
    }
    names
}

fn annotations(node: Node, source: &[u8]) -> Vec<String> {
    named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "modifiers")
        .flat_map(named_children)
        .filter(|m| matches!(m.kind(), "marker_annotation" | "annotation"))
        .map(|a| decorator_name(&node_text(a, source)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::tests::run;
    use crate::models::{ElementKind, Language};

    const SRC: &str = r#"package com.example;

import java.util.List;
import static java.util.Collections.emptyList;

/** A greeter. */
@Service
public class Greeter extends Base implements Runnable, Named {
    private final String name;

    public Greeter(String name) {
        this.name = name;
    }

    /**
     * Says hello.
     */
    @Override
    public <T> String greet(T target, String... extras) throws Exception {
        return "hi";
    }
}

interface Named extends Comparable<Named> {
    String name();
}

enum Mood { HAPPY, SAD; void show() {} }

record Pair(int left, int right) {}
"#;

    #[test]
    fn test_elements_in_source_order() {
        let out = run(Language::Java, "java", SRC);
        let names: Vec<(&str, ElementKind, usize)> = out
            .elements
            .iter()
            .map(|e| (e.name.as_str(), e.kind, e.line_start))
            .collect();
        assert_eq!(
            names,
            vec![
                ("Greeter", ElementKind::Type, 8),
                ("Greeter", ElementKind::Function, 11),
                ("greet", ElementKind::Function, 19),
                ("Named", ElementKind::Type, 24),
                ("name", ElementKind::Function, 25),
                ("Mood", ElementKind::Type, 28),
                ("show", ElementKind::Function, 28),
                ("Pair", ElementKind::Type, 30),
            ]
        );
    }

    #[test]
    fn test_class_metadata() {
        let out = run(Language::Java, "java", SRC);
        let greeter = &out.elements[0];
        assert_eq!(greeter.decorators(), vec!["Service"]);
        assert_eq!(greeter.bases(), vec!["Base", "Runnable", "Named"]);
        assert_eq!(greeter.methods(), vec!["Greeter", "greet"]);
        assert_eq!(greeter.doc_comment.as_deref(), Some("/** A greeter. */"));
        assert_eq!(
            greeter.signature.as_deref(),
            Some("class Greeter extends Base implements Runnable, Named")
        );
    }

    #[test]
    fn test_method_metadata() {
        let out = run(Language::Java, "java", SRC);
        let greet = &out.elements[2];
        assert_eq!(
            greet.signature.as_deref(),
            Some("<T> String greet(T target, String... extras) throws Exception")
        );
        assert_eq!(greet.params(), vec!["target", "extras"]);
        assert_eq!(greet.decorators(), vec!["Override"]);
        let doc = greet.doc_comment.as_deref().unwrap();
        assert!(doc.starts_with("/**"));
        assert!(doc.contains("Says hello."));
        assert_eq!(out.elements[1].params(), vec!["name"]);
    }

    #[test]
    fn test_interface_enum_record() {
        let out = run(Language::Java, "java", SRC);
        assert_eq!(out.elements[3].bases(), vec!["Comparable<Named>"]);
        assert_eq!(out.elements[3].methods(), vec!["name"]);
        assert_eq!(out.elements[4].signature.as_deref(), Some("String name()"));
        assert_eq!(out.elements[5].methods(), vec!["show"]);
        assert_eq!(
            out.elements[7].signature.as_deref(),
            Some("record Pair(int left, int right)")
        );
    }

    #[test]
    fn test_imports() {
        let out = run(Language::Java, "java", SRC);
        let targets: Vec<&str> = out.imports.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["java.util.List", "java.util.Collections.emptyList"]);
    }
}
