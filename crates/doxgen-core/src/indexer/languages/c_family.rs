//! C and C++ extraction.
//!
//! C has no methods; structs and unions with a body are its record types.
//! C++ adds classes with base lists, in-class method definitions and
//! declarations, and out-of-class `Type::method` definitions which are
//! attached to `Type` when it is defined in the same file.

use serde_json::Value;
use tree_sitter::{Node, Tree};

use super::Extraction;
use crate::indexer::symbols::{
    doc_comment_before, element_for, field_text, is_comment, line_of, named_children, node_text,
    text_between,
};
use crate::models::{
    CodeElement, ElementKind, ImportRef, Language, META_BASES, META_DECORATORS, META_IS_ASYNC,
    META_METHODS, META_PARAMS, META_SCOPE,
};

const RECORD_KINDS: &[&str] = &["struct_specifier", "union_specifier", "class_specifier"];

const DECLARATOR_WRAPPERS: &[&str] = &[
    "pointer_declarator",
    "reference_declarator",
    "parenthesized_declarator",
    "attributed_declarator",
];

const DOC_WRAPPERS: &[&str] = &["type_definition", "template_declaration", "declaration"];

pub fn extract(tree: &Tree, source: &[u8], language: Language) -> Extraction {
    let mut out = Extraction::default();
    visit(tree.root_node(), source, language, &mut out);
    if language == Language::Cpp {
        attach_scoped(&mut out.elements);
    }
    out
}

fn visit(node: Node, source: &[u8], language: Language, out: &mut Extraction) {
    match node.kind() {
        "function_definition" => {
            if let Some(el) = function_element(node, source, language) {
                out.elements.push(el);
            }
        }
        "field_declaration" | "declaration"
            if language == Language::Cpp && in_class_body(node) =>
        {
            if let Some(el) = function_element(node, source, language) {
                out.elements.push(el);
            }
        }
        kind if RECORD_KINDS.contains(&kind) => {
            if kind != "class_specifier" || language == Language::Cpp {
                if let Some(el) = record_element(node, source, language) {
                    out.elements.push(el);
                }
            }
        }
        "preproc_include" => {
            if let Some(path) = field_text(node, "path", source) {
                out.imports.push(ImportRef {
                    target: path
                        .trim_matches(|c| c == '"' || c == '<' || c == '>')
                        .to_string(),
                    line: line_of(node),
                });
            }
        }
        _ => {}
    }

    for child in named_children(node) {
        visit(child, source, language, out);
    }
}

fn in_class_body(node: Node) -> bool {
    match node.parent() {
        Some(p) if p.kind() == "field_declaration_list" => true,
        Some(p) if p.kind() == "template_declaration" => p
            .parent()
            .is_some_and(|gp| gp.kind() == "field_declaration_list"),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

/// Function definition, or (inside a C++ class body) a method declaration.
fn function_element(node: Node, source: &[u8], language: Language) -> Option<CodeElement> {
    let declarator = function_declarator(node.child_by_field_name("declarator")?)?;
    let (name, scope, name_node) = declarator_name(declarator.child_by_field_name("declarator")?, source)?;
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Function, language);

    let start = node
        .child_by_field_name("type")
        .map(|t| t.start_byte())
        .unwrap_or_else(|| declarator.start_byte());
    el.signature = Some(text_between(start, declarator.end_byte(), source));
    el.doc_comment = doc_comment(node, source);

    let params = declarator
        .child_by_field_name("parameters")
        .map(|p| {
            named_children(p)
                .into_iter()
                .filter(|param| {
                    matches!(
                        param.kind(),
                        "parameter_declaration"
                            | "optional_parameter_declaration"
                            | "variadic_parameter_declaration"
                    )
                })
                .filter_map(|param| param.child_by_field_name("declarator"))
                .filter_map(|d| declarator_name(d, source).map(|(n, _, _)| n))
                .collect()
        })
        .unwrap_or_default();

    el.set_list(META_PARAMS, params);
    el.set_list(META_DECORATORS, Vec::new());
    el.set_flag(META_IS_ASYNC, false);
    if let Some(scope) = scope {
        el.set_text(META_SCOPE, scope);
    }
    Some(el)
}

/// The function declarator under pointer/reference wrappers. Function
/// pointers (`int (*cb)(int)`) are not functions and yield `None`.
fn function_declarator(mut node: Node) -> Option<Node> {
    loop {
        match node.kind() {
            "function_declarator" => {
                let inner = node.child_by_field_name("declarator")?;
                return (inner.kind() != "parenthesized_declarator").then_some(node);
            }
            kind if DECLARATOR_WRAPPERS.contains(&kind) => {
                node = node
                    .child_by_field_name("declarator")
                    .or_else(|| named_children(node).into_iter().find(|c| !is_comment(*c)))?;
            }
            _ => return None,
        }
    }
}

/// Declared name, its qualifying scope if any, and the name node.
fn declarator_name<'t>(node: Node<'t>, source: &[u8]) -> Option<(String, Option<String>, Node<'t>)> {
    match node.kind() {
        "identifier" | "field_identifier" | "destructor_name" | "operator_name"
        | "type_identifier" => Some((node_text(node, source), None, node)),
        "qualified_identifier" => {
            let scope = field_text(node, "scope", source);
            let (name, inner_scope, name_node) =
                declarator_name(node.child_by_field_name("name")?, source)?;
            let scope = match (scope, inner_scope) {
                (Some(outer), Some(inner)) => Some(format!("{outer}::{inner}")),
                (outer, inner) => outer.or(inner),
            };
            Some((name, scope, name_node))
        }
        "template_function" => declarator_name(node.child_by_field_name("name")?, source),
        _ => {
            let inner = node
                .child_by_field_name("declarator")
                .or_else(|| named_children(node).into_iter().find(|c| !is_comment(*c)))?;
            declarator_name(inner, source)
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

fn record_element(node: Node, source: &[u8], language: Language) -> Option<CodeElement> {
    let body = node.child_by_field_name("body")?;
    let typedef = node
        .parent()
        .filter(|p| p.kind() == "type_definition");
    let (name, name_node, aliased) = match node.child_by_field_name("name") {
        Some(n) => (node_text(n, source), n, false),
        None => {
            let alias = typedef?.child_by_field_name("declarator")?;
            let (name, _, name_node) = declarator_name(alias, source)?;
            (name, name_node, true)
        }
    };
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Type, language);

    let header = text_between(node.start_byte(), body.start_byte(), source);
    el.signature = Some(if aliased {
        format!("typedef {header} {name}")
    } else {
        header
    });
    el.doc_comment = doc_comment(node, source);

    let bases: Vec<String> = named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "base_class_clause")
        .flat_map(named_children)
        .filter(|b| b.kind() != "access_specifier" && !is_comment(*b))
        .map(|b| node_text(b, source))
        .collect();
    let methods = if language == Language::Cpp {
        member_functions(body, source)
    } else {
        Vec::new()
    };

    el.set_list(META_METHODS, methods);
    el.set_list(META_BASES, bases);
    el.set_list(META_DECORATORS, Vec::new());
    Some(el)
}

fn member_functions(body: Node, source: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    for member in named_children(body) {
        let member = match member.kind() {
            "template_declaration" => match named_children(member).into_iter().last() {
                Some(inner) => inner,
                None => continue,
            },
            _ => member,
        };
        if !matches!(
            member.kind(),
            "function_definition" | "field_declaration" | "declaration"
        ) {
            continue;
        }
        let name = member
            .child_by_field_name("declarator")
            .and_then(function_declarator)
            .and_then(|f| f.child_by_field_name("declarator"))
            .and_then(|d| declarator_name(d, source))
            .map(|(n, _, _)| n);
        if let Some(name) = name {
            names.push(name);
        }
    }
    names
}

/// Add out-of-class `T::m` definitions to `T`'s method list.
fn attach_scoped(elements: &mut [CodeElement]) {
    let scoped: Vec<(String, String)> = elements
        .iter()
        .filter_map(|e| {
            let scope = e.metadata.get(META_SCOPE).and_then(Value::as_str)?;
            let owner = scope.rsplit("::").next().unwrap_or(scope);
            Some((owner.to_string(), e.name.clone()))
        })
        .collect();
    for (owner, method) in scoped {
        if let Some(ty) = elements
            .iter_mut()
            .find(|e| e.kind == ElementKind::Type && e.name == owner)
        {
            if !ty.methods().contains(&method.as_str()) {
                ty.push_to_list(META_METHODS, method);
            }
        }
    }
}

fn doc_comment(node: Node, source: &[u8]) -> Option<String> {
    let mut anchor = node;
    while let Some(parent) = anchor.parent() {
        if !DOC_WRAPPERS.contains(&parent.kind()) {
            break;
        }
        anchor = parent;
    }
    doc_comment_before(anchor, source, &[], |_| true)
}
