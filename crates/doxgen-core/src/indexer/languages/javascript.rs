//! JavaScript and TypeScript extraction. TypeScript adds interfaces, abstract
//! classes, `implements` and type annotations on top of the JavaScript shapes.

use tree_sitter::{Node, Tree};

use super::Extraction;
use crate::indexer::symbols::{
    children, collapse_whitespace, decorator_name, doc_comment_before, element_for, field_text,
    has_child_kind, header_text, is_comment, line_of, named_children, node_text,
};
use crate::models::{
    CodeElement, ElementKind, ImportRef, Language, META_BASES, META_DECORATORS, META_IS_ASYNC,
    META_METHODS, META_PARAMS,
};

const FUNCTION_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
    "method_signature",
    "abstract_method_signature",
];

const CLASS_KINDS: &[&str] = &["class_declaration", "abstract_class_declaration", "class"];

const METHOD_MEMBER_KINDS: &[&str] = &[
    "method_definition",
    "method_signature",
    "abstract_method_signature",
];

/// Wrappers whose leading comment documents the function or class inside.
const DOC_WRAPPERS: &[&str] = &[
    "export_statement",
    "variable_declarator",
    "lexical_declaration",
    "variable_declaration",
    "assignment_expression",
    "expression_statement",
    "pair",
    "field_definition",
    "public_field_definition",
];

pub fn extract(tree: &Tree, source: &[u8], language: Language) -> Extraction {
    let mut out = Extraction::default();
    visit(tree.root_node(), source, language, &mut out);
    out
}

fn visit(node: Node, source: &[u8], language: Language, out: &mut Extraction) {
    let kind = node.kind();
    if FUNCTION_KINDS.contains(&kind) {
        out.elements.push(function_element(node, source, language));
    } else if CLASS_KINDS.contains(&kind) {
        out.elements.push(class_element(node, source, language));
    } else if kind == "interface_declaration" {
        if let Some(el) = interface_element(node, source, language) {
            out.elements.push(el);
        }
    } else if matches!(kind, "import_statement" | "export_statement") {
        if let Some(target) = field_text(node, "source", source) {
            out.imports.push(ImportRef {
                target: unquote(&target),
                line: line_of(node),
            });
        }
    }

    for child in named_children(node) {
        visit(child, source, language, out);
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn function_element(node: Node, source: &[u8], language: Language) -> CodeElement {
    let (name, name_node) = match node.child_by_field_name("name") {
        Some(n) => (node_text(n, source), Some(n)),
        None => match binding_name(node, source) {
            Some((name, n)) => (name, Some(n)),
            None => ("anonymous".to_string(), None),
        },
    };
    let mut el = element_for(node, name_node, &name, ElementKind::Function, language);

    let params_node = node
        .child_by_field_name("parameters")
        .or_else(|| node.child_by_field_name("parameter"));
    let params_text = match params_node {
        Some(p) if p.kind() == "formal_parameters" => node_text(p, source),
        Some(p) => format!("({})", node_text(p, source)),
        None => "()".to_string(),
    };
    let mut signature = name.clone();
    if let Some(tp) = field_text(node, "type_parameters", source) {
        signature.push_str(&tp);
    }
    signature.push_str(&params_text);
    if let Some(ret) = field_text(node, "return_type", source) {
        signature.push_str(&ret);
    }
    el.signature = Some(collapse_whitespace(&signature));
    el.doc_comment = doc_comment(node, source);

    let params = params_node.map(|p| param_names(p, source)).unwrap_or_default();
    el.set_list(META_PARAMS, params);
    el.set_list(META_DECORATORS, decorators(node, source));
    el.set_flag(META_IS_ASYNC, has_child_kind(node, "async"));
    el
}

/// Name of the binding an unnamed function or class is assigned to.
fn binding_name<'t>(node: Node<'t>, source: &[u8]) -> Option<(String, Node<'t>)> {
    let parent = node.parent()?;
    let target = match parent.kind() {
        "variable_declarator" => parent.child_by_field_name("name"),
        "assignment_expression" => parent.child_by_field_name("left"),
        "pair" => parent.child_by_field_name("key"),
        "field_definition" => parent.child_by_field_name("property"),
        "public_field_definition" => parent.child_by_field_name("name"),
        _ => None,
    }?;
    let name = unquote(&node_text(target, source));
    (!name.is_empty()).then_some((name, target))
}

fn param_names(params: Node, source: &[u8]) -> Vec<String> {
    if params.kind() == "identifier" {
        return vec![node_text(params, source)];
    }
    named_children(params)
        .into_iter()
        .filter_map(|p| param_name(p, source))
        .collect()
}

fn param_name(param: Node, source: &[u8]) -> Option<String> {
    match param.kind() {
        "identifier" | "rest_pattern" | "object_pattern" | "array_pattern" => {
            Some(node_text(param, source))
        }
        "assignment_pattern" => field_text(param, "left", source),
        "required_parameter" | "optional_parameter" => {
            let pattern = param.child_by_field_name("pattern")?;
            match pattern.kind() {
                "assignment_pattern" => field_text(pattern, "left", source),
                _ => Some(node_text(pattern, source)),
            }
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn class_element(node: Node, source: &[u8], language: Language) -> CodeElement {
    let (name, name_node) = match node.child_by_field_name("name") {
        Some(n) => (node_text(n, source), Some(n)),
        None => match binding_name(node, source) {
            Some((name, n)) => (name, Some(n)),
            None => ("anonymous".to_string(), None),
        },
    };
    let mut el = element_for(node, name_node, &name, ElementKind::Type, language);
    let body = node.child_by_field_name("body");

    let bases = children(node)
        .into_iter()
        .find(|c| c.kind() == "class_heritage")
        .map(|h| heritage_bases(h, source))
        .unwrap_or_default();
    let methods = body
        .map(|b| member_names(b, METHOD_MEMBER_KINDS, source))
        .unwrap_or_default();

    el.signature = type_header(node, body, source);
    el.doc_comment = doc_comment(node, source);
    el.set_list(META_METHODS, methods);
    el.set_list(META_BASES, bases);
    el.set_list(META_DECORATORS, decorators(node, source));
    el
}

fn interface_element(node: Node, source: &[u8], language: Language) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Type, language);
    let body = node.child_by_field_name("body");

    let bases: Vec<String> = children(node)
        .into_iter()
        .filter(|c| c.kind() == "extends_type_clause")
        .flat_map(named_children)
        .filter(|t| !is_comment(*t))
        .map(|t| node_text(t, source))
        .collect();
    let methods = body
        .map(|b| member_names(b, &["method_signature"], source))
        .unwrap_or_default();

    el.signature = type_header(node, body, source);
    el.doc_comment = doc_comment(node, source);
    el.set_list(META_METHODS, methods);
    el.set_list(META_BASES, bases);
    el.set_list(META_DECORATORS, Vec::new());
    Some(el)
}

/// `extends` target(s) followed by `implements` targets.
fn heritage_bases(heritage: Node, source: &[u8]) -> Vec<String> {
    let mut bases = Vec::new();
    for clause in named_children(heritage) {
        match clause.kind() {
            "extends_clause" => bases.extend(
                named_children(clause)
                    .into_iter()
                    .filter(|v| v.kind() != "type_arguments" && !is_comment(*v))
                    .map(|v| node_text(v, source)),
            ),
            "implements_clause" => bases.extend(
                named_children(clause)
                    .into_iter()
                    .filter(|t| !is_comment(*t))
                    .map(|t| node_text(t, source)),
            ),
            _ if is_comment(clause) => {}
            // plain JavaScript: `extends <expression>`
            _ => bases.push(node_text(clause, source)),
        }
    }
    bases
}

fn member_names(body: Node, kinds: &[&str], source: &[u8]) -> Vec<String> {
    named_children(body)
        .into_iter()
        .filter(|m| kinds.contains(&m.kind()))
        .filter_map(|m| field_text(m, "name", source))
        .collect()
}

/// Declaration text up to the body, starting after any decorators.
fn type_header(node: Node, body: Option<Node>, source: &[u8]) -> Option<String> {
    let start = children(node)
        .into_iter()
        .find(|c| c.kind() != "decorator" && !is_comment(*c))
        .unwrap_or(node);
    let header = match body {
        Some(_) => header_text(start, body, source),
        None => header_text(node, None, source),
    };
    (!header.is_empty()).then_some(header)
}

// ---------------------------------------------------------------------------
// Shared
// ---------------------------------------------------------------------------

fn decorators(node: Node, source: &[u8]) -> Vec<String> {
    let own = named_children(node)
        .into_iter()
        .filter(|c| c.kind() == "decorator");
    let exported = node
        .parent()
        .filter(|p| p.kind() == "export_statement")
        .map(named_children)
        .unwrap_or_default()
        .into_iter()
        .filter(|c| c.kind() == "decorator");
    exported
        .chain(own)
        .map(|d| decorator_name(&node_text(d, source)))
        .collect()
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

fn unquote(text: &str) -> String {
    text.trim_matches(|c| c == '"' || c == '\'' || c == '`').to_string()
}
