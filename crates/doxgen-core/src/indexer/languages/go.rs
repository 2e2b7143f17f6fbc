//! Go extraction. Methods live outside their struct, so struct method lists
//! are filled in a second pass by matching receiver types.

use serde_json::Value;
use tree_sitter::{Node, Tree};

use super::Extraction;
use crate::indexer::symbols::{
    collapse_whitespace, doc_comment_before, element_for, field_text, header_text, is_comment,
    line_of, named_children, node_text,
};
use crate::models::{
    CodeElement, ElementKind, ImportRef, Language, META_BASES, META_DECORATORS, META_IS_ASYNC,
    META_METHODS, META_PARAMS, META_RECEIVER,
};

pub fn extract(tree: &Tree, source: &[u8]) -> Extraction {
    let mut out = Extraction::default();
    let mut structs = Vec::new();
    visit(tree.root_node(), source, &mut out, &mut structs);
    attach_methods(&mut out.elements, &structs);
    out
}

fn visit(node: Node, source: &[u8], out: &mut Extraction, structs: &mut Vec<usize>) {
    match node.kind() {
        "function_declaration" | "method_declaration" => {
            if let Some(el) = function_element(node, source) {
                out.elements.push(el);
            }
        }
        "method_elem" | "method_spec" => {
            if let Some(el) = interface_method(node, source) {
                out.elements.push(el);
            }
        }
        "func_literal" => {
            if let Some(el) = bound_literal(node, source) {
                out.elements.push(el);
            }
        }
        "type_spec" => {
            if let Some((el, is_struct)) = type_element(node, source) {
                if is_struct {
                    structs.push(out.elements.len());
                }
                out.elements.push(el);
            }
        }
        "import_spec" => {
            if let Some(path) = field_text(node, "path", source) {
                out.imports.push(ImportRef {
                    target: path.trim_matches(|c| c == '"' || c == '`').to_string(),
                    line: line_of(node),
                });
            }
        }
        _ => {}
    }

    for child in named_children(node) {
        visit(child, source, out, structs);
    }
}

fn function_element(node: Node, source: &[u8]) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Function, Language::Go);

    el.signature = Some(match node.child_by_field_name("body") {
        Some(body) => header_text(node, Some(body), source),
        None => collapse_whitespace(&node_text(node, source)),
    });
    el.doc_comment = go_doc(node, source);
    el.set_list(META_PARAMS, params_of(node, source));
    el.set_list(META_DECORATORS, Vec::new());
    el.set_flag(META_IS_ASYNC, false);

    if let Some(receiver) = node
        .child_by_field_name("receiver")
        .and_then(|r| {
            named_children(r)
                .into_iter()
                .find(|p| p.kind() == "parameter_declaration")
        })
        .and_then(|p| field_text(p, "type", source))
    {
        el.set_text(META_RECEIVER, receiver);
    }
    Some(el)
}

fn interface_method(node: Node, source: &[u8]) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Function, Language::Go);
    el.signature = Some(collapse_whitespace(&node_text(node, source)));
    el.doc_comment = go_doc(node, source);
    el.set_list(META_PARAMS, params_of(node, source));
    el.set_list(META_DECORATORS, Vec::new());
    el.set_flag(META_IS_ASYNC, false);
    Some(el)
}

/// A function literal is documented only when bound to a name by `:=`,
/// `var` or `=`.
fn bound_literal(node: Node, source: &[u8]) -> Option<CodeElement> {
    let values = node.parent().filter(|p| p.kind() == "expression_list")?;
    let stmt = values.parent()?;
    let names: Vec<Node> = match stmt.kind() {
        "short_var_declaration" | "assignment_statement" => {
            named_children(stmt.child_by_field_name("left")?)
        }
        "var_spec" => named_children(stmt)
            .into_iter()
            .filter(|c| c.kind() == "identifier")
            .collect(),
        _ => return None,
    };
    let position = named_children(values)
        .iter()
        .position(|v| v.id() == node.id())?;
    let name_node = *names.get(position)?;
    let name = node_text(name_node, source);
    if name == "_" {
        return None;
    }

    let mut el = element_for(node, Some(name_node), &name, ElementKind::Function, Language::Go);
    let params = field_text(node, "parameters", source).unwrap_or_else(|| "()".to_string());
    let mut signature = format!("func {name}{params}");
    if let Some(result) = field_text(node, "result", source) {
        signature.push(' ');
        signature.push_str(&result);
    }
    el.signature = Some(collapse_whitespace(&signature));
    let anchor = match stmt.kind() {
        "var_spec" => stmt.parent().unwrap_or(stmt),
        _ => stmt,
    };
    el.doc_comment = go_doc(anchor, source);
    el.set_list(META_PARAMS, params_of(node, source));
    el.set_list(META_DECORATORS, Vec::new());
    el.set_flag(META_IS_ASYNC, false);
    Some(el)
}

/// `type X struct {...}` and `type X interface {...}`; other named types are
/// not records and produce nothing.
fn type_element(spec: Node, source: &[u8]) -> Option<(CodeElement, bool)> {
    let name_node = spec.child_by_field_name("name")?;
    let ty = spec.child_by_field_name("type")?;
    let is_struct = match ty.kind() {
        "struct_type" => true,
        "interface_type" => false,
        _ => return None,
    };
    let name = node_text(name_node, source);
    let mut el = element_for(spec, Some(name_node), &name, ElementKind::Type, Language::Go);

    let tparams = field_text(spec, "type_parameters", source).unwrap_or_default();
    let keyword = if is_struct { "struct" } else { "interface" };
    el.signature = Some(format!("type {name}{tparams} {keyword}"));

    el.doc_comment = doc_comment_before(spec, source, &[], |_| true).or_else(|| {
        spec.parent()
            .filter(|p| p.kind() == "type_declaration")
            .and_then(|p| go_doc(p, source))
    });

    let (methods, bases) = if is_struct {
        (Vec::new(), embedded_fields(ty, source))
    } else {
        interface_members(ty, source)
    };
    el.set_list(META_METHODS, methods);
    el.set_list(META_BASES, bases);
    el.set_list(META_DECORATORS, Vec::new());
    Some((el, is_struct))
}

fn embedded_fields(struct_type: Node, source: &[u8]) -> Vec<String> {
    named_children(struct_type)
        .into_iter()
        .filter(|c| c.kind() == "field_declaration_list")
        .flat_map(named_children)
        .filter(|f| f.kind() == "field_declaration" && f.child_by_field_name("name").is_none())
        .filter_map(|f| field_text(f, "type", source))
        .collect()
}

fn interface_members(interface: Node, source: &[u8]) -> (Vec<String>, Vec<String>) {
    let mut methods = Vec::new();
    let mut bases = Vec::new();
    for member in named_children(interface) {
        match member.kind() {
            "method_elem" | "method_spec" => {
                if let Some(name) = field_text(member, "name", source) {
                    methods.push(name);
                }
            }
            _ if is_comment(member) => {}
            _ => bases.push(collapse_whitespace(&node_text(member, source))),
        }
    }
    (methods, bases)
}

fn params_of(node: Node, source: &[u8]) -> Vec<String> {
    let Some(params) = node.child_by_field_name("parameters") else {
        return Vec::new();
    };
    let mut names = Vec::new();
    for decl in named_children(params) {
        match decl.kind() {
            "parameter_declaration" => names.extend(
                named_children(decl)
                    .into_iter()
                    .filter(|c| c.kind() == "identifier")
                    .map(|c| node_text(c, source)),
            ),
            "variadic_parameter_declaration" => {
                if let Some(name) = field_text(decl, "name", source) {
                    names.push(name);
                }
            }
            _ => {}
        }
    }
    names
}

fn go_doc(node: Node, source: &[u8]) -> Option<String> {
    doc_comment_before(node, source, &[], |_| true)
}

/// Base type name of a receiver: `*Stack[T]` becomes `Stack`.
fn receiver_type(receiver: &str) -> &str {
    let trimmed = receiver.trim().trim_start_matches('*').trim();
    let end = trimmed.find('[').unwrap_or(trimmed.len());
    trimmed[..end].trim()
}

fn attach_methods(elements: &mut [CodeElement], structs: &[usize]) {
    for &idx in structs {
        let owner = elements[idx].name.clone();
        let methods: Vec<String> = elements
            .iter()
            .filter(|e| {
                e.metadata
                    .get(META_RECEIVER)
                    .and_then(Value::as_str)
                    .is_some_and(|r| receiver_type(r) == owner)
            })
            .map(|e| e.name.clone())
            .collect();
        elements[idx].set_list(META_METHODS, methods);
    }
}
