//! Python extraction over tree-sitter-python.

use tree_sitter::{Node, Tree};

use super::Extraction;
use crate::indexer::symbols::{
    clean_docstring, collapse_whitespace, decorator_name, element_for, field_text, has_child_kind,
    line_of, named_children, node_text,
};
use crate::models::{
    CodeElement, ElementKind, ImportRef, Language, META_BASES, META_DECORATORS, META_IS_ASYNC,
    META_METHODS, META_PARAMS,
};

pub fn extract(tree: &Tree, source: &[u8]) -> Extraction {
    let mut out = Extraction::default();
    visit(tree.root_node(), source, &mut out);
    out
}

fn visit(node: Node, source: &[u8], out: &mut Extraction) {
    match node.kind() {
        "function_definition" => {
            if let Some(el) = function_element(node, source) {
                out.elements.push(el);
            }
        }
        "class_definition" => {
            if let Some(el) = class_element(node, source) {
                out.elements.push(el);
            }
        }
        "assignment" => {
            if let Some(el) = bound_lambda(node, source) {
                out.elements.push(el);
            }
        }
        "import_statement" => {
            for child in named_children(node) {
                let target = match child.kind() {
                    "dotted_name" => Some(node_text(child, source)),
                    "aliased_import" => field_text(child, "name", source),
                    _ => None,
                };
                if let Some(target) = target {
                    out.imports.push(ImportRef {
                        target,
                        line: line_of(node),
                    });
                }
            }
        }
        "import_from_statement" => {
            if let Some(target) = field_text(node, "module_name", source) {
                out.imports.push(ImportRef {
                    target,
                    line: line_of(node),
                });
            }
        }
        _ => {}
    }

    for child in named_children(node) {
        visit(child, source, out);
    }
}

fn function_element(node: Node, source: &[u8]) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Function, Language::Python);

    let params_node = node.child_by_field_name("parameters");
    let params_text = params_node
        .map(|p| node_text(p, source))
        .unwrap_or_else(|| "()".to_string());
    let mut signature = format!("{name}{params_text}");
    if let Some(ret) = field_text(node, "return_type", source) {
        signature.push_str(" -> ");
        signature.push_str(&ret);
    }
    el.signature = Some(collapse_whitespace(&signature));
    el.doc_comment = docstring(node, source);

    let params = params_node.map(|p| param_names(p, source)).unwrap_or_default();
    el.set_list(META_PARAMS, params);
    el.set_list(META_DECORATORS, decorators(node, source));
    el.set_flag(META_IS_ASYNC, is_async(node));
    Some(el)
}

fn class_element(node: Node, source: &[u8]) -> Option<CodeElement> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    let mut el = element_for(node, Some(name_node), &name, ElementKind::Type, Language::Python);

    let bases: Vec<String> = node
        .child_by_field_name("superclasses")
        .map(|args| {
            named_children(args)
                .into_iter()
                .filter(|a| !matches!(a.kind(), "keyword_argument" | "comment"))
                .map(|a| node_text(a, source))
                .collect()
        })
        .unwrap_or_default();

    let mut signature = format!("class {name}");
    if let Some(args) = node.child_by_field_name("superclasses") {
        signature.push_str(&node_text(args, source));
    }
    el.signature = Some(collapse_whitespace(&signature));
    el.doc_comment = docstring(node, source);

    let methods: Vec<String> = node
        .child_by_field_name("body")
        .map(|body| {
            named_children(body)
                .into_iter()
                .filter_map(|stmt| match stmt.kind() {
                    "function_definition" => Some(stmt),
                    "decorated_definition" => stmt
                        .child_by_field_name("definition")
                        .filter(|d| d.kind() == "function_definition"),
                    _ => None,
                })
                .filter_map(|f| field_text(f, "name", source))
                .collect()
        })
        .unwrap_or_default();

    el.set_list(META_METHODS, methods);
    el.set_list(META_BASES, bases);
    el.set_list(META_DECORATORS, decorators(node, source));
    Some(el)
}

/// `name = lambda ...` is documented under the bound name; bare lambdas are
/// expressions, not definitions, and are skipped.
fn bound_lambda(node: Node, source: &[u8]) -> Option<CodeElement> {
    let right = node.child_by_field_name("right")?;
    if right.kind() != "lambda" {
        return None;
    }
    let left = node.child_by_field_name("left")?;
    if !matches!(left.kind(), "identifier" | "attribute") {
        return None;
    }
    let name = node_text(left, source);
    let mut el = element_for(right, Some(left), &name, ElementKind::Function, Language::Python);
    let params_node = right.child_by_field_name("parameters");
    let params_text = params_node.map(|p| node_text(p, source)).unwrap_or_default();
    el.signature = Some(collapse_whitespace(&format!("{name}({params_text})")));
    el.set_list(
        META_PARAMS,
        params_node.map(|p| param_names(p, source)).unwrap_or_default(),
    );
    el.set_list(META_DECORATORS, Vec::new());
    el.set_flag(META_IS_ASYNC, false);
    Some(el)
}

fn param_names(params: Node, source: &[u8]) -> Vec<String> {
    named_children(params)
        .into_iter()
        .filter_map(|p| match p.kind() {
            "identifier" | "list_splat_pattern" | "dictionary_splat_pattern" => {
                Some(node_text(p, source))
            }
            "typed_parameter" => named_children(p)
                .into_iter()
                .find(|c| {
                    matches!(
                        c.kind(),
                        "identifier" | "list_splat_pattern" | "dictionary_splat_pattern"
                    )
                })
                .map(|c| node_text(c, source)),
            "default_parameter" | "typed_default_parameter" => field_text(p, "name", source),
            _ => None,
        })
        .collect()
}

fn decorators(node: Node, source: &[u8]) -> Vec<String> {
    match node.parent() {
        Some(parent) if parent.kind() == "decorated_definition" => named_children(parent)
            .into_iter()
            .filter(|c| c.kind() == "decorator")
            .map(|d| decorator_name(&node_text(d, source)))
            .collect(),
        _ => Vec::new(),
    }
}

fn is_async(node: Node) -> bool {
    has_child_kind(node, "async")
}

fn docstring(node: Node, source: &[u8]) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = named_children(body)
        .into_iter()
        .find(|stmt| stmt.kind() != "comment")?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expr = first.named_child(0)?;
    if expr.kind() != "string" {
        return None;
    }
    let doc = clean_docstring(&node_text(expr, source));
    (!doc.is_empty()).then_some(doc)
}

#[cfg(test)]
mod tests {
    use super::super::tests::run;
    use crate::models::{ElementKind, Language};

    #[test]
    fn test_functions_in_source_order_with_lines() {
        let src = "\
def first(a, b):
    return a + b


def second():
    pass

def third(x: int = 3) -> int:
    return x
";
        let out = run(Language::Python, "py", src);
        let names: Vec<&str> = out.elements.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        let lines: Vec<usize> = out.elements.iter().map(|e| e.line_start).collect();
        assert_eq!(lines, vec![1, 5, 8]);
        assert_eq!(out.elements[0].line_end, Some(2));
        assert_eq!(out.elements[0].params(), vec!["a", "b"]);
        assert_eq!(
            out.elements[2].signature.as_deref(),
            Some("third(x: int = 3) -> int")
        );
        assert_eq!(out.elements[2].params(), vec!["x"]);
    }

    #[test]
    fn test_class_lists_methods_and_emits_them() {
        let src = "\
@dataclass
class Service(Base, metaclass=Meta):
    \"\"\"Handles requests.\"\"\"

    def start(self):
        pass

    @staticmethod
    async def stop(*args, **kwargs):
        pass
";
        let out = run(Language::Python, "py", src);
        assert_eq!(out.elements.len(), 3);
        let class = &out.elements[0];
        assert_eq!(class.kind, ElementKind::Type);
        assert_eq!(class.line_start, 2);
        assert_eq!(class.methods(), vec!["start", "stop"]);
        assert_eq!(class.bases(), vec!["Base"]);
        assert_eq!(class.decorators(), vec!["dataclass"]);
        assert_eq!(class.doc_comment.as_deref(), Some("Handles requests."));

        let stop = &out.elements[2];
        assert_eq!(stop.name, "stop");
        assert!(stop.is_async());
        assert_eq!(stop.decorators(), vec!["staticmethod"]);
        assert_eq!(stop.params(), vec!["*args", "**kwargs"]);
        assert_eq!(out.elements[1].params(), vec!["self"]);
    }

    #[test]
    fn test_comment_is_not_a_docstring() {
        let src = "# helper\ndef f():\n    return 1\n";
        let out = run(Language::Python, "py", src);
        assert_eq!(out.elements[0].doc_comment, None);
    }

    #[test]
    fn test_bound_lambda_takes_binding_name() {
        let src = "square = lambda x: x * x\nprint(list(map(lambda y: y, [1])))\n";
        let out = run(Language::Python, "py", src);
        assert_eq!(out.elements.len(), 1);
        assert_eq!(out.elements[0].name, "square");
        assert_eq!(out.elements[0].params(), vec!["x"]);
    }

    #[test]
    fn test_imports_in_order() {
        let src = "import os, sys as system\nfrom pathlib import Path\n";
        let out = run(Language::Python, "py", src);
        let targets: Vec<&str> = out.imports.iter().map(|i| i.target.as_str()).collect();
        assert_eq!(targets, vec!["os", "sys", "pathlib"]);
        assert_eq!(out.imports[2].line, 2);
    }
}
