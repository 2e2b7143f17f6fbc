//! Tree-walking helpers shared by the per-language extractors.

use std::path::{Component, Path};

use tree_sitter::Node;

use crate::models::{CodeElement, ElementKind, Language};

// ---------------------------------------------------------------------------
// Node access
// ---------------------------------------------------------------------------

/// Source text of a node. Extraction only runs on validated UTF-8, so the
/// lossy path is never taken in practice.
pub fn node_text(node: Node, source: &[u8]) -> String {
    node.utf8_text(source)
        .map(str::to_string)
        .unwrap_or_else(|_| String::from_utf8_lossy(&source[node.byte_range()]).into_owned())
}

pub fn field_text(node: Node, field: &str, source: &[u8]) -> Option<String> {
    node.child_by_field_name(field).map(|n| node_text(n, source))
}

/// 1-based line of a node's first byte.
pub fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

/// 1-based line of a node's last byte.
pub fn end_line_of(node: Node) -> usize {
    let end = node.end_position();
    if end.column == 0 && end.row > node.start_position().row {
        end.row
    } else {
        end.row + 1
    }
}

pub fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

pub fn children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub fn has_child_kind(node: Node, kind: &str) -> bool {
    children(node).iter().any(|c| c.kind() == kind)
}

// ---------------------------------------------------------------------------
// Element construction
// ---------------------------------------------------------------------------

/// Start an element anchored on `node`, using `name_node` (when present) as
/// the defining token for `line_start`.
pub fn element_for(
    node: Node,
    name_node: Option<Node>,
    name: &str,
    kind: ElementKind,
    language: Language,
) -> CodeElement {
    let line_start = line_of(name_node.unwrap_or(node));
    let mut element = CodeElement::new(name, kind, language, line_start);
    element.line_end = Some(end_line_of(node).max(element.line_start));
    element
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Source text from the start of `from` up to the start of `until` (or the
/// end of `from` when `until` is `None`), with trailing `{`, `;` or `:`
/// removed and whitespace collapsed.
pub fn header_text(from: Node, until: Option<Node>, source: &[u8]) -> String {
    let end = until.map(|n| n.start_byte()).unwrap_or_else(|| from.end_byte());
    text_between(from.start_byte(), end, source)
}

/// Byte range of `source` rendered the same way as [`header_text`].
pub fn text_between(start: usize, end: usize, source: &[u8]) -> String {
    let end = end.min(source.len());
    if end <= start {
        return String::new();
    }
    let raw = String::from_utf8_lossy(&source[start..end]);
    let trimmed = raw
        .trim()
        .trim_end_matches(|c: char| c == '{' || c == ';' || c == ':')
        .trim_end();
    collapse_whitespace(trimmed)
}

/// Name of a decorator or annotation without its marker and arguments:
/// `@app.route("/")` becomes `app.route`.
pub fn decorator_name(text: &str) -> String {
    let trimmed = text.trim().trim_start_matches('@').trim_start_matches("#[");
    let end = trimmed
        .find(|c: char| c == '(' || c == ']' || c.is_whitespace())
        .unwrap_or(trimmed.len());
    trimmed[..end].to_string()
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

const COMMENT_KINDS: &[&str] = &["comment", "line_comment", "block_comment"];

pub fn is_comment(node: Node) -> bool {
    COMMENT_KINDS.contains(&node.kind())
}

/// The comment block directly above `anchor`.
///
/// Walks previous siblings while each one ends on the line just above (or on
/// the same line as) the next. Siblings whose kind is in `transparent` (e.g.
/// attributes) are stepped over without breaking adjacency. The walk stops at
/// the first comment rejected by `accept`, at a blank line, or at any other
/// token. Comment text is returned raw, one comment per line.
pub fn doc_comment_before(
    anchor: Node,
    source: &[u8],
    transparent: &[&str],
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    let mut expected_row = anchor.start_position().row;
    let mut collected: Vec<String> = Vec::new();
    let mut current = anchor.prev_sibling();

    while let Some(sibling) = current {
        let end_row = end_line_of(sibling) - 1;
        if end_row + 1 < expected_row {
            break;
        }
        if is_comment(sibling) {
            let text = node_text(sibling, source);
            if !accept(&text) {
                break;
            }
            collected.push(text.trim_end().to_string());
        } else if !transparent.contains(&sibling.kind()) {
            break;
        }
        expected_row = sibling.start_position().row;
        current = sibling.prev_sibling();
    }

    if collected.is_empty() {
        return None;
    }
    collected.reverse();
    Some(collected.join("\n"))
}

/// Python docstring literal with its prefix and quotes removed and its
/// indentation normalised.
pub fn clean_docstring(raw: &str) -> String {
    let body = raw.trim_start_matches(|c: char| "rRuUbBfF".contains(c));
    let body = ["\"\"\"", "'''", "\"", "'"]
        .iter()
        .find_map(|q| {
            body.strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q))
        })
        .unwrap_or(body);

    let lines: Vec<&str> = body.lines().collect();
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let dedented = if i == 0 { None } else { line.get(indent..) };
        match dedented {
            Some(rest) => cleaned.push(rest.trim_end().to_string()),
            None => cleaned.push(line.trim().to_string()),
        }
    }
    while cleaned.last().is_some_and(|l| l.is_empty()) {
        cleaned.pop();
    }
    while cleaned.first().is_some_and(|l| l.is_empty()) {
        cleaned.remove(0);
    }
    cleaned.join("\n")
}

// ---------------------------------------------------------------------------
// Module naming
// ---------------------------------------------------------------------------

/// Dotted module name of `path` relative to `root`. Components are joined
/// with dots and the extension is kept, so `util.c` and `util.h` stay
/// distinct (`src/app/api.py` becomes `src.app.api.py`).
pub fn module_name(path: &Path, root: &Path) -> String {
    let parts = relative_parts(path, root);
    if parts.is_empty() {
        "index".to_string()
    } else {
        parts.join(".")
    }
}

/// Slash-separated page location of `path` relative to `root`, mirroring the
/// source tree (`src/app/api.py` stays `src/app/api.py`).
pub fn page_stem(path: &Path, root: &Path) -> String {
    let parts = relative_parts(path, root);
    if parts.is_empty() {
        "index".to_string()
    } else {
        parts.join("/")
    }
}

fn relative_parts(path: &Path, root: &Path) -> Vec<String> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(os) => Some(os.to_string_lossy().into_owned()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
