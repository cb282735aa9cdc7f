//! Graphviz DOT export. Nodes are plaintext shapes whose label is an HTML
//! table: a small top row and a larger bottom row, or a single cell.

use std::fmt::Write as _;

use crate::ir::{Graph, Node};

pub fn to_dot(graph: &Graph, font: &str) -> String {
    let font = font.replace('"', "");
    let mut out = String::new();
    out.push_str("digraph G {\n");
    let _ = writeln!(out, "  graph [rankdir=LR, charset=\"UTF-8\", fontname=\"{font}\"];");
    let _ = writeln!(out, "  node [shape=plaintext, margin=\"0,0\", fontname=\"{font}\"];");

    for node in &graph.nodes {
        let _ = writeln!(out, "  {} [label={}];", dot_id(&node.id), node_label(node, &font));
    }

    for edge in &graph.edges {
        let (from, to) = (dot_id(&edge.from), dot_id(&edge.to));
        match edge.label.as_deref().filter(|label| !label.is_empty()) {
            Some(label) => {
                let label = html_escape(label).replace('"', "\\\"");
                let _ = writeln!(out, "  {from} -> {to} [label=\"{label}\"];");
            }
            None => {
                let _ = writeln!(out, "  {from} -> {to};");
            }
        }
    }

    out.push('}');
    out
}

fn node_label(node: &Node, font: &str) -> String {
    let top = html_escape(&node.top);
    match &node.bottom {
        Some(bottom) => format!(
            "<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">\n      \
             <TR><TD CELLPADDING=\"3\" SIDES=\"TLRB\"><FONT FACE=\"{font}\" POINT-SIZE=\"11\">{top}</FONT></TD></TR>\n      \
             <TR><TD CELLPADDING=\"3\" SIDES=\"BLR\"><FONT FACE=\"{font}\" POINT-SIZE=\"13\">{}</FONT></TD></TR>\n    \
             </TABLE>\n  >",
            html_escape(bottom)
        ),
        None => format!(
            "<\n    <TABLE BORDER=\"0\" CELLBORDER=\"1\" CELLSPACING=\"0\">\n      \
             <TR><TD CELLPADDING=\"4\"><FONT FACE=\"{font}\" POINT-SIZE=\"12\">{top}</FONT></TD></TR>\n    \
             </TABLE>\n  >"
        ),
    }
}

/// Bare when the id is a plain DOT identifier, quoted otherwise (`:` and `-`
/// are legal in graph ids but not in bare DOT ids).
fn dot_id(id: &str) -> String {
    let plain = !id.is_empty()
        && !id.starts_with(|c: char| c.is_ascii_digit())
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        id.to_string()
    } else {
        format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Escapes the characters HTML-like labels cannot hold literally.
pub fn html_escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
