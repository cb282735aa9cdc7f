use crate::ir::{Edge, Graph, Node};
use once_cell::sync::Lazy;
use regex::Regex;

static NODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*([A-Za-z0-9_:-]+)\s+"([^"]*)"\s*$"#).unwrap());
static EDGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z0-9_:-]+)\s*->\s*([A-Za-z0-9_:-]+)\s*:\s*(.+?)\s*$").unwrap()
});

/// A non-blank line that matched neither the node nor the edge grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 1-based line number.
    pub line: usize,
    pub text: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: unrecognized statement `{}`", self.line, self.text)
    }
}

/// Parses the diagram DSL. Lines matching neither grammar are dropped.
pub fn parse_dsl(input: &str) -> Graph {
    parse_dsl_with_diagnostics(input).0
}

/// Like [`parse_dsl`], also reporting skipped statements. Blank lines and
/// block delimiters (`name {` / `}`) are not reported.
pub fn parse_dsl_with_diagnostics(input: &str) -> (Graph, Vec<Diagnostic>) {
    let mut graph = Graph::new();
    let mut diagnostics = Vec::new();

    for (idx, line) in input.lines().enumerate() {
        if let Some(caps) = NODE_RE.captures(line) {
            let (top, bottom) = split_node_text(&caps[2]);
            let mut node = Node::new(&caps[1], top);
            if let Some(bottom) = bottom {
                node = node.with_bottom(bottom);
            }
            graph.insert_node(node);
            continue;
        }
        if let Some(caps) = EDGE_RE.captures(line) {
            let label = caps[3].trim().to_string();
            graph.push_edge(Edge::new(&caps[1], &caps[2], Some(label)));
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() || is_block_delimiter(trimmed) {
            continue;
        }
        diagnostics.push(Diagnostic {
            line: idx + 1,
            text: trimmed.to_string(),
        });
    }

    (graph, diagnostics)
}

fn split_node_text(text: &str) -> (String, Option<String>) {
    match text.split_once('|') {
        Some((top, bottom)) => (top.trim().to_string(), Some(bottom.trim().to_string())),
        None => (text.trim().to_string(), None),
    }
}

fn is_block_delimiter(line: &str) -> bool {
    line == "}" || line.ends_with('{')
}
