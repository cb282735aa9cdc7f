//! draw.io (mxGraph) XML export.

use std::fmt::Write as _;

use crate::ir::Graph;
use crate::layout::LaidOutGraph;

#[derive(Debug, Clone, PartialEq)]
pub struct DrawioNode {
    pub id: String,
    pub label: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawioEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawioGraph {
    pub nodes: Vec<DrawioNode>,
    pub edges: Vec<DrawioEdge>,
}

impl DrawioGraph {
    /// Nodes come from the layout; edges from the source graph, so edges the
    /// engine could not place still reserve their cell id.
    pub fn from_layout(graph: &Graph, layout: &LaidOutGraph) -> Self {
        let nodes = layout
            .nodes
            .iter()
            .map(|node| DrawioNode {
                id: node.id.clone(),
                label: match &node.bottom {
                    Some(bottom) => format!("{}\n{}", node.top, bottom),
                    None => node.top.clone(),
                },
                x: node.x,
                y: node.y,
                width: node.width,
                height: node.height,
            })
            .collect();
        let edges = graph
            .edges
            .iter()
            .map(|edge| DrawioEdge {
                id: edge.id.clone(),
                from: edge.from.clone(),
                to: edge.to.clone(),
                label: edge.label.clone(),
            })
            .collect();
        Self { nodes, edges }
    }
}

pub fn to_drawio_xml(graph: &DrawioGraph) -> String {
    // Cells 0 and 1 are the root and the default layer.
    let mut next_id = 2usize;
    let mut cell_ids = std::collections::HashMap::with_capacity(graph.nodes.len());
    for node in &graph.nodes {
        cell_ids.insert(node.id.as_str(), next_id);
        next_id += 1;
    }

    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str("<mxfile host=\"app.diagrams.net\">\n");
    xml.push_str("  <diagram id=\"diagram-1\" name=\"Page-1\">\n");
    xml.push_str("    <mxGraphModel>\n");
    xml.push_str("      <root>\n");
    xml.push_str("        <mxCell id=\"0\"/>\n");
    xml.push_str("        <mxCell id=\"1\" parent=\"0\"/>\n");

    for (idx, node) in graph.nodes.iter().enumerate() {
        let _ = writeln!(
            xml,
            "        <mxCell id=\"{}\" value=\"{}\" style=\"rounded=1;whiteSpace=wrap;html=1;\" vertex=\"1\" parent=\"1\">",
            idx + 2,
            escape_xml(&node.label)
        );
        let _ = writeln!(
            xml,
            "          <mxGeometry x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" as=\"geometry\"/>",
            fmt_num(node.x),
            fmt_num(node.y),
            fmt_num(node.width),
            fmt_num(node.height)
        );
        xml.push_str("        </mxCell>\n");
    }

    for edge in &graph.edges {
        let edge_id = next_id;
        next_id += 1;
        let (Some(source), Some(target)) =
            (cell_ids.get(edge.from.as_str()), cell_ids.get(edge.to.as_str()))
        else {
            tracing::debug!(edge = %edge.id, "skipping edge with unresolved endpoint");
            continue;
        };
        let _ = writeln!(
            xml,
            "        <mxCell id=\"{edge_id}\" value=\"{}\" style=\"endArrow=block;endFill=1;html=1;\" edge=\"1\" parent=\"1\" source=\"{source}\" target=\"{target}\">",
            escape_xml(edge.label.as_deref().unwrap_or(""))
        );
        xml.push_str("          <mxGeometry relative=\"1\" as=\"geometry\"/>\n");
        xml.push_str("        </mxCell>\n");
    }

    xml.push_str("      </root>\n");
    xml.push_str("    </mxGraphModel>\n");
    xml.push_str("  </diagram>\n");
    xml.push_str("</mxfile>\n");
    xml
}

/// Attribute-safe text; line breaks become `&#xa;` so draw.io keeps them.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\n' => out.push_str("&#xa;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Whole numbers without a fraction, everything else to two decimals.
fn fmt_num(value: f32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.2}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, label: &str) -> DrawioNode {
        DrawioNode {
            id: id.to_string(),
            label: label.to_string(),
            x: 0.0,
            y: 0.0,
            width: 100.0,
            height: 50.0,
        }
    }

    #[test]
    fn single_node_exports_one_vertex_and_root_cells() {
        let graph = DrawioGraph {
            nodes: vec![node("A", "X")],
            edges: Vec::new(),
        };
        let xml = to_drawio_xml(&graph);
        assert!(xml.contains("<mxCell id=\"0\"/>"));
        assert!(xml.contains("<mxCell id=\"1\" parent=\"0\"/>"));
        assert_eq!(xml.matches("vertex=\"1\"").count(), 1);
        assert!(xml.contains("id=\"2\" value=\"X\""));
        assert!(xml.contains("x=\"0\" y=\"0\" width=\"100\" height=\"50\""));
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<mxfile host=\"app.diagrams.net\">"));
        assert!(xml.ends_with("</mxfile>\n"));
    }

    #[test]
    fn labels_are_escaped() {
        let graph = DrawioGraph {
            nodes: vec![node("A", "A & B \"C\"")],
            edges: Vec::new(),
        };
        let xml = to_drawio_xml(&graph);
        assert!(xml.contains("value=\"A &amp; B &quot;C&quot;\""));
        assert_eq!(escape_xml("<it's>\nnext"), "&lt;it&apos;s&gt;&#xa;next");
    }

    #[test]
    fn unresolved_edges_are_skipped_but_keep_their_id() {
        let graph = DrawioGraph {
            nodes: vec![node("A", "a"), node("B", "b")],
            edges: vec![
                DrawioEdge {
                    id: "A-Ghost-x".to_string(),
                    from: "A".to_string(),
                    to: "Ghost".to_string(),
                    label: Some("x".to_string()),
                },
                DrawioEdge {
                    id: "A-B-ok".to_string(),
                    from: "A".to_string(),
                    to: "B".to_string(),
                    label: Some("ok".to_string()),
                },
            ],
        };
        let xml = to_drawio_xml(&graph);
        assert_eq!(xml.matches("edge=\"1\"").count(), 1);
        assert!(!xml.contains("id=\"4\""));
        assert!(xml.contains("id=\"5\" value=\"ok\""));
        assert!(xml.contains("source=\"2\" target=\"3\""));
    }

    #[test]
    fn fractional_geometry_is_trimmed() {
        assert_eq!(fmt_num(12.5), "12.5");
        assert_eq!(fmt_num(12.25), "12.25");
        assert_eq!(fmt_num(-3.0), "-3");
    }
}
