use std::collections::{HashMap, HashSet};

use crate::config::LayoutConfig;
use crate::ir::Graph;
use crate::text_metrics::TextMeasurer;

use super::ports::{PortAllocation, allocate_ports};
use super::request::{
    LayoutRequest, LayoutResponse, PortConstraints, RequestEdge, RequestLabel, RequestNode,
    RequestPort,
};
use super::sizing::{size_edge_label, size_node};
use super::{LabelBox, LaidOutEdge, LaidOutGraph, LaidOutNode, Point, PortLayout, Size};

/// Everything computed before the engine call that the response is mapped
/// back against.
#[derive(Debug, Clone)]
pub struct PreparedLayout {
    pub request: LayoutRequest,
    pub sizes: HashMap<String, Size>,
    pub ports: PortAllocation,
    /// Edges left out of the request because an endpoint does not exist.
    pub skipped_edges: Vec<String>,
}

pub fn build_request(
    graph: &Graph,
    config: &LayoutConfig,
    measurer: &dyn TextMeasurer,
) -> PreparedLayout {
    let ports = allocate_ports(graph);
    let mut sizes = HashMap::with_capacity(graph.nodes.len());

    let nodes: Vec<RequestNode> = graph
        .nodes
        .iter()
        .map(|node| {
            let size = size_node(node, measurer, &config.sizing);
            sizes.insert(node.id.clone(), size);
            RequestNode {
                id: node.id.clone(),
                width: size.width,
                height: size.height,
                ports: ports
                    .ports_of(&node.id)
                    .iter()
                    .map(|port| RequestPort {
                        id: port.id.clone(),
                        side: port.side,
                    })
                    .collect(),
                port_constraints: PortConstraints::FixedSide,
            }
        })
        .collect();

    let known: HashSet<&str> = graph.nodes.iter().map(|node| node.id.as_str()).collect();
    let mut skipped_edges = Vec::new();
    let mut edges = Vec::with_capacity(graph.edges.len());
    for (edge, assigned) in graph.edges.iter().zip(&ports.edges) {
        if !known.contains(edge.from.as_str()) || !known.contains(edge.to.as_str()) {
            tracing::debug!(edge = %edge.id, from = %edge.from, to = %edge.to, "edge endpoint missing; leaving it out of the layout");
            skipped_edges.push(edge.id.clone());
            continue;
        }
        let label = edge.label.as_deref().filter(|text| !text.is_empty()).map(|text| {
            let size = size_edge_label(text, measurer, &config.edge_labels);
            RequestLabel {
                id: format!("{}.label", edge.id),
                text: text.to_string(),
                width: size.width,
                height: size.height,
            }
        });
        edges.push(RequestEdge {
            id: edge.id.clone(),
            source: assigned.source.id.clone(),
            target: assigned.target.id.clone(),
            label,
        });
    }

    PreparedLayout {
        request: LayoutRequest {
            id: "root".to_string(),
            options: config.engine.clone(),
            nodes,
            edges,
        },
        sizes,
        ports,
        skipped_edges,
    }
}

/// Resolves every input node and edge against the engine response. Nodes the
/// engine did not place sit at the origin; edges it did not route are
/// dropped.
pub fn map_response(graph: &Graph, prepared: &PreparedLayout, response: LayoutResponse) -> LaidOutGraph {
    let placed_nodes: HashMap<&str, _> = response
        .nodes
        .iter()
        .map(|node| (node.id.as_str(), node))
        .collect();

    let nodes: Vec<LaidOutNode> = graph
        .nodes
        .iter()
        .map(|node| {
            let placed = placed_nodes.get(node.id.as_str());
            let (x, y) = placed.map(|p| (p.x, p.y)).unwrap_or((0.0, 0.0));
            let size = prepared.sizes.get(&node.id).copied().unwrap_or_default();
            let placed_ports: HashMap<&str, (f32, f32)> = placed
                .map(|p| p.ports.iter().map(|port| (port.id.as_str(), (port.x, port.y))).collect())
                .unwrap_or_default();
            let ports = prepared
                .ports
                .ports_of(&node.id)
                .iter()
                .filter_map(|port| {
                    let (px, py) = placed_ports.get(port.id.as_str())?;
                    Some(PortLayout {
                        id: port.id.clone(),
                        side: port.side,
                        index: port.index,
                        position: Point::new(x + px, y + py),
                    })
                })
                .collect();
            if placed.is_none() {
                tracing::debug!(node = %node.id, "engine did not place node; defaulting to origin");
            }
            LaidOutNode {
                id: node.id.clone(),
                top: node.top.clone(),
                bottom: node.bottom.clone(),
                x,
                y,
                width: size.width,
                height: size.height,
                ports,
            }
        })
        .collect();

    let routed: HashMap<&str, _> = response
        .edges
        .iter()
        .map(|edge| (edge.id.as_str(), edge))
        .collect();
    let edges: Vec<LaidOutEdge> = graph
        .edges
        .iter()
        .zip(&prepared.ports.edges)
        .filter_map(|(edge, assigned)| {
            let route = routed.get(edge.id.as_str())?;
            let label_box = match (edge.label.as_ref(), route.labels.first()) {
                (Some(text), Some(placed)) => Some(LabelBox {
                    text: text.clone(),
                    x: placed.x,
                    y: placed.y,
                    width: placed.width,
                    height: placed.height,
                }),
                _ => None,
            };
            Some(LaidOutEdge {
                id: edge.id.clone(),
                from: edge.from.clone(),
                to: edge.to.clone(),
                label: edge.label.clone(),
                source_port: assigned.source.id.clone(),
                target_port: assigned.target.id.clone(),
                points: route.points(),
                label_box,
            })
        })
        .collect();

    let (content_width, content_height) = nodes.iter().fold((0.0f32, 0.0f32), |(w, h), node| {
        (w.max(node.x + node.width), h.max(node.y + node.height))
    });

    LaidOutGraph {
        width: response.width.max(content_width),
        height: response.height.max(content_height),
        nodes,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, Node};
    use crate::layout::request::{EdgeSection, PlacedNode, PlacedPort, RoutedEdge};
    use crate::text_metrics::HeuristicMeasurer;

    fn sample() -> Graph {
        Graph {
            nodes: vec![
                Node::new("A", "Alpha").with_bottom("first"),
                Node::new("B", "Beta"),
            ],
            edges: vec![
                Edge::new("A", "B", Some("ok".to_string())),
                Edge::new("A", "Ghost", Some("lost".to_string())),
                Edge::new("B", "A", None),
            ],
        }
    }

    #[test]
    fn request_mirrors_graph_and_skips_dangling_edges() {
        let prepared = build_request(&sample(), &LayoutConfig::default(), &HeuristicMeasurer);
        let request = &prepared.request;
        assert_eq!(request.nodes.len(), 2);
        assert_eq!(request.nodes[0].height, 96.0);
        assert_eq!(request.nodes[1].height, 56.0);
        assert_eq!(request.nodes[0].port_constraints, PortConstraints::FixedSide);
        // A: two outbound (one dangling) and one inbound.
        assert_eq!(request.nodes[0].ports.len(), 3);
        assert_eq!(request.edges.len(), 2);
        assert_eq!(request.edges[0].source, "A.E0");
        assert_eq!(request.edges[0].target, "B.W0");
        assert_eq!(request.edges[0].label.as_ref().unwrap().height, 20.0);
        assert!(request.edges[1].label.is_none());
        assert_eq!(prepared.skipped_edges, vec!["A-Ghost-lost".to_string()]);
    }

    #[test]
    fn mapping_defaults_missing_nodes_and_drops_missing_edges() {
        let graph = sample();
        let prepared = build_request(&graph, &LayoutConfig::default(), &HeuristicMeasurer);
        let response = LayoutResponse {
            width: 600.0,
            height: 200.0,
            nodes: vec![PlacedNode {
                id: "A".to_string(),
                x: 12.0,
                y: 30.0,
                width: 1.0,
                height: 1.0,
                ports: vec![PlacedPort {
                    id: "A.E0".to_string(),
                    x: 220.0,
                    y: 48.0,
                }],
            }],
            edges: vec![RoutedEdge {
                id: "A-B-ok".to_string(),
                sections: vec![EdgeSection {
                    start: Point::new(232.0, 78.0),
                    bend_points: vec![],
                    end: Point::new(400.0, 78.0),
                }],
                labels: vec![],
            }],
        };
        let laid_out = map_response(&graph, &prepared, response);

        let a = &laid_out.nodes[0];
        assert_eq!((a.x, a.y), (12.0, 30.0));
        // Computed size wins over whatever the engine echoes back.
        assert_eq!(a.height, 96.0);
        assert_eq!(a.ports.len(), 1);
        assert_eq!(a.ports[0].position, Point::new(232.0, 78.0));

        let b = &laid_out.nodes[1];
        assert_eq!((b.x, b.y), (0.0, 0.0));

        assert_eq!(laid_out.edges.len(), 1);
        assert_eq!(laid_out.edges[0].id, "A-B-ok");
        assert_eq!(laid_out.edges[0].source_port, "A.E0");
        assert!(laid_out.edges[0].label_box.is_none());
        assert_eq!(laid_out.width, 600.0);
    }
}
