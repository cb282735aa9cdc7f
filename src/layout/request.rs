//! Request and response of one layout engine call.
//!
//! The shapes mirror the ELK JSON graph format closely enough that
//! [`LayoutRequest::to_elk_json`] and [`LayoutResponse::from_elk_json`] are
//! thin conversions. Section points and label boxes are absolute; port
//! positions are relative to their node, as in ELK.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::EngineOptions;
use crate::ir::PortSide;

use super::Point;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortConstraints {
    /// Side is fixed; the engine picks the offset along the side.
    FixedSide,
}

impl PortConstraints {
    pub fn elk_name(self) -> &'static str {
        match self {
            Self::FixedSide => "FIXED_SIDE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPort {
    pub id: String,
    pub side: PortSide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestNode {
    pub id: String,
    pub width: f32,
    pub height: f32,
    pub ports: Vec<RequestPort>,
    pub port_constraints: PortConstraints,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestLabel {
    pub id: String,
    pub text: String,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEdge {
    pub id: String,
    /// Source port id.
    pub source: String,
    /// Target port id.
    pub target: String,
    pub label: Option<RequestLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutRequest {
    pub id: String,
    pub options: EngineOptions,
    pub nodes: Vec<RequestNode>,
    pub edges: Vec<RequestEdge>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedPort {
    pub id: String,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedNode {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub ports: Vec<PlacedPort>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSection {
    pub start: Point,
    pub bend_points: Vec<Point>,
    pub end: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedLabel {
    pub id: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedEdge {
    pub id: String,
    pub sections: Vec<EdgeSection>,
    pub labels: Vec<PlacedLabel>,
}

impl RoutedEdge {
    /// All section points as one polyline.
    pub fn points(&self) -> Vec<Point> {
        let mut points = Vec::new();
        for section in &self.sections {
            points.push(section.start);
            points.extend(section.bend_points.iter().copied());
            points.push(section.end);
        }
        points
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LayoutResponse {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<PlacedNode>,
    pub edges: Vec<RoutedEdge>,
}

impl LayoutRequest {
    pub fn elk_layout_options(&self) -> Map<String, Value> {
        let opts = &self.options;
        let mut map = Map::new();
        map.insert("elk.algorithm".into(), "layered".into());
        map.insert("elk.direction".into(), opts.direction.elk_name().into());
        map.insert("elk.spacing.nodeNode".into(), opts.node_spacing.to_string().into());
        map.insert(
            "elk.layered.spacing.nodeNodeBetweenLayers".into(),
            opts.layer_spacing.to_string().into(),
        );
        map.insert(
            "elk.layered.edgeRouting".into(),
            opts.edge_routing.elk_name().into(),
        );
        map.insert(
            "elk.edgeSpacing.factor".into(),
            opts.edge_spacing_factor.to_string().into(),
        );
        map.insert(
            "elk.layered.considerModelOrder".into(),
            opts.consider_model_order.to_string().into(),
        );
        map
    }

    /// The request as an ELK JSON graph, ready for `elk.layout(...)`.
    pub fn to_elk_json(&self) -> Value {
        let children: Vec<Value> = self
            .nodes
            .iter()
            .map(|node| {
                let ports: Vec<Value> = node
                    .ports
                    .iter()
                    .map(|port| {
                        json!({
                            "id": port.id,
                            "properties": { "elk.port.side": port.side.elk_side() },
                        })
                    })
                    .collect();
                json!({
                    "id": node.id,
                    "width": node.width,
                    "height": node.height,
                    "ports": ports,
                    "layoutOptions": { "elk.portConstraints": node.port_constraints.elk_name() },
                })
            })
            .collect();
        let edges: Vec<Value> = self
            .edges
            .iter()
            .map(|edge| {
                let labels: Vec<Value> = edge
                    .label
                    .iter()
                    .map(|label| {
                        json!({
                            "id": label.id,
                            "text": label.text,
                            "width": label.width,
                            "height": label.height,
                        })
                    })
                    .collect();
                json!({
                    "id": edge.id,
                    "sources": [edge.source],
                    "targets": [edge.target],
                    "labels": labels,
                })
            })
            .collect();
        json!({
            "id": self.id,
            "layoutOptions": Value::Object(self.elk_layout_options()),
            "children": children,
            "edges": edges,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElkGraph {
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default)]
    children: Vec<ElkNode>,
    #[serde(default)]
    edges: Vec<ElkEdge>,
}

#[derive(Debug, Deserialize)]
struct ElkNode {
    id: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default)]
    ports: Vec<ElkPort>,
}

#[derive(Debug, Deserialize)]
struct ElkPort {
    id: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElkEdge {
    id: String,
    #[serde(default)]
    sections: Vec<ElkSection>,
    #[serde(default)]
    labels: Vec<ElkLabel>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ElkSection {
    start_point: Point,
    end_point: Point,
    #[serde(default)]
    bend_points: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct ElkLabel {
    #[serde(default)]
    id: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
}

impl LayoutResponse {
    /// Reads an ELK layout result. Missing coordinates default to zero.
    pub fn from_elk_json(value: Value) -> Result<Self, serde_json::Error> {
        let graph: ElkGraph = serde_json::from_value(value)?;
        let nodes: Vec<PlacedNode> = graph
            .children
            .into_iter()
            .map(|node| PlacedNode {
                id: node.id,
                x: node.x,
                y: node.y,
                width: node.width,
                height: node.height,
                ports: node
                    .ports
                    .into_iter()
                    .map(|port| PlacedPort {
                        id: port.id,
                        x: port.x,
                        y: port.y,
                    })
                    .collect(),
            })
            .collect();
        let edges: Vec<RoutedEdge> = graph
            .edges
            .into_iter()
            .map(|edge| RoutedEdge {
                id: edge.id,
                sections: edge
                    .sections
                    .into_iter()
                    .map(|section| EdgeSection {
                        start: section.start_point,
                        bend_points: section.bend_points,
                        end: section.end_point,
                    })
                    .collect(),
                labels: edge
                    .labels
                    .into_iter()
                    .map(|label| PlacedLabel {
                        id: label.id,
                        x: label.x,
                        y: label.y,
                        width: label.width,
                        height: label.height,
                    })
                    .collect(),
            })
            .collect();
        let (width, height) = match (graph.width, graph.height) {
            (Some(w), Some(h)) => (w, h),
            _ => nodes.iter().fold((0.0f32, 0.0f32), |(w, h), node| {
                (w.max(node.x + node.width), h.max(node.y + node.height))
            }),
        };
        Ok(Self {
            width,
            height,
            nodes,
            edges,
        })
    }
}
