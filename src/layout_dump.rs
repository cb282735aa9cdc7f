use crate::layout::{LabelBox, LaidOutGraph};
use serde::Serialize;

/// Geometry handed to downstream exporters (slides and the like).
#[derive(Debug, Serialize)]
pub struct LayoutDump {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<NodeDump>,
    pub edges: Vec<EdgeDump>,
}

#[derive(Debug, Serialize)]
pub struct NodeDump {
    pub id: String,
    /// Both lines joined by a newline.
    pub label: String,
    pub top: String,
    pub bottom: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Serialize)]
pub struct EdgeDump {
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub points: Vec<[f32; 2]>,
    pub label_box: Option<LabelBoxDump>,
}

#[derive(Debug, Serialize)]
pub struct LabelBoxDump {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<&LabelBox> for LabelBoxDump {
    fn from(label: &LabelBox) -> Self {
        Self {
            x: label.x,
            y: label.y,
            width: label.width,
            height: label.height,
        }
    }
}

impl LayoutDump {
    pub fn from_layout(layout: &LaidOutGraph) -> Self {
        let nodes = layout
            .nodes
            .iter()
            .map(|node| NodeDump {
                id: node.id.clone(),
                label: match &node.bottom {
                    Some(bottom) => format!("{}\n{}", node.top, bottom),
                    None => node.top.clone(),
                },
                top: node.top.clone(),
                bottom: node.bottom.clone(),
                x: node.x,
                y: node.y,
                width: node.width,
                height: node.height,
            })
            .collect();

        let edges = layout
            .edges
            .iter()
            .map(|edge| EdgeDump {
                id: edge.id.clone(),
                from: edge.from.clone(),
                to: edge.to.clone(),
                label: edge.label.clone(),
                points: edge.points.iter().map(|p| [p.x, p.y]).collect(),
                label_box: edge.label_box.as_ref().map(LabelBoxDump::from),
            })
            .collect();

        LayoutDump {
            width: layout.width,
            height: layout.height,
            nodes,
            edges,
        }
    }
}

pub fn to_json(layout: &LaidOutGraph) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&LayoutDump::from_layout(layout))?)
}
