use serde::{Deserialize, Serialize};

/// A box in the diagram. `top` is the heading line, `bottom` the optional
/// subtitle rendered under a divider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub top: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, top: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            top: top.into(),
            bottom: None,
        }
    }

    pub fn with_bottom(mut self, bottom: impl Into<String>) -> Self {
        let bottom = bottom.into();
        self.bottom = if bottom.is_empty() { None } else { Some(bottom) };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Builds an edge whose id is synthesized as `from-to-label`.
    pub fn new(from: impl Into<String>, to: impl Into<String>, label: Option<String>) -> Self {
        let from = from.into();
        let to = to.into();
        let label = label.filter(|l| !l.is_empty());
        let id = format!("{}-{}-{}", from, to, label.as_deref().unwrap_or(""));
        Self {
            id,
            from,
            to,
            label,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Adds a node, replacing the text of an existing node with the same id
    /// so ids stay unique while the first declaration keeps its position.
    pub fn insert_node(&mut self, node: Node) {
        if let Some(existing) = self.nodes.iter_mut().find(|n| n.id == node.id) {
            existing.top = node.top;
            existing.bottom = node.bottom;
        } else {
            self.nodes.push(node);
        }
    }

    /// Appends an edge. A repeated synthesized id gets an occurrence suffix
    /// (`A-B-ok#2`) so every edge id in the graph is distinct.
    pub fn push_edge(&mut self, mut edge: Edge) {
        let base = edge.id.clone();
        let mut occurrence = 1;
        while self.edges.iter().any(|existing| existing.id == edge.id) {
            occurrence += 1;
            edge.id = format!("{base}#{occurrence}");
        }
        self.edges.push(edge);
    }
}

/// Which boundary of a node a port sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PortSide {
    /// Outbound side; east for left-to-right flow.
    Outbound,
    /// Inbound side; west for left-to-right flow.
    Inbound,
}

impl PortSide {
    pub fn elk_side(self) -> &'static str {
        match self {
            Self::Outbound => "EAST",
            Self::Inbound => "WEST",
        }
    }

    pub fn from_elk_side(token: &str) -> Option<Self> {
        match token {
            "EAST" => Some(Self::Outbound),
            "WEST" => Some(Self::Inbound),
            _ => None,
        }
    }

    fn tag(self) -> char {
        match self {
            Self::Outbound => 'E',
            Self::Inbound => 'W',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Port {
    pub id: String,
    pub node: String,
    pub side: PortSide,
    pub index: usize,
}

impl Port {
    pub fn new(node: &str, side: PortSide, index: usize) -> Self {
        Self {
            id: format!("{}.{}{}", node, side.tag(), index),
            node: node.to_string(),
            side,
            index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_id_is_synthesized_from_endpoints_and_label() {
        let edge = Edge::new("A", "B", Some("ok".to_string()));
        assert_eq!(edge.id, "A-B-ok");
        let bare = Edge::new("A", "B", None);
        assert_eq!(bare.id, "A-B-");
        assert!(bare.label.is_none());
    }

    #[test]
    fn insert_node_keeps_ids_unique() {
        let mut graph = Graph::new();
        graph.insert_node(Node::new("A", "first"));
        graph.insert_node(Node::new("B", "b"));
        graph.insert_node(Node::new("A", "second").with_bottom("sub"));
        assert_eq!(graph.nodes.len(), 2);
        assert_eq!(graph.nodes[0].top, "second");
        assert_eq!(graph.nodes[0].bottom.as_deref(), Some("sub"));
    }

    #[test]
    fn port_ids_encode_side_and_index() {
        assert_eq!(Port::new("E22", PortSide::Outbound, 0).id, "E22.E0");
        assert_eq!(Port::new("E22", PortSide::Inbound, 3).id, "E22.W3");
    }

    #[test]
    fn empty_bottom_is_no_bottom() {
        let node = Node::new("A", "X").with_bottom("");
        assert!(node.bottom.is_none());
        assert_eq!(node.top, "X");
    }

    #[test]
    fn repeated_edges_get_distinct_ids() {
        let mut graph = Graph::new();
        for _ in 0..3 {
            graph.push_edge(Edge::new("A", "B", Some("ok".to_string())));
        }
        graph.push_edge(Edge::new("A", "B", None));
        let ids: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["A-B-ok", "A-B-ok#2", "A-B-ok#3", "A-B-"]);
    }
}
