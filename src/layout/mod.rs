//! Layout pipeline: size nodes, allocate ports, ask a layered layout engine
//! for geometry, and map the answer back onto the input graph.

pub mod adapter;
pub mod engine;
mod error;
pub mod layered;
pub mod ports;
pub mod request;
pub mod sizing;

pub use adapter::{PreparedLayout, build_request, map_response};
pub use engine::{ElkProcessEngine, LayoutEngine};
pub use error::{EngineError, LayoutError};
pub use layered::LayeredEngine;
pub use ports::{EdgePorts, PortAllocation, allocate_ports};

use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::ir::{Graph, PortSide};
use crate::text_metrics::{HeuristicMeasurer, SystemFontMeasurer, TextMeasurer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortLayout {
    pub id: String,
    pub side: PortSide,
    pub index: usize,
    /// Absolute position.
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaidOutNode {
    pub id: String,
    pub top: String,
    pub bottom: Option<String>,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub ports: Vec<PortLayout>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelBox {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaidOutEdge {
    pub id: String,
    pub from: String,
    pub to: String,
    pub label: Option<String>,
    pub source_port: String,
    pub target_port: String,
    pub points: Vec<Point>,
    pub label_box: Option<LabelBox>,
}

/// The input graph with geometry. Node order follows the input; edges the
/// engine did not route are absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LaidOutGraph {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<LaidOutNode>,
    pub edges: Vec<LaidOutEdge>,
}

impl LaidOutGraph {
    pub fn node(&self, id: &str) -> Option<&LaidOutNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&LaidOutEdge> {
        self.edges.iter().find(|edge| edge.id == id)
    }
}

/// The measurer `config` asks for.
pub fn measurer_for(config: &LayoutConfig) -> Box<dyn TextMeasurer> {
    if config.fast_text_metrics {
        Box::new(HeuristicMeasurer)
    } else {
        Box::new(SystemFontMeasurer)
    }
}

/// One layout pass. The graph is only read; the result is a fresh value.
/// The single suspension point is the engine call, and an engine failure
/// fails the whole pass.
pub async fn layout_graph<E: LayoutEngine>(
    graph: &Graph,
    config: &LayoutConfig,
    measurer: &dyn TextMeasurer,
    engine: &mut E,
) -> Result<LaidOutGraph, LayoutError> {
    let prepared = build_request(graph, config, measurer);
    tracing::debug!(
        nodes = prepared.request.nodes.len(),
        edges = prepared.request.edges.len(),
        skipped = prepared.skipped_edges.len(),
        "requesting layout"
    );
    let response = engine.layout(prepared.request.clone()).await?;
    let laid_out = map_response(graph, &prepared, response);
    tracing::debug!(
        width = laid_out.width,
        height = laid_out.height,
        edges = laid_out.edges.len(),
        "layout complete"
    );
    Ok(laid_out)
}

/// Owns an engine together with the settings used for every pass, so that
/// passes over the same engine run strictly one after another.
pub struct LayoutSession<E> {
    engine: E,
    config: LayoutConfig,
    measurer: Box<dyn TextMeasurer>,
}

impl<E: LayoutEngine> LayoutSession<E> {
    pub fn new(engine: E, config: LayoutConfig) -> Self {
        let measurer = measurer_for(&config);
        Self {
            engine,
            config,
            measurer,
        }
    }

    pub fn with_measurer(mut self, measurer: Box<dyn TextMeasurer>) -> Self {
        self.measurer = measurer;
        self
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub async fn layout(&mut self, graph: &Graph) -> Result<LaidOutGraph, LayoutError> {
        layout_graph(graph, &self.config, self.measurer.as_ref(), &mut self.engine).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Edge, Node};
    use crate::layout::request::{
        EdgeSection, LayoutRequest, LayoutResponse, PlacedNode, RoutedEdge,
    };
    use futures::executor::block_on;
    use std::future::Future;

    /// Places node i at (i * 300, 0) and routes every requested edge as a
    /// straight segment; records each request it sees.
    #[derive(Default)]
    struct GridEngine {
        requests: Vec<LayoutRequest>,
    }

    impl LayoutEngine for GridEngine {
        fn layout(
            &mut self,
            request: LayoutRequest,
        ) -> impl Future<Output = Result<LayoutResponse, EngineError>> {
            let nodes = request
                .nodes
                .iter()
                .enumerate()
                .map(|(i, node)| PlacedNode {
                    id: node.id.clone(),
                    x: i as f32 * 300.0,
                    y: 0.0,
                    width: node.width,
                    height: node.height,
                    ports: Vec::new(),
                })
                .collect();
            let edges = request
                .edges
                .iter()
                .map(|edge| RoutedEdge {
                    id: edge.id.clone(),
                    sections: vec![EdgeSection {
                        start: Point::new(0.0, 0.0),
                        bend_points: Vec::new(),
                        end: Point::new(1.0, 0.0),
                    }],
                    labels: Vec::new(),
                })
                .collect();
            self.requests.push(request);
            std::future::ready(Ok(LayoutResponse {
                width: 0.0,
                height: 0.0,
                nodes,
                edges,
            }))
        }
    }

    struct BrokenEngine;

    impl LayoutEngine for BrokenEngine {
        fn layout(
            &mut self,
            _request: LayoutRequest,
        ) -> impl Future<Output = Result<LayoutResponse, EngineError>> {
            std::future::ready(Err(EngineError::Failed("engine crashed".to_string())))
        }
    }

    fn config() -> LayoutConfig {
        LayoutConfig {
            fast_text_metrics: true,
            ..LayoutConfig::default()
        }
    }

    fn sample() -> Graph {
        Graph {
            nodes: vec![
                Node::new("A", "Service").with_bottom("Handles requests"),
                Node::new("B", "Store"),
                Node::new("C", "Cache"),
            ],
            edges: vec![
                Edge::new("A", "B", Some("writes".to_string())),
                Edge::new("A", "C", Some("reads".to_string())),
                Edge::new("C", "Nowhere", Some("lost".to_string())),
            ],
        }
    }

    #[test]
    fn every_node_is_sized_and_dangling_edges_vanish() {
        let mut session = LayoutSession::new(GridEngine::default(), config());
        let laid_out = block_on(session.layout(&sample())).unwrap();
        assert_eq!(laid_out.nodes.len(), 3);
        for node in &laid_out.nodes {
            assert!(node.width >= 220.0);
            let expected = if node.bottom.is_some() { 96.0 } else { 56.0 };
            assert_eq!(node.height, expected);
        }
        assert!(laid_out.edge("C-Nowhere-lost").is_none());
        assert_eq!(laid_out.edges.len(), 2);
        assert_eq!(laid_out.node("C").unwrap().x, 600.0);
    }

    #[test]
    fn repeated_layout_yields_identical_requests() {
        let mut session = LayoutSession::new(GridEngine::default(), config());
        let graph = sample();
        let first = block_on(session.layout(&graph)).unwrap();
        let second = block_on(session.layout(&graph)).unwrap();
        assert_eq!(first, second);
        let requests = &session.engine().requests;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
    }

    #[test]
    fn engine_failure_propagates() {
        let graph = sample();
        let mut engine = BrokenEngine;
        let result = block_on(layout_graph(&graph, &config(), &HeuristicMeasurer, &mut engine));
        match result {
            Err(LayoutError::Engine(EngineError::Failed(message))) => {
                assert_eq!(message, "engine crashed")
            }
            other => panic!("expected engine failure, got {other:?}"),
        }
    }

    #[test]
    fn empty_graph_lays_out_to_nothing() {
        let mut session = LayoutSession::new(GridEngine::default(), config());
        let laid_out = block_on(session.layout(&Graph::new())).unwrap();
        assert!(laid_out.nodes.is_empty());
        assert!(laid_out.edges.is_empty());
        assert_eq!(laid_out.width, 0.0);
    }
}
