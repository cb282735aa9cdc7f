//! In-process layered layout.
//!
//! Works in a flow frame (`f` along the flow, `c` across it) and maps to
//! screen coordinates at the end, so every direction shares one code path.
//! Outbound ports sit on the flow-end side of a node and inbound ports on
//! the flow-start side.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;

use crate::config::{EdgeRouting, EngineOptions, FlowDirection};
use crate::ir::PortSide;

use super::Point;
use super::engine::LayoutEngine;
use super::error::EngineError;
use super::request::{
    EdgeSection, LayoutRequest, LayoutResponse, PlacedLabel, PlacedNode, PlacedPort, RoutedEdge,
};

const PADDING: f32 = 12.0;
const EDGE_SPACING: f32 = 10.0;
const LABEL_GAP: f32 = 2.0;
const LOOP_MARGIN: f32 = 12.0;
/// Median sweeps used when model order is not preserved.
const ORDER_PASSES: usize = 4;

#[derive(Debug, Clone)]
pub struct LayeredEngine {
    invocations: u64,
}

impl Default for LayeredEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LayeredEngine {
    pub fn new() -> Self {
        Self { invocations: 0 }
    }

    /// Number of layout calls served so far.
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    fn compute(&self, request: &LayoutRequest) -> LayoutResponse {
        if request.options.edge_routing != EdgeRouting::Orthogonal {
            tracing::warn!(
                requested = request.options.edge_routing.elk_name(),
                "built-in engine only routes orthogonally; ignoring edge routing option"
            );
        }
        let mut state = LayeredLayout::new(request);
        state.rank();
        state.order();
        state.stack();
        state.place_ports();
        state.place_layers();
        state.route();
        state.finish()
    }
}

impl LayoutEngine for LayeredEngine {
    fn layout(
        &mut self,
        request: LayoutRequest,
    ) -> impl Future<Output = Result<LayoutResponse, EngineError>> {
        async move {
            self.invocations += 1;
            tracing::debug!(
                invocation = self.invocations,
                nodes = request.nodes.len(),
                edges = request.edges.len(),
                "layered layout"
            );
            Ok(self.compute(&request))
        }
    }
}

#[derive(Debug, Clone)]
struct Vertex {
    /// Request node index; `None` for a dummy on a long edge.
    node: Option<usize>,
    len: f32,
    breadth: f32,
    rank: usize,
    f: f32,
    c: f32,
}

impl Vertex {
    fn center_c(&self) -> f32 {
        self.c + self.breadth / 2.0
    }
}

#[derive(Debug, Clone)]
struct Link {
    edge: usize,
    source: usize,
    target: usize,
    source_port: String,
    target_port: String,
    /// Label extent as (along flow, across flow).
    label: Option<(f32, f32)>,
    /// Dummy vertices between source and target, one per skipped layer.
    chain: Vec<usize>,
    forward: bool,
}

impl Link {
    /// Source, dummies, target.
    fn sequence(&self) -> Vec<usize> {
        let mut seq = Vec::with_capacity(self.chain.len() + 2);
        seq.push(self.source);
        seq.extend(self.chain.iter().copied());
        seq.push(self.target);
        seq
    }
}

#[derive(Debug, Clone, Copy)]
struct PortSlot {
    vertex: usize,
    side: PortSide,
    c: f32,
}

struct Route {
    points: Vec<(f32, f32)>,
    label: Option<(f32, f32, f32, f32)>,
}

struct LayeredLayout<'a> {
    request: &'a LayoutRequest,
    options: &'a EngineOptions,
    horizontal: bool,
    edge_spacing: f32,
    vertices: Vec<Vertex>,
    links: Vec<Link>,
    layers: Vec<Vec<usize>>,
    layer_len: Vec<f32>,
    layer_f: Vec<f32>,
    gaps: Vec<f32>,
    /// Per gap, the (link, hop) segments that jog across it, in slot order.
    channels: Vec<Vec<(usize, usize)>>,
    ports: HashMap<&'a str, PortSlot>,
    routes: Vec<Route>,
}

impl<'a> LayeredLayout<'a> {
    fn new(request: &'a LayoutRequest) -> Self {
        let options = &request.options;
        let horizontal = matches!(options.direction, FlowDirection::Right | FlowDirection::Left);
        let vertices = request
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let (len, breadth) = if horizontal {
                    (node.width, node.height)
                } else {
                    (node.height, node.width)
                };
                Vertex {
                    node: Some(idx),
                    len: len.max(0.0),
                    breadth: breadth.max(0.0),
                    rank: 0,
                    f: 0.0,
                    c: 0.0,
                }
            })
            .collect();

        let mut port_owner: HashMap<&str, usize> = HashMap::new();
        for (idx, node) in request.nodes.iter().enumerate() {
            for port in &node.ports {
                port_owner.insert(port.id.as_str(), idx);
            }
        }

        let mut links = Vec::with_capacity(request.edges.len());
        for (idx, edge) in request.edges.iter().enumerate() {
            let (Some(&source), Some(&target)) = (
                port_owner.get(edge.source.as_str()),
                port_owner.get(edge.target.as_str()),
            ) else {
                tracing::debug!(edge = %edge.id, "edge references an unknown port; not placing it");
                continue;
            };
            let label = edge.label.as_ref().map(|label| {
                if horizontal {
                    (label.width, label.height)
                } else {
                    (label.height, label.width)
                }
            });
            links.push(Link {
                edge: idx,
                source,
                target,
                source_port: edge.source.clone(),
                target_port: edge.target.clone(),
                label,
                chain: Vec::new(),
                forward: true,
            });
        }

        Self {
            request,
            options,
            horizontal,
            edge_spacing: EDGE_SPACING * options.edge_spacing_factor.max(0.1),
            vertices,
            links,
            layers: Vec::new(),
            layer_len: Vec::new(),
            layer_f: Vec::new(),
            gaps: Vec::new(),
            channels: Vec::new(),
            ports: HashMap::new(),
            routes: Vec::new(),
        }
    }

    /// Longest-path layering; inserts dummies on edges spanning several
    /// layers.
    fn rank(&mut self) {
        let count = self.request.nodes.len();
        let pairs: Vec<(usize, usize)> = self.links.iter().map(|l| (l.source, l.target)).collect();
        let ranks = compute_ranks(count, &pairs);
        for (vertex, rank) in self.vertices.iter_mut().zip(&ranks) {
            vertex.rank = *rank;
        }

        let layer_count = ranks.iter().copied().max().map_or(0, |max| max + 1);
        self.layers = vec![Vec::new(); layer_count];
        for idx in 0..count {
            self.layers[ranks[idx]].push(idx);
        }

        for link in &mut self.links {
            let (from, to) = (ranks[link.source], ranks[link.target]);
            link.forward = to > from;
            if !link.forward {
                continue;
            }
            for rank in from + 1..to {
                let id = self.vertices.len();
                self.vertices.push(Vertex {
                    node: None,
                    len: 0.0,
                    breadth: 0.0,
                    rank,
                    f: 0.0,
                    c: 0.0,
                });
                self.layers[rank].push(id);
                link.chain.push(id);
            }
        }
    }

    fn order(&mut self) {
        if self.options.consider_model_order {
            return;
        }
        let mut pairs = Vec::new();
        for link in self.links.iter().filter(|l| l.forward) {
            let seq = link.sequence();
            pairs.extend(seq.windows(2).map(|w| (w[0], w[1])));
        }
        order_layers(&mut self.layers, &pairs, self.vertices.len(), ORDER_PASSES);
    }

    /// Cross-axis positions: stack each layer, then centre it against the
    /// tallest one.
    fn stack(&mut self) {
        let node_spacing = self.options.node_spacing.max(0.0);
        let mut extents = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let mut cursor = 0.0f32;
            let mut prev_real: Option<bool> = None;
            for &v in layer {
                let real = self.vertices[v].node.is_some();
                if let Some(prev) = prev_real {
                    cursor += if prev && real { node_spacing } else { self.edge_spacing };
                }
                self.vertices[v].c = cursor;
                cursor += self.vertices[v].breadth;
                prev_real = Some(real);
            }
            extents.push(cursor);
        }
        let tallest = extents.iter().copied().fold(0.0f32, f32::max);
        for (layer, extent) in self.layers.iter().zip(&extents) {
            let offset = (tallest - extent) / 2.0;
            for &v in layer {
                self.vertices[v].c += offset;
            }
        }
        self.layer_len = self
            .layers
            .iter()
            .map(|layer| layer.iter().map(|&v| self.vertices[v].len).fold(0.0f32, f32::max))
            .collect();
    }

    /// Spreads each node's ports evenly along their side, ordered by where
    /// the other end of their edge sits.
    fn place_ports(&mut self) {
        let mut neighbor_c: HashMap<&str, f32> = HashMap::new();
        for link in &self.links {
            let seq = link.sequence();
            let after_source = seq[1];
            let before_target = seq[seq.len() - 2];
            neighbor_c.insert(
                link.source_port.as_str(),
                self.vertices[after_source].center_c(),
            );
            neighbor_c.insert(
                link.target_port.as_str(),
                self.vertices[before_target].center_c(),
            );
        }

        let request = self.request;
        for (idx, node) in request.nodes.iter().enumerate() {
            let vertex = &self.vertices[idx];
            for side in [PortSide::Outbound, PortSide::Inbound] {
                let mut side_ports: Vec<(usize, &str, f32)> = node
                    .ports
                    .iter()
                    .enumerate()
                    .filter(|(_, port)| port.side == side)
                    .map(|(order, port)| {
                        let key = neighbor_c.get(port.id.as_str()).copied().unwrap_or(f32::MAX);
                        (order, port.id.as_str(), key)
                    })
                    .collect();
                side_ports.sort_by(|a, b| {
                    a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0))
                });
                let slots = side_ports.len() as f32 + 1.0;
                for (k, (_, id, _)) in side_ports.into_iter().enumerate() {
                    let c = vertex.c + vertex.breadth * (k as f32 + 1.0) / slots;
                    self.ports.insert(
                        id,
                        PortSlot {
                            vertex: idx,
                            side,
                            c,
                        },
                    );
                }
            }
        }
    }

    fn port_c(&self, port: &str, fallback: usize) -> f32 {
        self.ports
            .get(port)
            .map(|slot| slot.c)
            .unwrap_or_else(|| self.vertices[fallback].center_c())
    }

    fn port_f(&self, port: &str, fallback: usize, side: PortSide) -> f32 {
        let (vertex, side) = self
            .ports
            .get(port)
            .map(|slot| (slot.vertex, slot.side))
            .unwrap_or((fallback, side));
        let v = &self.vertices[vertex];
        match side {
            PortSide::Outbound => v.f + v.len,
            PortSide::Inbound => v.f,
        }
    }

    /// Segments that need a vertical jog inside each gap, as (link, hop).
    fn gap_crossings(&self) -> Vec<Vec<(usize, usize)>> {
        let gap_count = self.layers.len().saturating_sub(1);
        let mut crossings: Vec<Vec<(usize, usize, f32, f32)>> = vec![Vec::new(); gap_count];
        for (li, link) in self.links.iter().enumerate().filter(|(_, l)| l.forward) {
            let seq = link.sequence();
            for hop in 0..seq.len() - 1 {
                let from_c = if hop == 0 {
                    self.port_c(&link.source_port, link.source)
                } else {
                    self.vertices[seq[hop]].c
                };
                let to_c = if hop + 1 == seq.len() - 1 {
                    self.port_c(&link.target_port, link.target)
                } else {
                    self.vertices[seq[hop + 1]].c
                };
                if (from_c - to_c).abs() > 0.5 {
                    let gap = self.vertices[seq[hop]].rank;
                    crossings[gap].push((li, hop, from_c, to_c));
                }
            }
        }
        crossings
            .into_iter()
            .map(|mut gap| {
                gap.sort_by(|a, b| {
                    a.2.partial_cmp(&b.2)
                        .unwrap_or(Ordering::Equal)
                        .then(a.3.partial_cmp(&b.3).unwrap_or(Ordering::Equal))
                });
                gap.into_iter().map(|(li, hop, _, _)| (li, hop)).collect()
            })
            .collect()
    }

    /// Flow-axis positions. A gap widens to fit its edge channels and the
    /// widest label placed in it.
    fn place_layers(&mut self) {
        let crossings = self.gap_crossings();
        let gap_count = self.layers.len().saturating_sub(1);
        let mut gaps = vec![self.options.layer_spacing.max(0.0); gap_count];
        for (gap, list) in gaps.iter_mut().zip(&crossings) {
            *gap = gap.max((list.len() as f32 + 1.0) * self.edge_spacing);
        }
        for link in self.links.iter().filter(|l| l.forward) {
            if let Some((lf, _)) = link.label {
                let gap = self.vertices[link.source].rank;
                gaps[gap] = gaps[gap].max(lf + 2.0 * self.edge_spacing);
            }
        }

        let mut layer_f = Vec::with_capacity(self.layers.len());
        let mut cursor = 0.0f32;
        for (rank, len) in self.layer_len.iter().enumerate() {
            layer_f.push(cursor);
            cursor += len + gaps.get(rank).copied().unwrap_or(0.0);
        }
        for vertex in &mut self.vertices {
            let start = layer_f[vertex.rank];
            vertex.f = start + (self.layer_len[vertex.rank] - vertex.len) / 2.0;
        }
        self.layer_f = layer_f;
        self.gaps = gaps;
        self.channels = crossings;
    }

    fn channel_f(&self, gap: usize, slot: usize) -> f32 {
        let start = self.layer_f[gap] + self.layer_len[gap];
        let slots = self.channels[gap].len() as f32 + 1.0;
        start + self.gaps[gap] * (slot as f32 + 1.0) / slots
    }

    fn route(&mut self) {
        let mut slot_of: HashMap<(usize, usize), (usize, usize)> = HashMap::new();
        for (gap, list) in self.channels.iter().enumerate() {
            for (slot, key) in list.iter().enumerate() {
                slot_of.insert(*key, (gap, slot));
            }
        }

        let top = self
            .vertices
            .iter()
            .filter(|v| v.node.is_some())
            .map(|v| v.c)
            .fold(f32::MAX, f32::min);
        let top = if top == f32::MAX { 0.0 } else { top };
        let loop_label = self
            .links
            .iter()
            .filter(|l| !l.forward)
            .filter_map(|l| l.label.map(|(_, lc)| lc))
            .fold(0.0f32, f32::max);
        let loop_step = self.edge_spacing + loop_label + LABEL_GAP;

        let mut routes = Vec::with_capacity(self.links.len());
        let mut backward_seen = 0usize;
        for (li, link) in self.links.iter().enumerate() {
            let start = (
                self.port_f(&link.source_port, link.source, PortSide::Outbound),
                self.port_c(&link.source_port, link.source),
            );
            let end = (
                self.port_f(&link.target_port, link.target, PortSide::Inbound),
                self.port_c(&link.target_port, link.target),
            );

            if link.forward {
                let seq = link.sequence();
                let mut points = vec![start];
                let mut current_c = start.1;
                for hop in 0..seq.len() - 1 {
                    let next_c = if hop + 1 == seq.len() - 1 {
                        end.1
                    } else {
                        self.vertices[seq[hop + 1]].c
                    };
                    if let Some(&(gap, slot)) = slot_of.get(&(li, hop)) {
                        let f = self.channel_f(gap, slot);
                        points.push((f, current_c));
                        points.push((f, next_c));
                    }
                    current_c = next_c;
                }
                points.push(end);

                let label = link.label.map(|(lf, lc)| {
                    let gap = self.vertices[link.source].rank;
                    let gap_start = self.layer_f[gap] + self.layer_len[gap];
                    let f = gap_start + (self.gaps[gap] - lf) / 2.0;
                    (f, start.1 - lc - LABEL_GAP, lf, lc)
                });
                routes.push(Route { points, label });
            } else {
                let lane = top - (backward_seen as f32 + 1.0) * loop_step;
                let out_f = start.0 + LOOP_MARGIN + backward_seen as f32 * self.edge_spacing / 2.0;
                let in_f = end.0 - LOOP_MARGIN - backward_seen as f32 * self.edge_spacing / 2.0;
                backward_seen += 1;
                let points = vec![
                    start,
                    (out_f, start.1),
                    (out_f, lane),
                    (in_f, lane),
                    (in_f, end.1),
                    end,
                ];
                let label = link.label.map(|(lf, lc)| {
                    let mid = (out_f + in_f) / 2.0;
                    (mid - lf / 2.0, lane - lc - LABEL_GAP, lf, lc)
                });
                routes.push(Route { points, label });
            }
        }
        self.routes = routes;
        self.stack_labels();
    }

    /// Forward labels share their source's gap; pushes each one below the
    /// previous label in the same gap so none overlap.
    fn stack_labels(&mut self) {
        let mut by_gap: HashMap<usize, Vec<usize>> = HashMap::new();
        for (li, link) in self.links.iter().enumerate() {
            if link.forward && self.routes[li].label.is_some() {
                by_gap
                    .entry(self.vertices[link.source].rank)
                    .or_default()
                    .push(li);
            }
        }
        for mut members in by_gap.into_values() {
            let desired = |li: usize| self.routes[li].label.map_or(0.0, |label| label.1);
            members.sort_by(|&a, &b| {
                desired(a)
                    .partial_cmp(&desired(b))
                    .unwrap_or(Ordering::Equal)
                    .then(a.cmp(&b))
            });
            let mut floor = f32::MIN;
            for li in members {
                if let Some(label) = self.routes[li].label.as_mut() {
                    label.1 = label.1.max(floor);
                    floor = label.1 + label.3 + LABEL_GAP;
                }
            }
        }
    }

    fn finish(self) -> LayoutResponse {
        let mut min_f = f32::MAX;
        let mut min_c = f32::MAX;
        let mut max_f = f32::MIN;
        let mut max_c = f32::MIN;
        let mut grow = |f: f32, c: f32, lf: f32, lc: f32| {
            min_f = min_f.min(f);
            min_c = min_c.min(c);
            max_f = max_f.max(f + lf);
            max_c = max_c.max(c + lc);
        };
        for vertex in self.vertices.iter().filter(|v| v.node.is_some()) {
            grow(vertex.f, vertex.c, vertex.len, vertex.breadth);
        }
        for route in &self.routes {
            for &(f, c) in &route.points {
                grow(f, c, 0.0, 0.0);
            }
            if let Some((f, c, lf, lc)) = route.label {
                grow(f, c, lf, lc);
            }
        }
        if min_f == f32::MAX {
            return LayoutResponse {
                width: 2.0 * PADDING,
                height: 2.0 * PADDING,
                nodes: Vec::new(),
                edges: Vec::new(),
            };
        }

        let shift_f = PADDING - min_f;
        let shift_c = PADDING - min_c;
        let frame = Frame {
            direction: self.options.direction,
            flow_extent: max_f - min_f + 2.0 * PADDING,
        };
        let cross_extent = max_c - min_c + 2.0 * PADDING;

        let nodes = self
            .request
            .nodes
            .iter()
            .enumerate()
            .map(|(idx, node)| {
                let v = &self.vertices[idx];
                let (x, y, _, _) = frame.rect(v.f + shift_f, v.c + shift_c, v.len, v.breadth);
                let ports = node
                    .ports
                    .iter()
                    .filter_map(|port| {
                        let slot = self.ports.get(port.id.as_str())?;
                        let f = match slot.side {
                            PortSide::Outbound => v.f + v.len,
                            PortSide::Inbound => v.f,
                        };
                        let p = frame.point(f + shift_f, slot.c + shift_c);
                        Some(PlacedPort {
                            id: port.id.clone(),
                            x: p.x - x,
                            y: p.y - y,
                        })
                    })
                    .collect();
                PlacedNode {
                    id: node.id.clone(),
                    x,
                    y,
                    width: node.width,
                    height: node.height,
                    ports,
                }
            })
            .collect();

        let edges = self
            .links
            .iter()
            .zip(&self.routes)
            .map(|(link, route)| {
                let edge = &self.request.edges[link.edge];
                let mut points: Vec<Point> = route
                    .points
                    .iter()
                    .map(|&(f, c)| frame.point(f + shift_f, c + shift_c))
                    .collect();
                points.dedup();
                let start = points.first().copied().unwrap_or_default();
                let end = points.last().copied().unwrap_or_default();
                let bend_points = if points.len() > 2 {
                    points[1..points.len() - 1].to_vec()
                } else {
                    Vec::new()
                };
                let labels = match (edge.label.as_ref(), route.label) {
                    (Some(label), Some((f, c, lf, lc))) => {
                        let (x, y, width, height) = frame.rect(f + shift_f, c + shift_c, lf, lc);
                        vec![PlacedLabel {
                            id: label.id.clone(),
                            x,
                            y,
                            width,
                            height,
                        }]
                    }
                    _ => Vec::new(),
                };
                RoutedEdge {
                    id: edge.id.clone(),
                    sections: vec![EdgeSection {
                        start,
                        bend_points,
                        end,
                    }],
                    labels,
                }
            })
            .collect();

        let (width, height) = if self.horizontal {
            (frame.flow_extent, cross_extent)
        } else {
            (cross_extent, frame.flow_extent)
        };
        LayoutResponse {
            width,
            height,
            nodes,
            edges,
        }
    }
}

struct Frame {
    direction: FlowDirection,
    flow_extent: f32,
}

impl Frame {
    fn point(&self, f: f32, c: f32) -> Point {
        match self.direction {
            FlowDirection::Right => Point::new(f, c),
            FlowDirection::Left => Point::new(self.flow_extent - f, c),
            FlowDirection::Down => Point::new(c, f),
            FlowDirection::Up => Point::new(c, self.flow_extent - f),
        }
    }

    /// Screen rectangle (x, y, width, height) of a flow-frame box.
    fn rect(&self, f: f32, c: f32, lf: f32, lc: f32) -> (f32, f32, f32, f32) {
        match self.direction {
            FlowDirection::Right => (f, c, lf, lc),
            FlowDirection::Left => (self.flow_extent - f - lf, c, lf, lc),
            FlowDirection::Down => (c, f, lc, lf),
            FlowDirection::Up => (c, self.flow_extent - f - lf, lc, lf),
        }
    }
}

/// Longest-path ranks over a topological order. A cycle is broken at the
/// earliest-declared node still waiting, whose remaining incoming edges then
/// count as backward.
fn compute_ranks(count: usize, pairs: &[(usize, usize)]) -> Vec<usize> {
    let mut adj: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut indeg = vec![0usize; count];
    for &(from, to) in pairs {
        if from != to {
            adj[from].push(to);
            indeg[to] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> =
        (0..count).filter(|&id| indeg[id] == 0).map(Reverse).collect();
    let mut done = vec![false; count];
    let mut order = Vec::with_capacity(count);
    loop {
        while let Some(Reverse(id)) = ready.pop() {
            if done[id] {
                continue;
            }
            done[id] = true;
            order.push(id);
            for &next in &adj[id] {
                if done[next] {
                    continue;
                }
                indeg[next] = indeg[next].saturating_sub(1);
                if indeg[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }
        if order.len() >= count {
            break;
        }
        match (0..count).find(|&id| !done[id]) {
            Some(id) => ready.push(Reverse(id)),
            None => break,
        }
    }

    let mut position = vec![0usize; count];
    for (pos, &id) in order.iter().enumerate() {
        position[id] = pos;
    }
    let mut ranks = vec![0usize; count];
    for &id in &order {
        for &next in &adj[id] {
            if position[next] > position[id] {
                ranks[next] = ranks[next].max(ranks[id] + 1);
            }
        }
    }
    ranks
}

fn order_layers(
    layers: &mut [Vec<usize>],
    pairs: &[(usize, usize)],
    vertex_count: usize,
    passes: usize,
) {
    if layers.len() <= 1 {
        return;
    }
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); vertex_count];
    let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); vertex_count];
    for &(from, to) in pairs {
        outgoing[from].push(to);
        incoming[to].push(from);
    }

    let mut positions = vec![0usize; vertex_count];
    refresh_positions(layers, &mut positions);
    for _ in 0..passes.max(1) {
        for rank in 1..layers.len() {
            sort_layer(&mut layers[rank], &incoming, &positions);
            refresh_positions(layers, &mut positions);
        }
        for rank in (0..layers.len() - 1).rev() {
            sort_layer(&mut layers[rank], &outgoing, &positions);
            refresh_positions(layers, &mut positions);
        }
    }
}

fn refresh_positions(layers: &[Vec<usize>], positions: &mut [usize]) {
    for layer in layers {
        for (idx, &v) in layer.iter().enumerate() {
            positions[v] = idx;
        }
    }
}

/// Sorts by median neighbour position; ties keep the current order, then
/// declaration order.
fn sort_layer(layer: &mut Vec<usize>, neighbors: &[Vec<usize>], positions: &[usize]) {
    if layer.len() <= 1 {
        return;
    }
    let mut keyed: Vec<(f32, usize, usize)> = layer
        .iter()
        .enumerate()
        .map(|(current, &v)| {
            let score = median_position(&neighbors[v], positions).unwrap_or(current as f32);
            (score, current, v)
        })
        .collect();
    keyed.sort_by(|a, b| {
        a.0.partial_cmp(&b.0)
            .unwrap_or(Ordering::Equal)
            .then(a.1.cmp(&b.1))
            .then(a.2.cmp(&b.2))
    });
    *layer = keyed.into_iter().map(|(_, _, v)| v).collect();
}

fn median_position(neighbors: &[usize], positions: &[usize]) -> Option<f32> {
    if neighbors.is_empty() {
        return None;
    }
    let mut values: Vec<f32> = neighbors.iter().map(|&n| positions[n] as f32).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) * 0.5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::request::{
        PortConstraints, RequestEdge, RequestLabel, RequestNode, RequestPort,
    };
    use futures::executor::block_on;

    struct Builder {
        nodes: Vec<RequestNode>,
        edges: Vec<RequestEdge>,
        out: HashMap<String, usize>,
        inc: HashMap<String, usize>,
    }

    impl Builder {
        fn new(ids: &[&str]) -> Self {
            Self {
                nodes: ids
                    .iter()
                    .map(|id| RequestNode {
                        id: id.to_string(),
                        width: 100.0,
                        height: 40.0,
                        ports: Vec::new(),
                        port_constraints: PortConstraints::FixedSide,
                    })
                    .collect(),
                edges: Vec::new(),
                out: HashMap::new(),
                inc: HashMap::new(),
            }
        }

        fn edge(mut self, from: &str, to: &str, label: Option<&str>) -> Self {
            let o = *self.out.entry(from.to_string()).or_insert(0);
            let i = *self.inc.entry(to.to_string()).or_insert(0);
            self.out.insert(from.to_string(), o + 1);
            self.inc.insert(to.to_string(), i + 1);
            let source = format!("{from}.E{o}");
            let target = format!("{to}.W{i}");
            if let Some(node) = self.nodes.iter_mut().find(|n| n.id == from) {
                node.ports.push(RequestPort {
                    id: source.clone(),
                    side: PortSide::Outbound,
                });
            }
            if let Some(node) = self.nodes.iter_mut().find(|n| n.id == to) {
                node.ports.push(RequestPort {
                    id: target.clone(),
                    side: PortSide::Inbound,
                });
            }
            let id = format!("{from}-{to}-{}", label.unwrap_or(""));
            self.edges.push(RequestEdge {
                id: id.clone(),
                source,
                target,
                label: label.map(|text| RequestLabel {
                    id: format!("{id}.label"),
                    text: text.to_string(),
                    width: 120.0,
                    height: 20.0,
                }),
            });
            self
        }

        fn request(self, options: EngineOptions) -> LayoutRequest {
            LayoutRequest {
                id: "root".to_string(),
                options,
                nodes: self.nodes,
                edges: self.edges,
            }
        }
    }

    fn run(request: LayoutRequest) -> LayoutResponse {
        block_on(LayeredEngine::new().layout(request)).unwrap()
    }

    fn node<'r>(response: &'r LayoutResponse, id: &str) -> &'r PlacedNode {
        response.nodes.iter().find(|n| n.id == id).unwrap()
    }

    fn overlaps(a: &PlacedNode, b: &PlacedNode) -> bool {
        a.x < b.x + b.width && b.x < a.x + a.width && a.y < b.y + b.height && b.y < a.y + a.height
    }

    #[test]
    fn ranks_follow_longest_path() {
        let ranks = compute_ranks(4, &[(0, 1), (1, 2), (0, 2), (3, 2)]);
        assert_eq!(ranks, vec![0, 1, 2, 0]);
    }

    #[test]
    fn cycles_are_broken_at_earliest_node() {
        let ranks = compute_ranks(3, &[(0, 1), (1, 2), (2, 0)]);
        assert_eq!(ranks, vec![0, 1, 2]);
    }

    #[test]
    fn layers_advance_left_to_right() {
        let request = Builder::new(&["A", "B", "C"])
            .edge("A", "B", Some("x"))
            .edge("B", "C", None)
            .request(EngineOptions::default());
        let response = run(request);
        let (a, b, c) = (node(&response, "A"), node(&response, "B"), node(&response, "C"));
        assert!(a.x + a.width < b.x);
        assert!(b.x + b.width < c.x);
        assert!(b.x - (a.x + a.width) >= 72.0);
        assert_eq!(a.x, PADDING);
    }

    #[test]
    fn nodes_in_a_layer_do_not_overlap_and_keep_input_order() {
        let request = Builder::new(&["Root", "X", "Y", "Z"])
            .edge("Root", "Z", None)
            .edge("Root", "X", None)
            .edge("Root", "Y", None)
            .request(EngineOptions::default());
        let response = run(request);
        let (x, y, z) = (node(&response, "X"), node(&response, "Y"), node(&response, "Z"));
        assert!(!overlaps(x, y) && !overlaps(y, z) && !overlaps(x, z));
        assert!(x.y < y.y && y.y < z.y);
        assert!(y.y - (x.y + x.height) >= 32.0 - 0.01);
    }

    #[test]
    fn routes_are_orthogonal_and_end_on_ports() {
        let request = Builder::new(&["A", "B", "C"])
            .edge("A", "B", Some("one"))
            .edge("A", "C", Some("two"))
            .request(EngineOptions::default());
        let response = run(request);
        for edge in &response.edges {
            let section = &edge.sections[0];
            let mut points = vec![section.start];
            points.extend(section.bend_points.iter().copied());
            points.push(section.end);
            for pair in points.windows(2) {
                let (p, q) = (pair[0], pair[1]);
                assert!(
                    (p.x - q.x).abs() < 0.01 || (p.y - q.y).abs() < 0.01,
                    "diagonal segment in {}",
                    edge.id
                );
            }
            assert_eq!(edge.labels.len(), 1);
        }
        let a = node(&response, "A");
        let start = response.edges[0].sections[0].start;
        assert!((start.x - (a.x + a.width)).abs() < 0.01);
        let port = &a.ports[0];
        assert!((a.x + port.x - start.x).abs() < 0.01);
        assert!((a.y + port.y - start.y).abs() < 0.01);
    }

    #[test]
    fn ports_on_a_side_are_distinct() {
        let request = Builder::new(&["A", "B"])
            .edge("A", "B", Some("1"))
            .edge("A", "B", Some("2"))
            .edge("A", "B", Some("3"))
            .request(EngineOptions::default());
        let response = run(request);
        let a = node(&response, "A");
        let mut ys: Vec<f32> = a.ports.iter().map(|p| p.y).collect();
        ys.sort_by(|l, r| l.partial_cmp(r).unwrap());
        ys.dedup();
        assert_eq!(ys.len(), 3);
        assert!(a.ports.iter().all(|p| (p.x - a.width).abs() < 0.01));
    }

    #[test]
    fn sibling_labels_are_stacked() {
        let request = Builder::new(&["A", "B", "C", "D"])
            .edge("A", "B", Some("first"))
            .edge("A", "C", Some("second"))
            .edge("A", "D", Some("third"))
            .request(EngineOptions::default());
        let response = run(request);
        let labels: Vec<&PlacedLabel> = response.edges.iter().map(|e| &e.labels[0]).collect();
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert!(
                    a.y + a.height <= b.y || b.y + b.height <= a.y,
                    "{} overlaps {}",
                    a.id,
                    b.id
                );
            }
        }
    }

    #[test]
    fn non_orthogonal_routing_still_routes_orthogonally() {
        for edge_routing in [EdgeRouting::Polyline, EdgeRouting::Splines] {
            let options = EngineOptions {
                edge_routing,
                ..EngineOptions::default()
            };
            let request = Builder::new(&["A", "B", "C"])
                .edge("A", "B", None)
                .edge("A", "C", None)
                .request(options);
            let response = run(request);
            assert_eq!(response.edges.len(), 2);
            for edge in &response.edges {
                let section = &edge.sections[0];
                let mut points = vec![section.start];
                points.extend(section.bend_points.iter().copied());
                points.push(section.end);
                assert!(points
                    .windows(2)
                    .all(|w| (w[0].x - w[1].x).abs() < 0.01 || (w[0].y - w[1].y).abs() < 0.01));
            }
        }
    }

    #[test]
    fn unknown_ports_are_not_placed() {
        let mut request = Builder::new(&["A", "B"])
            .edge("A", "B", None)
            .request(EngineOptions::default());
        request.edges.push(RequestEdge {
            id: "ghost".to_string(),
            source: "A.E9".to_string(),
            target: "Ghost.W0".to_string(),
            label: None,
        });
        let response = run(request);
        assert_eq!(response.edges.len(), 1);
        assert_eq!(response.edges[0].id, "A-B-");
    }

    #[test]
    fn back_edges_loop_above_the_drawing() {
        let request = Builder::new(&["A", "B"])
            .edge("A", "B", None)
            .edge("B", "A", Some("back"))
            .request(EngineOptions::default());
        let response = run(request);
        let back = response.edges.iter().find(|e| e.id == "B-A-back").unwrap();
        let lowest_node_top = response.nodes.iter().map(|n| n.y).fold(f32::MAX, f32::min);
        assert!(back.sections[0].bend_points.iter().any(|p| p.y < lowest_node_top));
        assert!(back.labels[0].y >= 0.0);
    }

    #[test]
    fn self_loops_are_routed() {
        let request = Builder::new(&["A"]).edge("A", "A", None).request(EngineOptions::default());
        let response = run(request);
        assert_eq!(response.edges.len(), 1);
        assert_eq!(response.edges[0].sections[0].bend_points.len(), 4);
    }

    #[test]
    fn long_edges_get_routed_around_intermediate_layers() {
        let request = Builder::new(&["A", "B", "C"])
            .edge("A", "B", None)
            .edge("B", "C", None)
            .edge("A", "C", None)
            .request(EngineOptions::default());
        let response = run(request);
        let long = response.edges.iter().find(|e| e.id == "A-C-").unwrap();
        let b = node(&response, "B");
        let points = long.sections[0].bend_points.clone();
        // The long edge never runs through B's box.
        for p in points {
            let inside = p.x > b.x && p.x < b.x + b.width && p.y > b.y && p.y < b.y + b.height;
            assert!(!inside);
        }
    }

    #[test]
    fn downward_flow_stacks_layers_vertically() {
        let options = EngineOptions {
            direction: FlowDirection::Down,
            ..EngineOptions::default()
        };
        let request = Builder::new(&["A", "B"]).edge("A", "B", None).request(options);
        let response = run(request);
        let (a, b) = (node(&response, "A"), node(&response, "B"));
        assert!(a.y + a.height < b.y);
        assert_eq!(a.width, 100.0);
        assert!(response.height > response.width);
    }

    #[test]
    fn median_ordering_reduces_crossings_without_model_order() {
        let options = EngineOptions {
            consider_model_order: false,
            ..EngineOptions::default()
        };
        let request = Builder::new(&["A", "B", "Y", "X"])
            .edge("A", "X", None)
            .edge("B", "Y", None)
            .request(options);
        let response = run(request);
        assert!(node(&response, "X").y < node(&response, "Y").y);
    }

    #[test]
    fn counts_invocations() {
        let mut engine = LayeredEngine::new();
        for _ in 0..3 {
            let request = Builder::new(&["A"]).request(EngineOptions::default());
            block_on(engine.layout(request)).unwrap();
        }
        assert_eq!(engine.invocations(), 3);
    }

    #[test]
    fn empty_request_is_just_padding() {
        let response = run(Builder::new(&[]).request(EngineOptions::default()));
        assert!(response.nodes.is_empty());
        assert_eq!(response.width, 2.0 * PADDING);
    }
}
