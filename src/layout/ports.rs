use std::collections::HashMap;

use crate::ir::{Graph, Port, PortSide};

/// The ports one edge is anchored to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePorts {
    pub edge: String,
    pub source: Port,
    pub target: Port,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortAllocation {
    /// Ports per node id, outbound first, each side in index order.
    pub node_ports: HashMap<String, Vec<Port>>,
    /// One entry per input edge, in input order.
    pub edges: Vec<EdgePorts>,
}

impl PortAllocation {
    pub fn ports_of(&self, node: &str) -> &[Port] {
        self.node_ports.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn count(&self, node: &str, side: PortSide) -> usize {
        self.ports_of(node).iter().filter(|port| port.side == side).count()
    }
}

/// Gives every edge its own outbound slot on its source and inbound slot on
/// its target. The k-th edge leaving a node takes outbound index k, in input
/// edge order; inbound is symmetric.
pub fn allocate_ports(graph: &Graph) -> PortAllocation {
    let mut out_degree: HashMap<&str, usize> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    for edge in &graph.edges {
        *out_degree.entry(edge.from.as_str()).or_insert(0) += 1;
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut node_ports: HashMap<String, Vec<Port>> = HashMap::new();
    for node in &graph.nodes {
        let outbound = out_degree.get(node.id.as_str()).copied().unwrap_or(0);
        let inbound = in_degree.get(node.id.as_str()).copied().unwrap_or(0);
        let mut ports = Vec::with_capacity(outbound + inbound);
        ports.extend((0..outbound).map(|k| Port::new(&node.id, PortSide::Outbound, k)));
        ports.extend((0..inbound).map(|k| Port::new(&node.id, PortSide::Inbound, k)));
        node_ports.insert(node.id.clone(), ports);
    }

    let mut next_out: HashMap<&str, usize> = HashMap::new();
    let mut next_in: HashMap<&str, usize> = HashMap::new();
    let edges = graph
        .edges
        .iter()
        .map(|edge| {
            let out_slot = next_out.entry(edge.from.as_str()).or_insert(0);
            let source = Port::new(&edge.from, PortSide::Outbound, *out_slot);
            *out_slot += 1;
            let in_slot = next_in.entry(edge.to.as_str()).or_insert(0);
            let target = Port::new(&edge.to, PortSide::Inbound, *in_slot);
            *in_slot += 1;
            EdgePorts {
                edge: edge.id.clone(),
                source,
                target,
            }
        })
        .collect();

    PortAllocation { node_ports, edges }
}
