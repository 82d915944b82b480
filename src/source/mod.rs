//! Graph sources
//!
//! The engine never owns the graph. It reads edges through [`GraphSource`],
//! which the host store implements: a full pass over every edge for full
//! computations and the inbound edges of single nodes for incremental ones.

pub mod filter;
pub mod triples;

pub use filter::{EdgeFilter, FilterList};
pub use triples::{FilteredGraph, Statement, TripleError, TripleGraph, TripleResult};

use graphrank_algorithms::NodeId;

/// Directed edge between two node ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }
}

impl From<(NodeId, NodeId)> for Edge {
    fn from((from, to): (NodeId, NodeId)) -> Self {
        Self { from, to }
    }
}

/// Read-only view of a directed graph with dense node ids `1..=node_count`
pub trait GraphSource {
    /// Number of nodes; ids run from 1 to this value inclusive
    fn node_count(&self) -> u64;

    /// Expected number of edges, used for progress reporting only
    fn size_hint(&self) -> u64;

    /// A fresh pass over every edge. Each call starts from the beginning.
    fn edges(&self) -> Box<dyn Iterator<Item = Edge> + '_>;

    /// Edges whose destination is `id`
    fn inbound(&self, id: NodeId) -> Box<dyn Iterator<Item = Edge> + '_>;

    /// Human readable name of a node
    fn label(&self, _id: NodeId) -> Option<String> {
        None
    }

    /// Release whatever the source holds for iteration
    fn close(&self) {}
}

/// Plain edge list kept in memory
#[derive(Debug, Clone, Default)]
pub struct EdgeList {
    node_count: u64,
    edges: Vec<Edge>,
}

impl EdgeList {
    pub fn new(node_count: u64) -> Self {
        Self {
            node_count,
            edges: Vec::new(),
        }
    }

    pub fn from_edges(node_count: u64, edges: impl IntoIterator<Item = (NodeId, NodeId)>) -> Self {
        Self {
            node_count,
            edges: edges.into_iter().map(Edge::from).collect(),
        }
    }

    /// Add an edge, growing the node count to cover both endpoints
    pub fn add(&mut self, from: NodeId, to: NodeId) {
        self.node_count = self.node_count.max(from).max(to);
        self.edges.push(Edge::new(from, to));
    }

    /// Register a node without edges
    pub fn add_node(&mut self) -> NodeId {
        self.node_count += 1;
        self.node_count
    }
}

impl GraphSource for EdgeList {
    fn node_count(&self) -> u64 {
        self.node_count
    }

    fn size_hint(&self) -> u64 {
        self.edges.len() as u64
    }

    fn edges(&self) -> Box<dyn Iterator<Item = Edge> + '_> {
        Box::new(self.edges.iter().copied())
    }

    fn inbound(&self, id: NodeId) -> Box<dyn Iterator<Item = Edge> + '_> {
        Box::new(self.edges.iter().copied().filter(move |e| e.to == id))
    }
}
