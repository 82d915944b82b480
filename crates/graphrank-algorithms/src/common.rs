//! Shared types for the rank algorithms
//!
//! The power iteration never sees the graph directly. It walks an [`EdgeTable`],
//! a multimap from source node to destination nodes that callers build once per
//! computation and tear down afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Node Identifier type (u64). Ids are dense and zero based; slot 0 is a sentinel.
pub type NodeId = u64;

/// Error raised when an edge endpoint falls outside the table dimension
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("edge {from} -> {to} is outside the table dimension {dimension}")]
pub struct OutOfRange {
    pub from: NodeId,
    pub to: NodeId,
    pub dimension: u64,
}

/// All outgoing destinations recorded for one node.
///
/// The row is materialized up front so that its length is known before it is
/// consumed. Duplicate destinations are kept.
#[derive(Debug, Clone, Default)]
pub struct Row {
    targets: Vec<NodeId>,
    cursor: usize,
}

impl Row {
    pub fn new(targets: Vec<NodeId>) -> Self {
        Self { targets, cursor: 0 }
    }

    /// Number of outgoing edges in the row, regardless of how many were consumed
    pub fn size(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl Iterator for Row {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let target = self.targets.get(self.cursor).copied()?;
        self.cursor += 1;
        Some(target)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.targets.len() - self.cursor;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Row {}

/// Temporary adjacency structure used by a full rank computation.
///
/// Implementations only need bulk unordered insert, full-row iteration with a
/// count, and teardown. The order of destinations inside a row is unspecified.
pub trait EdgeTable {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Number of node slots; valid ids are `[0, dimension)`
    fn dimension(&self) -> u64;

    /// Record a directed edge
    fn add(&mut self, from: NodeId, to: NodeId) -> Result<(), Self::Error>;

    /// Make every added edge visible to [`EdgeTable::row`]
    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// All outgoing destinations of `node`
    fn row(&self, node: NodeId) -> Result<Row, Self::Error>;

    /// Flush and release every backing resource
    fn shutdown(self) -> Result<(), Self::Error>
    where
        Self: Sized;
}

/// Edge table kept entirely in memory. Suitable for small graphs and tests.
#[derive(Debug, Clone)]
pub struct MemoryEdgeTable {
    rows: Vec<Vec<NodeId>>,
}

impl MemoryEdgeTable {
    pub fn new(dimension: u64) -> Self {
        Self {
            rows: vec![Vec::new(); dimension as usize],
        }
    }

    /// Build a table from an edge list in one go
    pub fn from_edges(
        dimension: u64,
        edges: impl IntoIterator<Item = (NodeId, NodeId)>,
    ) -> Result<Self, OutOfRange> {
        let mut table = Self::new(dimension);
        for (from, to) in edges {
            table.add(from, to)?;
        }
        Ok(table)
    }
}

impl EdgeTable for MemoryEdgeTable {
    type Error = OutOfRange;

    fn dimension(&self) -> u64 {
        self.rows.len() as u64
    }

    fn add(&mut self, from: NodeId, to: NodeId) -> Result<(), OutOfRange> {
        let dimension = self.dimension();
        if from >= dimension || to >= dimension {
            return Err(OutOfRange { from, to, dimension });
        }
        self.rows[from as usize].push(to);
        Ok(())
    }

    fn row(&self, node: NodeId) -> Result<Row, OutOfRange> {
        match self.rows.get(node as usize) {
            Some(targets) => Ok(Row::new(targets.clone())),
            None => Err(OutOfRange {
                from: node,
                to: node,
                dimension: self.dimension(),
            }),
        }
    }

    fn shutdown(self) -> Result<(), OutOfRange> {
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a computation and its controller.
///
/// Computations poll it at iteration, edge and node boundaries; nothing is
/// preempted.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder of this token to stop at its next check
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_size_known_before_consumption() {
        let mut row = Row::new(vec![3, 1, 3]);
        assert_eq!(row.size(), 3);
        assert_eq!(row.next(), Some(3));
        assert_eq!(row.size(), 3);
        assert_eq!(row.len(), 2);
        assert_eq!(row.collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_memory_table_rejects_out_of_range() {
        let mut table = MemoryEdgeTable::new(3);
        assert!(table.add(0, 2).is_ok());
        let err = table.add(1, 3).unwrap_err();
        assert_eq!(err.dimension, 3);
        assert!(table.add(5, 0).is_err());
    }

    #[test]
    fn test_memory_table_keeps_duplicates() {
        let table = MemoryEdgeTable::from_edges(4, [(1, 2), (1, 2), (1, 3)]).unwrap();
        assert_eq!(table.row(1).unwrap().size(), 3);
        assert!(table.row(2).unwrap().is_empty());
    }

    #[test]
    fn test_interrupt_is_shared() {
        let token = Interrupt::new();
        let other = token.clone();
        assert!(!other.is_raised());
        token.raise();
        assert!(other.is_raised());
        other.clear();
        assert!(!token.is_raised());
    }
}
