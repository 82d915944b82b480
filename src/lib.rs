//! graphrank
//!
//! PageRank-style ranking for the entities of a knowledge graph, built to sit
//! next to a triple store.
//!
//! # Architecture
//!
//! - [`adjacency`]: disposable RocksDB multimap of out-links used while a full
//!   computation runs
//! - [`storage`]: the binary rank file, its writer and a paged, evicting reader
//! - [`source`]: the [`GraphSource`] trait plus an in-memory quad store with
//!   statement filters
//! - [`engine`]: full and incremental computations, status, lookups and export
//! - [`state`] and [`config`]: parameters and persisted state
//!
//! The numeric core (power iteration, thresholds, incremental estimation) lives
//! in the `graphrank-algorithms` crate.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use graphrank::{RankEngine, TripleGraph};
//! use std::sync::Arc;
//!
//! let mut graph = TripleGraph::new();
//! graph.add("<alice>", "<knows>", "<bob>");
//! graph.add("<carol>", "<knows>", "<bob>");
//! let graph = Arc::new(graph);
//!
//! let engine = RankEngine::open("/tmp/ranks").unwrap();
//! engine.compute(&engine.filtered(Arc::clone(&graph))).unwrap();
//!
//! let bob = graph.lookup("<bob>").unwrap();
//! println!("bob: {}", engine.formatted_rank(bob, 2));
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod adjacency;
pub mod config;
pub mod engine;
pub mod source;
pub mod state;
pub mod storage;

pub use adjacency::{RocksEdgeTable, TableError, TableResult};
pub use config::{ConfigError, ConfigResult, RankConfig};
pub use engine::{Outcome, RankEngine, RankError, RankResult, SlotState, Status};
pub use source::{
    Edge, EdgeFilter, EdgeList, FilterList, FilteredGraph, GraphSource, Statement, TripleError,
    TripleGraph, TripleResult,
};
pub use state::{RankState, StateFile};
pub use storage::{RankFileReader, RankFileWriter, StorageError, StorageResult};

pub use graphrank_algorithms::{Interrupt, NodeId};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
