pub mod common;
pub mod incremental;
pub mod pagerank;
pub mod thresholds;

pub use common::{EdgeTable, Interrupt, MemoryEdgeTable, NodeId, OutOfRange, Row};
pub use incremental::{
    blended_rank, max_links, Bounds, Fraction16, InboundStats, Rescale, FLAT_SPREAD,
    MAX_NEW_NODES,
};
pub use pagerank::{page_rank, InvalidConfig, PageRankConfig, RankVector};
pub use thresholds::{
    compute_thresholds, find_threshold_index, normalized_score, DEFAULT_PRECISION,
};
