//! Load a graph source into the adjacency table and run the power iteration

use super::{RankError, RankResult};
use crate::adjacency::RocksEdgeTable;
use crate::config::RankConfig;
use crate::source::GraphSource;
use graphrank_algorithms::{page_rank, EdgeTable, Interrupt, RankVector};
use std::path::PathBuf;
use tracing::{info, warn};

/// Edges between two progress messages
const PROGRESS_INTERVAL: u64 = 1_000_000;

pub(crate) struct RankComputer<'a> {
    config: &'a RankConfig,
    interrupt: &'a Interrupt,
    table_path: PathBuf,
}

impl<'a> RankComputer<'a> {
    pub(crate) fn new(config: &'a RankConfig, interrupt: &'a Interrupt, table_path: PathBuf) -> Self {
        Self {
            config,
            interrupt,
            table_path,
        }
    }

    /// Ranks of every node of `source`, `None` if interrupted.
    ///
    /// The adjacency table is destroyed on every path out of this function.
    pub(crate) fn compute(&self, source: &dyn GraphSource) -> RankResult<Option<RankVector>> {
        self.config.validate()?;

        let dimension = source.node_count() + 1;
        let mut table = RocksEdgeTable::create(&self.table_path, dimension)?
            .with_batch_size(self.config.batch_size);

        let result = self.load_and_iterate(&mut table, source);
        source.close();
        let shutdown = table.shutdown();

        let ranks = result?;
        shutdown?;
        Ok(ranks)
    }

    fn load_and_iterate(
        &self,
        table: &mut RocksEdgeTable,
        source: &dyn GraphSource,
    ) -> RankResult<Option<RankVector>> {
        let expected = source.size_hint();
        info!(
            "Building adjacency table for {} nodes, about {} edges",
            table.dimension(),
            expected
        );

        let mut loaded = 0u64;
        for edge in source.edges() {
            if self.interrupt.is_raised() {
                warn!("Rank computation interrupted after loading {} edges", loaded);
                return Ok(None);
            }
            table.add(edge.from, edge.to)?;
            loaded += 1;
            if loaded % PROGRESS_INTERVAL == 0 {
                info!("Loaded {} of about {} edges", loaded, expected);
            }
        }
        if loaded == 0 {
            return Err(RankError::EmptyGraph);
        }
        table.flush()?;
        info!("Adjacency table ready with {} edges", loaded);

        let ranks = page_rank(&*table, &self.config.pagerank(), self.interrupt)?;
        match &ranks {
            Some(vector) => info!(
                "Rank computation finished after {} iterations, delta {}",
                vector.iterations, vector.delta
            ),
            None => warn!("Rank computation interrupted during iteration"),
        }
        Ok(ranks)
    }
}
