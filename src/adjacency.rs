//! RocksDB-backed adjacency table
//!
//! Holds the out-links of every node while a full rank computation runs. The
//! table lives in its own directory, is filled once, read once per iteration,
//! and destroyed at the end of the computation.
//!
//! Keys are `from (u64 BE) ++ sequence (u64 BE)` and values are `to (u64 BE)`,
//! so every added edge is kept (duplicates included) and all out-links of a
//! node form one contiguous key range.

use graphrank_algorithms::{EdgeTable, NodeId, OutOfRange, Row};
use rocksdb::{Direction, IteratorMode, Options, WriteBatch, WriteOptions, DB};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Edges buffered in memory before a batch is written
pub const DEFAULT_BATCH_SIZE: usize = 64 * 1024;

/// Adjacency table errors
#[derive(Error, Debug)]
pub enum TableError {
    /// RocksDB error
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Edge endpoint outside the table
    #[error(transparent)]
    OutOfRange(#[from] OutOfRange),

    /// Stored value is not a node id
    #[error("Corrupt adjacency entry for node {0}")]
    Corrupt(NodeId),
}

pub type TableResult<T> = Result<T, TableError>;

/// Disposable on-disk multimap from source node to destination nodes
pub struct RocksEdgeTable {
    db: DB,
    path: PathBuf,
    dimension: u64,
    batch: WriteBatch,
    pending: usize,
    batch_size: usize,
    sequence: u64,
}

impl RocksEdgeTable {
    /// Create an empty table at `path`, wiping whatever a previous run left there
    pub fn create(path: impl AsRef<Path>, dimension: u64) -> TableResult<Self> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            debug!("Removing stale adjacency table at {:?}", path);
            DB::destroy(&Options::default(), &path)?;
        }

        let db = DB::open(&Self::options(), &path)?;
        info!("Adjacency table opened at {:?} for {} nodes", path, dimension);

        Ok(Self {
            db,
            path,
            dimension,
            batch: WriteBatch::default(),
            pending: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            sequence: 0,
        })
    }

    /// Number of edges buffered before each RocksDB write
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of edges added so far
    pub fn len(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.sequence == 0
    }

    fn options() -> Options {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        // Bulk load, single reader: favour large memtables
        opts.set_write_buffer_size(64 * 1024 * 1024); // 64 MB
        opts.set_max_write_buffer_number(3);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn write_batch(&mut self) -> TableResult<()> {
        if self.pending == 0 {
            return Ok(());
        }
        // The table is rebuilt from scratch after a crash, no need for a WAL
        let mut write_opts = WriteOptions::default();
        write_opts.disable_wal(true);

        let batch = std::mem::take(&mut self.batch);
        self.db.write_opt(batch, &write_opts)?;
        debug!("Wrote batch of {} edges", self.pending);
        self.pending = 0;
        Ok(())
    }

    fn edge_key(from: NodeId, sequence: u64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&from.to_be_bytes());
        key[8..].copy_from_slice(&sequence.to_be_bytes());
        key
    }
}

impl EdgeTable for RocksEdgeTable {
    type Error = TableError;

    fn dimension(&self) -> u64 {
        self.dimension
    }

    fn add(&mut self, from: NodeId, to: NodeId) -> TableResult<()> {
        if from >= self.dimension || to >= self.dimension {
            return Err(OutOfRange {
                from,
                to,
                dimension: self.dimension,
            }
            .into());
        }

        self.batch
            .put(Self::edge_key(from, self.sequence), to.to_be_bytes());
        self.sequence += 1;
        self.pending += 1;

        if self.pending >= self.batch_size {
            self.write_batch()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> TableResult<()> {
        self.write_batch()
    }

    fn row(&self, node: NodeId) -> TableResult<Row> {
        let prefix = node.to_be_bytes();
        let mut targets = Vec::new();

        let iter = self
            .db
            .iterator(IteratorMode::From(&prefix, Direction::Forward));
        for item in iter {
            let (key, value) = item?;
            if key.len() < 8 || key[..8] != prefix {
                break;
            }
            let bytes: [u8; 8] = value
                .as_ref()
                .try_into()
                .map_err(|_| TableError::Corrupt(node))?;
            targets.push(u64::from_be_bytes(bytes));
        }

        Ok(Row::new(targets))
    }

    fn shutdown(mut self) -> TableResult<()> {
        self.write_batch()?;
        let RocksEdgeTable { db, path, sequence, .. } = self;
        drop(db);
        DB::destroy(&Options::default(), &path)?;
        info!("Adjacency table with {} edges removed from {:?}", sequence, path);
        Ok(())
    }
}
