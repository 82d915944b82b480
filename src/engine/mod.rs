//! Rank engine
//!
//! Owns one data directory:
//!
//! ```text
//! <data>/storage        rank file
//! <data>/storage.temp   rank file being written by a full computation
//! <data>/state.json     persisted state and filter configuration
//! <data>/graph/         adjacency table, only while a full computation runs
//! ```
//!
//! Computations run either on the caller's thread or on the engine's worker
//! thread. Only one runs at a time, whichever way it was started.

mod computer;
mod full;
mod incremental;
mod worker;

pub use worker::SlotState;

use crate::adjacency::TableError;
use crate::config::{ConfigError, RankConfig};
use crate::source::{EdgeFilter, FilterList, FilteredGraph, GraphSource, TripleGraph};
use crate::state::{RankState, StateFile};
use crate::storage::{RankFileReader, StorageError, DEFAULT_PAGE_BUDGET};
use graphrank_algorithms::{normalized_score, Interrupt, NodeId};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{info, warn};
use worker::{guarded, Slot, Worker};

const STORAGE_FILE: &str = "storage";
const TEMP_STORAGE_FILE: &str = "storage.temp";
const STATE_FILE: &str = "state.json";
const TABLE_DIR: &str = "graph";

/// Engine errors
#[derive(Error, Debug)]
pub enum RankError {
    /// Adjacency table error
    #[error("Adjacency table error: {0}")]
    Table(#[from] TableError),

    /// Rank file error
    #[error("Rank storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration or state file error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The source produced no edges
    #[error("The graph has no edges to rank")]
    EmptyGraph,

    /// Operation needs something that is not there yet
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Input exceeds a hard limit
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// Another computation holds the slot
    #[error("A rank computation is already in progress")]
    Busy,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Background worker unavailable
    #[error("Worker error: {0}")]
    Worker(String),
}

pub type RankResult<T> = Result<T, RankError>;

/// How a computation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Full computation wrote a new rank file
    Completed {
        nodes: u64,
        iterations: usize,
        fingerprint: u64,
    },
    /// Incremental computation appended records
    Appended { records: u64 },
    /// Interrupted; a full computation left the previous file in place
    Interrupted,
    /// No new nodes
    NothingToDo,
}

/// Status of the ranks, in order of precedence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Computing,
    Error(String),
    Canceled,
    Empty,
    ConfigChanged,
    Outdated,
    Computed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Computing => write!(f, "COMPUTING"),
            Status::Error(message) => write!(f, "ERROR {}", message),
            Status::Canceled => write!(f, "CANCELED"),
            Status::Empty => write!(f, "EMPTY"),
            Status::ConfigChanged => write!(f, "CONFIG_CHANGED"),
            Status::Outdated => write!(f, "OUTDATED"),
            Status::Computed => write!(f, "COMPUTED"),
        }
    }
}

/// State shared with the worker thread
pub(crate) struct Inner {
    data_dir: PathBuf,
    reader: RankFileReader,
    state: Mutex<StateFile>,
    interrupt: Interrupt,
    slot: Slot,
}

impl Inner {
    fn storage_path(&self) -> PathBuf {
        self.data_dir.join(STORAGE_FILE)
    }

    fn temp_storage_path(&self) -> PathBuf {
        self.data_dir.join(TEMP_STORAGE_FILE)
    }

    fn table_path(&self) -> PathBuf {
        self.data_dir.join(TABLE_DIR)
    }

    fn state(&self) -> RankState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state()
            .clone()
    }

    fn update_state<R>(&self, change: impl FnOnce(&mut RankState) -> R) -> RankResult<R> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(state.update(change)?)
    }
}

/// Computes, stores and serves node ranks for one data directory
pub struct RankEngine {
    inner: Arc<Inner>,
    worker: Worker,
}

impl RankEngine {
    /// Open (or create) the engine rooted at `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> RankResult<Self> {
        Self::with_page_budget(data_dir, DEFAULT_PAGE_BUDGET)
    }

    /// Open with at most `page_budget` rank pages held in memory
    pub fn with_page_budget(data_dir: impl AsRef<Path>, page_budget: usize) -> RankResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let state = StateFile::open(data_dir.join(STATE_FILE))?;
        let reader = RankFileReader::with_page_budget(data_dir.join(STORAGE_FILE), page_budget)?;
        info!(
            "Rank engine opened at {:?} with {} ranked ids",
            data_dir,
            reader.size()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                data_dir,
                reader,
                state: Mutex::new(state),
                interrupt: Interrupt::new(),
                slot: Slot::new(),
            }),
            worker: Worker::spawn()?,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.inner.data_dir
    }

    pub fn reader(&self) -> &RankFileReader {
        &self.inner.reader
    }

    /// Snapshot of the persisted state
    pub fn state(&self) -> RankState {
        self.inner.state()
    }

    // ---- Lookups ----

    /// Raw rank of `id`
    pub fn rank(&self, id: NodeId) -> Option<f64> {
        self.inner.reader.read(id)
    }

    /// Rank of `id` mapped to [0, 1] through the thresholds; 0 when unranked
    pub fn normalized_rank(&self, id: NodeId) -> f64 {
        match self.rank(id) {
            Some(rank) => normalized_score(rank, &self.inner.reader.thresholds()),
            None => 0.0,
        }
    }

    /// Normalized rank with 2 to 5 fraction digits
    pub fn formatted_rank(&self, id: NodeId, digits: usize) -> String {
        format_rank(self.normalized_rank(id), digits)
    }

    pub fn thresholds(&self) -> Vec<f64> {
        self.inner.reader.thresholds()
    }

    pub fn fingerprint(&self) -> u64 {
        self.inner.state().fingerprint
    }

    // ---- Status and control ----

    /// Status of the ranks for a graph of `node_count` nodes
    pub fn status(&self, node_count: u64) -> Status {
        match self.inner.slot.state() {
            SlotState::Running => return Status::Computing,
            SlotState::Failed(message) => return Status::Error(message),
            SlotState::Canceled => return Status::Canceled,
            SlotState::Idle | SlotState::Done(_) => {}
        }

        let size = self.inner.reader.size();
        if size == 0 {
            return Status::Empty;
        }
        let state = self.inner.state();
        if state.config_outdated() {
            return Status::ConfigChanged;
        }
        if size < node_count + 1 && state.last_ranked_id < node_count {
            return Status::Outdated;
        }
        Status::Computed
    }

    /// Ask the running computation to stop at its next check
    pub fn interrupt(&self) {
        info!("Interrupting rank computation");
        self.inner.interrupt.raise();
    }

    /// Block until no computation is running and report how the last one ended
    pub fn wait_for_completion(&self) -> SlotState {
        self.inner.slot.wait()
    }

    pub fn config(&self) -> RankConfig {
        self.inner.state().config
    }

    /// Validate and persist new computation parameters
    pub fn set_config(&self, config: RankConfig) -> RankResult<()> {
        config.validate()?;
        self.inner.update_state(|s| s.config = config)?;
        info!("Rank parameters updated: {:?}", config);
        Ok(())
    }

    // ---- Filtering ----

    pub fn filtering(&self) -> bool {
        self.inner.state().filtering
    }

    pub fn set_filtering(&self, enabled: bool) -> RankResult<()> {
        self.inner.update_state(|s| s.filtering = enabled)
    }

    pub fn filter(&self) -> EdgeFilter {
        self.inner.state().filter
    }

    /// Add `id` to one of the filter lists; false if it was already there
    pub fn add_filter_entry(&self, list: FilterList, id: NodeId) -> RankResult<bool> {
        self.inner.update_state(|s| s.filter.add(list, id))
    }

    /// Remove `id` from one of the filter lists; false if it was not there
    pub fn remove_filter_entry(&self, list: FilterList, id: NodeId) -> RankResult<bool> {
        self.inner.update_state(|s| s.filter.remove(list, id))
    }

    pub fn set_include_explicit(&self, include: bool) -> RankResult<()> {
        self.inner.update_state(|s| s.filter.include_explicit = include)
    }

    pub fn set_include_implicit(&self, include: bool) -> RankResult<()> {
        self.inner.update_state(|s| s.filter.include_implicit = include)
    }

    /// View of `graph` with the current filter applied if filtering is on
    pub fn filtered(&self, graph: Arc<TripleGraph>) -> FilteredGraph {
        FilteredGraph::new(graph, self.inner.state().active_filter())
    }

    // ---- Computation ----

    /// Rank every node of `source` and replace the rank file
    pub fn compute(&self, source: &dyn GraphSource) -> RankResult<Outcome> {
        self.run_sync(source, full::run)
    }

    /// Append estimated ranks for nodes added since the last computation
    pub fn compute_incremental(&self, source: &dyn GraphSource) -> RankResult<Outcome> {
        self.run_sync(source, incremental::run)
    }

    /// Start a full computation on the worker thread
    pub fn compute_async(&self, source: Arc<dyn GraphSource + Send + Sync>) -> RankResult<()> {
        self.run_async(source, full::run)
    }

    /// Start an incremental computation on the worker thread
    pub fn compute_incremental_async(
        &self,
        source: Arc<dyn GraphSource + Send + Sync>,
    ) -> RankResult<()> {
        self.run_async(source, incremental::run)
    }

    fn run_sync(
        &self,
        source: &dyn GraphSource,
        flow: fn(&Inner, &dyn GraphSource) -> RankResult<Outcome>,
    ) -> RankResult<Outcome> {
        self.inner.slot.acquire()?;
        self.inner.interrupt.clear();
        let result = guarded(|| flow(&self.inner, source));
        self.inner.slot.finish(&result);
        result
    }

    fn run_async(
        &self,
        source: Arc<dyn GraphSource + Send + Sync>,
        flow: fn(&Inner, &dyn GraphSource) -> RankResult<Outcome>,
    ) -> RankResult<()> {
        self.inner.slot.acquire()?;
        self.inner.interrupt.clear();

        let inner = Arc::clone(&self.inner);
        let submitted = self.worker.submit(Box::new(move || {
            let result = guarded(|| flow(&inner, source.as_ref()));
            drop(source);
            inner.slot.finish(&result);
        }));
        if let Err(e) = submitted {
            let message = e.to_string();
            self.inner.slot.finish(&Err(RankError::Worker(message.clone())));
            return Err(RankError::Worker(message));
        }
        Ok(())
    }

    // ---- Export ----

    /// Write `<label> <rank>` lines for every node of `source`.
    ///
    /// Returns the number of lines written.
    pub fn export(&self, path: impl AsRef<Path>, source: &dyn GraphSource) -> RankResult<u64> {
        let path = path.as_ref();
        let thresholds = self.inner.reader.thresholds();
        let mut out = BufWriter::new(File::create(path)?);

        let mut lines = 0u64;
        for id in 1..=source.node_count() {
            let label = match source.label(id) {
                Some(label) if label.starts_with('"') => continue,
                Some(label) => label,
                None => id.to_string(),
            };
            let score = self
                .inner
                .reader
                .read(id)
                .map_or(0.0, |rank| normalized_score(rank, &thresholds));
            writeln!(out, "{} {}", label, format_rank(score, 2))?;
            lines += 1;
        }
        out.flush()?;

        info!("Exported {} ranks to {:?}", lines, path);
        Ok(lines)
    }
}

impl Drop for RankEngine {
    fn drop(&mut self) {
        if self.inner.slot.state() == SlotState::Running {
            warn!("Rank engine dropped while computing, interrupting");
            self.inner.interrupt.raise();
        }
    }
}

fn format_rank(score: f64, digits: usize) -> String {
    format!("{:.*}", digits.clamp(2, 5), score)
}
