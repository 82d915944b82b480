//! Integration tests for full and incremental rank computations
//!
//! Covers reference scores, persistence across restarts, the status surface,
//! interruption and the single computation slot.

use graphrank::{
    Edge, EdgeList, FilterList, GraphSource, NodeId, Outcome, RankConfig, RankEngine, RankError,
    SlotState, Status, TripleGraph,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn reference_config() -> RankConfig {
    RankConfig {
        damping_factor: 0.85,
        epsilon: 0.0,
        max_iterations: 10,
        ..Default::default()
    }
}

/// Edge list whose edge pass blocks after the first edge until the gate opens
struct GatedSource {
    edges: EdgeList,
    started: AtomicBool,
    gate: (Mutex<bool>, Condvar),
}

impl GatedSource {
    fn new(edges: EdgeList) -> Self {
        Self {
            edges,
            started: AtomicBool::new(false),
            gate: (Mutex::new(false), Condvar::new()),
        }
    }

    fn wait_started(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.started.load(Ordering::SeqCst) {
            assert!(Instant::now() < deadline, "source never started");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    fn open(&self) {
        let (lock, cvar) = &self.gate;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn block(&self) {
        self.started.store(true, Ordering::SeqCst);
        let (lock, cvar) = &self.gate;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

impl GraphSource for GatedSource {
    fn node_count(&self) -> u64 {
        self.edges.node_count()
    }

    fn size_hint(&self) -> u64 {
        self.edges.size_hint()
    }

    fn edges(&self) -> Box<dyn Iterator<Item = Edge> + '_> {
        Box::new(self.edges.edges().enumerate().map(move |(i, edge)| {
            if i == 1 {
                self.block();
            }
            edge
        }))
    }

    fn inbound(&self, id: NodeId) -> Box<dyn Iterator<Item = Edge> + '_> {
        self.block();
        self.edges.inbound(id)
    }
}

/// Edge list that counts how often it was closed
struct CountingSource {
    edges: EdgeList,
    closed: AtomicUsize,
}

impl GraphSource for CountingSource {
    fn node_count(&self) -> u64 {
        self.edges.node_count()
    }

    fn size_hint(&self) -> u64 {
        self.edges.size_hint()
    }

    fn edges(&self) -> Box<dyn Iterator<Item = Edge> + '_> {
        self.edges.edges()
    }

    fn inbound(&self, id: NodeId) -> Box<dyn Iterator<Item = Edge> + '_> {
        self.edges.inbound(id)
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Source whose edge pass panics
struct BrokenSource;

impl GraphSource for BrokenSource {
    fn node_count(&self) -> u64 {
        3
    }

    fn size_hint(&self) -> u64 {
        2
    }

    fn edges(&self) -> Box<dyn Iterator<Item = Edge> + '_> {
        panic!("edge cursor lost");
    }

    fn inbound(&self, _id: NodeId) -> Box<dyn Iterator<Item = Edge> + '_> {
        panic!("edge cursor lost");
    }
}

#[test]
fn test_full_computation_reference_scores() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();
    engine.set_config(reference_config()).unwrap();

    let graph = EdgeList::from_edges(4, [(1, 3), (1, 4), (2, 4)]);
    let outcome = engine.compute(&graph).unwrap();
    assert!(matches!(
        outcome,
        Outcome::Completed {
            nodes: 4,
            iterations: 10,
            ..
        }
    ));

    assert_eq!(engine.normalized_rank(1), 0.0);
    assert_eq!(engine.normalized_rank(2), 0.0);
    assert!((engine.normalized_rank(3) - 1.0 / 3.0).abs() < 1e-9);
    assert!((engine.normalized_rank(4) - 1.0).abs() < 1e-9);
    assert_eq!(engine.formatted_rank(3, 2), "0.33");
    assert_eq!(engine.formatted_rank(4, 5), "1.00000");

    // Raw ranks form a distribution over ids 0..=4
    let sum: f64 = (1..=4).map(|id| engine.rank(id).unwrap()).sum::<f64>();
    let state = engine.state();
    let (min, max) = state.bounds().unwrap();
    assert!(sum < 1.0 && sum + min > 1.0 - 1e-9);
    for id in 1..=4 {
        let rank = engine.rank(id).unwrap();
        assert!(rank >= min && rank <= max);
    }
    assert_eq!(engine.rank(0), None);
    assert_eq!(engine.rank(5), None);
    assert_eq!(state.last_ranked_id, 4);
    assert!(state.computed_at.is_some());
    assert!(!temp_dir.path().join("graph").exists());
    assert!(!temp_dir.path().join("storage.temp").exists());
}

#[test]
fn test_ranks_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let graph = EdgeList::from_edges(4, [(1, 3), (1, 4), (2, 4)]);
    let (rank, fingerprint) = {
        let engine = RankEngine::open(temp_dir.path()).unwrap();
        engine.compute(&graph).unwrap();
        (engine.rank(4).unwrap(), engine.fingerprint())
    };

    let engine = RankEngine::open(temp_dir.path()).unwrap();
    assert_eq!(engine.rank(4), Some(rank));
    assert_eq!(engine.fingerprint(), fingerprint);
    assert_eq!(engine.status(4), Status::Computed);
}

#[test]
fn test_incremental_reference_score() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();

    let mut graph = EdgeList::from_edges(2, [(1, 2)]);
    engine.compute(&graph).unwrap();
    let fingerprint = engine.fingerprint();

    graph.add(1, 3);
    let outcome = engine.compute_incremental(&graph).unwrap();
    assert_eq!(outcome, Outcome::Appended { records: 1 });

    assert!((engine.normalized_rank(3) - 0.5).abs() < 1e-3);
    let (min, max) = engine.state().bounds().unwrap();
    let rank = engine.rank(3).unwrap();
    assert!(rank >= min && rank <= max);
    assert_ne!(engine.fingerprint(), fingerprint);
    assert_eq!(engine.state().last_ranked_id, 3);
    assert_eq!(engine.status(3), Status::Computed);
}

#[test]
fn test_incremental_twice_appends_once() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();

    let mut graph = EdgeList::from_edges(3, [(1, 2), (2, 3), (3, 1)]);
    engine.compute(&graph).unwrap();
    graph.add(1, 4);
    graph.add(2, 5);
    graph.add(4, 5);

    assert_eq!(
        engine.compute_incremental(&graph).unwrap(),
        Outcome::Appended { records: 2 }
    );
    let storage = temp_dir.path().join("storage");
    let len = std::fs::metadata(&storage).unwrap().len();
    let fingerprint = engine.fingerprint();

    assert_eq!(engine.compute_incremental(&graph).unwrap(), Outcome::NothingToDo);
    assert_eq!(std::fs::metadata(&storage).unwrap().len(), len);
    assert_eq!(engine.fingerprint(), fingerprint);
}

#[test]
fn test_incremental_without_inbound_links() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();

    let mut graph = EdgeList::from_edges(2, [(1, 2)]);
    engine.compute(&graph).unwrap();
    graph.add_node();
    assert_eq!(engine.status(3), Status::Outdated);

    assert_eq!(engine.compute_incremental(&graph).unwrap(), Outcome::NothingToDo);
    assert_eq!(engine.rank(3), None);
    assert_eq!(engine.state().last_ranked_id, 3);
    assert_eq!(engine.status(3), Status::Computed);
}

#[test]
fn test_status_transitions() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();
    assert_eq!(engine.status(4), Status::Empty);

    let graph = EdgeList::from_edges(4, [(1, 3), (1, 4), (2, 4)]);
    engine.compute(&graph).unwrap();
    assert_eq!(engine.status(4), Status::Computed);
    assert_eq!(engine.status(5), Status::Outdated);

    engine.set_filtering(true).unwrap();
    assert_eq!(engine.status(5), Status::ConfigChanged);
    engine.set_filtering(false).unwrap();
    assert_eq!(engine.status(4), Status::Computed);

    let err = engine.compute(&EdgeList::new(4)).unwrap_err();
    assert!(matches!(err, RankError::EmptyGraph));
    assert!(matches!(engine.status(4), Status::Error(msg) if msg.contains("no edges")));
    // The failed run left the previous ranks alone
    assert!(engine.rank(4).is_some());

    engine.compute(&graph).unwrap();
    assert_eq!(engine.status(4), Status::Computed);
}

#[test]
fn test_filter_change_after_filtered_run() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();

    let mut graph = TripleGraph::new();
    graph.add("<a>", "<knows>", "<b>");
    graph.add("<c>", "<likes>", "<b>");
    graph.add("<b>", "<knows>", "<d>");
    let likes = graph.lookup("<likes>").unwrap();
    let graph = Arc::new(graph);

    engine.add_filter_entry(FilterList::ExcludedPredicates, likes).unwrap();
    engine.set_filtering(true).unwrap();
    engine.compute(&engine.filtered(Arc::clone(&graph))).unwrap();
    let node_count = graph.entity_count();
    assert_eq!(engine.status(node_count), Status::Computed);

    engine.remove_filter_entry(FilterList::ExcludedPredicates, likes).unwrap();
    assert_eq!(engine.status(node_count), Status::ConfigChanged);
    engine.set_filtering(false).unwrap();
    assert_eq!(engine.status(node_count), Status::ConfigChanged);

    engine.compute(&engine.filtered(graph)).unwrap();
    assert_eq!(engine.status(node_count), Status::Computed);
}

#[test]
fn test_interrupted_full_computation_keeps_previous_file() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();
    engine
        .compute(&EdgeList::from_edges(3, [(1, 2), (2, 3)]))
        .unwrap();
    let storage = temp_dir.path().join("storage");
    let before = std::fs::read(&storage).unwrap();
    let rank = engine.rank(3);

    let source = Arc::new(GatedSource::new(EdgeList::from_edges(
        4,
        [(1, 2), (2, 3), (3, 4), (4, 1)],
    )));
    engine.compute_async(source.clone()).unwrap();
    source.wait_started();
    assert_eq!(engine.status(4), Status::Computing);

    engine.interrupt();
    source.open();
    assert_eq!(engine.wait_for_completion(), SlotState::Canceled);

    assert_eq!(engine.status(4), Status::Canceled);
    assert_eq!(std::fs::read(&storage).unwrap(), before);
    assert_eq!(engine.rank(3), rank);
    assert!(!temp_dir.path().join("graph").exists());
}

#[test]
fn test_interrupted_incremental_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();
    let mut edges = EdgeList::from_edges(2, [(1, 2)]);
    engine.compute(&edges).unwrap();
    let storage = temp_dir.path().join("storage");
    let before = std::fs::read(&storage).unwrap();

    edges.add(1, 3);
    let source = Arc::new(GatedSource::new(edges));
    engine.compute_incremental_async(source.clone()).unwrap();
    source.wait_started();
    engine.interrupt();
    source.open();

    assert_eq!(engine.wait_for_completion(), SlotState::Canceled);
    assert_eq!(std::fs::read(&storage).unwrap(), before);
    assert_eq!(engine.rank(3), None);
}

#[test]
fn test_second_computation_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();
    let source = Arc::new(GatedSource::new(EdgeList::from_edges(
        3,
        [(1, 2), (2, 3), (3, 1)],
    )));

    engine.compute_async(source.clone()).unwrap();
    source.wait_started();

    let other = Arc::new(EdgeList::from_edges(2, [(1, 2)]));
    assert!(matches!(engine.compute_async(other.clone()), Err(RankError::Busy)));
    assert!(matches!(engine.compute(other.as_ref()), Err(RankError::Busy)));
    assert!(matches!(
        engine.compute_incremental(other.as_ref()),
        Err(RankError::Busy)
    ));

    source.open();
    assert!(matches!(
        engine.wait_for_completion(),
        SlotState::Done(Outcome::Completed { nodes: 3, .. })
    ));
    assert_eq!(engine.status(3), Status::Computed);
    // The worker released the source
    assert_eq!(Arc::strong_count(&source), 1);
}

#[test]
fn test_export_writes_labels() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();

    let mut graph = TripleGraph::new();
    graph.add("<a>", "<p>", "<b>");
    graph.add("<c>", "<p>", "<b>");
    graph.add("<b>", "<name>", "\"Bee\"");
    let graph = Arc::new(graph);
    let source = engine.filtered(Arc::clone(&graph));
    engine.compute(&source).unwrap();

    let path = temp_dir.path().join("ranks.txt");
    let lines = engine.export(&path, &source).unwrap();
    assert_eq!(lines, graph.entity_count() - 1);

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(!text.contains("Bee"));
    let b = graph.lookup("<b>").unwrap();
    let expected = format!("<b> {}\n", engine.formatted_rank(b, 2));
    assert!(text.contains(&expected));
    for line in text.lines() {
        let (_, score) = line.rsplit_once(' ').unwrap();
        let score: f64 = score.parse().unwrap();
        assert!((0.0..=1.0).contains(&score));
    }
}

#[test]
fn test_both_flows_close_the_source() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();
    let mut source = CountingSource {
        edges: EdgeList::from_edges(2, [(1, 2)]),
        closed: AtomicUsize::new(0),
    };

    engine.compute(&source).unwrap();
    assert_eq!(source.closed.load(Ordering::SeqCst), 1);

    source.edges.add(2, 3);
    assert_eq!(
        engine.compute_incremental(&source).unwrap(),
        Outcome::Appended { records: 1 }
    );
    assert_eq!(source.closed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_panicking_source_releases_the_slot() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();

    engine.compute_async(Arc::new(BrokenSource)).unwrap();
    assert!(matches!(
        engine.wait_for_completion(),
        SlotState::Failed(msg) if msg.contains("edge cursor lost")
    ));
    assert!(matches!(engine.status(3), Status::Error(msg) if msg.contains("panicked")));

    let err = engine.compute(&BrokenSource).unwrap_err();
    assert!(matches!(err, RankError::Worker(_)));

    // Both the slot and the worker thread are still usable
    let graph = Arc::new(EdgeList::from_edges(3, [(1, 2), (2, 3)]));
    engine.compute_async(graph).unwrap();
    assert!(matches!(
        engine.wait_for_completion(),
        SlotState::Done(Outcome::Completed { nodes: 3, .. })
    ));
    assert_eq!(engine.status(3), Status::Computed);
}
