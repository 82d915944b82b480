//! Integration tests for the rank file writer and the paged reader

use graphrank::storage::{fingerprint, Header, RECORD_SIZE};
use graphrank::{RankEngine, RankFileReader, RankFileWriter, EdgeList};
use graphrank_algorithms::{compute_thresholds, find_threshold_index, DEFAULT_PRECISION};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

fn skewed_ranks(len: usize, seed: u64) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ranks: Vec<f64> = (0..len).map(|_| rng.gen::<f64>().powi(6) + 1e-9).collect();
    let total: f64 = ranks.iter().sum();
    ranks.iter_mut().for_each(|r| *r /= total);
    ranks
}

#[test]
fn test_write_then_read_every_id() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("storage");
    let ranks = skewed_ranks(12_345, 1);

    let written = RankFileWriter::new().write(&path, &ranks).unwrap();
    let reader = RankFileReader::open(&path).unwrap();

    assert_eq!(reader.size(), ranks.len() as u64);
    assert_eq!(reader.header_len(), Header::new(written.thresholds.clone()).len());
    assert_eq!(
        std::fs::metadata(&path).unwrap().len(),
        reader.header_len() + ranks.len() as u64 * RECORD_SIZE
    );

    assert_eq!(reader.read(0), None);
    assert_eq!(reader.read(ranks.len() as u64), None);
    assert_eq!(reader.read(u64::MAX), None);
    for (id, rank) in ranks.iter().enumerate().skip(1) {
        assert_eq!(reader.read(id as u64), Some(*rank));
    }
    assert_eq!(written.fingerprint, fingerprint(&ranks));
}

#[test]
fn test_reads_beyond_page_budget() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("storage");
    let ranks = skewed_ranks(20_000, 2);
    RankFileWriter::new().write(&path, &ranks).unwrap();

    // 20 pages through a 3 page cache, in an order that keeps evicting
    let reader = RankFileReader::with_page_budget(&path, 3).unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    for _ in 0..5_000 {
        let id = rng.gen_range(1..ranks.len() as u64);
        assert_eq!(reader.read(id), Some(ranks[id as usize]));
        assert!(reader.resident_pages() <= 3);
    }
}

#[test]
fn test_thresholds_respect_precision() {
    let ranks = skewed_ranks(50_000, 3);
    let thresholds = compute_thresholds(&ranks, DEFAULT_PRECISION);
    assert_eq!(thresholds.len() % 2, 0);

    for pair in thresholds.chunks_exact(2) {
        assert!(pair[0] <= pair[1]);
        assert!(pair[1] <= pair[0] * DEFAULT_PRECISION);
    }
    for window in thresholds.windows(2) {
        assert!(window[0] <= window[1]);
    }
    // Every next bucket starts past the previous bucket's ratio limit
    for i in (2..thresholds.len()).step_by(2) {
        assert!(thresholds[i] > thresholds[i - 2] * DEFAULT_PRECISION);
    }
    for rank in ranks.iter().filter(|r| **r > 0.0) {
        assert!(find_threshold_index(*rank, &thresholds).is_some());
    }
}

#[test]
fn test_engine_fingerprint_matches_file() {
    let temp_dir = TempDir::new().unwrap();
    let engine = RankEngine::open(temp_dir.path()).unwrap();
    let mut graph = EdgeList::from_edges(5, [(1, 2), (2, 3), (3, 4), (4, 5), (5, 1), (1, 3)]);
    engine.compute(&graph).unwrap();

    graph.add(2, 6);
    graph.add(6, 7);
    engine.compute_incremental(&graph).unwrap();

    let ranks: Vec<f64> = (0..8u64)
        .map(|id| engine.rank(id).unwrap_or(0.0))
        .collect();
    // Slot 0 contributes nothing to the fingerprint
    assert_eq!(engine.fingerprint(), fingerprint(&ranks));
}
