//! PageRank power iteration with dangling-mass redistribution
//!
//! Ranks are kept as a normalized distribution: after every completed iteration
//! the values sum to 1. Nodes without outgoing edges spread their rank over the
//! whole graph.

use super::common::{EdgeTable, Interrupt, NodeId};
use thiserror::Error;
use tracing::{debug, error, info};

/// PageRank configuration
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageRankConfig {
    /// Damping factor (usually 0.85)
    pub damping_factor: f64,
    /// Upper bound on the number of iterations
    pub max_iterations: usize,
    /// Stop early once the L1 difference between two iterations drops to this value
    pub epsilon: f64,
}

impl Default for PageRankConfig {
    fn default() -> Self {
        Self {
            damping_factor: 0.85,
            max_iterations: 20,
            epsilon: 0.01,
        }
    }
}

/// Rejected configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidConfig {
    #[error("damping factor must be in (0, 1], got {0}")]
    DampingFactor(f64),

    #[error("epsilon must be a non-negative number, got {0}")]
    Epsilon(f64),

    #[error("at least one iteration is required")]
    NoIterations,
}

impl PageRankConfig {
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if !(self.damping_factor > 0.0 && self.damping_factor <= 1.0) {
            return Err(InvalidConfig::DampingFactor(self.damping_factor));
        }
        if !(self.epsilon >= 0.0) {
            return Err(InvalidConfig::Epsilon(self.epsilon));
        }
        if self.max_iterations == 0 {
            return Err(InvalidConfig::NoIterations);
        }
        Ok(())
    }
}

/// Result of a completed power iteration
#[derive(Debug, Clone)]
pub struct RankVector {
    /// One normalized rank per node id; slot 0 is the sentinel
    pub ranks: Vec<f64>,
    /// Smallest normalized rank seen in the last iteration
    pub min_rank: f64,
    /// Largest normalized rank seen in the last iteration
    pub max_rank: f64,
    /// Number of iterations actually executed
    pub iterations: usize,
    /// L1 difference between the last two iterations
    pub delta: f64,
}

impl RankVector {
    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<f64> {
        self.ranks.get(id as usize).copied()
    }

    pub fn sum(&self) -> f64 {
        self.ranks.iter().sum()
    }
}

/// Run the power iteration over every node of `table`.
///
/// Returns `Ok(None)` when `interrupt` is raised between two iterations; the
/// partially iterated array is dropped. The table is left for the caller to
/// shut down.
pub fn page_rank<T: EdgeTable>(
    table: &T,
    config: &PageRankConfig,
    interrupt: &Interrupt,
) -> Result<Option<RankVector>, T::Error> {
    let size = table.dimension() as usize;
    if size == 0 {
        return Ok(Some(RankVector {
            ranks: Vec::new(),
            min_rank: 0.0,
            max_rank: 0.0,
            iterations: 0,
            delta: 0.0,
        }));
    }

    let n = size as f64;
    let damping = config.damping_factor;
    let reset_probability = (1.0 - damping) / n;

    let mut prev_rank = vec![0.0; size];
    let mut curr_rank = vec![1.0 / n; size];

    let mut min_rank = 0.0;
    let mut max_rank = 0.0;
    let mut delta = 0.0;
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        debug!("Executing iteration #{}", iter);

        std::mem::swap(&mut curr_rank, &mut prev_rank);
        curr_rank.iter_mut().for_each(|r| *r = 0.0);

        // Spread rank along outgoing links; sinks go to the dangling pool
        let mut dangling_rank = 0.0;
        for idx in 0..size {
            let row = table.row(idx as NodeId)?;
            let outgoing = row.size();
            if outgoing == 0 {
                dangling_rank += prev_rank[idx];
            } else {
                let emission = prev_rank[idx] / outgoing as f64;
                for target in row {
                    curr_rank[target as usize] += emission;
                }
            }
        }

        dangling_rank /= n;
        let mut total_rank = 0.0;
        for value in curr_rank.iter_mut() {
            *value = (*value + dangling_rank) * damping + reset_probability;
            total_rank += *value;
        }

        min_rank = f64::MAX;
        max_rank = f64::MIN;
        let mut negatives = 0usize;
        for value in curr_rank.iter_mut() {
            if *value < 0.0 {
                negatives += 1;
            }
            if total_rank > 0.0 {
                *value /= total_rank;
            }
            if *value < min_rank {
                min_rank = *value;
            }
            if *value > max_rank {
                max_rank = *value;
            }
        }
        if negatives > 0 {
            error!("Negative rank detected for {} nodes in iteration #{}", negatives, iter);
        }

        delta = curr_rank
            .iter()
            .zip(prev_rank.iter())
            .filter(|(curr, _)| **curr >= 0.0)
            .map(|(curr, prev)| (curr - prev).abs())
            .sum();
        iterations = iter + 1;
        debug!("Iteration #{} is different by {:.6}", iter, delta);

        if delta <= config.epsilon {
            break;
        }

        if interrupt.is_raised() {
            info!("Rank computation interrupted after {} iterations", iterations);
            return Ok(None);
        }
    }

    Ok(Some(RankVector {
        ranks: curr_rank,
        min_rank,
        max_rank,
        iterations,
        delta,
    }))
}
