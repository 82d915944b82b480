//! Rank computation parameters

use graphrank_algorithms::{InvalidConfig, PageRankConfig, DEFAULT_PRECISION};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::adjacency::DEFAULT_BATCH_SIZE;

/// Configuration and state file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Parameter out of range
    #[error("Invalid configuration: {0}")]
    Invalid(#[from] InvalidConfig),

    /// Threshold precision out of range
    #[error("Invalid configuration: precision must be greater than 1, got {0}")]
    Precision(f64),

    /// I/O error on the state file
    #[error("State file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// State file is not valid JSON
    #[error("Corrupt state file {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Parameters of a rank computation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    /// Probability of following a link rather than jumping
    pub damping_factor: f64,
    /// Upper bound on power iterations
    pub max_iterations: usize,
    /// Convergence threshold on the L1 change between iterations
    pub epsilon: f64,
    /// Factor between adjacent threshold buckets
    pub precision: f64,
    /// Edges buffered before each adjacency table write
    pub batch_size: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        let pagerank = PageRankConfig::default();
        Self {
            damping_factor: pagerank.damping_factor,
            max_iterations: pagerank.max_iterations,
            epsilon: pagerank.epsilon,
            precision: DEFAULT_PRECISION,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl RankConfig {
    pub fn pagerank(&self) -> PageRankConfig {
        PageRankConfig {
            damping_factor: self.damping_factor,
            max_iterations: self.max_iterations,
            epsilon: self.epsilon,
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.pagerank().validate()?;
        if !(self.precision > 1.0) {
            return Err(ConfigError::Precision(self.precision));
        }
        Ok(())
    }
}
