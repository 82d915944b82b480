//! Persistent engine state
//!
//! Stored as `state.json` next to the rank file. It remembers what the last
//! computations produced (bounds, fingerprint, last ranked id) and the filter
//! configuration, so status and incremental runs survive restarts.

use crate::config::{ConfigError, ConfigResult, RankConfig};
use crate::source::EdgeFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything persisted between runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankState {
    /// Highest id that has a rank, or was examined by an incremental run
    pub last_ranked_id: u64,
    /// Smallest rank of the last full computation
    pub min_rank: Option<f64>,
    /// Largest rank of the last full computation
    pub max_rank: Option<f64>,
    /// XOR fingerprint of the rank file
    pub fingerprint: u64,
    /// Apply `filter` when reading edges
    pub filtering: bool,
    pub filter: EdgeFilter,
    pub config: RankConfig,
    /// Filter digest captured by the last full computation
    pub computed_config_digest: Option<String>,
    /// Filtering flag in effect during the last full computation
    pub computed_with_filtering: bool,
    /// RFC 3339 time of the last full computation
    pub computed_at: Option<String>,
}

impl Default for RankState {
    fn default() -> Self {
        Self {
            last_ranked_id: 0,
            min_rank: None,
            max_rank: None,
            fingerprint: 0,
            filtering: false,
            filter: EdgeFilter::default(),
            config: RankConfig::default(),
            computed_config_digest: None,
            computed_with_filtering: false,
            computed_at: None,
        }
    }
}

impl RankState {
    /// Digest of the current filter configuration
    pub fn config_digest(&self) -> String {
        self.filter.digest(self.filtering)
    }

    /// The filter configuration differs from the one the ranks were computed with
    pub fn config_outdated(&self) -> bool {
        if !self.filtering && !self.computed_with_filtering {
            return false;
        }
        self.computed_config_digest.as_deref() != Some(self.config_digest().as_str())
    }

    /// Rank bounds recorded by the last full computation
    pub fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.min_rank?, self.max_rank?))
    }

    /// The filter to apply, if filtering is on
    pub fn active_filter(&self) -> Option<EdgeFilter> {
        self.filtering.then(|| self.filter.clone())
    }
}

/// State backed by a JSON file
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    state: RankState,
}

impl StateFile {
    /// Load `path`, creating it with defaults when missing
    pub fn open(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        match fs::read(&path) {
            Ok(bytes) => {
                let state = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Json {
                    path: path.clone(),
                    source,
                })?;
                debug!("Loaded state from {:?}", path);
                Ok(Self { path, state })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("Creating state file {:?}", path);
                let file = Self {
                    path,
                    state: RankState::default(),
                };
                file.save()?;
                Ok(file)
            }
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    pub fn state(&self) -> &RankState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` and persist the result.
    ///
    /// If saving fails the in-memory state keeps the change.
    pub fn update<R>(&mut self, change: impl FnOnce(&mut RankState) -> R) -> ConfigResult<R> {
        let result = change(&mut self.state);
        self.save()?;
        Ok(result)
    }

    /// Write through a temporary file so a crash never leaves half a state file
    fn save(&self) -> ConfigResult<()> {
        let io_err = |source| ConfigError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(&self.state).map_err(|source| ConfigError::Json {
            path: self.path.clone(),
            source,
        })?;

        let temp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp).map_err(io_err)?;
        file.write_all(&json).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        fs::rename(&temp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FilterList;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        let file = StateFile::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(file.state(), &RankState::default());
        assert_eq!(file.state().bounds(), None);
    }

    #[test]
    fn test_update_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        {
            let mut file = StateFile::open(&path).unwrap();
            file.update(|s| {
                s.min_rank = Some(0.1);
                s.max_rank = Some(0.4);
                s.last_ranked_id = 9;
                s.filter.add(FilterList::ExcludedGraphs, 3);
            })
            .unwrap();
        }

        let file = StateFile::open(&path).unwrap();
        assert_eq!(file.state().bounds(), Some((0.1, 0.4)));
        assert_eq!(file.state().last_ranked_id, 9);
        assert!(file.state().filter.excluded_graphs.contains(&3));
    }

    #[test]
    fn test_corrupt_state_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("state.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let err = StateFile::open(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Json { .. }));
    }

    #[test]
    fn test_config_outdated() {
        let mut state = RankState::default();
        // Never filtered, never computed with a filter
        assert!(!state.config_outdated());

        state.filtering = true;
        assert!(state.config_outdated());

        state.computed_config_digest = Some(state.config_digest());
        state.computed_with_filtering = true;
        assert!(!state.config_outdated());

        state.filter.add(FilterList::IncludedPredicates, 7);
        assert!(state.config_outdated());

        // Turning filtering off after a filtered run is a change too
        state.computed_config_digest = Some(state.config_digest());
        state.filtering = false;
        assert!(state.config_outdated());
    }
}
