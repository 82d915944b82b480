//! Full computation: rank every node and replace the rank file

use super::computer::RankComputer;
use super::{Inner, Outcome, RankError, RankResult};
use crate::source::GraphSource;
use crate::storage::RankFileWriter;
use std::fs;
use tracing::{info, warn};

pub(crate) fn run(inner: &Inner, source: &dyn GraphSource) -> RankResult<Outcome> {
    let state = inner.state();
    let config = state.config;
    config.validate()?;
    info!(
        "Starting full rank computation over {} nodes (damping {}, epsilon {}, max {} iterations)",
        source.node_count(),
        config.damping_factor,
        config.epsilon,
        config.max_iterations
    );

    let computer = RankComputer::new(&config, &inner.interrupt, inner.table_path());
    let Some(vector) = computer.compute(source)? else {
        return Ok(Outcome::Interrupted);
    };

    // The live file is only replaced once the new one is complete
    let temp = inner.temp_storage_path();
    let storage = inner.storage_path();
    let written = match RankFileWriter::new()
        .with_precision(config.precision)
        .write(&temp, &vector.ranks)
    {
        Ok(written) => written,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&temp) {
                warn!("Could not remove {:?}: {}", temp, cleanup);
            }
            return Err(e.into());
        }
    };
    fs::rename(&temp, &storage).map_err(RankError::Io)?;

    let last_id = vector.len() as u64 - 1;
    let digest = state.config_digest();
    inner.update_state(|s| {
        s.min_rank = Some(vector.min_rank);
        s.max_rank = Some(vector.max_rank);
        s.fingerprint = written.fingerprint;
        s.last_ranked_id = last_id;
        s.computed_config_digest = Some(digest);
        s.computed_with_filtering = state.filtering;
        s.computed_at = Some(chrono::Utc::now().to_rfc3339());
    })?;
    inner.reader.reload()?;

    info!(
        "Ranked {} nodes, ranks in [{}, {}], {} thresholds",
        last_id,
        vector.min_rank,
        vector.max_rank,
        written.thresholds.len()
    );
    Ok(Outcome::Completed {
        nodes: last_id,
        iterations: vector.iterations,
        fingerprint: written.fingerprint,
    })
}
