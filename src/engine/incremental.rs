//! Incremental computation: estimate ranks for ids added since the last run
//! and append them to the rank file

use super::{Inner, Outcome, RankError, RankResult};
use crate::source::GraphSource;
use crate::storage::{append_records, MAX_RECORD_ID};
use graphrank_algorithms::{
    blended_rank, max_links, Bounds, Fraction16, InboundStats, Rescale, MAX_NEW_NODES,
};
use tracing::{debug, info, warn};

pub(crate) fn run(inner: &Inner, source: &dyn GraphSource) -> RankResult<Outcome> {
    let storage = inner.storage_path();
    if !storage.exists() {
        return Err(RankError::Precondition(
            "no rank file found, perform a full computation first".to_string(),
        ));
    }
    let state = inner.state();
    let (min_old, max_old) = state.bounds().ok_or_else(|| {
        RankError::Precondition(
            "rank bounds are unknown, perform a full computation first".to_string(),
        )
    })?;

    let beg_id = inner.reader.size();
    let end_id = source.node_count() + 1;
    if beg_id >= end_id || end_id <= state.last_ranked_id + 1 {
        debug!("No new nodes to rank ({}..{})", beg_id, end_id);
        return Ok(Outcome::NothingToDo);
    }

    let count = end_id - beg_id;
    if count > MAX_NEW_NODES {
        return Err(RankError::Capacity(format!(
            "{} new nodes exceed the incremental limit of {}",
            count, MAX_NEW_NODES
        )));
    }
    if end_id - 1 > MAX_RECORD_ID {
        return Err(RankError::Capacity(format!(
            "node id {} does not fit in the rank file",
            end_id - 1
        )));
    }
    info!("Incremental rank computation for ids {}..{}", beg_id, end_id);

    let stats = inbound_stats(inner, source, beg_id, end_id);
    source.close();
    let Some(stats) = stats? else {
        warn!("Incremental computation interrupted before writing");
        return Ok(Outcome::Interrupted);
    };

    let max_in = max_links(&stats);
    if max_in == 0 {
        info!("New nodes have no inbound links, nothing to append");
        inner.update_state(|s| s.last_ranked_id = end_id - 1)?;
        return Ok(Outcome::NothingToDo);
    }

    let mut bounds = Bounds::empty();
    let mut blended = Vec::with_capacity(stats.len());
    for node_stats in &stats {
        if inner.interrupt.is_raised() {
            warn!("Incremental computation interrupted before writing");
            return Ok(Outcome::Interrupted);
        }
        let value = blended_rank(node_stats, max_in);
        bounds.observe(value);
        blended.push(Fraction16::from_f64(value));
    }
    drop(stats);

    let rescale = Rescale::new(bounds, Bounds::new(min_old, max_old));
    debug!(
        "Rescaling [{}, {}] into [{}, {}]",
        bounds.min,
        bounds.max,
        rescale.target().min,
        rescale.target().max
    );

    append_estimates(
        inner,
        beg_id,
        end_id,
        blended.iter().map(|value| rescale.apply(value.to_f64())),
    )
}

/// Inbound link statistics of ids `beg_id..end_id`; `None` if interrupted
fn inbound_stats(
    inner: &Inner,
    source: &dyn GraphSource,
    beg_id: u64,
    end_id: u64,
) -> RankResult<Option<Vec<InboundStats>>> {
    let mut stats = Vec::with_capacity((end_id - beg_id) as usize);
    for id in beg_id..end_id {
        if inner.interrupt.is_raised() {
            return Ok(None);
        }
        let mut links = 0u64;
        let mut stable_links = 0u64;
        let mut stable_sum = 0.0;
        for edge in source.inbound(id) {
            links += 1;
            if edge.from < beg_id {
                stable_links += 1;
                stable_sum += inner.reader.read(edge.from).unwrap_or(0.0);
            }
        }
        let links = u32::try_from(links).map_err(|_| {
            RankError::Capacity(format!("node {} has {} inbound links", id, links))
        })?;
        // stable_links <= links
        stats.push(InboundStats::new(links, stable_links as u32, stable_sum));
    }
    Ok(Some(stats))
}

/// Append `ranks` as ids `beg_id..end_id` and record how far the file got
fn append_estimates(
    inner: &Inner,
    beg_id: u64,
    end_id: u64,
    ranks: impl IntoIterator<Item = f64>,
) -> RankResult<Outcome> {
    let count = end_id - beg_id;
    let appended = append_records(inner.storage_path(), beg_id, ranks, &inner.interrupt)?;

    let last_ranked_id = if appended.interrupted {
        (beg_id + appended.written).saturating_sub(1)
    } else {
        end_id - 1
    };
    inner.update_state(|s| {
        s.fingerprint ^= appended.fingerprint;
        s.last_ranked_id = s.last_ranked_id.max(last_ranked_id);
    })?;
    inner.reader.reload()?;

    if appended.interrupted {
        warn!(
            "Incremental computation interrupted after appending {} of {} records",
            appended.written, count
        );
        return Ok(Outcome::Interrupted);
    }
    info!("Appended {} incremental ranks", appended.written);
    Ok(Outcome::Appended {
        records: appended.written,
    })
}
