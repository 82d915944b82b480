//! Rank thresholds
//!
//! Raw ranks span many orders of magnitude. Thresholds split the sorted positive
//! ranks into buckets whose members stay within a fixed factor of the bucket's
//! smallest value; a raw rank is then mapped to a [0, 1] score by its bucket and
//! its position inside that bucket.

use rayon::prelude::*;

/// Default minimum factor between the lower bounds of two adjacent buckets
pub const DEFAULT_PRECISION: f64 = 100.0;

/// Compute the flattened `[min0, max0, min1, max1, ...]` bucket list.
///
/// Non-positive ranks are ignored. An empty list means there is no positive rank.
pub fn compute_thresholds(ranks: &[f64], precision: f64) -> Vec<f64> {
    let mut sorted = ranks.to_vec();
    sorted.par_sort_unstable_by(|a, b| a.total_cmp(b));

    let mut positives = sorted.into_iter().skip_while(|r| !(*r > 0.0));
    let Some(first) = positives.next() else {
        return Vec::new();
    };

    let mut thresholds = Vec::new();
    let (mut min, mut max) = (first, first);
    for cur in positives {
        if cur > min * precision {
            thresholds.push(min);
            thresholds.push(max);
            min = cur;
        }
        max = cur;
    }
    thresholds.push(min);
    thresholds.push(max);
    thresholds
}

/// Index (always even) of the bucket whose `[min, max]` contains `number`
pub fn find_threshold_index(number: f64, thresholds: &[f64]) -> Option<usize> {
    if !(number > 0.0) {
        return None;
    }
    thresholds
        .chunks_exact(2)
        .position(|pair| pair[0] <= number && number <= pair[1])
        .map(|bucket| bucket * 2)
}

/// Map a raw rank to a human-scale score in [0, 1].
///
/// Every bucket owns an equal slice of the unit interval; inside the slice the
/// rank is placed linearly between the bucket bounds. Ranks that fall in no
/// bucket score 0.
pub fn normalized_score(number: f64, thresholds: &[f64]) -> f64 {
    let Some(index) = find_threshold_index(number, thresholds) else {
        return 0.0;
    };
    let min = thresholds[index];
    let max = thresholds[index + 1];
    if min == max {
        return 1.0;
    }
    ((number - min) / (max - min) + (index / 2) as f64) * (2.0 / thresholds.len() as f64)
}
