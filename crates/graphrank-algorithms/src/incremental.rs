//! Rank estimation for nodes added after the last full computation
//!
//! New nodes are not run through the power iteration. Each one gets a pseudo
//! rank blended from two local signals: how many inbound links it has compared
//! with the other new nodes, and the mean rank of the already ranked (stable)
//! nodes linking to it. The blended values are then squeezed into the rank
//! interval observed by the last full computation.

/// Largest batch of new nodes accepted by one incremental run
pub const MAX_NEW_NODES: u64 = 100_000_000;

/// Below this spread the blended values are treated as constant
pub const FLAT_SPREAD: f64 = 0.0001;

/// A value in [0, 1] stored as a 16 bit fixed-point fraction.
///
/// Conversion truncates, so a round trip loses at most `1 / 65535`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fraction16(u16);

impl Fraction16 {
    pub const ONE: Fraction16 = Fraction16(u16::MAX);

    pub fn from_f64(value: f64) -> Self {
        let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        Fraction16((clamped * u16::MAX as f64) as u16)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / u16::MAX as f64
    }

    pub fn raw(self) -> u16 {
        self.0
    }
}

/// What an incremental run learns about one new node's inbound links
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InboundStats {
    /// All inbound links
    pub links: u32,
    /// Inbound links whose source was ranked by the last full computation
    pub stable_links: u32,
    /// Mean rank of the stable sources
    pub stable_rank: Fraction16,
}

impl InboundStats {
    /// `stable_rank_sum` is the sum of the stable sources' ranks; the mean is
    /// clamped to [0, 1] before it is quantized.
    pub fn new(links: u32, stable_links: u32, stable_rank_sum: f64) -> Self {
        let mean = if stable_links != 0 {
            stable_rank_sum / stable_links as f64
        } else {
            0.0
        };
        Self {
            links,
            stable_links,
            stable_rank: Fraction16::from_f64(mean),
        }
    }
}

/// Largest inbound link count in a batch
pub fn max_links(stats: &[InboundStats]) -> u32 {
    stats.iter().map(|s| s.links).max().unwrap_or(0)
}

/// Blend the link-count rank with the stable-source rank.
///
/// The weight of the stable signal is the share of inbound links that come
/// from stable nodes. The result is clamped to [0, 1].
pub fn blended_rank(stats: &InboundStats, max_links: u32) -> f64 {
    if max_links == 0 {
        return 0.0;
    }
    let simple_rank = stats.links as f64 / max_links as f64;
    let c = if stats.links != 0 {
        stats.stable_links as f64 / stats.links as f64
    } else {
        0.0
    };
    let value = c * stats.stable_rank.to_f64() + (1.0 - c) * simple_rank;
    value.clamp(0.0, 1.0)
}

/// A closed rank interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Empty interval ready to be widened by [`Bounds::observe`]
    pub fn empty() -> Self {
        Self { min: 1.0, max: 0.0 }
    }

    pub fn observe(&mut self, value: f64) {
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn spread(&self) -> f64 {
        self.max - self.min
    }
}

/// Linear map from the blended interval into the old rank interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rescale {
    target: Bounds,
    slope: f64,
    offset: f64,
    flat: bool,
}

impl Rescale {
    /// Each target edge is the old edge when the new values overshoot it, and
    /// the midpoint between old and new edge otherwise, so the target never
    /// leaves `old`.
    pub fn new(new: Bounds, old: Bounds) -> Self {
        let min_adj = if new.min < old.min {
            old.min
        } else {
            0.5 * (new.min + old.min)
        };
        let max_adj = if new.max > old.max {
            old.max
        } else {
            0.5 * (new.max + old.max)
        };
        let target = Bounds::new(min_adj, max_adj);

        if new.spread() > FLAT_SPREAD {
            let slope = (max_adj - min_adj) / new.spread();
            let offset = min_adj - new.min * slope;
            Self {
                target,
                slope,
                offset,
                flat: false,
            }
        } else {
            Self {
                target,
                slope: 0.0,
                offset: max_adj,
                flat: true,
            }
        }
    }

    pub fn target(&self) -> Bounds {
        self.target
    }

    /// True when every value is mapped to the upper target edge
    pub fn is_flat(&self) -> bool {
        self.flat
    }

    pub fn apply(&self, value: f64) -> f64 {
        if self.flat {
            return self.target.max;
        }
        // Quantized inputs may sit a hair below the observed minimum
        (value * self.slope + self.offset).clamp(
            self.target.min.min(self.target.max),
            self.target.max.max(self.target.min),
        )
    }
}
