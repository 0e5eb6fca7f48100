//! Adaptive low/high watermarks over the free pool.
//!
//! Both thresholds are whole slab counts. They start at 15% and 75% of the
//! slab population and ratchet: repeated pressure (free pool below the low
//! mark) doubles them, sustained slack (free pool above the high mark) shrinks
//! them by 10%, each within fixed bounds. Products are truncated toward zero.

use serde::{Deserialize, Serialize};

const INITIAL_LOW_RATIO: f64 = 0.15;
const INITIAL_HIGH_RATIO: f64 = 0.75;
const HIGH_CEILING_RATIO: f64 = 0.9;
const LOW_FLOOR_RATIO: f64 = 0.05;
const HIGH_FLOOR_RATIO: f64 = 0.6;
const RESERVE_CAP_RATIO: f64 = 0.20;
const GROWTH_FACTOR: f64 = 2.0;
const SHRINK_FACTOR: f64 = 0.9;
/// Free slabs beyond `low * DRAIN_FACTOR` are moved into the reserve.
const DRAIN_FACTOR: f64 = 1.5;

fn scale(count: usize, ratio: f64) -> usize {
    (count as f64 * ratio) as usize
}

/// Which way a policy tick moved the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Adjustment {
    /// Both thresholds grew under pressure.
    Grew,
    /// Both thresholds shrank because of slack.
    Shrank,
    /// Thresholds unchanged.
    Held,
}

/// Persistent watermark state for one cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermarks {
    total_slabs: usize,
    low: usize,
    high: usize,
}

impl Watermarks {
    /// Initialize the thresholds from the slab population.
    pub fn new(total_slabs: usize) -> Self {
        Self {
            total_slabs,
            low: scale(total_slabs, INITIAL_LOW_RATIO),
            high: scale(total_slabs, INITIAL_HIGH_RATIO),
        }
    }

    /// Grow or shrink the thresholds based on the current free pool size.
    ///
    /// At most one direction applies per call.
    pub fn adapt(&mut self, free_len: usize) -> Adjustment {
        let total = self.total_slabs;
        if free_len < self.low && self.low < self.low_ceiling() {
            self.low = scale(self.low, GROWTH_FACTOR).min(self.low_ceiling());
            self.high = scale(self.high, GROWTH_FACTOR).min(scale(total, HIGH_CEILING_RATIO));
            Adjustment::Grew
        } else if free_len > self.high && self.low as f64 > total as f64 * LOW_FLOOR_RATIO {
            self.low = scale(self.low, SHRINK_FACTOR).max(self.low_floor());
            self.high = scale(self.high, SHRINK_FACTOR).max(scale(total, HIGH_FLOOR_RATIO));
            Adjustment::Shrank
        } else {
            Adjustment::Held
        }
    }

    /// Current low watermark.
    pub fn low(&self) -> usize {
        self.low
    }

    /// Current high watermark.
    pub fn high(&self) -> usize {
        self.high
    }

    /// Upper bound of the low watermark, half the slab population.
    pub fn low_ceiling(&self) -> usize {
        self.total_slabs / 2
    }

    /// Lower bound of the low watermark.
    pub fn low_floor(&self) -> usize {
        scale(self.total_slabs, LOW_FLOOR_RATIO)
    }

    /// Maximum number of slabs held in the reserve pool.
    pub fn reserve_cap(&self) -> usize {
        scale(self.total_slabs, RESERVE_CAP_RATIO)
    }

    /// Whether a free pool of `free_len` slabs has enough slack to feed the reserve.
    pub fn should_drain(&self, free_len: usize) -> bool {
        free_len as f64 > self.low as f64 * DRAIN_FACTOR
    }

    /// Whether the free pool is below the low watermark.
    pub fn below_low(&self, free_len: usize) -> bool {
        free_len < self.low
    }

    /// Whether a free pool of `free_len` slabs with an empty reserve needs
    /// garbage collection.
    pub fn should_escalate(&self, free_len: usize) -> bool {
        free_len < self.low / 2
    }
}
