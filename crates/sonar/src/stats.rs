//! Rank-driven stat curves.
//!
//! Both curves saturate exponentially, so every additional rank is worth a
//! little less than the previous one.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};

pub const MIN_DAMPENING: f64 = 0.2;
pub const MAX_DAMPENING: f64 = 1.0;
const DAMPENING_RATE: f64 = 0.3;

pub const BASE_PERCEPTION_RADIUS: f64 = 200.0;
pub const MAX_PERCEPTION_RADIUS: f64 = 350.0;
const PERCEPTION_RATE: f64 = 0.25;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    From,
    Into,
)]
#[serde(transparent)]
pub struct Rank(u32);

impl Rank {
    pub const ZERO: Rank = Rank(0);

    /// Negative input becomes zero; anything past `u32::MAX` saturates.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, u32::MAX as i64) as u32)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

/// Multiplier applied to emitted intensity: 1.0 at rank 0, approaching 0.2.
pub fn dampening_factor(rank: Rank) -> f64 {
    let reduction =
        (MAX_DAMPENING - MIN_DAMPENING) * (1.0 - (-DAMPENING_RATE * rank.0 as f64).exp());
    (MAX_DAMPENING - reduction).clamp(MIN_DAMPENING, MAX_DAMPENING)
}

/// Hearing range in world units: 200 at rank 0, approaching 350.
pub fn perception_radius(rank: Rank) -> f64 {
    let bonus = (MAX_PERCEPTION_RADIUS - BASE_PERCEPTION_RADIUS)
        * (1.0 - (-PERCEPTION_RATE * rank.0 as f64).exp());
    (BASE_PERCEPTION_RADIUS + bonus).clamp(BASE_PERCEPTION_RADIUS, MAX_PERCEPTION_RADIUS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlayerStats {
    dampening_rank: Rank,
    range_rank: Rank,
}

impl PlayerStats {
    pub fn new(dampening_rank: Rank, range_rank: Rank) -> Self {
        Self {
            dampening_rank,
            range_rank,
        }
    }

    pub fn dampening_rank(&self) -> Rank {
        self.dampening_rank
    }

    pub fn range_rank(&self) -> Rank {
        self.range_rank
    }

    pub fn set_dampening_rank(&mut self, value: i64) {
        self.dampening_rank = Rank::clamped(value);
    }

    pub fn set_range_rank(&mut self, value: i64) {
        self.range_rank = Rank::clamped(value);
    }

    pub fn dampening_factor(&self) -> f64 {
        dampening_factor(self.dampening_rank)
    }

    pub fn perception_radius(&self) -> f64 {
        perception_radius(self.range_rank)
    }
}
