//! Inter-channel phase estimation and correction
//!
//! - [`estimator`]: constant phase offset of each channel relative to channel 0
//! - [`imposer`]: rotate channels by a [`PhaseVector`] in place
//! - [`delay`]: integer sample lag between channels via FFT cross-correlation

pub mod delay;
pub mod estimator;
pub mod imposer;

use crate::NUM_CHANNELS;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from phase estimation, imposition and channel-set validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PhaseError {
    #[error("channel set is empty")]
    Empty,

    #[error("channel {0} is missing")]
    MissingChannel(usize),

    #[error("expected 4 channels, found {0}")]
    ChannelCount(usize),

    #[error("channel {channel} holds {found} values, expected {expected}")]
    LengthMismatch {
        channel: usize,
        expected: usize,
        found: usize,
    },

    #[error("channel {0} holds an odd number of values")]
    PartialPair(usize),

    #[error("reference sum for channel {0} averages to zero")]
    DegenerateReference(usize),
}

/// Per-channel phase in radians; entry 0 is the reference and is 0 for estimates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseVector {
    pub delta_phase0: f64,
    pub delta_phase1: f64,
    pub delta_phase2: f64,
    pub delta_phase3: f64,
}

impl PhaseVector {
    pub fn from_array(phases: [f64; NUM_CHANNELS]) -> Self {
        Self {
            delta_phase0: phases[0],
            delta_phase1: phases[1],
            delta_phase2: phases[2],
            delta_phase3: phases[3],
        }
    }

    pub fn as_array(&self) -> [f64; NUM_CHANNELS] {
        [
            self.delta_phase0,
            self.delta_phase1,
            self.delta_phase2,
            self.delta_phase3,
        ]
    }

    /// Phase of channel `k`, or `None` past the last channel
    pub fn get(&self, k: usize) -> Option<f64> {
        self.as_array().get(k).copied()
    }

    /// Negated vector; imposing it undoes the offsets this vector describes
    pub fn correction(&self) -> Self {
        Self::from_array(self.as_array().map(|p| -p))
    }

    /// Largest absolute phase across channels
    pub fn max_abs(&self) -> f64 {
        self.as_array().iter().fold(0.0, |acc, p| acc.max(p.abs()))
    }
}

impl From<[f64; NUM_CHANNELS]> for PhaseVector {
    fn from(phases: [f64; NUM_CHANNELS]) -> Self {
        Self::from_array(phases)
    }
}

impl fmt::Display for PhaseVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:+.6}, {:+.6}, {:+.6}, {:+.6}] rad",
            self.delta_phase0, self.delta_phase1, self.delta_phase2, self.delta_phase3
        )
    }
}
