//! History of phase estimates
//!
//! Repeated captures of the same setup should give the same offsets. The
//! store keeps a bounded, timestamped history and summarizes it per channel.
//! The median is the figure to report: one capture that caught a bad edge
//! shifts the mean but not the median.

use crate::phase::PhaseVector;
use crate::NUM_CHANNELS;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Default number of estimates kept
const MAX_HISTORY_SIZE: usize = 1000;

/// One phase estimate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseRecord {
    pub timestamp: DateTime<Utc>,
    pub phases: PhaseVector,
}

/// Summary of one channel across the history (radians)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ChannelSummary {
    /// Circular mean, robust to estimates straddling +/-pi
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

/// Per-channel summary of the stored estimates
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub count: usize,
    pub channels: [ChannelSummary; NUM_CHANNELS],
}

impl PhaseSummary {
    pub fn median(&self) -> PhaseVector {
        PhaseVector::from_array(self.channels.map(|c| c.median))
    }

    pub fn mean(&self) -> PhaseVector {
        PhaseVector::from_array(self.channels.map(|c| c.mean))
    }
}

/// Bounded history of phase estimates
#[derive(Debug)]
pub struct PhaseStore {
    history: VecDeque<PhaseRecord>,
    max_size: usize,
}

impl PhaseStore {
    pub fn new() -> Self {
        Self::with_max_size(MAX_HISTORY_SIZE)
    }

    /// Store keeping at most `max_size` estimates (at least one)
    pub fn with_max_size(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            history: VecDeque::with_capacity(max_size.min(MAX_HISTORY_SIZE)),
            max_size,
        }
    }

    /// Record an estimate, dropping the oldest once full
    pub fn record(&mut self, phases: PhaseVector) {
        self.history.push_back(PhaseRecord {
            timestamp: Utc::now(),
            phases,
        });
        while self.history.len() > self.max_size {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> &VecDeque<PhaseRecord> {
        &self.history
    }

    pub fn latest(&self) -> Option<&PhaseRecord> {
        self.history.back()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    /// Per-channel statistics, or `None` when nothing has been recorded
    pub fn summary(&self) -> Option<PhaseSummary> {
        if self.history.is_empty() {
            return None;
        }

        let mut channels = [ChannelSummary::default(); NUM_CHANNELS];
        for (k, summary) in channels.iter_mut().enumerate() {
            let mut values: Vec<f64> = self.history.iter().map(|r| r.phases.as_array()[k]).collect();
            *summary = summarize(&mut values);
        }

        Some(PhaseSummary {
            count: self.history.len(),
            channels,
        })
    }
}

impl Default for PhaseStore {
    fn default() -> Self {
        Self::new()
    }
}

fn summarize(values: &mut [f64]) -> ChannelSummary {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    let median = if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    };
    let (sin, cos) = values
        .iter()
        .fold((0.0, 0.0), |(s, c), v| (s + v.sin(), c + v.cos()));

    ChannelSummary {
        mean: sin.atan2(cos),
        median,
        min: values[0],
        max: values[n - 1],
    }
}
