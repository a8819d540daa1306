//! Integer sample lag between channels
//!
//! Phase estimation only holds when all four channels are sample-aligned. A
//! missed trigger edge on one device shows up as a whole-sample lag between
//! that device's channels and channel 0, which this module measures with an
//! FFT cross-correlation against channel 0.

use super::PhaseError;
use crate::capture::demux::ChannelSet;
use crate::NUM_CHANNELS;
use rustfft::{num_complex::Complex, FftPlanner};

/// Lag of each channel relative to channel 0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleOffsets {
    /// Lag in I/Q pairs; positive when the channel trails channel 0
    pub lags: [i64; NUM_CHANNELS],
    /// Normalized correlation peak (0.0 to 1.0)
    pub confidence: [f64; NUM_CHANNELS],
}

impl SampleOffsets {
    /// True when every channel peaks at zero lag
    pub fn is_aligned(&self) -> bool {
        self.lags.iter().all(|&lag| lag == 0)
    }
}

fn to_complex(samples: &[i16], size: usize) -> Vec<Complex<f64>> {
    samples
        .chunks_exact(2)
        .map(|p| Complex::new(f64::from(p[0]), f64::from(p[1])))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect()
}

fn energy(samples: &[Complex<f64>]) -> f64 {
    samples.iter().map(|c| c.norm_sqr()).sum()
}

/// Find the lag of channels 1-3 against channel 0
///
/// # Arguments
/// * `channels` - Four aligned channels of interleaved I/Q samples
/// * `max_lag` - Largest lag searched in either direction, in I/Q pairs
///
/// # Returns
/// Per-channel lags and confidences; channel 0 is always lag 0, confidence 1
pub fn estimate_sample_offsets(
    channels: &ChannelSet,
    max_lag: usize,
) -> Result<SampleOffsets, PhaseError> {
    if channels.is_empty() {
        return Err(PhaseError::Empty);
    }

    let pairs = channels.pairs();
    let max_lag = max_lag.min(pairs - 1) as i64;
    // Zero padding to 2N keeps the circular correlation free of wrap-around
    let fft_size = (pairs * 2).next_power_of_two();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(fft_size);
    let ifft = planner.plan_fft_inverse(fft_size);

    let mut reference = to_complex(channels.channel(0), fft_size);
    let reference_energy = energy(&reference);
    fft.process(&mut reference);

    let mut offsets = SampleOffsets {
        lags: [0; NUM_CHANNELS],
        confidence: [1.0, 0.0, 0.0, 0.0],
    };

    for k in 1..NUM_CHANNELS {
        let mut spectrum = to_complex(channels.channel(k), fft_size);
        let channel_energy = energy(&spectrum);
        fft.process(&mut spectrum);

        for (s, r) in spectrum.iter_mut().zip(&reference) {
            *s *= r.conj();
        }
        ifft.process(&mut spectrum);

        let norm = 1.0 / fft_size as f64;
        let mut peak = 0.0;
        let mut peak_lag = 0i64;
        for lag in -max_lag..=max_lag {
            let index = lag.rem_euclid(fft_size as i64) as usize;
            let magnitude = spectrum[index].norm() * norm;
            if magnitude > peak {
                peak = magnitude;
                peak_lag = lag;
            }
        }

        let scale = (reference_energy * channel_energy).sqrt();
        offsets.lags[k] = peak_lag;
        offsets.confidence[k] = if scale > 1e-10 {
            (peak / scale).clamp(0.0, 1.0)
        } else {
            0.0
        };
    }

    if !offsets.is_aligned() {
        tracing::warn!(lags = ?offsets.lags, "Channels are not sample-aligned");
    }
    Ok(offsets)
}
