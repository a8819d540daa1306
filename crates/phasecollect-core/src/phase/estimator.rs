//! Phase-delta estimation
//!
//! For each channel k in 1..=3 the estimator keeps running means of the sum
//! `S = ch0 + chk` and difference `D = ch0 - chk` over every I/Q pair. If
//! `chk = ch0 * e^{j*phi}` then `D/S = -j*tan(phi/2)`, so
//! `phi = 2*atan(-Im(D/S))`.
//!
//! The estimate assumes the channels carry the same coherent carrier and
//! differ only by a constant rotation. It is not a delay estimator; see
//! [`super::delay`] for sample lags.

use super::{PhaseError, PhaseVector};
use crate::capture::csv::read_csv;
use crate::capture::demux::ChannelSet;
use crate::error::SamplerError;
use crate::NUM_CHANNELS;
use rustfft::num_complex::Complex64;
use std::path::Path;

/// Incremental mean, `avg(n+1) = (avg(n)*n + x) / (n+1)`
#[derive(Debug, Clone, Copy, Default)]
struct RunningMean {
    mean: Complex64,
    count: u64,
}

impl RunningMean {
    fn push(&mut self, x: Complex64) {
        let n = self.count as f64;
        self.mean = (self.mean * n + x) / (n + 1.0);
        self.count += 1;
    }
}

fn iq(pair: &[i16]) -> Complex64 {
    Complex64::new(f64::from(pair[0]), f64::from(pair[1]))
}

/// Phase of `channel` relative to `reference`, both interleaved I/Q of equal length
fn phase_delta(reference: &[i16], channel: &[i16], k: usize) -> Result<f64, PhaseError> {
    let mut sum = RunningMean::default();
    let mut diff = RunningMean::default();

    for (a, b) in reference.chunks_exact(2).zip(channel.chunks_exact(2)) {
        let (a, b) = (iq(a), iq(b));
        sum.push(a + b);
        diff.push(a - b);
    }

    if sum.mean.norm() == 0.0 {
        return Err(PhaseError::DegenerateReference(k));
    }
    let ratio = diff.mean / sum.mean;
    Ok(2.0 * (-ratio.im).atan())
}

/// Estimate the phase of channels 1-3 relative to channel 0
///
/// # Arguments
/// * `channels` - Four aligned channels of interleaved I/Q samples
///
/// # Returns
/// Offsets in radians within (-pi, pi); `delta_phase0` is exactly 0
pub fn estimate_phase(channels: &ChannelSet) -> Result<PhaseVector, PhaseError> {
    if channels.is_empty() {
        return Err(PhaseError::Empty);
    }

    let reference = channels.channel(0);
    let mut phases = [0.0; NUM_CHANNELS];
    for (k, phase) in phases.iter_mut().enumerate().skip(1) {
        *phase = phase_delta(reference, channels.channel(k), k)?;
    }

    let estimate = PhaseVector::from_array(phases);
    tracing::debug!(pairs = channels.pairs(), %estimate, "Estimated phase deltas");
    Ok(estimate)
}

/// Load a capture CSV and estimate its phase deltas
pub fn estimate_phase_csv(path: &Path) -> Result<PhaseVector, SamplerError> {
    let channels = read_csv(path)?;
    Ok(estimate_phase(&channels)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::synthetic_channel_set;
    use approx::assert_abs_diff_eq;

    const TOLERANCE: f64 = 1e-3;

    fn check_recovers(phases: [f64; 4]) {
        let cs = synthetic_channel_set(phases, 1000, 32767.0, 1.0).unwrap();
        let estimate = estimate_phase(&cs).unwrap();
        assert_eq!(estimate.delta_phase0, 0.0);
        for k in 1..4 {
            assert_abs_diff_eq!(
                estimate.get(k).unwrap(),
                phases[k] - phases[0],
                epsilon = TOLERANCE
            );
        }
    }

    #[test]
    fn test_recovers_small_offsets() {
        check_recovers([0.0, 0.262, 0.524, 0.785]);
    }

    #[test]
    fn test_recovers_mixed_sign_offsets() {
        check_recovers([0.0, -1.0, 2.0, -2.9]);
    }

    #[test]
    fn test_recovers_offsets_near_pi() {
        check_recovers([0.0, 3.0, -0.1, 1.5]);
    }

    #[test]
    fn test_recovers_tiny_offset() {
        check_recovers([0.0, 0.001, -0.5, 2.5]);
    }

    #[test]
    fn test_quarter_turn_single_pair() {
        let cs = ChannelSet::from_array([
            vec![1000, 0],
            vec![0, 1000],
            vec![1000, 0],
            vec![-1000, 0],
        ])
        .unwrap();
        // Channel 3 is exactly pi away: S averages to zero
        assert_eq!(
            estimate_phase(&cs).unwrap_err(),
            PhaseError::DegenerateReference(3)
        );

        let cs = ChannelSet::from_array([
            vec![1000, 0],
            vec![0, 1000],
            vec![1000, 0],
            vec![0, -1000],
        ])
        .unwrap();
        let estimate = estimate_phase(&cs).unwrap();
        assert_abs_diff_eq!(estimate.delta_phase1, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_abs_diff_eq!(estimate.delta_phase2, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(estimate.delta_phase3, -std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
    }

    #[test]
    fn test_empty_set_rejected() {
        let cs = ChannelSet::from_array(Default::default()).unwrap();
        assert_eq!(estimate_phase(&cs).unwrap_err(), PhaseError::Empty);
    }

    #[test]
    fn test_silent_channels_are_degenerate() {
        let cs = ChannelSet::from_array([vec![0; 8], vec![0; 8], vec![0; 8], vec![0; 8]]).unwrap();
        assert_eq!(
            estimate_phase(&cs).unwrap_err(),
            PhaseError::DegenerateReference(1)
        );
    }

    #[test]
    fn test_running_mean_matches_batch_mean() {
        let mut mean = RunningMean::default();
        for x in [1.0, 2.0, 3.0, 6.0] {
            mean.push(Complex64::new(x, -x));
        }
        assert_eq!(mean.count, 4);
        assert_abs_diff_eq!(mean.mean.re, 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mean.mean.im, -3.0, epsilon = 1e-12);
    }
}
