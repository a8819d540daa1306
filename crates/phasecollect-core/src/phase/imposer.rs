//! In-place phase rotation of a channel set

use super::{PhaseError, PhaseVector};
use crate::capture::demux::ChannelSet;
use crate::signal::quantize;
use rustfft::num_complex::Complex64;

fn rotate(samples: &mut [i16], phase: f64) {
    if phase == 0.0 {
        return;
    }
    let phasor = Complex64::from_polar(1.0, phase);
    for pair in samples.chunks_exact_mut(2) {
        let z = Complex64::new(f64::from(pair[0]), f64::from(pair[1])) * phasor;
        pair[0] = quantize(z.re);
        pair[1] = quantize(z.im);
    }
}

/// Multiply every sample of channel k by `e^{j*phases[k]}`, re-quantized in place
///
/// Rotated samples are rounded to the nearest integer and saturate at the
/// i16 limits.
pub fn impose_phase(channels: &mut ChannelSet, phases: &PhaseVector) -> Result<(), PhaseError> {
    if channels.is_empty() {
        return Err(PhaseError::Empty);
    }
    for (k, phase) in phases.as_array().into_iter().enumerate() {
        rotate(channels.channel_mut(k), phase);
    }
    Ok(())
}

/// Undo the offsets described by `estimate`, rotating channel k by `e^{-j*estimate[k]}`
pub fn remove_phase(channels: &mut ChannelSet, estimate: &PhaseVector) -> Result<(), PhaseError> {
    impose_phase(channels, &estimate.correction())
}
