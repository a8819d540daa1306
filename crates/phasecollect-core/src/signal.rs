//! Synthetic test signals
//!
//! - [`CarrierGenerator`]: SC16 Q11 carrier with a settable phase
//! - [`MlsGenerator`]: maximum-length ±1 sequences for correlation tests
//! - [`synthetic_channel_set`]: four coherent channels with injected phase offsets
//!
//! These stand in for over-the-air signals when no radios are attached.

use crate::capture::demux::ChannelSet;
use crate::phase::PhaseError;
use crate::NUM_CHANNELS;
use rustfft::num_complex::Complex64;

/// Round to the nearest integer sample, saturating at the i16 limits
pub fn quantize(value: f64) -> i16 {
    // `as` saturates on overflow and maps NaN to 0
    value.round() as i16
}

/// Waveform produced by a [`CarrierGenerator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierShape {
    /// Real cosine `A*cos(wn)` on I, rotated into the complex plane by the phase
    Cosine,
    /// Complex exponential `A*e^{j(wn + phase)}`
    Complex,
}

/// Carrier generator producing interleaved I/Q samples
#[derive(Debug, Clone)]
pub struct CarrierGenerator {
    shape: CarrierShape,
    /// Peak amplitude in counts (2048 = 1.0 in SC16 Q11)
    amplitude: f64,
    /// Radians per sample
    omega: f64,
    phase: f64,
    position: u64,
}

impl CarrierGenerator {
    /// Create a carrier generator
    ///
    /// # Arguments
    /// * `shape` - Real cosine or complex exponential
    /// * `amplitude` - Peak amplitude in counts, clamped to the i16 range
    /// * `omega` - Angular rate in radians per sample
    pub fn new(shape: CarrierShape, amplitude: f64, omega: f64) -> Self {
        Self {
            shape,
            amplitude: amplitude.clamp(0.0, f64::from(i16::MAX)),
            omega,
            phase: 0.0,
            position: 0,
        }
    }

    /// Rotate every subsequent sample by `phase` radians
    pub fn with_phase(mut self, phase: f64) -> Self {
        self.phase = phase;
        self
    }

    /// Next sample as a complex value before quantization
    pub fn next_complex(&mut self) -> Complex64 {
        let t = self.omega * self.position as f64;
        self.position += 1;
        let rotation = Complex64::from_polar(1.0, self.phase);
        match self.shape {
            CarrierShape::Cosine => Complex64::new(self.amplitude * t.cos(), 0.0) * rotation,
            CarrierShape::Complex => Complex64::from_polar(self.amplitude, t) * rotation,
        }
    }

    /// Fill an interleaved I/Q buffer; a trailing odd value is left untouched
    pub fn fill_iq(&mut self, buffer: &mut [i16]) {
        for pair in buffer.chunks_exact_mut(2) {
            let z = self.next_complex();
            pair[0] = quantize(z.re);
            pair[1] = quantize(z.im);
        }
    }

    /// Generate `pairs` interleaved I/Q samples
    pub fn generate(&mut self, pairs: usize) -> Vec<i16> {
        let mut buffer = vec![0i16; pairs * 2];
        self.fill_iq(&mut buffer);
        buffer
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

/// MLS (Maximum Length Sequence) generator
///
/// Generates a pseudo-random ±1 sequence of length 2^order - 1 whose circular
/// autocorrelation is a single peak, which makes sample lags between channels
/// unambiguous.
#[derive(Debug, Clone)]
pub struct MlsGenerator {
    order: u32,
    position: usize,
    sequence: Vec<f64>,
}

impl MlsGenerator {
    /// Create a new MLS generator
    ///
    /// # Arguments
    /// * `order` - Order of the sequence (2-15). Sequence length = 2^order - 1
    ///
    /// # Panics
    /// Panics if order is less than 2 or greater than 15
    pub fn new(order: u32) -> Self {
        assert!((2..=15).contains(&order), "Order must be between 2 and 15");
        let length = (1usize << order) - 1;
        Self {
            order,
            position: 0,
            sequence: Self::generate_sequence(order, length),
        }
    }

    /// Galois LFSR over a primitive polynomial of the given order
    fn generate_sequence(order: u32, length: usize) -> Vec<f64> {
        // XOR taps applied when the output bit is 1 (Xilinx XAPP052)
        let mask: u32 = match order {
            2 => 0x3,
            3 => 0x6,
            4 => 0xC,
            5 => 0x14,
            6 => 0x30,
            7 => 0x60,
            8 => 0xB8,
            9 => 0x110,
            10 => 0x240,
            11 => 0x500,
            12 => 0xE08,
            13 => 0x1C80,
            14 => 0x3802,
            _ => 0x6000,
        };

        let mut lfsr: u32 = 1;
        (0..length)
            .map(|_| {
                let output = lfsr & 1;
                lfsr >>= 1;
                if output == 1 {
                    lfsr ^= mask;
                    1.0
                } else {
                    -1.0
                }
            })
            .collect()
    }

    /// Next chip; the sequence repeats after its last chip
    pub fn next_chip(&mut self) -> f64 {
        let chip = self.sequence[self.position];
        self.position = (self.position + 1) % self.sequence.len();
        chip
    }

    pub fn length(&self) -> usize {
        self.sequence.len()
    }

    pub fn order(&self) -> u32 {
        self.order
    }

    /// Get the full sequence for correlation
    pub fn sequence(&self) -> &[f64] {
        &self.sequence
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

/// Build four coherent channels of a real cosine carrier
///
/// Channel k is channel 0 rotated by `phases[k]`, so an ideal estimator
/// recovers `phases[k] - phases[0]` for each k.
///
/// # Arguments
/// * `phases` - Phase of each channel in radians
/// * `pairs` - I/Q pairs per channel
/// * `amplitude` - Peak amplitude in counts
/// * `omega` - Carrier rate in radians per sample
///
/// # Returns
/// A validated [`ChannelSet`], or [`PhaseError::Empty`] when `pairs` is zero
pub fn synthetic_channel_set(
    phases: [f64; NUM_CHANNELS],
    pairs: usize,
    amplitude: f64,
    omega: f64,
) -> Result<ChannelSet, PhaseError> {
    if pairs == 0 {
        return Err(PhaseError::Empty);
    }
    let channels = phases.map(|phase| {
        CarrierGenerator::new(CarrierShape::Cosine, amplitude, omega)
            .with_phase(phase)
            .generate(pairs)
    });
    ChannelSet::from_array(channels)
}
