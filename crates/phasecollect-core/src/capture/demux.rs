//! Four-channel demultiplexing
//!
//! Each device buffer interleaves its two RX channels frame by frame as
//! `I0, Q0, I1, Q1`. Demultiplexing maps master RX0/RX1 to channels 0/1 and
//! slave RX0/RX1 to channels 2/3, truncated to the shorter of the two buffers.

use crate::error::SamplerError;
use crate::phase::PhaseError;
use crate::sampler::stream::RawDeviceBuffer;
use crate::{CHANNELS_PER_DEVICE, NUM_CHANNELS};

/// i16 values per device frame: one I/Q pair for each of the two channels
const FRAME_LEN: usize = CHANNELS_PER_DEVICE * 2;

/// Four channels of interleaved I/Q samples sharing one length
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSet {
    channels: [Vec<i16>; NUM_CHANNELS],
}

impl ChannelSet {
    /// Build from four channels; lengths must agree and hold whole I/Q pairs
    pub fn from_array(channels: [Vec<i16>; NUM_CHANNELS]) -> Result<Self, PhaseError> {
        let expected = channels[0].len();
        for (channel, samples) in channels.iter().enumerate() {
            if samples.len() != expected {
                return Err(PhaseError::LengthMismatch {
                    channel,
                    expected,
                    found: samples.len(),
                });
            }
            if samples.len() % 2 != 0 {
                return Err(PhaseError::PartialPair(channel));
            }
        }
        Ok(Self { channels })
    }

    /// Build from a list of channels, reporting the first absent one
    pub fn from_vec(channels: Vec<Vec<i16>>) -> Result<Self, PhaseError> {
        let found = channels.len();
        let channels: [Vec<i16>; NUM_CHANNELS] = channels.try_into().map_err(|_| {
            if found < NUM_CHANNELS {
                PhaseError::MissingChannel(found)
            } else {
                PhaseError::ChannelCount(found)
            }
        })?;
        Self::from_array(channels)
    }

    /// Samples of channel `k`
    ///
    /// # Panics
    /// Panics if `k >= NUM_CHANNELS`
    pub fn channel(&self, k: usize) -> &[i16] {
        &self.channels[k]
    }

    /// Mutable samples of channel `k`; the length cannot change through a slice
    ///
    /// # Panics
    /// Panics if `k >= NUM_CHANNELS`
    pub fn channel_mut(&mut self, k: usize) -> &mut [i16] {
        &mut self.channels[k]
    }

    pub fn channels(&self) -> &[Vec<i16>; NUM_CHANNELS] {
        &self.channels
    }

    pub fn into_channels(self) -> [Vec<i16>; NUM_CHANNELS] {
        self.channels
    }

    /// i16 values per channel
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    /// I/Q pairs per channel
    pub fn pairs(&self) -> usize {
        self.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split the master and slave buffers into four aligned channels
///
/// Consumes both buffers. The channel length is
/// `min(master.valid_len(), slave.valid_len()) / 2` values, always whole
/// I/Q pairs.
///
/// # Returns
/// The channel set, or [`SamplerError::Allocation`] if a channel cannot be
/// allocated (channels already allocated are freed)
pub fn demux(master: RawDeviceBuffer, slave: RawDeviceBuffer) -> Result<ChannelSet, SamplerError> {
    let common = master.valid_len().min(slave.valid_len());
    let common = common - common % FRAME_LEN;
    let per_channel = common / CHANNELS_PER_DEVICE;

    let mut channels: [Vec<i16>; NUM_CHANNELS] = Default::default();
    for channel in channels.iter_mut() {
        channel
            .try_reserve_exact(per_channel)
            .map_err(|_| SamplerError::Allocation {
                what: "demultiplexed channel",
                requested: per_channel,
            })?;
    }

    for (device, buffer) in [master.valid(), slave.valid()].into_iter().enumerate() {
        let (first, second) = channels[device * CHANNELS_PER_DEVICE..].split_at_mut(1);
        for frame in buffer[..common].chunks_exact(FRAME_LEN) {
            first[0].extend_from_slice(&frame[..2]);
            second[0].extend_from_slice(&frame[2..]);
        }
    }

    tracing::debug!(
        master_valid = master.valid_len(),
        slave_valid = slave.valid_len(),
        per_channel,
        "Demultiplexed capture"
    );

    Ok(ChannelSet { channels })
}
