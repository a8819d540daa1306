//! RF front-end configuration
//!
//! Both RX channels of a device get identical settings. The order is fixed:
//! gain mode, gain (manual mode only), sample rate, bandwidth, frequency,
//! bias tee. Gain mode goes first because the hardware rejects a gain value
//! under automatic gain control.
//!
//! Configuration is not transactional: the first failure is returned and
//! settings already applied stay applied.

use crate::device::{DeviceController, DeviceError, GainMode, RxChannel};
use crate::error::SamplerError;
use serde::{Deserialize, Serialize};

/// Front-end settings applied to both RX channels of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_gain_mode")]
    pub gain_mode: GainMode,
    /// Gain in dB, only applied in manual gain mode
    #[serde(default = "default_gain")]
    pub gain: i32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_bandwidth")]
    pub bandwidth: u32,
    #[serde(default = "default_frequency")]
    pub frequency: u64,
    #[serde(default)]
    pub bias_tee: bool,
}

fn default_gain_mode() -> GainMode {
    GainMode::Manual
}

fn default_gain() -> i32 {
    30
}

fn default_sample_rate() -> u32 {
    20_480_000
}

fn default_bandwidth() -> u32 {
    18_000_000
}

/// GPS L1
fn default_frequency() -> u64 {
    1_575_420_000
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            gain_mode: default_gain_mode(),
            gain: default_gain(),
            sample_rate: default_sample_rate(),
            bandwidth: default_bandwidth(),
            frequency: default_frequency(),
            bias_tee: false,
        }
    }
}

impl ChannelConfig {
    /// Compare with a read-back; gain only counts in manual mode
    pub fn matches(&self, other: &ChannelConfig) -> bool {
        let gain_matches = !self.gain_mode.is_manual() || self.gain == other.gain;
        self.gain_mode == other.gain_mode
            && gain_matches
            && self.sample_rate == other.sample_rate
            && self.bandwidth == other.bandwidth
            && self.frequency == other.frequency
            && self.bias_tee == other.bias_tee
    }
}

/// Apply `config` to both RX channels of `device`
///
/// # Returns
/// The first hardware error, tagged with the device and failing step
pub fn configure_channels(
    device: &dyn DeviceController,
    config: &ChannelConfig,
) -> Result<(), SamplerError> {
    let fail = |step: &'static str| move |e: DeviceError| SamplerError::device(device, step, e);

    for ch in RxChannel::ALL {
        device
            .set_gain_mode(ch, config.gain_mode)
            .map_err(fail("set gain mode"))?;
        if config.gain_mode.is_manual() {
            device.set_gain(ch, config.gain).map_err(fail("set gain"))?;
        }
        device
            .set_sample_rate(ch, config.sample_rate)
            .map_err(fail("set sample rate"))?;
        device
            .set_bandwidth(ch, config.bandwidth)
            .map_err(fail("set bandwidth"))?;
        device
            .set_frequency(ch, config.frequency)
            .map_err(fail("set frequency"))?;
        device
            .set_bias_tee(ch, config.bias_tee)
            .map_err(fail("set bias tee"))?;
    }

    tracing::info!(
        device = device.name(),
        gain_mode = ?config.gain_mode,
        gain = config.gain,
        sample_rate = config.sample_rate,
        bandwidth = config.bandwidth,
        frequency = config.frequency,
        bias_tee = config.bias_tee,
        "RX channels configured"
    );
    Ok(())
}

/// Re-query every front-end field of one channel
pub fn read_back(device: &dyn DeviceController, ch: RxChannel) -> Result<ChannelConfig, SamplerError> {
    let fail = |step: &'static str| move |e: DeviceError| SamplerError::device(device, step, e);
    Ok(ChannelConfig {
        gain_mode: device.gain_mode(ch).map_err(fail("read gain mode"))?,
        gain: device.gain(ch).map_err(fail("read gain"))?,
        sample_rate: device.sample_rate(ch).map_err(fail("read sample rate"))?,
        bandwidth: device.bandwidth(ch).map_err(fail("read bandwidth"))?,
        frequency: device.frequency(ch).map_err(fail("read frequency"))?,
        bias_tee: device.bias_tee(ch).map_err(fail("read bias tee"))?,
    })
}

/// Enable both RX modules
pub fn enable_channels(device: &dyn DeviceController) -> Result<(), SamplerError> {
    set_modules(device, true)
}

/// Disable both RX modules, attempting both even if the first fails
pub fn disable_channels(device: &dyn DeviceController) -> Result<(), SamplerError> {
    set_modules(device, false)
}

fn set_modules(device: &dyn DeviceController, enable: bool) -> Result<(), SamplerError> {
    let step = if enable { "enable RX module" } else { "disable RX module" };
    let mut first_error = None;
    for ch in RxChannel::ALL {
        if let Err(e) = device.enable_module(ch, enable) {
            tracing::warn!(device = device.name(), channel = ?ch, error = %e, "{} failed", step);
            first_error.get_or_insert(SamplerError::device(device, step, e));
            if enable {
                break;
            }
        }
    }
    first_error.map_or(Ok(()), Err)
}
