//! Radio hardware abstraction
//!
//! The pipeline talks to each radio only through [`DeviceController`]. A
//! vendor binding implements it on top of the native API; [`sim`] provides a
//! deterministic software radio pair for tests and dry runs.
//!
//! Opening a device is construction of the implementor and closing it is
//! `Drop`; the trait covers everything in between.

pub mod sim;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors reported by a [`DeviceController`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("invalid value for {parameter}: {reason}")]
    InvalidValue {
        parameter: &'static str,
        reason: String,
    },

    #[error("device not ready: {0}")]
    NotReady(String),

    #[error("timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u32 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("hardware fault during {0}")]
    Fault(Operation),
}

/// Hardware operations, used to name faults
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SetClockSelect,
    SetClockOutput,
    SetGainMode,
    SetGain,
    SetSampleRate,
    SetBandwidth,
    SetFrequency,
    SetBiasTee,
    EnableModule,
    TriggerInit,
    TriggerArm,
    TriggerDisarm,
    TriggerFire,
    TriggerState,
    SyncConfig,
    SyncRx,
    SyncTx,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::SetClockSelect => "set_clock_select",
            Operation::SetClockOutput => "set_clock_output",
            Operation::SetGainMode => "set_gain_mode",
            Operation::SetGain => "set_gain",
            Operation::SetSampleRate => "set_sample_rate",
            Operation::SetBandwidth => "set_bandwidth",
            Operation::SetFrequency => "set_frequency",
            Operation::SetBiasTee => "set_bias_tee",
            Operation::EnableModule => "enable_module",
            Operation::TriggerInit => "trigger_init",
            Operation::TriggerArm => "trigger_arm",
            Operation::TriggerDisarm => "trigger_disarm",
            Operation::TriggerFire => "trigger_fire",
            Operation::TriggerState => "trigger_state",
            Operation::SyncConfig => "sync_config",
            Operation::SyncRx => "sync_rx",
            Operation::SyncTx => "sync_tx",
        };
        f.write_str(name)
    }
}

/// One of the two RX paths on a radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RxChannel {
    Rx0,
    Rx1,
}

impl RxChannel {
    /// Both RX channels in index order
    pub const ALL: [RxChannel; 2] = [RxChannel::Rx0, RxChannel::Rx1];

    pub fn index(self) -> usize {
        match self {
            RxChannel::Rx0 => 0,
            RxChannel::Rx1 => 1,
        }
    }
}

/// Reference clock source for the sample clock PLL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockSelect {
    /// Onboard VCTCXO
    Onboard,
    /// External reference on the clock input
    External,
}

/// RX gain control mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GainMode {
    /// Manual gain control; the only mode in which a gain value applies
    Manual,
    /// Device default AGC
    Default,
    FastAttack,
    SlowAttack,
    Hybrid,
}

impl GainMode {
    pub fn is_manual(self) -> bool {
        matches!(self, GainMode::Manual)
    }
}

/// Role of a device on the shared trigger line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRole {
    /// Drives the trigger line when fired
    Master,
    /// Listens on the trigger line
    Slave,
    Disabled,
}

/// Physical trigger signal pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSignal {
    /// bladeRF 2.0 micro mini expansion header, pin 1
    MiniExp1,
    /// bladeRF x40/x115 J71 pin 4
    J71Pin4,
    /// bladeRF x40/x115 J51 pin 1
    J51Pin1,
}

/// Local trigger handle returned by [`DeviceController::trigger_init`]
///
/// The role is chosen by the caller before arming; the device's view of the
/// trigger is always re-queried with [`DeviceController::trigger_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub channel: RxChannel,
    pub role: TriggerRole,
    pub signal: TriggerSignal,
}

/// Snapshot of a device's trigger registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerState {
    pub role: TriggerRole,
    pub is_armed: bool,
    pub has_fired: bool,
    pub fire_requested: bool,
}

/// Sample wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Interleaved signed 16-bit I/Q, 12-bit significant (2048 = 1.0)
    Sc16Q11,
}

/// Stream channel layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    RxX1,
    /// Both RX channels, samples interleaved as I0,Q0,I1,Q1
    RxX2,
    TxX1,
    TxX2,
}

impl ChannelLayout {
    pub fn is_rx(self) -> bool {
        matches!(self, ChannelLayout::RxX1 | ChannelLayout::RxX2)
    }

    pub fn channel_count(self) -> usize {
        match self {
            ChannelLayout::RxX1 | ChannelLayout::TxX1 => 1,
            ChannelLayout::RxX2 | ChannelLayout::TxX2 => 2,
        }
    }
}

/// Block-buffered stream parameters passed to [`DeviceController::sync_config`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncParams {
    pub num_buffers: u32,
    /// Samples per buffer
    pub buffer_size: u32,
    pub num_transfers: u32,
    pub timeout_ms: u32,
}

/// Narrow control surface of one radio
///
/// All methods take `&self`: a fire command must be deliverable while another
/// thread is blocked in [`sync_rx`](DeviceController::sync_rx) on the same
/// device, so implementors lock internally.
pub trait DeviceController: Send + Sync {
    /// Identifier used in logs and errors
    fn name(&self) -> &str;

    fn set_clock_select(&self, select: ClockSelect) -> Result<(), DeviceError>;
    fn clock_select(&self) -> Result<ClockSelect, DeviceError>;
    fn set_clock_output(&self, enable: bool) -> Result<(), DeviceError>;
    fn clock_output(&self) -> Result<bool, DeviceError>;

    fn set_gain_mode(&self, ch: RxChannel, mode: GainMode) -> Result<(), DeviceError>;
    fn gain_mode(&self, ch: RxChannel) -> Result<GainMode, DeviceError>;
    /// Gain in dB; rejected unless the channel is in manual gain mode
    fn set_gain(&self, ch: RxChannel, gain_db: i32) -> Result<(), DeviceError>;
    fn gain(&self, ch: RxChannel) -> Result<i32, DeviceError>;
    fn set_sample_rate(&self, ch: RxChannel, rate_hz: u32) -> Result<(), DeviceError>;
    fn sample_rate(&self, ch: RxChannel) -> Result<u32, DeviceError>;
    fn set_bandwidth(&self, ch: RxChannel, bandwidth_hz: u32) -> Result<(), DeviceError>;
    fn bandwidth(&self, ch: RxChannel) -> Result<u32, DeviceError>;
    fn set_frequency(&self, ch: RxChannel, frequency_hz: u64) -> Result<(), DeviceError>;
    fn frequency(&self, ch: RxChannel) -> Result<u64, DeviceError>;
    fn set_bias_tee(&self, ch: RxChannel, enable: bool) -> Result<(), DeviceError>;
    fn bias_tee(&self, ch: RxChannel) -> Result<bool, DeviceError>;
    fn enable_module(&self, ch: RxChannel, enable: bool) -> Result<(), DeviceError>;

    fn trigger_init(&self, ch: RxChannel, signal: TriggerSignal) -> Result<Trigger, DeviceError>;
    /// Arm (`true`) or disarm (`false`) using the role carried by `trigger`
    fn trigger_arm(&self, trigger: &Trigger, arm: bool) -> Result<(), DeviceError>;
    fn trigger_fire(&self, trigger: &Trigger) -> Result<(), DeviceError>;
    fn trigger_state(&self, trigger: &Trigger) -> Result<TriggerState, DeviceError>;

    fn sync_config(
        &self,
        layout: ChannelLayout,
        format: SampleFormat,
        params: &SyncParams,
    ) -> Result<(), DeviceError>;

    /// Blocking receive of `num_samples` I/Q pairs, counted across all channels
    /// of the configured layout, into `buffer` (which holds `2 * num_samples`
    /// values).
    ///
    /// Returns the number of I/Q pairs actually delivered, which may be short
    /// if the stream ended early.
    fn sync_rx(
        &self,
        buffer: &mut [i16],
        num_samples: usize,
        timeout_ms: u32,
    ) -> Result<usize, DeviceError>;

    fn sync_tx(&self, buffer: &[i16], num_samples: usize, timeout_ms: u32)
        -> Result<(), DeviceError>;
}
