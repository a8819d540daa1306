//! Phasecollect Core - coherent dual-radio capture and phase estimation
//!
//! This library drives two dual-RX software-defined radios (a "master" and a
//! "slave") that share a reference clock and a trigger line, captures four
//! sample-aligned RX channels, and estimates the relative phase offsets of
//! channels 1-3 against channel 0.
//!
//! The pipeline, leaves first:
//! - Reference clock distribution ([`sampler::clock`])
//! - RF front-end configuration ([`sampler::channel`])
//! - Trigger arm/fire/disarm protocol ([`sampler::trigger`])
//! - Block-buffered synchronous receive ([`sampler::stream`])
//! - Four-channel demultiplexing ([`capture::demux`])
//! - Phase-delta estimation and correction ([`phase`])

pub mod capture;
pub mod config;
pub mod device;
pub mod error;
pub mod phase;
pub mod sampler;
pub mod signal;
pub mod stats;

pub use capture::demux::{demux, ChannelSet};
pub use config::SessionConfig;
pub use device::sim::{SimSignal, SimulatedRadio};
pub use device::DeviceController;
pub use error::{ErrorKind, SamplerError};
pub use phase::delay::{estimate_sample_offsets, SampleOffsets};
pub use phase::estimator::{estimate_phase, estimate_phase_csv};
pub use phase::imposer::{impose_phase, remove_phase};
pub use phase::{PhaseError, PhaseVector};
pub use sampler::channel::ChannelConfig;
pub use sampler::session::{CaptureSession, RawCapture};
pub use sampler::stream::StreamConfig;
pub use stats::store::PhaseStore;

/// Library version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// RX channels exposed by each radio
pub const CHANNELS_PER_DEVICE: usize = 2;

/// RX channels across the cooperating pair
pub const NUM_CHANNELS: usize = 4;

/// Stream buffer sizes must be a positive multiple of this many samples
pub const BUFFER_SIZE_MULTIPLE: u32 = 1024;

/// SC16 Q11 full scale: 2048 counts represent 1.0
pub const SC16_Q11_SCALE: f64 = 2048.0;
