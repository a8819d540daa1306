//! Phasecollect - coherent dual-radio capture and phase estimation
//!
//! This library re-exports the capture pipeline, phase estimators and
//! session configuration from `phasecollect-core`.

pub use phasecollect_core::{capture, config, device, error, phase, sampler, signal, stats};

pub use phasecollect_core::{
    demux, estimate_phase, estimate_phase_csv, estimate_sample_offsets, impose_phase,
    remove_phase, CaptureSession, ChannelConfig, ChannelSet, DeviceController, ErrorKind,
    PhaseError, PhaseStore, PhaseVector, RawCapture, SampleOffsets, SamplerError, SessionConfig,
    SimSignal, SimulatedRadio, StreamConfig,
};
pub use phasecollect_core::{BUILD_DATE, NUM_CHANNELS, SC16_Q11_SCALE, VERSION};
