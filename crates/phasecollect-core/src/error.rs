//! Error taxonomy for the capture pipeline
//!
//! Every failure is single-shot: nothing in the pipeline retries. The caller
//! decides whether to re-run the whole session.

use crate::capture::csv::CsvError;
use crate::device::{DeviceController, DeviceError};
use crate::phase::PhaseError;
use thiserror::Error;

/// Errors surfaced by the sampler, stream and session layers
#[derive(Error, Debug)]
pub enum SamplerError {
    /// The hardware rejected a parameter or command
    #[error("{device}: {step} failed: {source}")]
    Configuration {
        device: String,
        step: &'static str,
        #[source]
        source: DeviceError,
    },

    /// A configuration value was rejected before touching hardware
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to allocate {what} ({requested} samples)")]
    Allocation { what: &'static str, requested: usize },

    /// Trigger or stream did not reach the expected state
    #[error("protocol failure: {0}")]
    Protocol(String),

    #[error("{device}: {step} timed out after {timeout_ms} ms")]
    Timeout {
        device: String,
        step: &'static str,
        timeout_ms: u32,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] CsvError),

    #[error(transparent)]
    Phase(#[from] PhaseError),
}

/// Coarse classification of a [`SamplerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Allocation,
    Protocol,
    Timeout,
    Io,
    Phase,
}

impl SamplerError {
    /// Wrap a device failure, keeping timeouts distinguishable from rejections
    pub fn device(device: &dyn DeviceController, step: &'static str, err: DeviceError) -> Self {
        match err {
            DeviceError::Timeout { timeout_ms } => SamplerError::Timeout {
                device: device.name().to_string(),
                step,
                timeout_ms,
            },
            source => SamplerError::Configuration {
                device: device.name().to_string(),
                step,
                source,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SamplerError::Configuration { .. } | SamplerError::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            SamplerError::Allocation { .. } => ErrorKind::Allocation,
            SamplerError::Protocol(_) => ErrorKind::Protocol,
            SamplerError::Timeout { .. } => ErrorKind::Timeout,
            SamplerError::Io(_) | SamplerError::Csv(_) => ErrorKind::Io,
            SamplerError::Phase(_) => ErrorKind::Phase,
        }
    }
}
