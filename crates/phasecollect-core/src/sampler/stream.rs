//! Block-buffered synchronous receive
//!
//! [`StreamManager`] configures the RX stream on both devices, owns one
//! [`RawDeviceBuffer`] per device, and runs the blocking receive calls. The
//! buffers stay with the manager until [`StreamManager::take_buffers`] hands
//! them to the demultiplexer, or [`StreamManager::release_buffers`] frees them.
//!
//! Units: `StreamConfig::num_samples` counts I/Q pairs per RF channel. A
//! device buffer interleaves both of its channels, so it holds
//! `num_samples * 4` i16 values and one receive call asks the device for
//! `num_samples * 2` pairs.

use super::channel::{enable_channels, ChannelConfig};
use crate::device::{ChannelLayout, DeviceController, SampleFormat, SyncParams};
use crate::error::SamplerError;
use crate::{BUFFER_SIZE_MULTIPLE, CHANNELS_PER_DEVICE};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// i16 values per device frame (I/Q for each of the two channels)
const FRAME_LEN: usize = CHANNELS_PER_DEVICE * 2;

/// Stream parameters for one capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// I/Q pairs wanted per RF channel
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    #[serde(default = "default_num_buffers")]
    pub num_buffers: u32,
    /// Samples per stream buffer; a positive multiple of 1024
    #[serde(default = "default_buffer_size")]
    pub buffer_size: u32,
    #[serde(default = "default_num_transfers")]
    pub num_transfers: u32,
    /// Must exceed the trigger round trip or the capture misses the edge
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
    /// Pause between both receives listening and the fire command
    #[serde(default = "default_fire_delay_ms")]
    pub fire_delay_ms: u32,
}

fn default_num_samples() -> usize {
    8192
}

fn default_num_buffers() -> u32 {
    16
}

fn default_buffer_size() -> u32 {
    8192
}

fn default_num_transfers() -> u32 {
    8
}

fn default_timeout_ms() -> u32 {
    3500
}

fn default_fire_delay_ms() -> u32 {
    10
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            num_buffers: default_num_buffers(),
            buffer_size: default_buffer_size(),
            num_transfers: default_num_transfers(),
            timeout_ms: default_timeout_ms(),
            fire_delay_ms: default_fire_delay_ms(),
        }
    }
}

impl StreamConfig {
    /// Static checks, run before any hardware is touched
    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.buffer_size == 0 || self.buffer_size % BUFFER_SIZE_MULTIPLE != 0 {
            return Err(SamplerError::InvalidConfig(format!(
                "buffer_size {} must be a positive multiple of {}",
                self.buffer_size, BUFFER_SIZE_MULTIPLE
            )));
        }
        if self.num_buffers == 0 {
            return Err(SamplerError::InvalidConfig("num_buffers must be positive".into()));
        }
        if self.num_transfers == 0 || self.num_transfers > self.num_buffers {
            return Err(SamplerError::InvalidConfig(format!(
                "num_transfers {} must be between 1 and num_buffers ({})",
                self.num_transfers, self.num_buffers
            )));
        }
        if self.num_samples == 0 {
            return Err(SamplerError::InvalidConfig("num_samples must be positive".into()));
        }
        if self.timeout_ms == 0 {
            return Err(SamplerError::InvalidConfig("timeout_ms must be positive".into()));
        }
        if self.fire_delay_ms >= self.timeout_ms {
            return Err(SamplerError::InvalidConfig(format!(
                "fire_delay_ms {} must be shorter than timeout_ms {}",
                self.fire_delay_ms, self.timeout_ms
            )));
        }
        Ok(())
    }

    pub fn sync_params(&self) -> SyncParams {
        SyncParams {
            num_buffers: self.num_buffers,
            buffer_size: self.buffer_size,
            num_transfers: self.num_transfers,
            timeout_ms: self.timeout_ms,
        }
    }

    /// I/Q pairs requested from each device, across both of its channels
    pub fn device_samples(&self) -> Option<usize> {
        self.num_samples.checked_mul(CHANNELS_PER_DEVICE)
    }

    pub fn fire_delay(&self) -> Duration {
        Duration::from_millis(u64::from(self.fire_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.timeout_ms))
    }

    /// Wall-clock length of the capture at `sample_rate`
    pub fn capture_duration(&self, sample_rate: u32) -> Duration {
        if sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.num_samples as f64 / f64::from(sample_rate))
    }
}

/// Receive buffer of one device: interleaved `I0, Q0, I1, Q1` frames
///
/// `valid_len` counts the i16 values actually written by the last receive
/// and is always a whole number of frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeviceBuffer {
    data: Vec<i16>,
    valid_len: usize,
}

impl RawDeviceBuffer {
    /// Allocate a zeroed buffer for `num_samples` pairs per channel
    ///
    /// # Returns
    /// The buffer, or [`SamplerError::Allocation`] if the size overflows or
    /// the allocator refuses
    pub fn allocate(num_samples: usize) -> Result<Self, SamplerError> {
        let values = num_samples
            .checked_mul(FRAME_LEN)
            .ok_or(SamplerError::Allocation {
                what: "device buffer",
                requested: num_samples,
            })?;
        let mut data = Vec::new();
        data.try_reserve_exact(values)
            .map_err(|_| SamplerError::Allocation {
                what: "device buffer",
                requested: num_samples,
            })?;
        data.resize(values, 0);
        Ok(Self { data, valid_len: 0 })
    }

    /// Wrap already-received samples; a trailing partial frame is not valid
    pub fn from_samples(data: Vec<i16>) -> Self {
        let valid_len = data.len() - data.len() % FRAME_LEN;
        Self { data, valid_len }
    }

    /// Allocated length in i16 values
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn valid_len(&self) -> usize {
        self.valid_len
    }

    /// The received portion
    pub fn valid(&self) -> &[i16] {
        &self.data[..self.valid_len]
    }

    fn as_mut_slice(&mut self) -> &mut [i16] {
        &mut self.data
    }

    /// Record `pairs` I/Q pairs as received, clamped to capacity and whole frames
    pub fn set_valid_samples(&mut self, pairs: usize) {
        let values = pairs.saturating_mul(2).min(self.data.len());
        self.valid_len = values - values % FRAME_LEN;
    }
}

/// Which side of the pair a buffer belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRole {
    Master,
    Slave,
}

/// Owns the RX stream setup and receive buffers of both devices
#[derive(Debug, Default)]
pub struct StreamManager {
    master: Option<RawDeviceBuffer>,
    slave: Option<RawDeviceBuffer>,
    config: Option<StreamConfig>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure both streams, enable the RX modules and allocate buffers
    pub fn prepare(
        &mut self,
        master: &dyn DeviceController,
        slave: &dyn DeviceController,
        config: &StreamConfig,
    ) -> Result<(), SamplerError> {
        config.validate()?;
        let params = config.sync_params();

        for device in [master, slave] {
            device
                .sync_config(ChannelLayout::RxX2, SampleFormat::Sc16Q11, &params)
                .map_err(|e| SamplerError::device(device, "configure RX stream", e))?;
            enable_channels(device)?;
        }

        if self.master.is_some() || self.slave.is_some() {
            tracing::warn!("Replacing receive buffers that were never released");
            self.release_buffers();
        }
        // A failed slave allocation drops the master buffer with it
        let master_buf = RawDeviceBuffer::allocate(config.num_samples)?;
        let slave_buf = RawDeviceBuffer::allocate(config.num_samples)?;
        self.master = Some(master_buf);
        self.slave = Some(slave_buf);
        self.config = Some(config.clone());

        tracing::debug!(
            num_samples = config.num_samples,
            buffer_size = config.buffer_size,
            num_buffers = config.num_buffers,
            num_transfers = config.num_transfers,
            "RX streams prepared"
        );
        Ok(())
    }

    /// Blocking receive into both buffers, one thread per device
    ///
    /// # Returns
    /// I/Q pairs delivered by the master and by the slave
    pub fn receive(
        &mut self,
        master: &dyn DeviceController,
        slave: &dyn DeviceController,
    ) -> Result<(usize, usize), SamplerError> {
        let (listening, _ignored) = crossbeam_channel::unbounded();
        self.receive_notify(master, slave, &listening)
    }

    /// [`receive`](Self::receive), announcing each device on `listening`
    ///
    /// A device's role is sent just before its thread blocks in `sync_rx`, so
    /// a caller holding the other end can hold the trigger until both
    /// devices are waiting for it. When both fail the master error wins.
    pub fn receive_notify(
        &mut self,
        master: &dyn DeviceController,
        slave: &dyn DeviceController,
        listening: &Sender<DeviceRole>,
    ) -> Result<(usize, usize), SamplerError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| SamplerError::Protocol("receive before stream setup".into()))?;
        let requested = config.device_samples().ok_or(SamplerError::Allocation {
            what: "device buffer",
            requested: config.num_samples,
        })?;
        let timeout_ms = config.timeout_ms;
        let (Some(master_buf), Some(slave_buf)) = (self.master.as_mut(), self.slave.as_mut()) else {
            return Err(SamplerError::Protocol("receive buffer missing".into()));
        };

        let (from_master, from_slave) = thread::scope(|s| -> Result<_, SamplerError> {
            let mut handles = Vec::with_capacity(2);
            for (role, device, buffer) in [
                (DeviceRole::Master, master, master_buf),
                (DeviceRole::Slave, slave, slave_buf),
            ] {
                let name = match role {
                    DeviceRole::Master => "sync-rx-master",
                    DeviceRole::Slave => "sync-rx-slave",
                };
                let handle = thread::Builder::new().name(name.into()).spawn_scoped(s, move || {
                    receive_into(device, buffer, requested, timeout_ms, role, listening)
                })?;
                handles.push(handle);
            }
            let mut results = handles.into_iter().map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(SamplerError::Protocol("sync-rx task panicked".into())))
            });
            let from_master = results
                .next()
                .unwrap_or_else(|| Err(SamplerError::Protocol("master receive not started".into())));
            let from_slave = results
                .next()
                .unwrap_or_else(|| Err(SamplerError::Protocol("slave receive not started".into())));
            Ok((from_master, from_slave))
        })?;

        let delivered = match (from_master, from_slave) {
            (Ok(m), Ok(s)) => (m, s),
            (Err(e), other) => {
                if let Err(slave_err) = other {
                    tracing::warn!(error = %slave_err, "Slave receive failed as well");
                }
                return Err(e);
            }
            (Ok(_), Err(e)) => return Err(e),
        };

        tracing::info!(master = delivered.0, slave = delivered.1, "Receive complete");
        Ok(delivered)
    }

    /// Configure, allocate and receive on both devices
    ///
    /// Rejects a `buffer_size` that is not a positive multiple of 1024 with a
    /// configuration error before touching hardware.
    pub fn start_synchronized_receive(
        &mut self,
        master: &dyn DeviceController,
        slave: &dyn DeviceController,
        channel: &ChannelConfig,
        config: &StreamConfig,
    ) -> Result<(usize, usize), SamplerError> {
        config.validate()?;
        let duration = config.capture_duration(channel.sample_rate);
        if config.timeout() < duration {
            tracing::warn!(
                timeout_ms = config.timeout_ms,
                capture_ms = duration.as_millis() as u64,
                "Timeout shorter than the capture itself"
            );
        }
        self.prepare(master, slave, config)?;
        self.receive(master, slave)
    }

    pub fn buffer(&self, role: DeviceRole) -> Option<&RawDeviceBuffer> {
        match role {
            DeviceRole::Master => self.master.as_ref(),
            DeviceRole::Slave => self.slave.as_ref(),
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.master.is_some() || self.slave.is_some()
    }

    /// Hand both buffers over; the manager no longer holds any
    pub fn take_buffers(&mut self) -> Option<(RawDeviceBuffer, RawDeviceBuffer)> {
        let pair = match (self.master.take(), self.slave.take()) {
            (Some(m), Some(s)) => Some((m, s)),
            _ => None,
        };
        self.config = None;
        pair
    }

    /// Free both buffers; safe to call when nothing is allocated
    pub fn release_buffers(&mut self) {
        if self.master.take().is_some() | self.slave.take().is_some() {
            tracing::debug!("Receive buffers released");
        }
        self.config = None;
    }
}

/// One device's blocking receive
fn receive_into(
    device: &dyn DeviceController,
    buffer: &mut RawDeviceBuffer,
    requested: usize,
    timeout_ms: u32,
    role: DeviceRole,
    listening: &Sender<DeviceRole>,
) -> Result<usize, SamplerError> {
    // Nobody may be waiting on the notification; that is fine
    let _ = listening.send(role);
    let count = device
        .sync_rx(buffer.as_mut_slice(), requested, timeout_ms)
        .map_err(|e| SamplerError::device(device, "receive samples", e))?;
    if count == 0 {
        return Err(SamplerError::Protocol(format!(
            "{}: receive returned no samples",
            device.name()
        )));
    }
    if count < requested {
        tracing::warn!(
            device = device.name(),
            requested,
            received = count,
            "Short receive"
        );
    }
    buffer.set_valid_samples(count);
    Ok(count)
}
