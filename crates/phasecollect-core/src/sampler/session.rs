//! One coherent capture, end to end
//!
//! A [`CaptureSession`] owns everything a capture needs besides the radios
//! themselves: the trigger handles, the receive buffers, and the
//! configuration. Several sessions over different radio pairs can run side
//! by side because nothing is shared between them.
//!
//! ## Sequence
//!
//! 1. Share the reference clock, configure both front ends (once)
//! 2. Arm the triggers
//! 3. Configure the streams, enable RX, allocate buffers
//! 4. Start the blocking receive on both devices, one thread each
//! 5. Once both receives are listening, wait `fire_delay_ms` and fire the
//!    master trigger
//! 6. Hand the buffers over as a [`RawCapture`]
//! 7. Disarm, disable RX, release buffers
//!
//! Step 5 holds the fire until both receive threads have announced they are
//! about to block; `fire_delay_ms` covers the rest of the way into the driver.
//! Step 7 runs on every exit path. Nothing retries; a failed capture is
//! reported and the caller decides whether to run another.
//!
//! ## Concurrent variant
//!
//! [`CaptureSession::acquire_concurrent`] runs steps 3+4 and the fire as two
//! scoped threads joined at one barrier, cutting the host-side delay between
//! starting the receive and firing. The receive must be listening before the
//! trigger edge reaches the device and nothing here enforces that order: it
//! relies on the receive setup being faster than the trigger propagation,
//! with `timeout_ms` covering the slack. A device that latches the edge
//! (as the simulated radios do) tolerates either order.

use super::channel::{configure_channels, disable_channels, ChannelConfig};
use super::clock::configure_clocks;
use super::stream::{DeviceRole, RawDeviceBuffer, StreamConfig, StreamManager};
use super::trigger::TriggerCoordinator;
use crate::capture::csv;
use crate::capture::demux::{demux, ChannelSet};
use crate::config::SessionConfig;
use crate::device::{DeviceController, TriggerSignal};
use crate::error::SamplerError;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// Raw receive buffers of both devices from one triggered capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCapture {
    pub master: RawDeviceBuffer,
    pub slave: RawDeviceBuffer,
}

impl RawCapture {
    /// Append both buffers to a CSV file, one row per frame
    pub fn write_csv(&self, path: &Path) -> Result<usize, SamplerError> {
        Ok(csv::write_csv(path, self.master.valid(), self.slave.valid())?)
    }

    /// Split into four aligned channels, consuming the buffers
    pub fn demux(self) -> Result<ChannelSet, SamplerError> {
        demux(self.master, self.slave)
    }
}

/// Capture session over one master/slave radio pair
pub struct CaptureSession<'a> {
    master: &'a dyn DeviceController,
    slave: &'a dyn DeviceController,
    channel: ChannelConfig,
    stream: StreamConfig,
    triggers: TriggerCoordinator,
    streams: StreamManager,
    configured: bool,
}

impl<'a> CaptureSession<'a> {
    pub fn new(
        master: &'a dyn DeviceController,
        slave: &'a dyn DeviceController,
        channel: ChannelConfig,
        stream: StreamConfig,
        signal: TriggerSignal,
    ) -> Self {
        Self {
            master,
            slave,
            channel,
            stream,
            triggers: TriggerCoordinator::new(signal),
            streams: StreamManager::new(),
            configured: false,
        }
    }

    pub fn from_config(
        master: &'a dyn DeviceController,
        slave: &'a dyn DeviceController,
        config: &SessionConfig,
    ) -> Self {
        Self::new(
            master,
            slave,
            config.channel.clone(),
            config.stream.clone(),
            config.trigger_signal,
        )
    }

    pub fn stream_config(&self) -> &StreamConfig {
        &self.stream
    }

    pub fn channel_config(&self) -> &ChannelConfig {
        &self.channel
    }

    /// Share the reference clock and configure both front ends
    ///
    /// Runs once; later captures reuse the configuration.
    pub fn configure(&mut self) -> Result<(), SamplerError> {
        self.stream.validate()?;
        configure_clocks(self.master, self.slave)?;
        configure_channels(self.master, &self.channel)?;
        configure_channels(self.slave, &self.channel)?;
        self.configured = true;
        Ok(())
    }

    /// Capture with both receives listening before the fire command
    pub fn acquire(&mut self) -> Result<RawCapture, SamplerError> {
        self.run(Self::sequential)
    }

    /// Capture with receive and fire issued from two threads joined at one barrier
    pub fn acquire_concurrent(&mut self) -> Result<RawCapture, SamplerError> {
        self.run(Self::concurrent)
    }

    /// [`acquire`](Self::acquire), then demultiplex
    pub fn capture(&mut self) -> Result<ChannelSet, SamplerError> {
        self.acquire()?.demux()
    }

    /// [`acquire_concurrent`](Self::acquire_concurrent), then demultiplex
    pub fn capture_concurrent(&mut self) -> Result<ChannelSet, SamplerError> {
        self.acquire_concurrent()?.demux()
    }

    fn run(
        &mut self,
        flow: fn(&mut Self) -> Result<RawCapture, SamplerError>,
    ) -> Result<RawCapture, SamplerError> {
        if !self.configured {
            self.configure()?;
        }

        let result = flow(self);
        let teardown = self.teardown();

        match (result, teardown) {
            (Ok(capture), Ok(())) => Ok(capture),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(teardown_err)) => {
                tracing::error!(error = %teardown_err, "Teardown after failed capture also failed");
                Err(e)
            }
        }
    }

    fn take_capture(&mut self) -> Result<RawCapture, SamplerError> {
        self.streams
            .take_buffers()
            .map(|(master, slave)| RawCapture { master, slave })
            .ok_or_else(|| SamplerError::Protocol("receive buffers missing after capture".into()))
    }

    fn sequential(&mut self) -> Result<RawCapture, SamplerError> {
        self.triggers.init_and_arm(self.master, self.slave)?;
        self.streams.prepare(self.master, self.slave, &self.stream)?;

        let (master, slave) = (self.master, self.slave);
        let (timeout, fire_delay) = (self.stream.timeout(), self.stream.fire_delay());
        let streams = &mut self.streams;
        let triggers = &self.triggers;

        let (received, fired) = thread::scope(|s| -> Result<_, SamplerError> {
            let (listening_tx, listening_rx) = crossbeam_channel::bounded(2);
            let rx = thread::Builder::new()
                .name("sync-rx".into())
                .spawn_scoped(s, move || streams.receive_notify(master, slave, &listening_tx))?;

            let fired = match wait_listening(&listening_rx, timeout) {
                Ok(true) => {
                    thread::sleep(fire_delay);
                    triggers.fire(master)
                }
                // The receive ended before listening; its own error is reported
                Ok(false) => Ok(()),
                Err(e) => Err(e),
            };

            let received = rx
                .join()
                .unwrap_or_else(|_| Err(SamplerError::Protocol("sync-rx task panicked".into())));
            Ok((received, fired))
        })?;

        self.finish(received, fired)
    }

    fn concurrent(&mut self) -> Result<RawCapture, SamplerError> {
        self.triggers.init_and_arm(self.master, self.slave)?;

        let (master, slave) = (self.master, self.slave);
        let (channel, stream) = (&self.channel, &self.stream);
        let streams = &mut self.streams;
        let triggers = &self.triggers;

        let (received, fired) = thread::scope(|s| -> Result<_, SamplerError> {
            let rx = thread::Builder::new()
                .name("sync-rx".into())
                .spawn_scoped(s, move || {
                    streams.start_synchronized_receive(master, slave, channel, stream)
                })?;
            let fire = thread::Builder::new()
                .name("trigger-fire".into())
                .spawn_scoped(s, move || triggers.fire(master))?;

            let received = rx
                .join()
                .unwrap_or_else(|_| Err(SamplerError::Protocol("sync-rx task panicked".into())));
            let fired = fire
                .join()
                .unwrap_or_else(|_| Err(SamplerError::Protocol("trigger-fire task panicked".into())));
            Ok((received, fired))
        })?;

        self.finish(received, fired)
    }

    /// Combine the receive and fire outcomes; a fire failure takes precedence
    fn finish(
        &mut self,
        received: Result<(usize, usize), SamplerError>,
        fired: Result<(), SamplerError>,
    ) -> Result<RawCapture, SamplerError> {
        match (received, fired) {
            (Ok(_), Ok(())) => self.take_capture(),
            (received, Err(fire_err)) => {
                if let Err(rx_err) = received {
                    tracing::warn!(error = %rx_err, "Receive failed after fire failure");
                }
                Err(fire_err)
            }
            (Err(rx_err), Ok(())) => Err(rx_err),
        }
    }

    /// Disarm both triggers, disable RX on both devices, release the buffers
    ///
    /// Every step is attempted; the first failure is returned.
    pub fn teardown(&mut self) -> Result<(), SamplerError> {
        let disarm = self.triggers.disarm(self.master, self.slave);
        let master_off = disable_channels(self.master);
        let slave_off = disable_channels(self.slave);
        self.streams.release_buffers();

        disarm.and(master_off).and(slave_off)
    }
}

/// Wait for both receive threads to announce themselves
///
/// # Returns
/// `true` once both devices are listening, `false` if the receive side ended
/// first, or a timeout error if neither happens within `timeout`
fn wait_listening(listening: &Receiver<DeviceRole>, timeout: Duration) -> Result<bool, SamplerError> {
    let deadline = Instant::now() + timeout;
    for _ in 0..2 {
        match listening.recv_deadline(deadline) {
            Ok(role) => tracing::trace!(?role, "Receive listening"),
            Err(RecvTimeoutError::Disconnected) => return Ok(false),
            Err(RecvTimeoutError::Timeout) => {
                return Err(SamplerError::Protocol(format!(
                    "receive threads not listening after {} ms",
                    timeout.as_millis()
                )))
            }
        }
    }
    Ok(true)
}

impl Drop for CaptureSession<'_> {
    fn drop(&mut self) {
        if self.triggers.is_armed() || self.streams.is_allocated() {
            if let Err(e) = self.teardown() {
                tracing::error!(error = %e, "Teardown on drop failed");
            }
        }
    }
}
