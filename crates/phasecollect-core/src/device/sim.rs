//! Deterministic software radio pair
//!
//! [`SimulatedRadio::pair`] returns two radios wired together the way the
//! bench setup is: a reference clock link (one device drives its clock
//! output into the other's clock input) and a shared trigger line.
//!
//! Every parameter written is stored for bit-exact read-back. Once a trigger
//! is armed, `sync_rx` blocks until an edge arrives on the trigger line or the
//! timeout elapses, and sample index 0 of the capture is the trigger edge on
//! both devices. Samples are rendered from a single over-the-air
//! [`SimSignal`], rotated by a per-channel phase offset and shifted by a
//! per-device skew, so the estimators downstream have a known ground truth.
//!
//! Faults can be injected on any [`Operation`] to drive the pipeline's error
//! paths without hardware.

use super::{
    ChannelLayout, ClockSelect, DeviceController, DeviceError, GainMode, Operation, RxChannel,
    SampleFormat, SyncParams, Trigger, TriggerRole, TriggerSignal, TriggerState,
};
use crate::signal::{quantize, MlsGenerator};
use crate::BUFFER_SIZE_MULTIPLE;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use rustfft::num_complex::Complex64;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

const GAIN_RANGE_DB: RangeInclusive<i32> = -15..=60;
const SAMPLE_RATE_RANGE_HZ: RangeInclusive<u32> = 520_834..=61_440_000;
const BANDWIDTH_RANGE_HZ: RangeInclusive<u32> = 200_000..=56_000_000;
const FREQUENCY_RANGE_HZ: RangeInclusive<u64> = 70_000_000..=6_000_000_000;

/// Pending edges per device; further edges while full are redundant
const EDGE_QUEUE_DEPTH: usize = 8;

const MASTER_PORT: usize = 0;
const SLAVE_PORT: usize = 1;

/// Over-the-air signal received by every simulated channel
#[derive(Debug, Clone, PartialEq)]
pub enum SimSignal {
    /// Complex tone `amplitude * e^{j*omega*n}`
    Tone { amplitude: f64, omega: f64 },
    /// BPSK chips of a maximum-length sequence, for correlation tests
    Mls { amplitude: f64, order: u32 },
}

impl Default for SimSignal {
    /// A ~1 kHz tone at 20.48 MHz, just under 1.0 in SC16 Q11
    fn default() -> Self {
        SimSignal::Tone {
            amplitude: 2000.0,
            omega: 3.0e-4,
        }
    }
}

/// Rendered form of a [`SimSignal`], shared by both radios
#[derive(Debug)]
struct Emitter {
    signal: SimSignal,
    chips: Vec<f64>,
}

impl Emitter {
    fn new(signal: SimSignal) -> Self {
        let chips = match signal {
            SimSignal::Mls { order, .. } => {
                MlsGenerator::new(order.clamp(2, 15)).sequence().to_vec()
            }
            SimSignal::Tone { .. } => Vec::new(),
        };
        Self { signal, chips }
    }

    fn sample(&self, index: i64, phase: f64) -> Complex64 {
        match self.signal {
            SimSignal::Tone { amplitude, omega } => {
                Complex64::from_polar(amplitude, omega * index as f64 + phase)
            }
            SimSignal::Mls { amplitude, .. } => {
                let chip = self.chips[index.rem_euclid(self.chips.len() as i64) as usize];
                Complex64::from_polar(amplitude * chip, phase)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TriggerEdge {
    signal: TriggerSignal,
}

struct Tap {
    port: usize,
    connected: Arc<AtomicBool>,
    tx: Sender<TriggerEdge>,
}

/// The physical trigger wire between the two radios
struct TriggerLine {
    taps: Vec<Tap>,
}

impl TriggerLine {
    /// Deliver an edge to every connected device; the driver always sees its own edge
    fn drive(&self, from_port: usize, edge: TriggerEdge) {
        for tap in &self.taps {
            if tap.port == from_port || tap.connected.load(Ordering::Acquire) {
                let _ = tap.tx.try_send(edge);
            }
        }
    }
}

/// Clock output state of both ends of the reference cable
#[derive(Default)]
struct ReferenceLink {
    outputs: [AtomicBool; 2],
}

#[derive(Debug, Clone, Copy)]
struct ChannelRegs {
    gain_mode: GainMode,
    gain: i32,
    sample_rate: u32,
    bandwidth: u32,
    frequency: u64,
    bias_tee: bool,
    enabled: bool,
}

impl Default for ChannelRegs {
    fn default() -> Self {
        Self {
            gain_mode: GainMode::Default,
            gain: 0,
            sample_rate: 30_720_000,
            bandwidth: 18_000_000,
            frequency: 2_400_000_000,
            bias_tee: false,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TriggerRegs {
    signal: TriggerSignal,
    role: TriggerRole,
    armed: bool,
    fired: bool,
    fire_requested: bool,
}

impl TriggerRegs {
    fn waiting(&self) -> bool {
        self.armed && !self.fired
    }
}

#[derive(Debug)]
struct RadioState {
    clock_select: ClockSelect,
    channels: [ChannelRegs; 2],
    trigger: Option<TriggerRegs>,
    stream: Option<(ChannelLayout, SyncParams)>,
    /// Frames delivered since the capture window opened
    cursor: u64,
    /// I/Q pairs delivered since the stream was configured
    delivered: usize,
    /// I/Q pairs consumed by TX since the stream was configured
    transmitted: usize,
    phase_offsets: [f64; 2],
    skew: i64,
    capture_limit: Option<usize>,
    faults: HashSet<Operation>,
    ignore_fire: bool,
}

impl Default for RadioState {
    fn default() -> Self {
        Self {
            clock_select: ClockSelect::Onboard,
            channels: [ChannelRegs::default(); 2],
            trigger: None,
            stream: None,
            cursor: 0,
            delivered: 0,
            transmitted: 0,
            phase_offsets: [0.0; 2],
            skew: 0,
            capture_limit: None,
            faults: HashSet::new(),
            ignore_fire: false,
        }
    }
}

impl RadioState {
    fn check(&self, op: Operation) -> Result<(), DeviceError> {
        if self.faults.contains(&op) {
            return Err(DeviceError::Fault(op));
        }
        Ok(())
    }

    fn apply_edge(&mut self, edge: TriggerEdge) {
        if let Some(trigger) = self.trigger.as_mut() {
            if trigger.armed && trigger.signal == edge.signal && trigger.role != TriggerRole::Disabled
            {
                trigger.fired = true;
            }
        }
    }

    fn channel(&self, ch: RxChannel) -> &ChannelRegs {
        &self.channels[ch.index()]
    }

    fn channel_mut(&mut self, ch: RxChannel) -> &mut ChannelRegs {
        &mut self.channels[ch.index()]
    }
}

/// One simulated dual-RX radio
pub struct SimulatedRadio {
    name: String,
    port: usize,
    state: Mutex<RadioState>,
    edges: Receiver<TriggerEdge>,
    connected: Arc<AtomicBool>,
    line: Arc<TriggerLine>,
    link: Arc<ReferenceLink>,
    emitter: Arc<Emitter>,
}

impl SimulatedRadio {
    /// Create a master/slave pair sharing a reference link and trigger line
    pub fn pair(signal: SimSignal) -> (SimulatedRadio, SimulatedRadio) {
        let emitter = Arc::new(Emitter::new(signal));
        let link = Arc::new(ReferenceLink::default());

        let (master_tx, master_rx) = crossbeam_channel::bounded(EDGE_QUEUE_DEPTH);
        let (slave_tx, slave_rx) = crossbeam_channel::bounded(EDGE_QUEUE_DEPTH);
        let master_connected = Arc::new(AtomicBool::new(true));
        let slave_connected = Arc::new(AtomicBool::new(true));

        let line = Arc::new(TriggerLine {
            taps: vec![
                Tap {
                    port: MASTER_PORT,
                    connected: Arc::clone(&master_connected),
                    tx: master_tx,
                },
                Tap {
                    port: SLAVE_PORT,
                    connected: Arc::clone(&slave_connected),
                    tx: slave_tx,
                },
            ],
        });

        let make = |name: &str, port, edges, connected| SimulatedRadio {
            name: name.to_string(),
            port,
            state: Mutex::new(RadioState::default()),
            edges,
            connected,
            line: Arc::clone(&line),
            link: Arc::clone(&link),
            emitter: Arc::clone(&emitter),
        };

        (
            make("master", MASTER_PORT, master_rx, master_connected),
            make("slave", SLAVE_PORT, slave_rx, slave_connected),
        )
    }

    fn state(&self) -> MutexGuard<'_, RadioState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn absorb_edges(&self, state: &mut RadioState) {
        while let Ok(edge) = self.edges.try_recv() {
            state.apply_edge(edge);
        }
    }

    fn peer_drives_reference(&self) -> bool {
        self.link.outputs[1 - self.port].load(Ordering::Acquire)
    }

    /// Rotate the carrier seen on each RX channel by a fixed phase (radians)
    pub fn set_phase_offsets(&self, offsets: [f64; 2]) {
        self.state().phase_offsets = offsets;
    }

    /// Shift delivered samples by `skew` sample periods relative to the trigger edge
    pub fn set_skew(&self, skew: i64) {
        self.state().skew = skew;
    }

    /// Cap the I/Q pairs delivered per configured stream; `None` is unlimited
    pub fn set_capture_limit(&self, limit: Option<usize>) {
        self.state().capture_limit = limit;
    }

    /// Make every subsequent call of `op` fail with [`DeviceError::Fault`]
    pub fn inject_fault(&self, op: Operation) {
        self.state().faults.insert(op);
    }

    pub fn clear_faults(&self) {
        self.state().faults.clear();
    }

    /// Accept fire commands without driving the line or changing state
    pub fn ignore_fire_commands(&self, ignore: bool) {
        self.state().ignore_fire = ignore;
    }

    /// Connect or cut this device's end of the trigger wire
    pub fn set_trigger_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn module_enabled(&self, ch: RxChannel) -> bool {
        self.state().channel(ch).enabled
    }

    /// True when this device runs from a reference that is actually present
    pub fn reference_locked(&self) -> bool {
        match self.state().clock_select {
            ClockSelect::Onboard => true,
            ClockSelect::External => self.peer_drives_reference(),
        }
    }

    pub fn stream_params(&self) -> Option<SyncParams> {
        self.state().stream.map(|(_, params)| params)
    }

    /// I/Q pairs accepted by `sync_tx` since the stream was configured
    pub fn transmitted_samples(&self) -> usize {
        self.state().transmitted
    }

    fn render(&self, state: &mut RadioState, layout: ChannelLayout, buffer: &mut [i16], frames: usize) {
        let channels = layout.channel_count();
        for frame in 0..frames {
            let index = state.cursor as i64 + frame as i64 + state.skew;
            for c in 0..channels {
                let z = self.emitter.sample(index, state.phase_offsets[c]);
                let base = (frame * channels + c) * 2;
                buffer[base] = quantize(z.re);
                buffer[base + 1] = quantize(z.im);
            }
        }
        state.cursor += frames as u64;
    }
}

fn check_range<T>(parameter: &'static str, value: T, range: &RangeInclusive<T>) -> Result<(), DeviceError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(DeviceError::InvalidValue {
            parameter,
            reason: format!("{} outside {}..={}", value, range.start(), range.end()),
        })
    }
}

impl DeviceController for SimulatedRadio {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_clock_select(&self, select: ClockSelect) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SetClockSelect)?;
        state.clock_select = select;
        Ok(())
    }

    fn clock_select(&self) -> Result<ClockSelect, DeviceError> {
        Ok(self.state().clock_select)
    }

    fn set_clock_output(&self, enable: bool) -> Result<(), DeviceError> {
        let state = self.state();
        state.check(Operation::SetClockOutput)?;
        self.link.outputs[self.port].store(enable, Ordering::Release);
        Ok(())
    }

    fn clock_output(&self) -> Result<bool, DeviceError> {
        Ok(self.link.outputs[self.port].load(Ordering::Acquire))
    }

    fn set_gain_mode(&self, ch: RxChannel, mode: GainMode) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SetGainMode)?;
        state.channel_mut(ch).gain_mode = mode;
        Ok(())
    }

    fn gain_mode(&self, ch: RxChannel) -> Result<GainMode, DeviceError> {
        Ok(self.state().channel(ch).gain_mode)
    }

    fn set_gain(&self, ch: RxChannel, gain_db: i32) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SetGain)?;
        if !state.channel(ch).gain_mode.is_manual() {
            return Err(DeviceError::InvalidValue {
                parameter: "gain",
                reason: "manual gain requires manual gain mode".into(),
            });
        }
        check_range("gain", gain_db, &GAIN_RANGE_DB)?;
        state.channel_mut(ch).gain = gain_db;
        Ok(())
    }

    fn gain(&self, ch: RxChannel) -> Result<i32, DeviceError> {
        Ok(self.state().channel(ch).gain)
    }

    fn set_sample_rate(&self, ch: RxChannel, rate_hz: u32) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SetSampleRate)?;
        check_range("sample_rate", rate_hz, &SAMPLE_RATE_RANGE_HZ)?;
        state.channel_mut(ch).sample_rate = rate_hz;
        Ok(())
    }

    fn sample_rate(&self, ch: RxChannel) -> Result<u32, DeviceError> {
        Ok(self.state().channel(ch).sample_rate)
    }

    fn set_bandwidth(&self, ch: RxChannel, bandwidth_hz: u32) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SetBandwidth)?;
        check_range("bandwidth", bandwidth_hz, &BANDWIDTH_RANGE_HZ)?;
        state.channel_mut(ch).bandwidth = bandwidth_hz;
        Ok(())
    }

    fn bandwidth(&self, ch: RxChannel) -> Result<u32, DeviceError> {
        Ok(self.state().channel(ch).bandwidth)
    }

    fn set_frequency(&self, ch: RxChannel, frequency_hz: u64) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SetFrequency)?;
        check_range("frequency", frequency_hz, &FREQUENCY_RANGE_HZ)?;
        state.channel_mut(ch).frequency = frequency_hz;
        Ok(())
    }

    fn frequency(&self, ch: RxChannel) -> Result<u64, DeviceError> {
        Ok(self.state().channel(ch).frequency)
    }

    fn set_bias_tee(&self, ch: RxChannel, enable: bool) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SetBiasTee)?;
        state.channel_mut(ch).bias_tee = enable;
        Ok(())
    }

    fn bias_tee(&self, ch: RxChannel) -> Result<bool, DeviceError> {
        Ok(self.state().channel(ch).bias_tee)
    }

    fn enable_module(&self, ch: RxChannel, enable: bool) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::EnableModule)?;
        state.channel_mut(ch).enabled = enable;
        Ok(())
    }

    fn trigger_init(&self, ch: RxChannel, signal: TriggerSignal) -> Result<Trigger, DeviceError> {
        let mut state = self.state();
        state.check(Operation::TriggerInit)?;
        state.trigger = Some(TriggerRegs {
            signal,
            role: TriggerRole::Disabled,
            armed: false,
            fired: false,
            fire_requested: false,
        });
        Ok(Trigger {
            channel: ch,
            role: TriggerRole::Disabled,
            signal,
        })
    }

    fn trigger_arm(&self, trigger: &Trigger, arm: bool) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(if arm {
            Operation::TriggerArm
        } else {
            Operation::TriggerDisarm
        })?;

        let regs = match state.trigger {
            Some(regs) if regs.signal == trigger.signal => regs,
            _ => return Err(DeviceError::NotReady("trigger not initialized".into())),
        };

        if arm {
            if trigger.role == TriggerRole::Disabled {
                return Err(DeviceError::InvalidArgument(
                    "cannot arm a trigger with role Disabled".into(),
                ));
            }
            // Edges from an earlier session must not fire this one
            while self.edges.try_recv().is_ok() {}
            state.trigger = Some(TriggerRegs {
                role: trigger.role,
                armed: true,
                fired: false,
                fire_requested: false,
                ..regs
            });
            state.cursor = 0;
        } else {
            state.trigger = Some(TriggerRegs {
                role: TriggerRole::Disabled,
                armed: false,
                fire_requested: false,
                ..regs
            });
        }
        Ok(())
    }

    fn trigger_fire(&self, trigger: &Trigger) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::TriggerFire)?;

        let regs = state
            .trigger
            .as_ref()
            .filter(|regs| regs.signal == trigger.signal)
            .ok_or_else(|| DeviceError::NotReady("trigger not initialized".into()))?;
        if !regs.armed || regs.role != TriggerRole::Master {
            return Err(DeviceError::NotReady(
                "fire requires an armed master trigger".into(),
            ));
        }
        if state.ignore_fire {
            return Ok(());
        }

        if let Some(regs) = state.trigger.as_mut() {
            regs.fire_requested = true;
            regs.fired = true;
        }
        drop(state);

        self.line.drive(
            self.port,
            TriggerEdge {
                signal: trigger.signal,
            },
        );
        Ok(())
    }

    fn trigger_state(&self, trigger: &Trigger) -> Result<TriggerState, DeviceError> {
        let mut state = self.state();
        state.check(Operation::TriggerState)?;
        self.absorb_edges(&mut state);
        match state.trigger {
            Some(regs) if regs.signal == trigger.signal => Ok(TriggerState {
                role: regs.role,
                is_armed: regs.armed,
                has_fired: regs.fired,
                fire_requested: regs.fire_requested,
            }),
            _ => Err(DeviceError::NotReady("trigger not initialized".into())),
        }
    }

    fn sync_config(
        &self,
        layout: ChannelLayout,
        format: SampleFormat,
        params: &SyncParams,
    ) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SyncConfig)?;
        match format {
            SampleFormat::Sc16Q11 => {}
        }
        if params.buffer_size == 0 || params.buffer_size % BUFFER_SIZE_MULTIPLE != 0 {
            return Err(DeviceError::InvalidValue {
                parameter: "buffer_size",
                reason: format!("{} is not a multiple of {}", params.buffer_size, BUFFER_SIZE_MULTIPLE),
            });
        }
        if params.num_transfers == 0 || params.num_transfers > params.num_buffers {
            return Err(DeviceError::InvalidValue {
                parameter: "num_transfers",
                reason: format!(
                    "{} transfers for {} buffers",
                    params.num_transfers, params.num_buffers
                ),
            });
        }
        state.stream = Some((layout, *params));
        state.delivered = 0;
        state.transmitted = 0;
        if !state.trigger.map(|t| t.armed).unwrap_or(false) {
            state.cursor = 0;
        }
        Ok(())
    }

    fn sync_rx(
        &self,
        buffer: &mut [i16],
        num_samples: usize,
        timeout_ms: u32,
    ) -> Result<usize, DeviceError> {
        let layout = {
            let state = self.state();
            state.check(Operation::SyncRx)?;

            let layout = match state.stream {
                Some((layout, _)) if layout.is_rx() => layout,
                _ => return Err(DeviceError::NotReady("RX stream not configured".into())),
            };
            let needed = match layout {
                ChannelLayout::RxX2 => &RxChannel::ALL[..],
                _ => &RxChannel::ALL[..1],
            };
            if needed.iter().any(|&ch| !state.channel(ch).enabled) {
                return Err(DeviceError::NotReady("RX module disabled".into()));
            }
            if state.clock_select == ClockSelect::External && !self.peer_drives_reference() {
                return Err(DeviceError::NotReady("no external reference present".into()));
            }
            if num_samples % layout.channel_count() != 0 {
                return Err(DeviceError::InvalidArgument(format!(
                    "{} samples is not a whole number of frames",
                    num_samples
                )));
            }
            if buffer.len() < num_samples * 2 {
                return Err(DeviceError::InvalidArgument(format!(
                    "buffer holds {} values, {} needed",
                    buffer.len(),
                    num_samples * 2
                )));
            }
            layout
        };

        // Gated on the trigger: wait for the edge without holding the state lock
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        loop {
            {
                let mut state = self.state();
                self.absorb_edges(&mut state);
                if !state.trigger.map(|t| t.waiting()).unwrap_or(false) {
                    break;
                }
            }
            match self.edges.recv_deadline(deadline) {
                Ok(edge) => self.state().apply_edge(edge),
                Err(RecvTimeoutError::Timeout) => return Err(DeviceError::Timeout { timeout_ms }),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(DeviceError::NotReady("trigger line disconnected".into()))
                }
            }
        }

        let mut state = self.state();
        let channels = layout.channel_count();
        let remaining = state
            .capture_limit
            .map(|limit| limit.saturating_sub(state.delivered))
            .unwrap_or(usize::MAX);
        let delivered = num_samples.min(remaining);
        let delivered = delivered - delivered % channels;
        if delivered == 0 && num_samples > 0 {
            // Stream stalled; real hardware would sit out the timeout
            return Err(DeviceError::Timeout { timeout_ms });
        }

        self.render(&mut state, layout, buffer, delivered / channels);
        state.delivered += delivered;
        Ok(delivered)
    }

    fn sync_tx(&self, buffer: &[i16], num_samples: usize, _timeout_ms: u32) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.check(Operation::SyncTx)?;
        let layout = match state.stream {
            Some((layout, _)) if !layout.is_rx() => layout,
            _ => return Err(DeviceError::NotReady("TX stream not configured".into())),
        };
        if num_samples % layout.channel_count() != 0 {
            return Err(DeviceError::InvalidArgument(format!(
                "{} samples is not a whole number of frames",
                num_samples
            )));
        }
        if buffer.len() < num_samples * 2 {
            return Err(DeviceError::InvalidArgument(format!(
                "buffer holds {} values, {} needed",
                buffer.len(),
                num_samples * 2
            )));
        }
        state.transmitted += num_samples;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn params() -> SyncParams {
        SyncParams {
            num_buffers: 16,
            buffer_size: 8192,
            num_transfers: 8,
            timeout_ms: 200,
        }
    }

    fn ready(radio: &SimulatedRadio) {
        radio
            .sync_config(ChannelLayout::RxX2, SampleFormat::Sc16Q11, &params())
            .unwrap();
        for ch in RxChannel::ALL {
            radio.enable_module(ch, true).unwrap();
        }
    }

    fn armed(radio: &SimulatedRadio, role: TriggerRole) -> Trigger {
        let mut trig = radio
            .trigger_init(RxChannel::Rx0, TriggerSignal::MiniExp1)
            .unwrap();
        trig.role = role;
        radio.trigger_arm(&trig, true).unwrap();
        trig
    }

    #[test]
    fn test_manual_gain_rejected_under_agc() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        master.set_gain_mode(RxChannel::Rx0, GainMode::SlowAttack).unwrap();
        assert!(matches!(
            master.set_gain(RxChannel::Rx0, 30),
            Err(DeviceError::InvalidValue { parameter: "gain", .. })
        ));

        master.set_gain_mode(RxChannel::Rx0, GainMode::Manual).unwrap();
        master.set_gain(RxChannel::Rx0, 30).unwrap();
        assert_eq!(master.gain(RxChannel::Rx0).unwrap(), 30);
    }

    #[test]
    fn test_out_of_range_frequency_rejected() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        assert!(master.set_frequency(RxChannel::Rx1, 10).is_err());
        master.set_frequency(RxChannel::Rx1, 1_575_420_000).unwrap();
        assert_eq!(master.frequency(RxChannel::Rx1).unwrap(), 1_575_420_000);
    }

    #[test]
    fn test_reference_lock_requires_driven_link() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        slave.set_clock_select(ClockSelect::External).unwrap();
        assert!(!slave.reference_locked());

        master.set_clock_output(true).unwrap();
        assert!(slave.reference_locked());
        assert!(master.reference_locked());
    }

    #[test]
    fn test_free_running_rx_returns_immediately() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        ready(&master);
        let mut buf = vec![0i16; 64];
        assert_eq!(master.sync_rx(&mut buf, 32, 10).unwrap(), 32);
        assert!(buf.iter().any(|&s| s != 0));
    }

    #[test]
    fn test_rx_requires_enabled_modules() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        master
            .sync_config(ChannelLayout::RxX2, SampleFormat::Sc16Q11, &params())
            .unwrap();
        let mut buf = vec![0i16; 64];
        assert!(matches!(
            master.sync_rx(&mut buf, 32, 10),
            Err(DeviceError::NotReady(_))
        ));
    }

    #[test]
    fn test_armed_rx_times_out_without_fire() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        ready(&master);
        armed(&master, TriggerRole::Master);

        let mut buf = vec![0i16; 64];
        let start = Instant::now();
        let result = master.sync_rx(&mut buf, 32, 30);
        assert_eq!(result, Err(DeviceError::Timeout { timeout_ms: 30 }));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_slave_rx_released_by_master_fire() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        ready(&slave);
        let master_trig = armed(&master, TriggerRole::Master);
        armed(&slave, TriggerRole::Slave);

        let received = thread::scope(|s| {
            let rx = s.spawn(|| {
                let mut buf = vec![0i16; 128];
                slave.sync_rx(&mut buf, 64, 2000)
            });
            thread::sleep(Duration::from_millis(20));
            master.trigger_fire(&master_trig).unwrap();
            rx.join().unwrap()
        });
        assert_eq!(received.unwrap(), 64);
    }

    #[test]
    fn test_disconnected_slave_never_fires() {
        let (master, slave) = SimulatedRadio::pair(SimSignal::default());
        let master_trig = armed(&master, TriggerRole::Master);
        let slave_trig = armed(&slave, TriggerRole::Slave);
        slave.set_trigger_connected(false);

        master.trigger_fire(&master_trig).unwrap();
        assert!(master.trigger_state(&master_trig).unwrap().has_fired);
        assert!(!slave.trigger_state(&slave_trig).unwrap().has_fired);
    }

    #[test]
    fn test_slave_cannot_fire() {
        let (_master, slave) = SimulatedRadio::pair(SimSignal::default());
        let trig = armed(&slave, TriggerRole::Slave);
        assert!(matches!(
            slave.trigger_fire(&trig),
            Err(DeviceError::NotReady(_))
        ));
    }

    #[test]
    fn test_capture_limit_short_then_stall() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        ready(&master);
        master.set_capture_limit(Some(40));

        let mut buf = vec![0i16; 128];
        assert_eq!(master.sync_rx(&mut buf, 64, 10).unwrap(), 40);
        assert!(matches!(
            master.sync_rx(&mut buf, 64, 10),
            Err(DeviceError::Timeout { .. })
        ));
    }

    #[test]
    fn test_injected_fault() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        master.inject_fault(Operation::SetBiasTee);
        assert_eq!(
            master.set_bias_tee(RxChannel::Rx0, true),
            Err(DeviceError::Fault(Operation::SetBiasTee))
        );
        master.clear_faults();
        master.set_bias_tee(RxChannel::Rx0, true).unwrap();
    }

    #[test]
    fn test_sync_config_rejects_unaligned_buffer() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        let mut p = params();
        p.buffer_size = 1000;
        assert!(master
            .sync_config(ChannelLayout::RxX2, SampleFormat::Sc16Q11, &p)
            .is_err());
    }

    #[test]
    fn test_sync_tx_requires_tx_stream() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        ready(&master);
        assert!(master.sync_tx(&[0; 8], 4, 10).is_err());
        assert_eq!(master.transmitted_samples(), 0);
        master
            .sync_config(ChannelLayout::TxX1, SampleFormat::Sc16Q11, &params())
            .unwrap();
        master.sync_tx(&[0; 8], 4, 10).unwrap();
        assert_eq!(master.transmitted_samples(), 4);
    }

    #[test]
    fn test_sync_tx_counts_consumed_samples() {
        let (master, _slave) = SimulatedRadio::pair(SimSignal::default());
        ready(&master);
        master
            .sync_config(ChannelLayout::TxX2, SampleFormat::Sc16Q11, &params())
            .unwrap();
        let block = vec![100i16; 64];
        for _ in 0..3 {
            master.sync_tx(&block, 32, 10).unwrap();
        }
        assert_eq!(master.transmitted_samples(), 96);

        // Short buffer and a partial frame are refused without counting
        assert!(master.sync_tx(&block, 64, 10).is_err());
        assert!(master.sync_tx(&block, 31, 10).is_err());
        master.inject_fault(Operation::SyncTx);
        assert!(master.sync_tx(&block, 32, 10).is_err());
        assert_eq!(master.transmitted_samples(), 96);

        // A new stream configuration restarts the count
        master.clear_faults();
        master
            .sync_config(ChannelLayout::TxX2, SampleFormat::Sc16Q11, &params())
            .unwrap();
        assert_eq!(master.transmitted_samples(), 0);
    }
}
