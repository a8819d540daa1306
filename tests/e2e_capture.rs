//! E2E tests for the capture pipeline
//!
//! Drives a simulated master/slave pair through complete triggered captures
//! and checks demultiplexing, short reads and the CSV interchange format.

use approx::assert_abs_diff_eq;
use phasecollect::capture::csv;
use phasecollect::sampler::stream::RawDeviceBuffer;
use phasecollect::{
    demux, estimate_phase, CaptureSession, ChannelConfig, SessionConfig, SimSignal,
    SimulatedRadio, StreamConfig,
};
use tempfile::TempDir;

fn small_config() -> SessionConfig {
    SessionConfig {
        stream: StreamConfig {
            num_samples: 1024,
            timeout_ms: 500,
            ..StreamConfig::default()
        },
        ..SessionConfig::default()
    }
}

fn offset_pair(phases: [f64; 4]) -> (SimulatedRadio, SimulatedRadio) {
    let (master, slave) = SimulatedRadio::pair(SimSignal::default());
    master.set_phase_offsets([phases[0], phases[1]]);
    slave.set_phase_offsets([phases[2], phases[3]]);
    (master, slave)
}

/// Test that demux truncates to the shorter buffer: 4096 and 3072 values give 1536
#[test]
fn test_demux_truncates_to_shorter_buffer() {
    let master: Vec<i16> = (0..4096).map(|i| (i % 1000) as i16).collect();
    let slave: Vec<i16> = (0..3072).map(|i| -((i % 1000) as i16)).collect();

    let cs = demux(
        RawDeviceBuffer::from_samples(master),
        RawDeviceBuffer::from_samples(slave),
    )
    .unwrap();

    assert_eq!(cs.len(), 1536);
    assert_eq!(cs.pairs(), 768);
    assert_eq!(&cs.channel(0)[..4], &[0, 1, 4, 5]);
    assert_eq!(&cs.channel(1)[..4], &[2, 3, 6, 7]);
    assert_eq!(&cs.channel(2)[..4], &[0, -1, -4, -5]);
    assert_eq!(&cs.channel(3)[..4], &[-2, -3, -6, -7]);
}

/// Test that every channel holds min(valid)/2 values for a spread of lengths
#[test]
fn test_demux_length_property() {
    for (m, s) in [(0, 0), (4, 4), (8, 4), (400, 1024), (4100, 4096), (13, 9)] {
        let cs = demux(
            RawDeviceBuffer::from_samples(vec![1; m]),
            RawDeviceBuffer::from_samples(vec![1; s]),
        )
        .unwrap();
        let common = m.min(s) - m.min(s) % 4;
        for k in 0..4 {
            assert_eq!(
                cs.channel(k).len(),
                common / 2,
                "channel {} of ({}, {})",
                k,
                m,
                s
            );
        }
    }
}

/// Test a full sequential capture written to CSV and read back
#[test]
fn test_sim_capture_to_csv() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("capture.csv");
    let (master, slave) = offset_pair([0.0, 0.262, 0.524, 0.785]);
    let config = small_config();
    let mut session = CaptureSession::from_config(&master, &slave, &config);

    let capture = session.acquire().unwrap();
    assert_eq!(capture.master.valid_len(), 1024 * 4);
    assert_eq!(capture.write_csv(&path).unwrap(), 1024);

    let from_file = csv::read_csv(&path).unwrap();
    let from_memory = capture.demux().unwrap();
    assert_eq!(from_file, from_memory);

    let pv = estimate_phase(&from_file).unwrap();
    assert_abs_diff_eq!(pv.delta_phase1, 0.262, epsilon = 1e-3);
    assert_abs_diff_eq!(pv.delta_phase2, 0.524, epsilon = 1e-3);
    assert_abs_diff_eq!(pv.delta_phase3, 0.785, epsilon = 1e-3);
}

/// Test that repeated captures append to the same CSV file
#[test]
fn test_repeated_captures_append() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("capture.csv");
    let (master, slave) = offset_pair([0.0; 4]);
    let config = small_config();
    let mut session = CaptureSession::from_config(&master, &slave, &config);

    for _ in 0..3 {
        session.acquire().unwrap().write_csv(&path).unwrap();
    }
    assert_eq!(csv::read_csv(&path).unwrap().pairs(), 3 * 1024);
}

/// Test that a short slave read truncates all four channels
#[test]
fn test_short_slave_read_truncates_channels() {
    let (master, slave) = offset_pair([0.0, 0.1, 0.2, 0.3]);
    // Pairs across both slave channels, so 768 pairs per channel
    slave.set_capture_limit(Some(1536));
    let config = small_config();
    let mut session = CaptureSession::from_config(&master, &slave, &config);

    let capture = session.acquire().unwrap();
    assert_eq!(capture.master.valid_len(), 4096);
    assert_eq!(capture.slave.valid_len(), 3072);

    let cs = capture.demux().unwrap();
    assert_eq!(cs.len(), 1536);
    let pv = estimate_phase(&cs).unwrap();
    assert_abs_diff_eq!(pv.delta_phase3, 0.3, epsilon = 1e-3);
}

/// Test that the concurrent flow produces the same layout as the sequential one
#[test]
fn test_concurrent_capture_layout() {
    let (master, slave) = offset_pair([0.0, -0.7, 1.1, 2.0]);
    let mut session = CaptureSession::new(
        &master,
        &slave,
        ChannelConfig::default(),
        small_config().stream,
        small_config().trigger_signal,
    );

    let cs = session.capture_concurrent().unwrap();
    assert_eq!(cs.pairs(), 1024);
    let pv = estimate_phase(&cs).unwrap();
    assert_abs_diff_eq!(pv.delta_phase1, -0.7, epsilon = 1e-3);
    assert_abs_diff_eq!(pv.delta_phase2, 1.1, epsilon = 1e-3);
    assert_abs_diff_eq!(pv.delta_phase3, 2.0, epsilon = 1e-3);
}
