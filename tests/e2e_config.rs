//! E2E tests for session configuration persistence
//!
//! Verifies that a session config survives a save/load cycle, that partial
//! files fill in defaults, and that a loaded config drives a capture.

use phasecollect::device::{GainMode, TriggerSignal};
use phasecollect::{CaptureSession, SessionConfig, SimSignal, SimulatedRadio};
use std::path::PathBuf;
use tempfile::TempDir;

/// Test that the default config path lives under the phasecollect directory
#[test]
fn test_config_path() {
    let path = SessionConfig::path();
    assert!(path.ends_with("phasecollect/session.json"));
}

/// Test that a missing file falls back to defaults
#[test]
fn test_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = SessionConfig::load_from(&dir.path().join("absent.json"));
    assert_eq!(config, SessionConfig::default());
}

/// Test that every field survives a save/load cycle
#[test]
fn test_full_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");

    let mut config = SessionConfig::default();
    config.master = "*:serial=aaaa".into();
    config.slave = "*:serial=bbbb".into();
    config.channel.gain_mode = GainMode::FastAttack;
    config.channel.sample_rate = 10_000_000;
    config.channel.bias_tee = true;
    config.stream.num_samples = 2048;
    config.stream.timeout_ms = 1000;
    config.trigger_signal = TriggerSignal::J71Pin4;
    config.csv_path = Some(PathBuf::from("runs/capture.csv"));
    config.concurrent = true;

    config.save(&path).unwrap();
    let loaded = SessionConfig::load_from(&path);
    assert_eq!(loaded, config);
}

/// Test that a hand-written partial file keeps defaults for the rest
#[test]
fn test_partial_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    std::fs::write(
        &path,
        r#"{ "stream": { "buffer_size": 4096 }, "channel": { "frequency": 915000000 } }"#,
    )
    .unwrap();

    let config = SessionConfig::load_from(&path);
    assert_eq!(config.stream.buffer_size, 4096);
    assert_eq!(config.stream.num_buffers, 16);
    assert_eq!(config.channel.frequency, 915_000_000);
    assert_eq!(config.channel.gain, 30);
    assert_eq!(config.trigger_signal, TriggerSignal::MiniExp1);
    config.validate().unwrap();
}

/// Test that validation catches settings the radios would reject
#[test]
fn test_validation() {
    let mut config = SessionConfig::default();
    config.stream.buffer_size = 1000;
    assert!(config.validate().is_err());

    let mut config = SessionConfig::default();
    config.stream.num_transfers = 0;
    assert!(config.validate().is_err());

    let mut config = SessionConfig::default();
    config.slave = config.master.clone();
    assert!(config.validate().is_err());
}

/// Test that a loaded config drives a simulated capture end to end
#[test]
fn test_loaded_config_drives_capture() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("session.json");
    let mut config = SessionConfig::default();
    config.stream.num_samples = 256;
    config.stream.timeout_ms = 200;
    config.trigger_signal = TriggerSignal::J51Pin1;
    config.save(&path).unwrap();

    let loaded = SessionConfig::load_from(&path);
    let (master, slave) = SimulatedRadio::pair(SimSignal::default());
    let mut session = CaptureSession::from_config(&master, &slave, &loaded);
    let cs = session.capture().unwrap();
    assert_eq!(cs.pairs(), 256);
}
