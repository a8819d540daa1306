//! E2E tests for phase estimation
//!
//! Builds synthetic four-channel captures with known offsets and checks that
//! the estimator recovers them, that correction undoes them, and that a
//! capture written to CSV estimates the same as the in-memory set.

use approx::assert_abs_diff_eq;
use phasecollect::capture::csv;
use phasecollect::signal::synthetic_channel_set;
use phasecollect::{
    estimate_phase, estimate_phase_csv, impose_phase, remove_phase, ChannelSet, PhaseError,
    PhaseVector,
};
use tempfile::TempDir;

const AMPLITUDE: f64 = 32767.0;
const OMEGA: f64 = 1.0;
const PAIRS: usize = 1000;

/// Test the reference scenario: 15, 30 and 45 degree offsets at N=1000
#[test]
fn test_recovers_quarter_turn_offsets() {
    let cs = synthetic_channel_set([0.0, 0.262, 0.524, 0.785], PAIRS, AMPLITUDE, OMEGA).unwrap();
    let pv = estimate_phase(&cs).unwrap();

    assert_eq!(pv.delta_phase0, 0.0);
    assert_abs_diff_eq!(pv.delta_phase1, 0.262, epsilon = 1e-3);
    assert_abs_diff_eq!(pv.delta_phase2, 0.524, epsilon = 1e-3);
    assert_abs_diff_eq!(pv.delta_phase3, 0.785, epsilon = 1e-3);
}

/// Test that negative and near-pi offsets keep their sign
#[test]
fn test_recovers_signed_offsets() {
    let cs = synthetic_channel_set([0.0, -1.0, 2.0, -2.9], PAIRS, AMPLITUDE, OMEGA).unwrap();
    let pv = estimate_phase(&cs).unwrap();

    assert_abs_diff_eq!(pv.delta_phase1, -1.0, epsilon = 1e-3);
    assert_abs_diff_eq!(pv.delta_phase2, 2.0, epsilon = 1e-3);
    assert_abs_diff_eq!(pv.delta_phase3, -2.9, epsilon = 1e-3);
}

/// Test that every estimate stays within (-pi, pi]
#[test]
fn test_estimates_are_bounded() {
    let cs = synthetic_channel_set([0.0, 3.0, -0.1, 1.5], PAIRS, AMPLITUDE, OMEGA).unwrap();
    let pv = estimate_phase(&cs).unwrap();

    assert!(pv.max_abs() <= std::f64::consts::PI);
    assert_abs_diff_eq!(pv.delta_phase1, 3.0, epsilon = 1e-3);
}

/// Test that removing an estimate leaves channels in phase with channel 0
#[test]
fn test_remove_phase_round_trip() {
    let mut cs = synthetic_channel_set([0.0, 0.001, -0.5, 2.5], PAIRS, 16384.0, OMEGA).unwrap();
    let estimate = estimate_phase(&cs).unwrap();

    remove_phase(&mut cs, &estimate).unwrap();
    let residual = estimate_phase(&cs).unwrap();
    assert!(
        residual.max_abs() < 5e-3,
        "residual after correction too large: {}",
        residual
    );
}

/// Test that an imposed rotation shows up in the estimate
#[test]
fn test_impose_then_estimate() {
    let mut cs = synthetic_channel_set([0.0; 4], PAIRS, 16384.0, 0.3).unwrap();
    let imposed = PhaseVector::from([0.0, 0.4, -0.8, 1.2]);

    impose_phase(&mut cs, &imposed).unwrap();
    let pv = estimate_phase(&cs).unwrap();

    for k in 1..4 {
        assert_abs_diff_eq!(pv.as_array()[k], imposed.as_array()[k], epsilon = 2e-3);
    }
}

/// Test that imposing a set's own estimate doubles its offsets and removing it cancels them
#[test]
fn test_impose_own_estimate_adds_rotation() {
    let offsets = [0.0, 0.262, 0.524, 0.785];
    let mut cs = synthetic_channel_set(offsets, PAIRS, 16384.0, 0.3).unwrap();
    let estimate = estimate_phase(&cs).unwrap();

    impose_phase(&mut cs, &estimate).unwrap();
    let doubled = estimate_phase(&cs).unwrap();
    for k in 1..4 {
        assert_abs_diff_eq!(doubled.as_array()[k], 2.0 * offsets[k], epsilon = 3e-3);
    }

    // Removing twice lands back in phase with channel 0
    remove_phase(&mut cs, &estimate).unwrap();
    remove_phase(&mut cs, &estimate).unwrap();
    let residual = estimate_phase(&cs).unwrap();
    assert!(residual.max_abs() < 5e-3, "residual: {}", residual);
}

/// Test that the CSV path gives the same estimate as the in-memory set
#[test]
fn test_csv_estimate_matches_memory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("capture.csv");

    let cs = synthetic_channel_set([0.0, 0.262, 0.524, 0.785], PAIRS, AMPLITUDE, OMEGA).unwrap();
    let rows = csv::write_channel_set(&path, &cs).unwrap();
    assert_eq!(rows, PAIRS);

    let from_file = estimate_phase_csv(&path).unwrap();
    assert_eq!(from_file, estimate_phase(&cs).unwrap());
}

/// Test the empty and degenerate inputs
#[test]
fn test_degenerate_inputs() {
    let empty = ChannelSet::from_array(Default::default()).unwrap();
    assert_eq!(estimate_phase(&empty).unwrap_err(), PhaseError::Empty);

    // Channel 2 exactly cancels channel 0, so their sum is zero
    let ch0: Vec<i16> = (0..200).map(|i| (i % 7) as i16 * 100).collect();
    let ch2: Vec<i16> = ch0.iter().map(|v| -v).collect();
    let cs = ChannelSet::from_array([ch0.clone(), ch0.clone(), ch2, ch0]).unwrap();
    assert_eq!(
        estimate_phase(&cs).unwrap_err(),
        PhaseError::DegenerateReference(2)
    );

    assert_eq!(
        ChannelSet::from_vec(vec![vec![0; 4]; 3]).unwrap_err(),
        PhaseError::MissingChannel(3)
    );
}
