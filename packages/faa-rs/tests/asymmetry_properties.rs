use faa_rs::{
    AsymmetryCalculator, ChannelDescriptor, FAAError, FrequencyBand, MultichannelRecording,
};
use std::f64::consts::PI;

const FS: f64 = 250.0;

fn alpha(amplitude: f64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64 / FS;
            amplitude * (2.0 * PI * 10.0 * t).sin() + 0.2 * (2.0 * PI * 3.0 * t).sin()
        })
        .collect()
}

fn frontal_pair(left_gain: f64, right_gain: f64) -> MultichannelRecording {
    let n = 5000;
    let channels = vec![ChannelDescriptor::signal("F3"), ChannelDescriptor::signal("F4")];
    MultichannelRecording::new(
        channels,
        vec![alpha(left_gain, n), alpha(right_gain, n)],
        FS,
    )
    .unwrap()
}

fn alpha_band() -> FrequencyBand {
    FrequencyBand::new(8.0, 13.0).unwrap()
}

#[test]
fn test_doubled_right_amplitude_gives_log10_four() {
    let rec = frontal_pair(1.0, 2.0);
    let result = AsymmetryCalculator::default()
        .compute(&rec, "F3", "F4", alpha_band(), Some(2.0))
        .unwrap();

    // The 3 Hz component is shared, but its leakage into 8-13 Hz is negligible
    // next to the alpha peak.
    assert!((result.asymmetry - 4f64.log10()).abs() < 1e-3);
    assert!(result.power_right > result.power_left);
    assert_eq!(
        result.asymmetry,
        result.log_power_right - result.log_power_left
    );
}

#[test]
fn test_swapping_channels_negates_asymmetry() {
    let rec = frontal_pair(1.0, 1.5);
    let calc = AsymmetryCalculator::default();
    let forward = calc
        .compute(&rec, "F3", "F4", alpha_band(), Some(2.0))
        .unwrap();
    let backward = calc
        .compute(&rec, "F4", "F3", alpha_band(), Some(2.0))
        .unwrap();
    assert!((forward.asymmetry + backward.asymmetry).abs() < 1e-12);
}

#[test]
fn test_guard_band_does_not_change_in_band_power() {
    let rec = frontal_pair(1.0, 1.5);
    let narrow = AsymmetryCalculator::new(0.0)
        .compute(&rec, "F3", "F4", alpha_band(), Some(2.0))
        .unwrap();
    let wide = AsymmetryCalculator::new(5.0)
        .compute(&rec, "F3", "F4", alpha_band(), Some(2.0))
        .unwrap();
    assert!((narrow.power_left - wide.power_left).abs() <= 1e-12 * narrow.power_left);
    assert!((narrow.asymmetry - wide.asymmetry).abs() < 1e-12);
}

#[test]
fn test_both_missing_channels_are_named() {
    let rec = frontal_pair(1.0, 1.0);
    match AsymmetryCalculator::default().compute(&rec, "F7", "F8", alpha_band(), None) {
        Err(FAAError::MissingChannels(names)) => {
            assert_eq!(names, vec!["F7".to_string(), "F8".to_string()])
        }
        other => panic!("expected MissingChannels, got {:?}", other),
    }
}

#[test]
fn test_band_above_nyquist_is_empty() {
    let rec = frontal_pair(1.0, 1.0);
    let band = FrequencyBand::new(200.0, 240.0).unwrap();
    assert!(matches!(
        AsymmetryCalculator::default().compute(&rec, "F3", "F4", band, Some(2.0)),
        Err(FAAError::EmptyBand { .. })
    ));
}
