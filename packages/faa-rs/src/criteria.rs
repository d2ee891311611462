//! Per-channel summary statistics for the four bad-channel criteria.
//!
//! Every function takes the rows of the candidate channels and returns one
//! summary value per row. Larger values are more suspicious, except for the
//! amplitude summary, which is judged two-sided. Numerical degeneracy is
//! absorbed here: an undefined correlation or a failed regression becomes
//! the maximally anomalous value `1.0`.

use crate::error::Result;
use crate::spectral::welch_psd;
use crate::stats::{median_across, pearson, peak_to_peak};
use crate::types::FrequencyBand;
use nalgebra::{DMatrix, DVector};

/// Summary substituted when a criterion is undefined for a channel
pub const MAX_ANOMALY: f64 = 1.0;

/// `log10(peak_to_peak + eps)` per channel, computed on decimated rows
pub fn amplitude(decimated: &[Vec<f64>]) -> Vec<f64> {
    decimated
        .iter()
        .map(|row| (peak_to_peak(row) + f64::EPSILON).log10())
        .collect()
}

/// `1 - |r|` between each channel and the sample-wise median of all others
pub fn correlation(decimated: &[Vec<f64>]) -> Vec<f64> {
    (0..decimated.len())
        .map(|idx| {
            let others: Vec<&[f64]> = decimated
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != idx)
                .map(|(_, row)| row.as_slice())
                .collect();
            if others.is_empty() {
                return 0.0;
            }

            let reference = median_across(&others);
            match pearson(&decimated[idx], &reference) {
                Some(r) => 1.0 - r.abs(),
                None => MAX_ANOMALY,
            }
        })
        .collect()
}

/// `log10((hf + eps) / (lf + eps))` from trapezoid-integrated Welch power
pub fn spectral_ratio<R: AsRef<[f64]>>(
    rows: &[R],
    sampling_rate: f64,
    lf_band: &FrequencyBand,
    hf_band: &FrequencyBand,
    segment_seconds: Option<f64>,
) -> Result<Vec<f64>> {
    let psd = welch_psd(rows, sampling_rate, None, None, segment_seconds)?;
    let eps = f64::EPSILON;

    Ok((0..rows.len())
        .map(|ch| {
            let lf = psd.integrate_band(ch, lf_band);
            let hf = psd.integrate_band(ch, hf_band);
            ((hf + eps) / (lf + eps)).log10()
        })
        .collect())
}

/// `1 - |r|` between each channel and its least-squares prediction from all
/// other channels.
///
/// The fits share one Gram matrix of the decimated rows, so the cost is
/// `O(channels² × samples)` plus one small pseudo-inverse per channel. A
/// rank-deficient design is solved in the minimum-norm sense; a zero or
/// non-finite design, or an undefined correlation, yields `1.0`.
pub fn predictability(decimated: &[Vec<f64>]) -> Vec<f64> {
    let n_channels = decimated.len();
    let n_samples = decimated.iter().map(Vec::len).min().unwrap_or(0);
    if n_channels < 2 || n_samples == 0 {
        return vec![0.0; n_channels];
    }

    let data = DMatrix::from_fn(n_channels, n_samples, |c, t| decimated[c][t]);
    let gram = &data * data.transpose();

    (0..n_channels)
        .map(|idx| {
            let others: Vec<usize> = (0..n_channels).filter(|&j| j != idx).collect();
            match fit_channel(&data, &gram, idx, &others) {
                Some(prediction) => match pearson(&decimated[idx][..n_samples], &prediction) {
                    Some(r) => 1.0 - r.abs(),
                    None => MAX_ANOMALY,
                },
                None => {
                    log::debug!("Regression for channel index {} is singular", idx);
                    MAX_ANOMALY
                }
            }
        })
        .collect()
}

fn fit_channel(
    data: &DMatrix<f64>,
    gram: &DMatrix<f64>,
    target: usize,
    regressors: &[usize],
) -> Option<Vec<f64>> {
    let xtx = gram.select_rows(regressors).select_columns(regressors);
    if !xtx.iter().all(|v| v.is_finite()) {
        return None;
    }
    let xty = DVector::from_iterator(regressors.len(), regressors.iter().map(|&j| gram[(j, target)]));

    let svd = xtx.svd(true, true);
    let largest = svd.singular_values.max();
    if !largest.is_finite() || largest <= 0.0 {
        return None;
    }
    let cutoff = largest * regressors.len() as f64 * f64::EPSILON;
    let coefs = svd.solve(&xty, cutoff).ok()?;
    if !coefs.iter().all(|v| v.is_finite()) {
        return None;
    }

    let x = data.select_rows(regressors);
    let prediction = x.transpose() * coefs;
    Some(prediction.iter().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    #[test]
    fn test_amplitude_is_log_ptp() {
        let rows = vec![vec![-1.0, 1.0], vec![0.0, 100.0]];
        let summary = amplitude(&rows);
        assert!((summary[0] - 2f64.log10()).abs() < 1e-12);
        assert!((summary[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_amplitude_flat_channel_is_finite() {
        let summary = amplitude(&[vec![0.0; 8]]);
        assert!(summary[0].is_finite());
    }

    #[test]
    fn test_correlation_constant_channel_is_maximal() {
        let base = sine(5.0, 100.0, 200);
        let rows = vec![base.clone(), base.clone(), vec![1.0; 200]];
        let summary = correlation(&rows);
        assert_eq!(summary[2], MAX_ANOMALY);
        assert!(summary[0] < 1e-9);
    }

    #[test]
    fn test_single_channel_has_no_reference() {
        let rows = vec![sine(5.0, 100.0, 100)];
        assert_eq!(correlation(&rows), vec![0.0]);
        assert_eq!(predictability(&rows), vec![0.0]);
    }

    #[test]
    fn test_spectral_ratio_prefers_high_frequency_channel() {
        let fs = 512.0;
        let low = sine(10.0, fs, 2048);
        let high = sine(80.0, fs, 2048);
        let lf = FrequencyBand::new(1.0, 40.0).unwrap();
        let hf = FrequencyBand::new(50.0, 125.0).unwrap();
        let summary = spectral_ratio(&[low, high], fs, &lf, &hf, None).unwrap();
        assert!(summary[1] > summary[0] + 2.0);
        assert!(summary.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_spectral_ratio_band_beyond_nyquist_is_finite() {
        let fs = 100.0;
        let lf = FrequencyBand::new(1.0, 40.0).unwrap();
        let hf = FrequencyBand::new(50.0, 125.0).unwrap();
        let summary = spectral_ratio(&[sine(10.0, fs, 400)], fs, &lf, &hf, None).unwrap();
        assert!(summary[0].is_finite());
    }

    #[test]
    fn test_predictability_linear_combination() {
        let n = 500;
        let a = sine(3.0, 100.0, n);
        let b = sine(7.0, 100.0, n);
        let c: Vec<f64> = a.iter().zip(&b).map(|(x, y)| 2.0 * x - 0.5 * y).collect();
        let summary = predictability(&[a, b, c]);
        assert!(summary[2] < 1e-9, "summary {:?}", summary);
    }

    #[test]
    fn test_predictability_all_zero_design_is_maximal() {
        let rows = vec![vec![0.0; 50], vec![0.0; 50], sine(3.0, 100.0, 50)];
        let summary = predictability(&rows);
        assert_eq!(summary[2], MAX_ANOMALY);
        assert!(summary.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_predictability_duplicate_regressors_do_not_fail() {
        let a = sine(3.0, 100.0, 300);
        let b = sine(11.0, 100.0, 300);
        let rows = vec![a.clone(), a.clone(), b];
        let summary = predictability(&rows);
        assert!(summary.iter().all(|v| v.is_finite()));
        assert!(summary[0] < 1e-9);
    }
}
