//! Welch power spectral density estimation.
//!
//! Each channel is split into Hamming-windowed segments with 50% overlap,
//! every segment is mean-detrended, and the squared-magnitude spectra are
//! averaged. Output is a one-sided density in units²/Hz. Without a segment
//! length the whole signal forms a single segment (a windowed periodogram).

use crate::error::{FAAError, Result};
use crate::types::FrequencyBand;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

/// Fraction of a segment shared with the next one
pub const SEGMENT_OVERLAP: f64 = 0.5;

/// Power spectrum for a set of channels on a shared frequency axis
#[derive(Debug, Clone, PartialEq)]
pub struct PowerSpectrum {
    /// `[channels × bins]`
    pub power: Vec<Vec<f64>>,
    /// Ascending, uniformly spaced
    pub freqs: Vec<f64>,
}

impl PowerSpectrum {
    pub fn n_bins(&self) -> usize {
        self.freqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.freqs.is_empty()
    }

    /// Indices of bins whose frequency lies inside `band`
    pub fn band_indices(&self, band: &FrequencyBand) -> Vec<usize> {
        self.freqs
            .iter()
            .enumerate()
            .filter(|(_, f)| band.contains(**f))
            .map(|(i, _)| i)
            .collect()
    }

    /// Mean power of one channel over the bins inside `band`; `None` if the
    /// band selects no bins
    pub fn mean_band_power(&self, channel: usize, band: &FrequencyBand) -> Option<f64> {
        let idx = self.band_indices(band);
        if idx.is_empty() {
            return None;
        }
        let row = &self.power[channel];
        Some(idx.iter().map(|&i| row[i]).sum::<f64>() / idx.len() as f64)
    }

    /// Trapezoidal integral of one channel's power over `band`
    pub fn integrate_band(&self, channel: usize, band: &FrequencyBand) -> f64 {
        let idx = self.band_indices(band);
        let freqs: Vec<f64> = idx.iter().map(|&i| self.freqs[i]).collect();
        let power: Vec<f64> = idx.iter().map(|&i| self.power[channel][i]).collect();
        crate::stats::trapezoid(&power, &freqs)
    }
}

/// Segment length in samples for an optional duration, clamped to `[1, n_samples]`
pub fn segment_length(n_samples: usize, sampling_rate: f64, segment_seconds: Option<f64>) -> usize {
    let requested = match segment_seconds {
        Some(secs) => (secs * sampling_rate).round() as usize,
        None => n_samples,
    };
    requested.clamp(1, n_samples.max(1))
}

/// Periodic Hamming window
fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / n as f64).cos())
        .collect()
}

/// Welch PSD of every row in `signal`.
///
/// `fmin`/`fmax` restrict the returned frequency axis (inclusive). A range
/// outside `[0, Nyquist]` yields a spectrum with zero bins rather than an
/// error; callers decide whether an empty axis is acceptable.
pub fn welch_psd<R: AsRef<[f64]>>(
    signal: &[R],
    sampling_rate: f64,
    fmin: Option<f64>,
    fmax: Option<f64>,
    segment_seconds: Option<f64>,
) -> Result<PowerSpectrum> {
    if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
        return Err(FAAError::InvalidParameter(format!(
            "Sampling rate must be positive, got {}",
            sampling_rate
        )));
    }
    if let Some(secs) = segment_seconds {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(FAAError::InvalidParameter(format!(
                "Segment length must be positive, got {} s",
                secs
            )));
        }
    }

    let n_samples = signal.iter().map(|r| r.as_ref().len()).min().unwrap_or(0);
    if n_samples == 0 {
        return Ok(PowerSpectrum {
            power: vec![Vec::new(); signal.len()],
            freqs: Vec::new(),
        });
    }

    let nperseg = segment_length(n_samples, sampling_rate, segment_seconds);
    let step = ((nperseg as f64 * (1.0 - SEGMENT_OVERLAP)).floor() as usize).max(1);
    let n_segments = (n_samples - nperseg) / step + 1;

    let window = hamming(nperseg);
    let window_power: f64 = window.iter().map(|w| w * w).sum();
    let scale = 1.0 / (sampling_rate * window_power);

    let n_bins = nperseg / 2 + 1;
    let lo = fmin.unwrap_or(f64::NEG_INFINITY);
    let hi = fmax.unwrap_or(f64::INFINITY);
    let keep: Vec<usize> = (0..n_bins)
        .filter(|&k| {
            let f = k as f64 * sampling_rate / nperseg as f64;
            f >= lo && f <= hi
        })
        .collect();
    let freqs: Vec<f64> = keep
        .iter()
        .map(|&k| k as f64 * sampling_rate / nperseg as f64)
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(nperseg);
    let mut buffer = vec![Complex::new(0.0, 0.0); nperseg];

    let power = signal
        .iter()
        .map(|row| {
            let row = row.as_ref();
            let mut accum = vec![0.0; n_bins];

            for seg in 0..n_segments {
                let start = seg * step;
                let segment = &row[start..start + nperseg];
                let mean = segment.iter().sum::<f64>() / nperseg as f64;

                for ((slot, &x), &w) in buffer.iter_mut().zip(segment).zip(&window) {
                    *slot = Complex::new((x - mean) * w, 0.0);
                }
                fft.process(&mut buffer);

                for (k, acc) in accum.iter_mut().enumerate() {
                    *acc += buffer[k].norm_sqr();
                }
            }

            keep.iter()
                .map(|&k| {
                    // One-sided: fold negative frequencies except DC and Nyquist
                    let fold = if k == 0 || (nperseg % 2 == 0 && k == nperseg / 2) {
                        1.0
                    } else {
                        2.0
                    };
                    fold * scale * accum[k] / n_segments as f64
                })
                .collect()
        })
        .collect();

    Ok(PowerSpectrum { power, freqs })
}
