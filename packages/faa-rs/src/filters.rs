//! Re-referencing and zero-phase IIR filtering.
//!
//! Filters are cascaded second-order sections (biquads) run forward and then
//! backward over an odd-reflected signal, so the net response has no phase
//! shift and squared magnitude.

use crate::error::{FAAError, Result};
use crate::types::MultichannelRecording;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Re-referencing applied to the signal channels before filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceMode {
    /// Subtract the sample-wise mean of all signal channels
    #[default]
    Average,
    /// Keep the recording reference
    None,
}

impl std::str::FromStr for ReferenceMode {
    type Err = FAAError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "average" => Ok(ReferenceMode::Average),
            "none" => Ok(ReferenceMode::None),
            other => Err(FAAError::InvalidParameter(format!(
                "Unknown reference mode: {} (expected average or none)",
                other
            ))),
        }
    }
}

/// Biquad coefficients, normalized so `a0 = 1`.
/// `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// Cascade of biquads
#[derive(Debug, Clone, Default)]
pub struct SosFilter {
    sections: Vec<BiquadCoeffs>,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadCoeffs>) -> Self {
        Self { sections }
    }

    pub fn sections(&self) -> &[BiquadCoeffs] {
        &self.sections
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Append another cascade after this one
    pub fn chain(mut self, other: SosFilter) -> Self {
        self.sections.extend(other.sections);
        self
    }

    /// Causal filtering in place, Direct Form II Transposed, zero initial state
    pub fn filter_in_place(&self, signal: &mut [f64]) {
        let zero = vec![(0.0, 0.0); self.sections.len()];
        self.run_sections(signal, &zero);
    }

    /// Per-section `(z1, z2)` state reached after a unit step has settled.
    /// Scaling it by the first sample starts the cascade as if that sample
    /// had been held forever, so a DC offset produces no transient.
    pub fn steady_state(&self) -> Vec<(f64, f64)> {
        let mut level = 1.0;
        self.sections
            .iter()
            .map(|c| {
                let den = 1.0 + c.a1 + c.a2;
                let dc_gain = if den.abs() > f64::EPSILON {
                    (c.b0 + c.b1 + c.b2) / den
                } else {
                    0.0
                };
                let y = level * dc_gain;
                let state = (y - c.b0 * level, c.b2 * level - c.a2 * y);
                level = y;
                state
            })
            .collect()
    }

    /// Causal filtering starting from the steady state of `signal[0]`
    pub fn filter_settled(&self, signal: &mut [f64]) {
        let Some(&x0) = signal.first() else {
            return;
        };
        let initial: Vec<(f64, f64)> = self
            .steady_state()
            .into_iter()
            .map(|(z1, z2)| (z1 * x0, z2 * x0))
            .collect();
        self.run_sections(signal, &initial);
    }

    fn run_sections(&self, signal: &mut [f64], initial: &[(f64, f64)]) {
        for (c, &(mut z1, mut z2)) in self.sections.iter().zip(initial) {
            for x in signal.iter_mut() {
                let input = *x;
                let output = c.b0 * input + z1;
                z1 = c.b1 * input - c.a1 * output + z2;
                z2 = c.b2 * input - c.a2 * output;
                *x = output;
            }
        }
    }

    /// Forward-backward filtering with odd-reflection padding at both ends.
    /// Each pass starts from the steady state of its first sample.
    pub fn filtfilt(&self, signal: &mut [f64]) {
        let n = signal.len();
        if n < 2 || self.sections.is_empty() {
            return;
        }

        let pad = (3 * (2 * self.sections.len() + 1)).min(n - 1);
        let first = signal[0];
        let last = signal[n - 1];

        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        ext.extend_from_slice(signal);
        ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));

        self.filter_settled(&mut ext);
        ext.reverse();
        self.filter_settled(&mut ext);
        ext.reverse();

        signal.copy_from_slice(&ext[pad..pad + n]);
    }
}

/// Butterworth designs via the bilinear transform
pub struct ButterworthFilter;

impl ButterworthFilter {
    pub fn lowpass(cutoff: f64, sample_rate: f64, order: usize) -> SosFilter {
        let k = Self::prewarp(cutoff, sample_rate);
        SosFilter::new(Self::sections(order, |damping| {
            if let Some(b) = damping {
                let a0 = 1.0 + b * k + k * k;
                BiquadCoeffs {
                    b0: k * k / a0,
                    b1: 2.0 * k * k / a0,
                    b2: k * k / a0,
                    a1: 2.0 * (k * k - 1.0) / a0,
                    a2: (1.0 - b * k + k * k) / a0,
                }
            } else {
                BiquadCoeffs {
                    b0: k / (1.0 + k),
                    b1: k / (1.0 + k),
                    b2: 0.0,
                    a1: (k - 1.0) / (k + 1.0),
                    a2: 0.0,
                }
            }
        }))
    }

    pub fn highpass(cutoff: f64, sample_rate: f64, order: usize) -> SosFilter {
        let k = Self::prewarp(cutoff, sample_rate);
        SosFilter::new(Self::sections(order, |damping| {
            if let Some(b) = damping {
                let a0 = 1.0 + b * k + k * k;
                BiquadCoeffs {
                    b0: 1.0 / a0,
                    b1: -2.0 / a0,
                    b2: 1.0 / a0,
                    a1: 2.0 * (k * k - 1.0) / a0,
                    a2: (1.0 - b * k + k * k) / a0,
                }
            } else {
                BiquadCoeffs {
                    b0: 1.0 / (1.0 + k),
                    b1: -1.0 / (1.0 + k),
                    b2: 0.0,
                    a1: (k - 1.0) / (k + 1.0),
                    a2: 0.0,
                }
            }
        }))
    }

    /// High-pass cascaded with low-pass
    pub fn bandpass(low: f64, high: f64, sample_rate: f64, order: usize) -> SosFilter {
        Self::highpass(low, sample_rate, order).chain(Self::lowpass(high, sample_rate, order))
    }

    fn prewarp(freq: f64, sample_rate: f64) -> f64 {
        (PI * freq / sample_rate).tan()
    }

    /// One section per conjugate pole pair; `None` marks the real pole of an
    /// odd order
    fn sections(order: usize, design: impl Fn(Option<f64>) -> BiquadCoeffs) -> Vec<BiquadCoeffs> {
        let order = order.max(1);
        let mut sections: Vec<BiquadCoeffs> = (0..order / 2)
            .map(|k| {
                let theta = PI * (2 * k + 1) as f64 / (2 * order) as f64;
                design(Some(2.0 * theta.sin()))
            })
            .collect();
        if order % 2 == 1 {
            sections.push(design(None));
        }
        sections
    }
}

/// Second-order IIR band-reject filter
pub struct NotchFilter;

impl NotchFilter {
    /// `q_factor`: center frequency over -3 dB bandwidth
    pub fn design(center_freq: f64, sample_rate: f64, q_factor: f64) -> SosFilter {
        let w0 = 2.0 * PI * center_freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q_factor);
        let a0 = 1.0 + alpha;

        SosFilter::new(vec![BiquadCoeffs {
            b0: 1.0 / a0,
            b1: -2.0 * cos_w0 / a0,
            b2: 1.0 / a0,
            a1: -2.0 * cos_w0 / a0,
            a2: (1.0 - alpha) / a0,
        }])
    }
}

/// Band-pass and notch settings for [`apply_filters`]
#[derive(Debug, Clone, PartialEq)]
pub struct FilterSettings {
    /// High-pass cutoff; 0 disables the high-pass side
    pub l_freq: f64,
    pub h_freq: f64,
    pub order: usize,
    pub notch_freqs: Vec<f64>,
    pub notch_q: f64,
}

/// Subtract the sample-wise mean of the signal channels from each of them.
/// Other channels are left untouched.
pub fn average_reference(recording: &mut MultichannelRecording) {
    let indices = recording.signal_indices();
    if indices.is_empty() {
        return;
    }

    let n = recording.n_samples();
    let mut mean = vec![0.0; n];
    for row in recording.rows(&indices) {
        for (m, x) in mean.iter_mut().zip(row) {
            *m += x;
        }
    }
    let count = indices.len() as f64;
    mean.iter_mut().for_each(|m| *m /= count);

    for idx in indices {
        for (x, m) in recording.row_mut(idx).iter_mut().zip(&mean) {
            *x -= m;
        }
    }
}

/// Zero-phase band-pass, then notches, over every signal channel.
///
/// A low-pass cutoff at or above Nyquist is an error. Notch frequencies at
/// or above Nyquist are skipped; each skip is returned as a warning.
pub fn apply_filters(
    recording: &mut MultichannelRecording,
    settings: &FilterSettings,
) -> Result<Vec<String>> {
    let fs = recording.sampling_rate();
    let nyquist = fs / 2.0;
    let mut warnings = Vec::new();

    if settings.h_freq >= nyquist {
        return Err(FAAError::InvalidParameter(format!(
            "High cutoff ({} Hz) must be less than Nyquist ({} Hz)",
            settings.h_freq, nyquist
        )));
    }
    if settings.l_freq < 0.0 || settings.l_freq >= settings.h_freq {
        return Err(FAAError::InvalidParameter(format!(
            "Low cutoff ({} Hz) must be in [0, {}) Hz",
            settings.l_freq, settings.h_freq
        )));
    }

    let mut filter = if settings.l_freq > 0.0 {
        ButterworthFilter::bandpass(settings.l_freq, settings.h_freq, fs, settings.order)
    } else {
        ButterworthFilter::lowpass(settings.h_freq, fs, settings.order)
    };

    for &freq in &settings.notch_freqs {
        if freq >= nyquist {
            let msg = format!(
                "Skipping {} Hz notch: at or above Nyquist ({} Hz)",
                freq, nyquist
            );
            log::warn!("{}", msg);
            warnings.push(msg);
            continue;
        }
        filter = filter.chain(NotchFilter::design(freq, fs, settings.notch_q));
    }

    let indices = recording.signal_indices();
    log::debug!(
        "Filtering {} signal channels: {}-{} Hz, {} sections",
        indices.len(),
        settings.l_freq,
        settings.h_freq,
        filter.sections().len()
    );
    for idx in indices {
        filter.filtfilt(recording.row_mut(idx));
    }

    Ok(warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelDescriptor, ChannelRole};

    fn sine(freq: f64, fs: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| (2.0 * PI * freq * i as f64 / fs).sin()).collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    /// Magnitude response at `freq` from the section coefficients
    fn gain_at(filter: &SosFilter, freq: f64, fs: f64) -> f64 {
        let w = 2.0 * PI * freq / fs;
        filter
            .sections()
            .iter()
            .map(|c| {
                let (c1, s1, c2, s2) = (w.cos(), w.sin(), (2.0 * w).cos(), (2.0 * w).sin());
                let num_re = c.b0 + c.b1 * c1 + c.b2 * c2;
                let num_im = -(c.b1 * s1 + c.b2 * s2);
                let den_re = 1.0 + c.a1 * c1 + c.a2 * c2;
                let den_im = -(c.a1 * s1 + c.a2 * s2);
                ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
            })
            .product()
    }

    #[test]
    fn test_butterworth_half_power_at_cutoff() {
        let fs = 250.0;
        for order in [1, 2, 3, 4] {
            let lp = ButterworthFilter::lowpass(40.0, fs, order);
            assert!((gain_at(&lp, 40.0, fs) - 0.5f64.sqrt()).abs() < 1e-9);
            assert!((gain_at(&lp, 0.0, fs) - 1.0).abs() < 1e-9);

            let hp = ButterworthFilter::highpass(1.0, fs, order);
            assert!((gain_at(&hp, 1.0, fs) - 0.5f64.sqrt()).abs() < 1e-9);
            assert!(gain_at(&hp, 0.0, fs) < 1e-9);
        }
    }

    #[test]
    fn test_notch_zero_at_center() {
        let filter = NotchFilter::design(50.0, 1000.0, 30.0);
        assert!(gain_at(&filter, 50.0, 1000.0) < 1e-9);
        assert!((gain_at(&filter, 10.0, 1000.0) - 1.0).abs() < 1e-2);
    }

    #[test]
    fn test_filtfilt_passes_band_and_rejects_line_noise() {
        let fs = 500.0;
        let n = 5000;
        let alpha = sine(10.0, fs, n);
        let mut mixed: Vec<f64> = alpha
            .iter()
            .zip(sine(50.0, fs, n))
            .map(|(a, b)| a + b)
            .collect();

        let filter = ButterworthFilter::bandpass(1.0, 40.0, fs, 4).chain(NotchFilter::design(50.0, fs, 30.0));
        filter.filtfilt(&mut mixed);

        let core = 500..4500;
        let residual: Vec<f64> = mixed[core.clone()]
            .iter()
            .zip(&alpha[core])
            .map(|(y, a)| y - a)
            .collect();
        assert!(rms(&residual) < 0.05, "residual rms {}", rms(&residual));
    }

    #[test]
    fn test_filtfilt_short_signals() {
        let filter = ButterworthFilter::lowpass(10.0, 100.0, 4);
        let mut one = vec![1.0];
        filter.filtfilt(&mut one);
        assert_eq!(one, vec![1.0]);

        let mut three = vec![1.0, 2.0, 3.0];
        filter.filtfilt(&mut three);
        assert!(three.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_filtfilt_removes_dc_offset_without_edge_transient() {
        // 27 samples per period, both ends on a zero crossing
        let fs = 270.0;
        let n = 2701;
        let alpha = sine(10.0, fs, n);
        let mut shifted: Vec<f64> = alpha.iter().map(|a| a + 2000.0).collect();

        let filter = ButterworthFilter::bandpass(1.0, 40.0, fs, 4);
        filter.filtfilt(&mut shifted);

        let ptp = |x: &[f64]| {
            x.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
                - x.iter().cloned().fold(f64::INFINITY, f64::min)
        };
        let whole = ptp(&shifted);
        let middle = ptp(&shifted[n / 4..3 * n / 4]);
        assert!(whole < 1.5 * middle, "whole {} middle {}", whole, middle);
        assert!(shifted.iter().all(|v| v.abs() < 2.0));
    }

    #[test]
    fn test_steady_state_holds_constant_input() {
        let filter = ButterworthFilter::lowpass(10.0, 100.0, 3).chain(NotchFilter::design(25.0, 100.0, 30.0));
        let mut constant = vec![5.0; 64];
        filter.filter_settled(&mut constant);
        assert!(constant.iter().all(|v| (v - 5.0).abs() < 1e-9));

        let mut zero_started = vec![5.0; 64];
        filter.filter_in_place(&mut zero_started);
        assert!((zero_started[0] - 5.0).abs() > 1.0);
    }

    #[test]
    fn test_average_reference_skips_other_roles() {
        let channels = vec![
            ChannelDescriptor::signal("A"),
            ChannelDescriptor::signal("B"),
            ChannelDescriptor::new("Status", ChannelRole::Auxiliary),
        ];
        let data = vec![vec![1.0, 2.0], vec![3.0, 6.0], vec![5.0, 5.0]];
        let mut rec = MultichannelRecording::new(channels, data, 10.0).unwrap();
        average_reference(&mut rec);

        assert_eq!(rec.data()[0], vec![-1.0, -2.0]);
        assert_eq!(rec.data()[1], vec![1.0, 2.0]);
        assert_eq!(rec.data()[2], vec![5.0, 5.0]);
    }

    #[test]
    fn test_apply_filters_validation_and_notch_skip() {
        let channels = vec![ChannelDescriptor::signal("A")];
        let mut rec = MultichannelRecording::new(channels, vec![sine(10.0, 200.0, 400)], 200.0).unwrap();

        let mut settings = FilterSettings {
            l_freq: 1.0,
            h_freq: 40.0,
            order: 4,
            notch_freqs: vec![50.0, 100.0],
            notch_q: 30.0,
        };
        let warnings = apply_filters(&mut rec, &settings).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("100"));

        settings.h_freq = 120.0;
        assert!(matches!(
            apply_filters(&mut rec, &settings),
            Err(FAAError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_reference_mode_parsing() {
        assert_eq!("Average".parse::<ReferenceMode>().unwrap(), ReferenceMode::Average);
        assert_eq!("none".parse::<ReferenceMode>().unwrap(), ReferenceMode::None);
        assert!("rest".parse::<ReferenceMode>().is_err());
    }
}
