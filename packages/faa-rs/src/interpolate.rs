//! Spherical-spline interpolation of bad channels (Perrin et al., 1989).

use crate::error::{FAAError, Result};
use crate::types::MultichannelRecording;
use nalgebra::DMatrix;
use serde::Serialize;
use std::f64::consts::PI;

const LEGENDRE_TERMS: usize = 7;
const STIFFNESS: i32 = 4;
/// Ridge added to the diagonal of the source Gram matrix
const REGULARIZATION: f64 = 1e-5;
const MIN_GOOD_CHANNELS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InterpolationSummary {
    pub interpolated: Vec<String>,
    pub n_sources: usize,
}

/// `g(x) = Σ (2n+1) / (n^m (n+1)^m 4π) · P_n(x)` for `n = 1..=7`
fn spline_g(cos_angle: f64) -> f64 {
    let x = cos_angle.clamp(-1.0, 1.0);
    let (mut p_prev, mut p) = (1.0, x);
    let mut total = 0.0;

    for n in 1..=LEGENDRE_TERMS {
        let nf = n as f64;
        let weight = (2.0 * nf + 1.0) / (nf.powi(STIFFNESS) * (nf + 1.0).powi(STIFFNESS) * 4.0 * PI);
        total += weight * p;

        // (n+1) P_{n+1} = (2n+1) x P_n - n P_{n-1}
        let p_next = ((2.0 * nf + 1.0) * x * p - nf * p_prev) / (nf + 1.0);
        p_prev = p;
        p = p_next;
    }
    total
}

fn unit(v: [f64; 3]) -> [f64; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm > 0.0 {
        [v[0] / norm, v[1] / norm, v[2] / norm]
    } else {
        v
    }
}

fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// `[targets × sources]` weights mapping good-channel samples to the targets
pub fn interpolation_matrix(sources: &[[f64; 3]], targets: &[[f64; 3]]) -> Result<DMatrix<f64>> {
    let sources: Vec<[f64; 3]> = sources.iter().copied().map(unit).collect();
    let targets: Vec<[f64; 3]> = targets.iter().copied().map(unit).collect();
    let n = sources.len();
    let m = targets.len();

    let mut system = DMatrix::<f64>::zeros(n + 1, n + 1);
    for i in 0..n {
        for j in 0..n {
            system[(i, j)] = spline_g(dot(&sources[i], &sources[j]));
        }
        system[(i, i)] += REGULARIZATION;
        system[(i, n)] = 1.0;
        system[(n, i)] = 1.0;
    }

    let inverse = system
        .pseudo_inverse(1e-12)
        .map_err(|e| FAAError::Interpolation(e.to_string()))?;

    let mut g_to = DMatrix::<f64>::zeros(m, n + 1);
    for (i, target) in targets.iter().enumerate() {
        for (j, source) in sources.iter().enumerate() {
            g_to[(i, j)] = spline_g(dot(target, source));
        }
        g_to[(i, n)] = 1.0;
    }

    let weights = g_to * inverse.columns(0, n);
    if weights.iter().any(|w| !w.is_finite()) {
        return Err(FAAError::Interpolation(
            "Interpolation weights are not finite".to_string(),
        ));
    }
    Ok(weights)
}

/// Replace every bad signal channel with a spline estimate from the good,
/// positioned signal channels. The bad set itself is left unchanged.
pub fn interpolate_bads(recording: &mut MultichannelRecording) -> Result<InterpolationSummary> {
    let bad: Vec<String> = recording
        .bad_signal_channels()
        .into_iter()
        .map(str::to_string)
        .collect();
    if bad.is_empty() {
        return Ok(InterpolationSummary::default());
    }

    let mut targets = Vec::with_capacity(bad.len());
    let mut target_idx = Vec::with_capacity(bad.len());
    for name in &bad {
        let idx = recording
            .channel_index(name)
            .ok_or_else(|| FAAError::MissingChannels(vec![name.clone()]))?;
        let pos = recording.channels()[idx]
            .position
            .filter(|p| p.iter().all(|v| v.is_finite()))
            .ok_or_else(|| {
                FAAError::Interpolation(format!("Bad channel {} has no sensor position", name))
            })?;
        targets.push(pos);
        target_idx.push(idx);
    }

    let (source_idx, sources): (Vec<usize>, Vec<[f64; 3]>) = recording
        .signal_indices()
        .into_iter()
        .filter(|&i| !recording.bad.contains(&recording.channels()[i].name))
        .filter_map(|i| {
            recording.channels()[i]
                .position
                .filter(|p| p.iter().all(|v| v.is_finite()))
                .map(|p| (i, p))
        })
        .unzip();

    if sources.len() < MIN_GOOD_CHANNELS {
        return Err(FAAError::Interpolation(format!(
            "Need at least {} good channels with positions, found {}",
            MIN_GOOD_CHANNELS,
            sources.len()
        )));
    }

    let weights = interpolation_matrix(&sources, &targets)?;

    let n_samples = recording.n_samples();
    let estimates: Vec<Vec<f64>> = (0..target_idx.len())
        .map(|t| {
            let mut out = vec![0.0; n_samples];
            for (s, &src) in source_idx.iter().enumerate() {
                let w = weights[(t, s)];
                for (o, x) in out.iter_mut().zip(&recording.data()[src]) {
                    *o += w * x;
                }
            }
            out
        })
        .collect();

    for (idx, estimate) in target_idx.iter().zip(estimates) {
        recording.row_mut(*idx).copy_from_slice(&estimate);
    }

    log::info!(
        "Interpolated {} bad channels from {} sources: {}",
        bad.len(),
        sources.len(),
        bad.join(", ")
    );

    Ok(InterpolationSummary {
        interpolated: bad,
        n_sources: sources.len(),
    })
}
