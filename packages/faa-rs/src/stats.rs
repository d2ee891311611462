//! Robust statistics shared by the bad-channel criteria.

/// Floor substituted for a zero MAD
pub const MAD_FLOOR: f64 = 1e-12;

/// Rescales MAD to a consistent estimator of the standard deviation under normality
pub const MAD_SCALE: f64 = 1.4826;

/// Decimated channels keep at most about this many samples
pub const DECIMATION_TARGET: usize = 20_000;

/// Median of a slice. Returns 0.0 for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        sorted[mid - 1] / 2.0 + sorted[mid] / 2.0
    } else {
        sorted[mid]
    }
}

/// Median absolute deviation around the median
pub fn mad(values: &[f64]) -> f64 {
    let med = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    median(&deviations)
}

/// Robust z-scores: `(value - median) / (1.4826 * MAD)`.
///
/// A zero (or non-finite) MAD is replaced by [`MAD_FLOOR`], so constant input
/// yields all-zero scores. Scores that would overflow saturate at
/// `±f64::MAX`; finite input never produces NaN or infinity.
pub fn robust_zscore(values: &[f64]) -> Vec<f64> {
    let med = median(values);
    let mut spread = mad(values);
    if spread == 0.0 || !spread.is_finite() {
        spread = MAD_FLOOR;
    }
    let scale = MAD_SCALE * spread;

    values
        .iter()
        .map(|v| {
            let z = (v - med) / scale;
            if z.is_finite() {
                z
            } else if z.is_nan() {
                0.0
            } else {
                f64::MAX.copysign(z)
            }
        })
        .collect()
}

/// Pearson correlation; `None` when either side has zero variance or the
/// result is not finite
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }

    let nf = n as f64;
    let mean_x = x[..n].iter().sum::<f64>() / nf;
    let mean_y = y[..n].iter().sum::<f64>() / nf;

    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x[..n].iter().zip(&y[..n]) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }

    let r = sxy / (sxx.sqrt() * syy.sqrt());
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// `max - min`; 0.0 for an empty slice
pub fn peak_to_peak(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    max - min
}

/// `max(1, floor(n_samples / 20000))`
pub fn decimation_factor(n_samples: usize) -> usize {
    (n_samples / DECIMATION_TARGET).max(1)
}

/// Keep every `factor`-th sample of each row
pub fn decimate<R: AsRef<[f64]>>(rows: &[R], factor: usize) -> Vec<Vec<f64>> {
    let step = factor.max(1);
    rows.iter()
        .map(|row| row.as_ref().iter().step_by(step).copied().collect())
        .collect()
}

/// Sample-wise median across rows
pub fn median_across(rows: &[&[f64]]) -> Vec<f64> {
    let n = rows.iter().map(|r| r.len()).min().unwrap_or(0);
    let mut column = Vec::with_capacity(rows.len());
    (0..n)
        .map(|t| {
            column.clear();
            column.extend(rows.iter().map(|r| r[t]));
            median(&column)
        })
        .collect()
}

/// Trapezoidal integral of `y` over `x`; 0.0 with fewer than two points
pub fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    y.windows(2)
        .zip(x.windows(2))
        .map(|(yy, xx)| (xx[1] - xx[0]) * (yy[0] + yy[1]) / 2.0)
        .sum()
}
