use crate::error::{FAAError, Result};
use crate::spectral::welch_psd;
use crate::types::{AsymmetryResult, FrequencyBand, MultichannelRecording};

/// Hz added on each side of the band before estimating the spectrum
pub const DEFAULT_GUARD_HZ: f64 = 2.0;

/// Band-restricted log-power difference between two channels
#[derive(Debug, Clone, Copy)]
pub struct AsymmetryCalculator {
    guard_hz: f64,
}

impl Default for AsymmetryCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_GUARD_HZ)
    }
}

impl AsymmetryCalculator {
    pub fn new(guard_hz: f64) -> Self {
        Self {
            guard_hz: guard_hz.max(0.0),
        }
    }

    pub fn guard_hz(&self) -> f64 {
        self.guard_hz
    }

    /// `log10(P_right) - log10(P_left)`, where `P` is the mean Welch power
    /// over the bins inside `band`.
    ///
    /// Fails with `MissingChannels` naming every absent channel, `EmptyBand`
    /// when no bin falls inside `band`, and `DegeneratePower` when a mean
    /// power is not positive.
    pub fn compute(
        &self,
        recording: &MultichannelRecording,
        left_channel: &str,
        right_channel: &str,
        band: FrequencyBand,
        segment_seconds: Option<f64>,
    ) -> Result<AsymmetryResult> {
        let missing: Vec<String> = [left_channel, right_channel]
            .iter()
            .filter(|name| recording.channel_index(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(FAAError::MissingChannels(missing));
        }

        let left = recording.channel_data(left_channel).unwrap_or(&[]);
        let right = recording.channel_data(right_channel).unwrap_or(&[]);

        let window = band.widened(self.guard_hz);
        let psd = welch_psd(
            &[left, right],
            recording.sampling_rate(),
            Some(window.low),
            Some(window.high),
            segment_seconds,
        )?;

        let (power_left, power_right) = match (
            psd.mean_band_power(0, &band),
            psd.mean_band_power(1, &band),
        ) {
            (Some(l), Some(r)) => (l, r),
            _ => {
                return Err(FAAError::EmptyBand {
                    low: band.low,
                    high: band.high,
                })
            }
        };

        let log_power_left = log_power(left_channel, power_left)?;
        let log_power_right = log_power(right_channel, power_right)?;
        let asymmetry = log_power_right - log_power_left;

        log::info!(
            "{}-Hz asymmetry {}/{}: {:.6}",
            band,
            right_channel,
            left_channel,
            asymmetry
        );

        Ok(AsymmetryResult {
            left_channel: left_channel.to_string(),
            right_channel: right_channel.to_string(),
            band,
            power_left,
            power_right,
            log_power_left,
            log_power_right,
            asymmetry,
        })
    }
}

fn log_power(channel: &str, power: f64) -> Result<f64> {
    if power > 0.0 && power.is_finite() {
        Ok(power.log10())
    } else {
        Err(FAAError::DegeneratePower(channel.to_string()))
    }
}
