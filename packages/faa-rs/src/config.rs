//! Pipeline configuration
//!
//! One structure covers every stage so the single-file and batch entry points
//! share defaults. All fields deserialize with defaults, so a JSON file only
//! needs the values it overrides.

use crate::asymmetry::DEFAULT_GUARD_HZ;
use crate::detector::{DetectionBands, DetectionMethod, DetectionThresholds};
use crate::error::{FAAError, Result};
use crate::filters::ReferenceMode;
use crate::types::FrequencyBand;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const TRAINING_CHANNELS: [&str; 2] = ["[T1] EEG Trainin", "[T2] EEG Trainin"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Built-in electrode layout name
    #[serde(default = "default_montage")]
    pub montage: String,

    #[serde(default)]
    pub reference: ReferenceMode,

    /// High-pass cutoff (Hz)
    #[serde(default = "default_l_freq")]
    pub l_freq: f64,

    /// Low-pass cutoff (Hz)
    #[serde(default = "default_h_freq")]
    pub h_freq: f64,

    /// Butterworth order for each side of the band-pass
    #[serde(default = "default_filter_order")]
    pub filter_order: usize,

    #[serde(default = "default_notch_freqs")]
    pub notch_freqs: Vec<f64>,

    #[serde(default = "default_notch_q")]
    pub notch_q: f64,

    #[serde(default)]
    pub detection_method: DetectionMethod,

    #[serde(default)]
    pub thresholds: DetectionThresholds,

    #[serde(default)]
    pub detection_bands: DetectionBands,

    /// z-score threshold of the legacy peak-to-peak detector
    #[serde(default = "default_ptp_threshold")]
    pub ptp_threshold: f64,

    /// Interpolate bad channels after detection
    #[serde(default = "default_true")]
    pub interpolate: bool,

    #[serde(default = "default_left_channel")]
    pub left_channel: String,

    #[serde(default = "default_right_channel")]
    pub right_channel: String,

    #[serde(default = "default_asymmetry_band")]
    pub asymmetry_band: FrequencyBand,

    #[serde(default = "default_guard_hz")]
    pub band_guard_hz: f64,

    /// Welch segment length in seconds; whole signal when unset
    #[serde(default)]
    pub segment_seconds: Option<f64>,

    #[serde(default = "default_auxiliary_channels")]
    pub auxiliary_channels: Vec<String>,

    #[serde(default = "default_excluded_channels")]
    pub excluded_channels: Vec<String>,
}

fn default_montage() -> String {
    "standard_1020".to_string()
}
fn default_l_freq() -> f64 {
    1.0
}
fn default_h_freq() -> f64 {
    40.0
}
fn default_filter_order() -> usize {
    4
}
fn default_notch_freqs() -> Vec<f64> {
    vec![50.0, 100.0]
}
fn default_notch_q() -> f64 {
    30.0
}
fn default_ptp_threshold() -> f64 {
    5.0
}
fn default_true() -> bool {
    true
}
fn default_left_channel() -> String {
    "F3".to_string()
}
fn default_right_channel() -> String {
    "F4".to_string()
}
fn default_asymmetry_band() -> FrequencyBand {
    FrequencyBand { low: 8.0, high: 13.0 }
}
fn default_guard_hz() -> f64 {
    DEFAULT_GUARD_HZ
}
fn default_auxiliary_channels() -> Vec<String> {
    vec!["Status".to_string()]
}
fn default_excluded_channels() -> Vec<String> {
    TRAINING_CHANNELS.iter().map(|s| s.to_string()).collect()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            montage: default_montage(),
            reference: ReferenceMode::default(),
            l_freq: default_l_freq(),
            h_freq: default_h_freq(),
            filter_order: default_filter_order(),
            notch_freqs: default_notch_freqs(),
            notch_q: default_notch_q(),
            detection_method: DetectionMethod::default(),
            thresholds: DetectionThresholds::default(),
            detection_bands: DetectionBands::default(),
            ptp_threshold: default_ptp_threshold(),
            interpolate: true,
            left_channel: default_left_channel(),
            right_channel: default_right_channel(),
            asymmetry_band: default_asymmetry_band(),
            band_guard_hz: default_guard_hz(),
            segment_seconds: None,
            auxiliary_channels: default_auxiliary_channels(),
            excluded_channels: default_excluded_channels(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FAAError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        for (name, value) in [
            ("amp", t.amp),
            ("corr", t.corr),
            ("hf", t.hf),
            ("ransac", t.ransac),
            ("ptp", self.ptp_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(FAAError::InvalidParameter(format!(
                    "Threshold {} must be positive, got {}",
                    name, value
                )));
            }
        }

        for (name, band) in [
            ("detection lf", self.detection_bands.lf),
            ("detection hf", self.detection_bands.hf),
            ("asymmetry", self.asymmetry_band),
        ] {
            FrequencyBand::new(band.low, band.high).map_err(|_| {
                FAAError::InvalidParameter(format!(
                    "Invalid {} band {}-{} Hz",
                    name, band.low, band.high
                ))
            })?;
        }

        if !(self.l_freq >= 0.0 && self.l_freq < self.h_freq) {
            return Err(FAAError::InvalidParameter(format!(
                "Filter band must satisfy 0 <= l_freq < h_freq, got {}-{} Hz",
                self.l_freq, self.h_freq
            )));
        }

        if self.filter_order == 0 || self.filter_order > 8 {
            return Err(FAAError::InvalidParameter(format!(
                "Filter order must be between 1 and 8, got {}",
                self.filter_order
            )));
        }

        if let Some(f) = self.notch_freqs.iter().find(|f| !f.is_finite() || **f <= 0.0) {
            return Err(FAAError::InvalidParameter(format!(
                "Notch frequency must be positive, got {}",
                f
            )));
        }

        if !self.notch_q.is_finite() || self.notch_q <= 0.0 {
            return Err(FAAError::InvalidParameter(format!(
                "Notch Q must be positive, got {}",
                self.notch_q
            )));
        }

        if let Some(secs) = self.segment_seconds {
            if !secs.is_finite() || secs <= 0.0 {
                return Err(FAAError::InvalidParameter(format!(
                    "Segment length must be positive, got {} s",
                    secs
                )));
            }
        }

        if !self.band_guard_hz.is_finite() || self.band_guard_hz < 0.0 {
            return Err(FAAError::InvalidParameter(format!(
                "Band guard must be non-negative, got {} Hz",
                self.band_guard_hz
            )));
        }

        if self.left_channel.is_empty() || self.right_channel.is_empty() {
            return Err(FAAError::InvalidParameter(
                "Asymmetry channel names must not be empty".to_string(),
            ));
        }
        if self.left_channel == self.right_channel {
            return Err(FAAError::InvalidParameter(format!(
                "Left and right channels must differ, both are {}",
                self.left_channel
            )));
        }

        crate::montage::Montage::by_name(&self.montage)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.asymmetry_band.to_string(), "8-13");
        assert_eq!(config.excluded_channels.len(), 2);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"left_channel": "F7", "right_channel": "F8", "reference": "none"}"#)
                .unwrap();
        assert_eq!(config.left_channel, "F7");
        assert_eq!(config.reference, ReferenceMode::None);
        assert_eq!(config.notch_freqs, vec![50.0, 100.0]);
        assert_eq!(config.thresholds, DetectionThresholds::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.thresholds.corr = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.right_channel = "F3".to_string();
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.asymmetry_band = FrequencyBand { low: 13.0, high: 8.0 };
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.segment_seconds = Some(0.0);
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.montage = "biosemi512".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"thresholds": {{"amp": 3.5}}, "segment_seconds": 2.0}}"#).unwrap();
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.thresholds.amp, 3.5);
        assert_eq!(config.thresholds.hf, 5.0);
        assert_eq!(config.segment_seconds, Some(2.0));

        let missing = PipelineConfig::from_json_file(Path::new("/nonexistent/config.json"));
        assert!(matches!(missing, Err(FAAError::FileNotFound(_))));
    }
}
