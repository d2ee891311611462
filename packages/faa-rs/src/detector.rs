use crate::criteria;
use crate::error::{FAAError, Result};
use crate::stats::{decimate, decimation_factor, peak_to_peak, robust_zscore};
use crate::types::{FrequencyBand, MultichannelRecording};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

fn default_threshold() -> f64 {
    5.0
}

fn default_lf_band() -> FrequencyBand {
    FrequencyBand { low: 1.0, high: 40.0 }
}

fn default_hf_band() -> FrequencyBand {
    FrequencyBand { low: 50.0, high: 125.0 }
}

/// Robust z-score thresholds, one per criterion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionThresholds {
    #[serde(default = "default_threshold")]
    pub amp: f64,
    #[serde(default = "default_threshold")]
    pub corr: f64,
    #[serde(default = "default_threshold")]
    pub hf: f64,
    #[serde(default = "default_threshold")]
    pub ransac: f64,
}

impl Default for DetectionThresholds {
    fn default() -> Self {
        Self {
            amp: default_threshold(),
            corr: default_threshold(),
            hf: default_threshold(),
            ransac: default_threshold(),
        }
    }
}

/// Bands compared by the spectral-ratio criterion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionBands {
    #[serde(default = "default_lf_band")]
    pub lf: FrequencyBand,
    #[serde(default = "default_hf_band")]
    pub hf: FrequencyBand,
}

impl Default for DetectionBands {
    fn default() -> Self {
        Self {
            lf: default_lf_band(),
            hf: default_hf_band(),
        }
    }
}

/// Bad-channel detection strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Four-criterion robust detector
    #[default]
    Prep,
    /// Peak-to-peak amplitude only
    Ptp,
}

impl std::str::FromStr for DetectionMethod {
    type Err = FAAError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "prep" => Ok(DetectionMethod::Prep),
            "ptp" => Ok(DetectionMethod::Ptp),
            other => Err(FAAError::InvalidParameter(format!(
                "Unknown detection method: {} (expected prep or ptp)",
                other
            ))),
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionMethod::Prep => write!(f, "prep"),
            DetectionMethod::Ptp => write!(f, "ptp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Amplitude,
    Correlation,
    SpectralRatio,
    Predictability,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Amplitude,
        Criterion::Correlation,
        Criterion::SpectralRatio,
        Criterion::Predictability,
    ];
}

/// One float per criterion
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CriterionScores {
    pub amplitude: f64,
    pub correlation: f64,
    pub spectral_ratio: f64,
    pub predictability: f64,
}

impl CriterionScores {
    pub fn get(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Amplitude => self.amplitude,
            Criterion::Correlation => self.correlation,
            Criterion::SpectralRatio => self.spectral_ratio,
            Criterion::Predictability => self.predictability,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CriterionFlags {
    pub amplitude: bool,
    pub correlation: bool,
    pub spectral_ratio: bool,
    pub predictability: bool,
}

impl CriterionFlags {
    pub fn get(&self, criterion: Criterion) -> bool {
        match criterion {
            Criterion::Amplitude => self.amplitude,
            Criterion::Correlation => self.correlation,
            Criterion::SpectralRatio => self.spectral_ratio,
            Criterion::Predictability => self.predictability,
        }
    }

    pub fn any(&self) -> bool {
        self.amplitude || self.correlation || self.spectral_ratio || self.predictability
    }
}

/// Number of channels flagged by each criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CriterionCounts {
    pub amplitude: usize,
    pub correlation: usize,
    pub spectral_ratio: usize,
    pub predictability: usize,
}

impl CriterionCounts {
    pub fn get(&self, criterion: Criterion) -> usize {
        match criterion {
            Criterion::Amplitude => self.amplitude,
            Criterion::Correlation => self.correlation,
            Criterion::SpectralRatio => self.spectral_ratio,
            Criterion::Predictability => self.predictability,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelQuality {
    pub name: String,
    /// Summary statistic before z-scoring
    pub raw: CriterionScores,
    pub z_scores: CriterionScores,
    pub flags: CriterionFlags,
}

/// Result of one detection run. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelQualityReport {
    channels: Vec<ChannelQuality>,
    bad: Vec<String>,
    counts: CriterionCounts,
}

impl ChannelQualityReport {
    fn from_channels(channels: Vec<ChannelQuality>) -> Self {
        let mut counts = CriterionCounts::default();
        let mut bad = BTreeSet::new();

        for ch in &channels {
            counts.amplitude += ch.flags.amplitude as usize;
            counts.correlation += ch.flags.correlation as usize;
            counts.spectral_ratio += ch.flags.spectral_ratio as usize;
            counts.predictability += ch.flags.predictability as usize;
            if ch.flags.any() {
                bad.insert(ch.name.clone());
            }
        }

        Self {
            channels,
            bad: bad.into_iter().collect(),
            counts,
        }
    }

    pub fn empty() -> Self {
        Self::from_channels(Vec::new())
    }

    /// Per-channel scores in recording order
    pub fn channels(&self) -> &[ChannelQuality] {
        &self.channels
    }

    pub fn get(&self, name: &str) -> Option<&ChannelQuality> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// Union of all per-criterion flags, sorted, without duplicates
    pub fn bad(&self) -> &[String] {
        &self.bad
    }

    pub fn counts(&self) -> CriterionCounts {
        self.counts
    }

    /// Channels flagged by a single criterion, sorted
    pub fn flagged_by(&self, criterion: Criterion) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .channels
            .iter()
            .filter(|c| c.flags.get(criterion))
            .map(|c| c.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Four-criterion robust bad-channel detector
#[derive(Debug, Clone, Default)]
pub struct BadChannelDetector {
    thresholds: DetectionThresholds,
    bands: DetectionBands,
    segment_seconds: Option<f64>,
}

impl BadChannelDetector {
    pub fn new(thresholds: DetectionThresholds, bands: DetectionBands) -> Self {
        Self {
            thresholds,
            bands,
            segment_seconds: None,
        }
    }

    /// Welch segment length used by the spectral-ratio criterion
    pub fn with_segment_seconds(mut self, segment_seconds: Option<f64>) -> Self {
        self.segment_seconds = segment_seconds;
        self
    }

    pub fn thresholds(&self) -> &DetectionThresholds {
        &self.thresholds
    }

    pub fn bands(&self) -> &DetectionBands {
        &self.bands
    }

    /// Score every signal-role channel. The recording is not modified; the
    /// caller decides whether to copy `report.bad()` into `recording.bad`.
    pub fn detect(&self, recording: &MultichannelRecording) -> Result<ChannelQualityReport> {
        crate::profile_scope!("bad_channel_detection");
        let indices = recording.signal_indices();
        if indices.is_empty() {
            log::info!("No signal channels; skipping bad-channel detection");
            return Ok(ChannelQualityReport::empty());
        }

        let rows = recording.rows(&indices);
        let factor = decimation_factor(recording.n_samples());
        let decimated = decimate(&rows, factor);
        log::debug!(
            "Detecting bad channels over {} signal channels (decimation x{})",
            indices.len(),
            factor
        );

        let raw_amp = criteria::amplitude(&decimated);
        let raw_corr = criteria::correlation(&decimated);
        let raw_hf = criteria::spectral_ratio(
            &rows,
            recording.sampling_rate(),
            &self.bands.lf,
            &self.bands.hf,
            self.segment_seconds,
        )?;
        let raw_ransac = criteria::predictability(&decimated);

        let z_amp = robust_zscore(&raw_amp);
        let z_corr = robust_zscore(&raw_corr);
        let z_hf = robust_zscore(&raw_hf);
        let z_ransac = robust_zscore(&raw_ransac);

        let t = &self.thresholds;
        let channels: Vec<ChannelQuality> = indices
            .iter()
            .enumerate()
            .map(|(k, &idx)| ChannelQuality {
                name: recording.channels()[idx].name.clone(),
                raw: CriterionScores {
                    amplitude: raw_amp[k],
                    correlation: raw_corr[k],
                    spectral_ratio: raw_hf[k],
                    predictability: raw_ransac[k],
                },
                z_scores: CriterionScores {
                    amplitude: z_amp[k],
                    correlation: z_corr[k],
                    spectral_ratio: z_hf[k],
                    predictability: z_ransac[k],
                },
                flags: CriterionFlags {
                    amplitude: z_amp[k].abs() > t.amp,
                    correlation: z_corr[k] > t.corr,
                    spectral_ratio: z_hf[k] > t.hf,
                    predictability: z_ransac[k] > t.ransac,
                },
            })
            .collect();

        let report = ChannelQualityReport::from_channels(channels);
        let counts = report.counts();
        log::info!(
            "Bad channels: {:?} (amp={}, corr={}, hf={}, ransac={})",
            report.bad(),
            counts.amplitude,
            counts.correlation,
            counts.spectral_ratio,
            counts.predictability
        );
        Ok(report)
    }
}

/// Legacy detector: two-sided robust z-score of `log10` peak-to-peak
/// amplitude over the signal channels. Returns names in recording order.
pub fn detect_bad_channels_ptp(recording: &MultichannelRecording, z_threshold: f64) -> Vec<String> {
    let indices = recording.signal_indices();
    let log_ptp: Vec<f64> = indices
        .iter()
        .map(|&i| (peak_to_peak(&recording.data()[i]) + f64::EPSILON).log10())
        .collect();

    robust_zscore(&log_ptp)
        .into_iter()
        .zip(&indices)
        .filter(|(z, _)| z.abs() > z_threshold)
        .map(|(_, &i)| recording.channels()[i].name.clone())
        .collect()
}
