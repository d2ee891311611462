use crate::error::{FAAError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// How a channel takes part in detection and asymmetry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    /// Scalp signal, candidate for bad-channel detection
    Signal,
    /// Stimulus/status or other non-scalp channel
    Auxiliary,
    /// Kept in the recording but ignored by every stage
    Excluded,
}

/// Immutable per-channel metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDescriptor {
    pub name: String,
    pub role: ChannelRole,
    /// Unit-sphere sensor position, set by the montage stage
    #[serde(default)]
    pub position: Option<[f64; 3]>,
    /// Physical dimension as recorded in the source file, e.g. `uV`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ChannelDescriptor {
    pub fn new(name: impl Into<String>, role: ChannelRole) -> Self {
        Self {
            name: name.into(),
            role,
            position: None,
            unit: None,
        }
    }

    pub fn signal(name: impl Into<String>) -> Self {
        Self::new(name, ChannelRole::Signal)
    }

    /// Set the physical dimension; blank strings leave it unset
    pub fn with_unit(mut self, unit: &str) -> Self {
        let unit = unit.trim();
        self.unit = (!unit.is_empty()).then(|| unit.to_string());
        self
    }
}

/// Frequency interval in Hz, inclusive on both ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBand {
    pub low: f64,
    pub high: f64,
}

impl FrequencyBand {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low < 0.0 || low >= high {
            return Err(FAAError::InvalidParameter(format!(
                "Invalid frequency band {}-{} Hz: expected 0 <= low < high",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    pub fn contains(&self, freq: f64) -> bool {
        freq >= self.low && freq <= self.high
    }

    /// Band widened by `guard` Hz on each side, never below 0 Hz
    pub fn widened(&self, guard: f64) -> Self {
        Self {
            low: (self.low - guard).max(0.0),
            high: self.high + guard,
        }
    }
}

impl fmt::Display for FrequencyBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

/// Multichannel time series with channel metadata and a mutable bad set.
///
/// Invariants checked on construction: one data row per channel, every row
/// the same length, finite positive sampling rate.
#[derive(Debug, Clone)]
pub struct MultichannelRecording {
    channels: Vec<ChannelDescriptor>,
    data: Vec<Vec<f64>>,
    sampling_rate: f64,
    /// Channels flagged as unreliable; written by the caller of the detector
    pub bad: BTreeSet<String>,
}

impl MultichannelRecording {
    pub fn new(
        channels: Vec<ChannelDescriptor>,
        data: Vec<Vec<f64>>,
        sampling_rate: f64,
    ) -> Result<Self> {
        if !sampling_rate.is_finite() || sampling_rate <= 0.0 {
            return Err(FAAError::InvalidRecording(format!(
                "Sampling rate must be positive, got {}",
                sampling_rate
            )));
        }

        if channels.len() != data.len() {
            return Err(FAAError::InvalidRecording(format!(
                "{} channel descriptors but {} data rows",
                channels.len(),
                data.len()
            )));
        }

        if let Some(first) = data.first() {
            let n_samples = first.len();
            if let Some((idx, row)) = data.iter().enumerate().find(|(_, r)| r.len() != n_samples) {
                return Err(FAAError::InvalidRecording(format!(
                    "Channel {} has {} samples, expected {}",
                    channels[idx].name,
                    row.len(),
                    n_samples
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for ch in &channels {
            if !seen.insert(ch.name.as_str()) {
                return Err(FAAError::InvalidRecording(format!(
                    "Duplicate channel name: {}",
                    ch.name
                )));
            }
        }

        Ok(Self {
            channels,
            data,
            sampling_rate,
            bad: BTreeSet::new(),
        })
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn data(&self) -> &[Vec<f64>] {
        &self.data
    }

    pub fn sampling_rate(&self) -> f64 {
        self.sampling_rate
    }

    pub fn n_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn n_samples(&self) -> usize {
        self.data.first().map(Vec::len).unwrap_or(0)
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_samples() as f64 / self.sampling_rate
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn channel_index(&self, name: &str) -> Option<usize> {
        self.channels.iter().position(|c| c.name == name)
    }

    pub fn channel_data(&self, name: &str) -> Option<&[f64]> {
        self.channel_index(name).map(|idx| self.data[idx].as_slice())
    }

    /// Indices of channels with the `Signal` role, in recording order
    pub fn signal_indices(&self) -> Vec<usize> {
        self.channels
            .iter()
            .enumerate()
            .filter(|(_, c)| c.role == ChannelRole::Signal)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn signal_names(&self) -> Vec<&str> {
        self.signal_indices()
            .into_iter()
            .map(|i| self.channels[i].name.as_str())
            .collect()
    }

    /// Rows of the given channel indices
    pub fn rows(&self, indices: &[usize]) -> Vec<&[f64]> {
        indices.iter().map(|&i| self.data[i].as_slice()).collect()
    }

    /// Mutable access to one channel's samples; row length cannot change
    pub fn row_mut(&mut self, index: usize) -> &mut [f64] {
        self.data[index].as_mut_slice()
    }

    pub fn rename_channel(&mut self, index: usize, new_name: &str) -> Result<()> {
        self.rename_channels(&[(index, new_name.to_string())])
    }

    /// Apply several renames at once. Names only need to be unique after
    /// every rename is applied, so swaps are allowed.
    pub fn rename_channels(&mut self, renames: &[(usize, String)]) -> Result<()> {
        let mut names: Vec<String> = self.channels.iter().map(|c| c.name.clone()).collect();
        for (idx, new_name) in renames {
            let slot = names.get_mut(*idx).ok_or_else(|| {
                FAAError::InvalidParameter(format!("Channel index {} out of bounds", idx))
            })?;
            *slot = new_name.clone();
        }

        let mut seen = BTreeSet::new();
        if let Some(dup) = names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(FAAError::InvalidRecording(format!(
                "Renaming would duplicate channel name {}",
                dup
            )));
        }

        let bad = std::mem::take(&mut self.bad);
        for (channel, new_name) in self.channels.iter_mut().zip(names) {
            if bad.contains(&channel.name) {
                self.bad.insert(new_name.clone());
            }
            channel.name = new_name;
        }
        Ok(())
    }

    pub fn set_role(&mut self, index: usize, role: ChannelRole) {
        self.channels[index].role = role;
    }

    pub fn set_position(&mut self, index: usize, position: Option<[f64; 3]>) {
        self.channels[index].position = position;
    }

    /// Bad channel names that still carry the `Signal` role
    pub fn bad_signal_channels(&self) -> Vec<&str> {
        self.channels
            .iter()
            .filter(|c| c.role == ChannelRole::Signal && self.bad.contains(&c.name))
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Band-restricted log-power difference between two channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsymmetryResult {
    pub left_channel: String,
    pub right_channel: String,
    pub band: FrequencyBand,
    pub power_left: f64,
    pub power_right: f64,
    pub log_power_left: f64,
    pub log_power_right: f64,
    /// `log_power_right - log_power_left`
    pub asymmetry: f64,
}
