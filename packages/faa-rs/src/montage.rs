//! Built-in electrode layouts and sensor position checks.
//!
//! Positions are stored as spherical (theta, phi) angles in degrees and
//! converted to unit-sphere Cartesian coordinates: +x right, +y anterior,
//! +z vertex.

use crate::error::{FAAError, Result};
use crate::types::{ChannelRole, MultichannelRecording};
use serde::Serialize;
use std::collections::HashMap;

/// 10-20 electrodes plus the 10-10 positions commonly present in caps.
/// (label, theta, phi) in degrees.
const STANDARD_1020: &[(&str, f64, f64)] = &[
    ("Fp1", -90.0, -72.0),
    ("Fpz", 90.0, 90.0),
    ("Fp2", 90.0, 72.0),
    ("AF7", -90.0, -54.0),
    ("AF3", -74.0, -65.0),
    ("AFz", 67.0, 90.0),
    ("AF4", 74.0, 65.0),
    ("AF8", 90.0, 54.0),
    ("F7", -90.0, -36.0),
    ("F5", -75.0, -41.0),
    ("F3", -60.0, -51.0),
    ("F1", -50.0, -68.0),
    ("Fz", 45.0, 90.0),
    ("F2", 50.0, 68.0),
    ("F4", 60.0, 51.0),
    ("F6", 75.0, 41.0),
    ("F8", 90.0, 36.0),
    ("FT7", -90.0, -18.0),
    ("FC5", -72.0, -21.0),
    ("FC3", -51.0, -22.0),
    ("FC1", -32.0, -45.0),
    ("FCz", 23.0, 90.0),
    ("FC2", 32.0, 45.0),
    ("FC4", 51.0, 22.0),
    ("FC6", 72.0, 21.0),
    ("FT8", 90.0, 18.0),
    ("T7", -90.0, 0.0),
    ("C5", -68.0, 0.0),
    ("C3", -45.0, 0.0),
    ("C1", -23.0, 0.0),
    ("Cz", 0.0, 0.0),
    ("C2", 23.0, 0.0),
    ("C4", 45.0, 0.0),
    ("C6", 68.0, 0.0),
    ("T8", 90.0, 0.0),
    ("TP7", -90.0, 18.0),
    ("CP5", -72.0, 21.0),
    ("CP3", -51.0, 22.0),
    ("CP1", -32.0, 45.0),
    ("CPz", 23.0, -90.0),
    ("CP2", 32.0, -45.0),
    ("CP4", 51.0, -22.0),
    ("CP6", 72.0, -21.0),
    ("TP8", 90.0, -18.0),
    ("P7", -90.0, 36.0),
    ("P5", -75.0, 41.0),
    ("P3", -60.0, 51.0),
    ("P1", -50.0, 68.0),
    ("Pz", 45.0, -90.0),
    ("P2", 50.0, -68.0),
    ("P4", 60.0, -51.0),
    ("P6", 75.0, -41.0),
    ("P8", 90.0, -36.0),
    ("PO7", -90.0, 54.0),
    ("PO3", -74.0, 65.0),
    ("POz", 67.0, -90.0),
    ("PO4", 74.0, -65.0),
    ("PO8", 90.0, -54.0),
    ("O1", -90.0, 72.0),
    ("Oz", 90.0, -90.0),
    ("O2", 90.0, -72.0),
];

/// Old 10-20 temporal names
const ALIASES: &[(&str, &str)] = &[("T3", "T7"), ("T4", "T8"), ("T5", "P7"), ("T6", "P8")];

/// Decimal places used to decide whether two positions coincide
const POSITION_DECIMALS: i32 = 6;

fn spherical_to_cartesian(theta_deg: f64, phi_deg: f64) -> [f64; 3] {
    let theta = theta_deg.to_radians();
    let phi = phi_deg.to_radians();
    [theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos()]
}

/// Strip an EDF type prefix such as `EEG Fp1` and lowercase
fn normalize_label(label: &str) -> String {
    let lower = label.trim().to_lowercase();
    lower
        .strip_prefix("eeg ")
        .map(|s| s.trim().to_string())
        .unwrap_or(lower)
}

/// Label → unit-sphere position lookup
#[derive(Debug, Clone)]
pub struct Montage {
    name: String,
    positions: HashMap<String, [f64; 3]>,
}

impl Montage {
    pub fn standard_1020() -> Self {
        let mut positions: HashMap<String, [f64; 3]> = STANDARD_1020
            .iter()
            .map(|&(label, theta, phi)| (label.to_lowercase(), spherical_to_cartesian(theta, phi)))
            .collect();
        for &(alias, target) in ALIASES {
            if let Some(&pos) = positions.get(&target.to_lowercase()) {
                positions.insert(alias.to_lowercase(), pos);
            }
        }

        Self {
            name: "standard_1020".to_string(),
            positions,
        }
    }

    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "standard_1020" => Ok(Self::standard_1020()),
            other => Err(FAAError::InvalidParameter(format!(
                "Unknown montage: {} (available: standard_1020)",
                other
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Case-insensitive position lookup
    pub fn position(&self, label: &str) -> Option<[f64; 3]> {
        self.positions.get(&normalize_label(label)).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MontageSummary {
    pub positioned: usize,
    /// Signal channels the montage does not know
    pub missing: Vec<String>,
}

/// Attach montage positions to every channel. Signal channels without a
/// montage entry keep no position and are reported.
pub fn apply_montage(recording: &mut MultichannelRecording, montage: &Montage) -> MontageSummary {
    let mut summary = MontageSummary::default();

    for idx in 0..recording.n_channels() {
        let channel = &recording.channels()[idx];
        let position = montage.position(&channel.name);
        if position.is_some() {
            summary.positioned += 1;
        } else if channel.role == ChannelRole::Signal {
            summary.missing.push(channel.name.clone());
        }
        recording.set_position(idx, position);
    }

    if !summary.missing.is_empty() {
        log::warn!(
            "Channels not in montage {}: {}",
            montage.name(),
            summary.missing.join(", ")
        );
    }
    summary
}

/// Retype signal channels as `Excluded` when their position is missing or
/// non-finite, or coincides with an earlier signal channel's. Returns one
/// warning per retyped channel.
pub fn ensure_valid_positions(recording: &mut MultichannelRecording) -> Vec<String> {
    let mut warnings = Vec::new();
    let mut seen: HashMap<[i64; 3], String> = HashMap::new();
    let scale = 10f64.powi(POSITION_DECIMALS);

    for idx in recording.signal_indices() {
        let channel = &recording.channels()[idx];
        let name = channel.name.clone();
        let position = channel.position;

        let position = match position {
            Some(pos) if pos.iter().all(|v| v.is_finite()) => pos,
            _ => {
                let msg = format!("Channel {} lacks a finite position; excluding it", name);
                log::warn!("{}", msg);
                warnings.push(msg);
                recording.set_role(idx, ChannelRole::Excluded);
                continue;
            }
        };

        let key = position.map(|v| (v * scale).round() as i64);
        if let Some(first) = seen.get(&key) {
            let msg = format!(
                "Channel {} shares position with {}; excluding {}",
                name, first, name
            );
            log::warn!("{}", msg);
            warnings.push(msg);
            recording.set_role(idx, ChannelRole::Excluded);
        } else {
            seen.insert(key, name);
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelDescriptor;

    fn recording(names: &[&str]) -> MultichannelRecording {
        let channels = names.iter().map(|n| ChannelDescriptor::signal(*n)).collect();
        MultichannelRecording::new(channels, vec![vec![0.0; 4]; names.len()], 100.0).unwrap()
    }

    #[test]
    fn test_positions_on_unit_sphere() {
        let montage = Montage::standard_1020();
        for &(label, _, _) in STANDARD_1020 {
            let p = montage.position(label).unwrap();
            let norm = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
            assert!((norm - 1.0).abs() < 1e-12, "{} not on unit sphere", label);
        }
    }

    #[test]
    fn test_orientation() {
        let montage = Montage::standard_1020();
        let f3 = montage.position("F3").unwrap();
        let f4 = montage.position("F4").unwrap();
        let cz = montage.position("Cz").unwrap();
        assert!(f3[0] < 0.0 && f4[0] > 0.0);
        assert!(f3[1] > 0.0 && f4[1] > 0.0);
        assert!((cz[2] - 1.0).abs() < 1e-12);
        assert!((f3[0] + f4[0]).abs() < 1e-12);
    }

    #[test]
    fn test_lookup_is_case_insensitive_with_aliases() {
        let montage = Montage::standard_1020();
        assert_eq!(montage.position("fp1"), montage.position("FP1"));
        assert_eq!(montage.position("EEG Fp1"), montage.position("Fp1"));
        assert_eq!(montage.position("T3"), montage.position("T7"));
        assert!(montage.position("Status").is_none());
        assert!(Montage::by_name("nope").is_err());
    }

    #[test]
    fn test_apply_montage_reports_missing() {
        let mut rec = recording(&["F3", "F4", "EEG 23"]);
        let summary = apply_montage(&mut rec, &Montage::standard_1020());
        assert_eq!(summary.positioned, 2);
        assert_eq!(summary.missing, vec!["EEG 23".to_string()]);
        assert!(rec.channels()[2].position.is_none());
    }

    #[test]
    fn test_ensure_valid_positions_retypes() {
        let mut rec = recording(&["F3", "T7", "T3", "EEG 23"]);
        apply_montage(&mut rec, &Montage::standard_1020());
        let warnings = ensure_valid_positions(&mut rec);

        assert_eq!(warnings.len(), 2);
        assert_eq!(rec.channels()[0].role, ChannelRole::Signal);
        assert_eq!(rec.channels()[1].role, ChannelRole::Signal);
        assert_eq!(rec.channels()[2].role, ChannelRole::Excluded);
        assert_eq!(rec.channels()[3].role, ChannelRole::Excluded);
    }
}
