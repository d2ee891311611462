use crate::error::Result;
use crate::types::AsymmetryResult;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

/// Recording condition encoded in the file name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    EyesOpen,
    EyesClosed,
    Unknown,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Condition::EyesOpen => "eyes-open",
            Condition::EyesClosed => "eyes-closed",
            Condition::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

fn filename_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)est(?P<id>\d+)(?P<cond>yo|yc)?$").ok())
        .as_ref()
}

/// Participant id and condition from a stem like `est001yo`
pub fn parse_filename(stem: &str) -> (Option<String>, Condition) {
    let Some(caps) = filename_pattern().and_then(|re| re.captures(stem)) else {
        return (None, Condition::Unknown);
    };

    let id = caps.name("id").map(|m| m.as_str().to_string());
    let condition = match caps.name("cond").map(|m| m.as_str().to_lowercase()) {
        Some(c) if c == "yo" => Condition::EyesOpen,
        Some(c) if c == "yc" => Condition::EyesClosed,
        _ => Condition::Unknown,
    };
    (id, condition)
}

/// One row of the asymmetry CSV
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FAARow {
    pub participant_id: String,
    pub condition: Condition,
    pub band_hz: String,
    pub left_channel: String,
    pub right_channel: String,
    pub power_left: f64,
    pub power_right: f64,
    pub log10_left: f64,
    pub log10_right: f64,
    pub asymmetry: f64,
}

impl FAARow {
    pub fn new(participant_id: Option<&str>, condition: Condition, result: &AsymmetryResult) -> Self {
        Self {
            participant_id: participant_id.unwrap_or("unknown").to_string(),
            condition,
            band_hz: result.band.to_string(),
            left_channel: result.left_channel.clone(),
            right_channel: result.right_channel.clone(),
            power_left: result.power_left,
            power_right: result.power_right,
            log10_left: result.log_power_left,
            log10_right: result.log_power_right,
            asymmetry: result.asymmetry,
        }
    }

    /// Row for a recording, labelled from its file stem
    pub fn from_stem(stem: &str, result: &AsymmetryResult) -> Self {
        let (id, condition) = parse_filename(stem);
        Self::new(id.as_deref(), condition, result)
    }
}

/// Create or overwrite `path` with a header and one line per row
pub fn write_faa_csv(path: &Path, rows: &[FAARow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    log::info!("Saved asymmetry CSV: {}", path.display());
    Ok(())
}

pub fn read_faa_csv(path: &Path) -> Result<Vec<FAARow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader.deserialize().collect::<std::result::Result<Vec<FAARow>, _>>()?;
    Ok(rows)
}
