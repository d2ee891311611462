//! Channel renaming from a two-column TSV template and role assignment.

use crate::error::{FAAError, Result};
use crate::types::{ChannelRole, MultichannelRecording};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Original name → desired name. Iteration order is sorted by original name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameMap {
    entries: BTreeMap<String, String>,
}

impl RenameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `original → desired`, plus the `+`/`~` twin of `original`.
    /// The first mapping registered for a key wins.
    pub fn insert(&mut self, original: &str, desired: &str) {
        for key in Self::variants(original) {
            self.entries
                .entry(key)
                .or_insert_with(|| desired.to_string());
        }
    }

    fn variants(original: &str) -> Vec<String> {
        let mut keys = vec![original.to_string()];
        if original.contains('+') {
            keys.push(original.replace('+', "~"));
        }
        if original.contains('~') {
            keys.push(original.replace('~', "+"));
        }
        keys
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.entries.get(original).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Read a tab-separated template. Rows with fewer than two non-empty cells
/// are skipped; a template with no usable rows is an error.
pub fn load_rename_map(path: &Path) -> Result<RenameMap> {
    if !path.exists() {
        return Err(FAAError::FileNotFound(format!(
            "Rename TSV not found: {}",
            path.display()
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_path(path)?;

    let mut map = RenameMap::new();
    for record in reader.records() {
        let record = record?;
        let (Some(original), Some(desired)) = (record.get(0), record.get(1)) else {
            continue;
        };
        let (original, desired) = (original.trim(), desired.trim());
        if original.is_empty() || desired.is_empty() {
            continue;
        }
        map.insert(original, desired);
    }

    if map.is_empty() {
        return Err(FAAError::ParseError(format!(
            "Rename TSV is empty: {}",
            path.display()
        )));
    }
    log::debug!("Loaded {} rename entries from {}", map.len(), path.display());
    Ok(map)
}

/// The only `*.tsv` file in `dir`
pub fn find_single_tsv(dir: &Path) -> Result<PathBuf> {
    // Bracketed directory names are common, so the directory part is literal
    let pattern = Path::new(&glob::Pattern::escape(&dir.to_string_lossy())).join("*.tsv");
    let pattern = pattern.to_string_lossy();
    let mut found: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| FAAError::InvalidParameter(format!("Invalid directory pattern: {}", e)))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    found.sort();

    match found.len() {
        0 => Err(FAAError::FileNotFound(format!(
            "No TSV found in {}; add a two-column channel rename TSV",
            dir.display()
        ))),
        1 => {
            let chosen = found.remove(0);
            log::info!("Using channel rename TSV: {}", chosen.display());
            Ok(chosen)
        }
        _ => Err(FAAError::InvalidParameter(format!(
            "Multiple TSV files found; keep only the channel rename TSV: {}",
            found
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RenameSummary {
    pub renamed: usize,
    /// Template entries with no matching channel, sorted
    pub missing: Vec<String>,
}

/// Rename every channel the map knows and mark it `Signal`.
pub fn apply_renames(
    recording: &mut MultichannelRecording,
    map: &RenameMap,
) -> Result<RenameSummary> {
    let mut summary = RenameSummary::default();
    if map.is_empty() {
        log::info!("No rename map provided; keeping channel names as-is");
        return Ok(summary);
    }

    let present: Vec<(usize, String, String)> = recording
        .channels()
        .iter()
        .enumerate()
        .filter_map(|(i, c)| map.get(&c.name).map(|new| (i, c.name.clone(), new.to_string())))
        .collect();

    let renames: Vec<(usize, String)> = present
        .iter()
        .map(|(i, _, new)| (*i, new.clone()))
        .collect();
    recording.rename_channels(&renames)?;
    for (i, _, _) in &present {
        recording.set_role(*i, ChannelRole::Signal);
    }
    summary.renamed = present.len();

    let mut missing: Vec<&str> = map
        .iter()
        .map(|(k, _)| k)
        .filter(|k| !present.iter().any(|(_, old, _)| old == k))
        .collect();
    missing.retain(|k| {
        !present.iter().any(|(_, old, _)| {
            (old.contains('+') && old.replace('+', "~") == *k)
                || (old.contains('~') && old.replace('~', "+") == *k)
        })
    });
    summary.missing = missing.into_iter().map(str::to_string).collect();

    if summary.renamed > 0 {
        log::info!("Renamed {} channels", summary.renamed);
    }
    if !summary.missing.is_empty() {
        log::info!(
            "Channels from rename template not found: {}",
            summary.missing.join(", ")
        );
    }
    Ok(summary)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleSummary {
    pub auxiliary: Vec<String>,
    pub excluded: Vec<String>,
    /// Requested names absent from the recording
    pub missing: Vec<String>,
}

/// Mark the named channels `Auxiliary` or `Excluded`; absent names are
/// ignored and reported.
pub fn assign_roles(
    recording: &mut MultichannelRecording,
    auxiliary: &[String],
    excluded: &[String],
) -> RoleSummary {
    let mut summary = RoleSummary::default();

    for (names, role) in [(auxiliary, ChannelRole::Auxiliary), (excluded, ChannelRole::Excluded)] {
        for name in names {
            match recording.channel_index(name) {
                Some(idx) => {
                    recording.set_role(idx, role);
                    match role {
                        ChannelRole::Auxiliary => summary.auxiliary.push(name.clone()),
                        _ => summary.excluded.push(name.clone()),
                    }
                }
                None => summary.missing.push(name.clone()),
            }
        }
    }

    if !summary.missing.is_empty() {
        log::debug!(
            "Channels missing when assigning roles: {}",
            summary.missing.join(", ")
        );
    }
    summary
}
