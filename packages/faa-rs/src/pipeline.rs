//! Recording pipeline
//!
//! Runs one recording through every stage in order:
//! 1. Rename channels from the template and assign auxiliary/excluded roles
//! 2. Attach montage positions and exclude channels with unusable positions
//! 3. Re-reference, band-pass and notch filter the signal channels
//! 4. Detect bad channels and interpolate them
//! 5. Compute the band-power asymmetry
//!
//! Stages report what they did through [`StageDiagnostics`]. A failing
//! asymmetry step leaves the cleaned recording intact.

use crate::asymmetry::AsymmetryCalculator;
use crate::channels::{apply_renames, assign_roles, RenameMap, RenameSummary, RoleSummary};
use crate::config::PipelineConfig;
use crate::detector::{
    detect_bad_channels_ptp, BadChannelDetector, ChannelQualityReport, CriterionCounts,
    DetectionMethod,
};
use crate::edf::{load_recording, write_edf};
use crate::error::{FAAError, Result};
use crate::filters::{apply_filters, average_reference, FilterSettings, ReferenceMode};
use crate::interpolate::{interpolate_bads, InterpolationSummary};
use crate::montage::{apply_montage, ensure_valid_positions, Montage, MontageSummary};
use crate::output::{write_faa_csv, FAARow};
use crate::profiling::ProfileScope;
use crate::types::{AsymmetryResult, MultichannelRecording};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Structured record of what each stage did
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageDiagnostics {
    pub rename: Option<RenameSummary>,
    pub roles: RoleSummary,
    pub montage: MontageSummary,
    pub criterion_counts: Option<CriterionCounts>,
    pub bad_channels: Vec<String>,
    pub interpolation: Option<InterpolationSummary>,
    /// Retyped channels, skipped notches, skipped interpolation
    pub warnings: Vec<String>,
    /// (stage, milliseconds)
    pub timings_ms: Vec<(String, f64)>,
}

impl StageDiagnostics {
    fn finish(&mut self, scope: ProfileScope) {
        self.timings_ms
            .push((scope.label().to_string(), scope.elapsed_ms()));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionOutcome {
    pub method: DetectionMethod,
    /// Sorted, without duplicates
    pub bad: Vec<String>,
    /// Present for the four-criterion method
    pub report: Option<ChannelQualityReport>,
}

#[derive(Debug)]
pub struct ProcessedRecording {
    pub recording: MultichannelRecording,
    pub detection: DetectionOutcome,
    pub asymmetry: Result<AsymmetryResult>,
    pub diagnostics: StageDiagnostics,
}

/// Files written for one input and the values they hold
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub clean_edf: PathBuf,
    pub faa_csv: PathBuf,
    pub row: FAARow,
    pub diagnostics: StageDiagnostics,
}

pub struct Pipeline {
    config: PipelineConfig,
    montage: Montage,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let montage = Montage::by_name(&config.montage)?;
        Ok(Self { config, montage })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            l_freq: self.config.l_freq,
            h_freq: self.config.h_freq,
            order: self.config.filter_order,
            notch_freqs: self.config.notch_freqs.clone(),
            notch_q: self.config.notch_q,
        }
    }

    /// Rename, roles, montage, reference, position check and filtering
    pub fn preprocess(
        &self,
        recording: &mut MultichannelRecording,
        rename_map: Option<&RenameMap>,
        diagnostics: &mut StageDiagnostics,
    ) -> Result<()> {
        let scope = ProfileScope::new("preprocess");

        if let Some(map) = rename_map {
            diagnostics.rename = Some(apply_renames(recording, map)?);
        }
        diagnostics.roles = assign_roles(
            recording,
            &self.config.auxiliary_channels,
            &self.config.excluded_channels,
        );

        diagnostics.montage = apply_montage(recording, &self.montage);
        // Reference over every signal channel before positions can retype any
        if self.config.reference == ReferenceMode::Average {
            average_reference(recording);
        }
        diagnostics
            .warnings
            .extend(ensure_valid_positions(recording));

        diagnostics
            .warnings
            .extend(apply_filters(recording, &self.filter_settings())?);

        diagnostics.finish(scope);
        Ok(())
    }

    /// Bad channels by the configured method. Does not touch `recording.bad`.
    pub fn detect(&self, recording: &MultichannelRecording) -> Result<DetectionOutcome> {
        match self.config.detection_method {
            DetectionMethod::Prep => {
                let detector = BadChannelDetector::new(
                    self.config.thresholds,
                    self.config.detection_bands,
                )
                .with_segment_seconds(self.config.segment_seconds);
                let report = detector.detect(recording)?;
                Ok(DetectionOutcome {
                    method: DetectionMethod::Prep,
                    bad: report.bad().to_vec(),
                    report: Some(report),
                })
            }
            DetectionMethod::Ptp => {
                let mut bad = detect_bad_channels_ptp(recording, self.config.ptp_threshold);
                bad.sort();
                log::info!("Peak-to-peak bad channels: {:?}", bad);
                Ok(DetectionOutcome {
                    method: DetectionMethod::Ptp,
                    bad,
                    report: None,
                })
            }
        }
    }

    pub fn asymmetry(&self, recording: &MultichannelRecording) -> Result<AsymmetryResult> {
        AsymmetryCalculator::new(self.config.band_guard_hz).compute(
            recording,
            &self.config.left_channel,
            &self.config.right_channel,
            self.config.asymmetry_band,
            self.config.segment_seconds,
        )
    }

    /// Every stage on an in-memory recording. Only preprocessing and
    /// detection errors abort; interpolation failure becomes a warning and
    /// asymmetry failure is returned alongside the cleaned recording.
    pub fn process(
        &self,
        mut recording: MultichannelRecording,
        rename_map: Option<&RenameMap>,
    ) -> Result<ProcessedRecording> {
        let mut diagnostics = StageDiagnostics::default();
        self.preprocess(&mut recording, rename_map, &mut diagnostics)?;

        let scope = ProfileScope::new("detect");
        let detection = self.detect(&recording)?;
        recording.bad = detection.bad.iter().cloned().collect();
        diagnostics.bad_channels = detection.bad.clone();
        diagnostics.criterion_counts = detection.report.as_ref().map(|r| r.counts());
        log::info!(
            "Marked {} bad channels: {}",
            detection.bad.len(),
            if detection.bad.is_empty() {
                "none".to_string()
            } else {
                detection.bad.join(", ")
            }
        );
        diagnostics.finish(scope);

        if self.config.interpolate {
            let scope = ProfileScope::new("interpolate");
            match interpolate_bads(&mut recording) {
                Ok(summary) => diagnostics.interpolation = Some(summary),
                Err(e) => {
                    let msg = format!("Skipping bad-channel interpolation: {}", e);
                    log::warn!("{}", msg);
                    diagnostics.warnings.push(msg);
                }
            }
            diagnostics.finish(scope);
        }

        let scope = ProfileScope::new("asymmetry");
        let asymmetry = self.asymmetry(&recording);
        diagnostics.finish(scope);

        Ok(ProcessedRecording {
            recording,
            detection,
            asymmetry,
            diagnostics,
        })
    }

    /// Load an EDF, process it, then write `<stem>_clean.edf` and
    /// `<stem>_faa.csv` into `out_dir`. The cleaned file is written before
    /// the asymmetry result is checked.
    pub fn process_file(
        &self,
        path: &Path,
        rename_map: Option<&RenameMap>,
        out_dir: &Path,
    ) -> Result<FileOutcome> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                FAAError::InvalidParameter(format!("Bad file name: {}", path.display()))
            })?
            .to_string();

        let (header, recording) = load_recording(path)?;
        log::info!("Processing {}", path.display());
        let processed = self.process(recording, rename_map)?;

        std::fs::create_dir_all(out_dir)?;
        let clean_edf = out_dir.join(format!("{}_clean.edf", stem));
        write_edf(&clean_edf, &processed.recording, Some(&header))?;

        let result = processed.asymmetry.map_err(|e| {
            log::error!("Failed to compute asymmetry for {}: {}", path.display(), e);
            e
        })?;

        let faa_csv = out_dir.join(format!("{}_faa.csv", stem));
        let row = FAARow::from_stem(&stem, &result);
        write_faa_csv(&faa_csv, std::slice::from_ref(&row))?;

        Ok(FileOutcome {
            clean_edf,
            faa_csv,
            row,
            diagnostics: processed.diagnostics,
        })
    }
}

/// Result of one batch item
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchItemOutcome<T> {
    Succeeded { source: String, value: T },
    Failed { source: String, reason: String },
}

impl<T> BatchItemOutcome<T> {
    pub fn source(&self) -> &str {
        match self {
            BatchItemOutcome::Succeeded { source, .. } | BatchItemOutcome::Failed { source, .. } => {
                source
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, BatchItemOutcome::Succeeded { .. })
    }
}

/// One outcome per input, in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport<T> {
    pub items: Vec<BatchItemOutcome<T>>,
    pub succeeded: usize,
    pub failed: usize,
}

impl<T> BatchReport<T> {
    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().filter_map(|item| match item {
            BatchItemOutcome::Failed { source, reason } => Some((source.as_str(), reason.as_str())),
            _ => None,
        })
    }
}

/// Run `f` on every item in sequence. A failing item is logged and recorded;
/// it never stops the remaining items.
pub fn run_batch<I, L, S, T, F>(items: I, mut f: F) -> BatchReport<T>
where
    I: IntoIterator<Item = (L, S)>,
    L: Into<String>,
    F: FnMut(S) -> Result<T>,
{
    let mut outcomes = Vec::new();
    let (mut succeeded, mut failed) = (0, 0);

    for (label, item) in items {
        let source = label.into();
        match f(item) {
            Ok(value) => {
                succeeded += 1;
                outcomes.push(BatchItemOutcome::Succeeded { source, value });
            }
            Err(e) => {
                log::error!("Failed to process {}: {}", source, e);
                failed += 1;
                outcomes.push(BatchItemOutcome::Failed {
                    source,
                    reason: e.to_string(),
                });
            }
        }
    }

    log::info!("Batch finished: {} succeeded, {} failed", succeeded, failed);
    BatchReport {
        items: outcomes,
        succeeded,
        failed,
    }
}
