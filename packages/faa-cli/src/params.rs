use crate::cli::{parse_band, PipelineArgs};
use faa_rs::{load_rename_map, FrequencyBand, PipelineConfig, RenameMap};
use std::path::Path;

/// Check existence and the `.edf` extension
pub fn validate_edf_path(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);
    if !path.is_file() {
        return Err(format!("Input file not found: {}", file_path));
    }

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !ext.eq_ignore_ascii_case("edf") {
        return Err(format!("Unsupported file extension '{}'. Supported: edf", ext));
    }
    Ok(())
}

fn band_from(values: &[f64]) -> Result<FrequencyBand, String> {
    let (low, high) = parse_band(values)?;
    FrequencyBand::new(low, high).map_err(|e| e.to_string())
}

/// Load the JSON configuration (or defaults), apply flag overrides and
/// validate the result.
pub fn build_config(args: &PipelineArgs) -> Result<PipelineConfig, String> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(Path::new(path))
            .map_err(|e| format!("Failed to load config '{}': {}", path, e))?,
        None => PipelineConfig::default(),
    };

    if let Some(v) = args.l_freq {
        config.l_freq = v;
    }
    if let Some(v) = args.h_freq {
        config.h_freq = v;
    }
    if let Some(ref v) = args.notch_freqs {
        config.notch_freqs = v.clone();
    }
    if let Some(v) = args.reference {
        config.reference = v;
    }
    if let Some(v) = args.bad_method {
        config.detection_method = v;
    }

    let t = &mut config.thresholds;
    for (slot, value) in [
        (&mut t.amp, args.bad_z_thresh_amp),
        (&mut t.corr, args.bad_z_thresh_corr),
        (&mut t.hf, args.bad_z_thresh_hf),
        (&mut t.ransac, args.bad_z_thresh_ransac),
    ] {
        if let Some(v) = value {
            *slot = v;
        }
    }

    if let Some(ref v) = args.bad_lf_band {
        config.detection_bands.lf = band_from(v)?;
    }
    if let Some(ref v) = args.bad_hf_band {
        config.detection_bands.hf = band_from(v)?;
    }
    if args.no_interpolate {
        config.interpolate = false;
    }
    if let Some(ref v) = args.left {
        config.left_channel = v.clone();
    }
    if let Some(ref v) = args.right {
        config.right_channel = v.clone();
    }
    if let Some(ref v) = args.band {
        config.asymmetry_band = band_from(v)?;
    }
    if args.segment_seconds.is_some() {
        config.segment_seconds = args.segment_seconds;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

pub fn load_optional_rename_map(path: Option<&str>) -> Result<Option<RenameMap>, String> {
    match path {
        Some(p) => load_rename_map(Path::new(p))
            .map(Some)
            .map_err(|e| e.to_string()),
        None => Ok(None),
    }
}
