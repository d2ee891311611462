use clap::{Args, Parser, Subcommand};
use faa_rs::filters::ReferenceMode;
use faa_rs::DetectionMethod;

#[derive(Parser)]
#[command(
    name = "faa",
    version,
    about = "EEG cleaning and frontal alpha asymmetry command-line tool",
    long_about = "Clean resting-state EEG recordings (EDF), detect and interpolate bad channels,\n\
                  and compute the log band-power asymmetry between two channels."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Clean one EDF file and write its asymmetry CSV
    Run(RunArgs),
    /// Clean every EDF file in a directory or file list
    Batch(BatchArgs),
    /// Print the bad-channel report for one EDF file
    Detect(DetectArgs),
    /// Check an EDF file and pipeline configuration
    Validate(ValidateArgs),
}

/// Overrides applied on top of the JSON configuration
#[derive(Args, Clone, Default)]
pub struct PipelineArgs {
    /// Pipeline configuration JSON; flags below override its fields
    #[arg(long)]
    pub config: Option<String>,

    /// High-pass cutoff (Hz)
    #[arg(long)]
    pub l_freq: Option<f64>,

    /// Low-pass cutoff (Hz)
    #[arg(long)]
    pub h_freq: Option<f64>,

    /// Notch frequencies (Hz)
    #[arg(long, num_args = 1..)]
    pub notch_freqs: Option<Vec<f64>>,

    /// Reference: average or none
    #[arg(long = "ref")]
    pub reference: Option<ReferenceMode>,

    /// Bad-channel method: prep or ptp
    #[arg(long)]
    pub bad_method: Option<DetectionMethod>,

    #[arg(long)]
    pub bad_z_thresh_amp: Option<f64>,

    #[arg(long)]
    pub bad_z_thresh_corr: Option<f64>,

    #[arg(long)]
    pub bad_z_thresh_hf: Option<f64>,

    #[arg(long)]
    pub bad_z_thresh_ransac: Option<f64>,

    /// Low-frequency band of the spectral-ratio criterion
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    pub bad_lf_band: Option<Vec<f64>>,

    /// High-frequency band of the spectral-ratio criterion
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    pub bad_hf_band: Option<Vec<f64>>,

    /// Keep bad channels as recorded instead of interpolating them
    #[arg(long, default_value_t = false)]
    pub no_interpolate: bool,

    /// Left channel of the asymmetry pair
    #[arg(long)]
    pub left: Option<String>,

    /// Right channel of the asymmetry pair
    #[arg(long)]
    pub right: Option<String>,

    /// Asymmetry band
    #[arg(long, num_args = 2, value_names = ["LOW", "HIGH"])]
    pub band: Option<Vec<f64>>,

    /// Welch segment length in seconds (default: whole recording)
    #[arg(long)]
    pub segment_seconds: Option<f64>,
}

#[derive(Args)]
pub struct RunArgs {
    /// Input EDF file
    #[arg(long)]
    pub edf: String,

    /// Directory for the cleaned EDF and the asymmetry CSV
    #[arg(long)]
    pub out_dir: String,

    /// Two-column TSV mapping original to desired channel names
    #[arg(long)]
    pub rename_tsv: Option<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Print the file outcome as JSON on stdout
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct BatchArgs {
    /// Process every EDF in this directory; its single TSV is the rename map
    #[arg(long, conflicts_with_all = ["glob", "files"])]
    pub dir: Option<String>,

    /// Glob pattern for input files (e.g. "data/*.edf")
    #[arg(long, conflicts_with = "files")]
    pub glob: Option<String>,

    /// Explicit list of input files
    #[arg(long, num_args = 1..)]
    pub files: Option<Vec<String>>,

    /// Output directory (default: input directory with --dir, else current)
    #[arg(long)]
    pub out_dir: Option<String>,

    /// Rename TSV; with --dir the directory's only TSV is used when omitted
    #[arg(long)]
    pub rename_tsv: Option<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Write the batch report as JSON to this file
    #[arg(long)]
    pub summary: Option<String>,

    /// List matching files without processing
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct DetectArgs {
    /// Input EDF file
    #[arg(long)]
    pub edf: String,

    #[arg(long)]
    pub rename_tsv: Option<String>,

    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Input EDF file
    #[arg(long)]
    pub edf: String,

    /// Pipeline configuration JSON to check
    #[arg(long)]
    pub config: Option<String>,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Parse a `[low, high]` pair collected by a two-value flag
pub fn parse_band(values: &[f64]) -> Result<(f64, f64), String> {
    match values {
        [low, high] if low.is_finite() && high.is_finite() && low < high => Ok((*low, *high)),
        [low, high] => Err(format!(
            "Invalid band {}-{} Hz: expected finite LOW < HIGH",
            low, high
        )),
        _ => Err(format!("Expected LOW HIGH, got {} values", values.len())),
    }
}
