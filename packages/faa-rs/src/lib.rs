pub mod types;
pub mod error;
pub mod stats;
pub mod spectral;
pub mod criteria;
pub mod detector;
pub mod asymmetry;
pub mod config;
pub mod montage;
pub mod filters;
pub mod interpolate;
pub mod edf;
pub mod channels;
pub mod output;
pub mod pipeline;
pub mod profiling;

pub use types::*;
pub use error::{FAAError, Result};
pub use detector::{
    BadChannelDetector, ChannelQuality, ChannelQualityReport, Criterion, DetectionBands,
    DetectionMethod, DetectionThresholds,
};
pub use asymmetry::AsymmetryCalculator;
pub use config::PipelineConfig;
pub use channels::{load_rename_map, RenameMap};
pub use output::{FAARow, Condition};
pub use pipeline::{run_batch, BatchItemOutcome, BatchReport, Pipeline};
