use thiserror::Error;

#[derive(Error, Debug)]
pub enum FAAError {
    #[error("Missing required channels: {}", .0.join(", "))]
    MissingChannels(Vec<String>),

    #[error("No frequency bins between {low} Hz and {high} Hz")]
    EmptyBand { low: f64, high: f64 },

    #[error("Non-positive band power on channel {0}; log power is undefined")]
    DegeneratePower(String),

    #[error("Invalid recording: {0}")]
    InvalidRecording(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Interpolation failed: {0}")]
    Interpolation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FAAError>;
