use crate::cli::DetectArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use faa_rs::edf::load_recording;
use faa_rs::pipeline::{DetectionOutcome, StageDiagnostics};
use faa_rs::Pipeline;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct DetectOutput {
    file: String,
    #[serde(flatten)]
    detection: DetectionOutcome,
    diagnostics: StageDiagnostics,
}

pub fn execute(args: DetectArgs) -> i32 {
    if let Err(msg) = params::validate_edf_path(&args.edf) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let pipeline = match params::build_config(&args.pipeline)
        .and_then(|c| Pipeline::new(c).map_err(|e| e.to_string()))
    {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let rename_map = match params::load_optional_rename_map(args.rename_tsv.as_deref()) {
        Ok(m) => m,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let (_, mut recording) = match load_recording(Path::new(&args.edf)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let mut diagnostics = StageDiagnostics::default();
    let detection = match pipeline
        .preprocess(&mut recording, rename_map.as_ref(), &mut diagnostics)
        .and_then(|_| pipeline.detect(&recording))
    {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    diagnostics.bad_channels = detection.bad.clone();
    diagnostics.criterion_counts = detection.report.as_ref().map(|r| r.counts());

    let result = DetectOutput {
        file: args.edf.clone(),
        detection,
        diagnostics,
    };
    if let Err(e) = output::emit(&result, args.compact, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    exit_codes::SUCCESS
}
