use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use faa_rs::edf::EDFFile;
use faa_rs::PipelineConfig;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize, Default)]
struct ValidateOutput {
    file: String,
    exists: bool,
    supported: bool,
    edf_plus: Option<bool>,
    channels: Option<Vec<String>>,
    sampling_rate: Option<f64>,
    duration_secs: Option<f64>,
    start: Option<String>,
    config_valid: Option<bool>,
    errors: Vec<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let path = Path::new(&args.edf);
    let mut result = ValidateOutput {
        file: args.edf.clone(),
        exists: path.is_file(),
        ..Default::default()
    };

    match params::validate_edf_path(&args.edf) {
        Err(msg) => result.errors.push(msg),
        Ok(()) => {
            result.supported = true;
            match EDFFile::open(path).and_then(|edf| edf.to_recording().map(|rec| (edf, rec))) {
                Ok((edf, rec)) => {
                    result.edf_plus = Some(edf.header.is_edf_plus());
                    result.channels =
                        Some(rec.channel_names().into_iter().map(str::to_string).collect());
                    result.sampling_rate = Some(rec.sampling_rate());
                    result.duration_secs = Some(edf.duration_secs());
                    result.start = edf.header.start_datetime().map(|dt| dt.to_string());
                }
                Err(e) => result.errors.push(format!("Invalid EDF: {}", e)),
            }
        }
    }

    if let Some(ref config_path) = args.config {
        let checked = PipelineConfig::from_json_file(Path::new(config_path))
            .and_then(|c| c.validate());
        result.config_valid = Some(checked.is_ok());
        if let Err(e) = checked {
            result.errors.push(format!("Invalid config '{}': {}", config_path, e));
        }
    }

    if args.json {
        if let Err(e) = output::emit(&result, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    } else if !result.errors.is_empty() {
        for err in &result.errors {
            eprintln!("Error: {}", err);
        }
    } else {
        println!(
            "File '{}' is valid ({} channels at {} Hz, {:.1}s)",
            args.edf,
            result.channels.as_ref().map(Vec::len).unwrap_or(0),
            result.sampling_rate.unwrap_or(0.0),
            result.duration_secs.unwrap_or(0.0)
        );
    }

    if result.errors.is_empty() {
        exit_codes::SUCCESS
    } else {
        exit_codes::INPUT_ERROR
    }
}
