use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use faa_rs::Pipeline;
use std::path::Path;

pub fn execute(args: RunArgs) -> i32 {
    if let Err(msg) = params::validate_edf_path(&args.edf) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let config = match params::build_config(&args.pipeline) {
        Ok(c) => c,
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

    let pipeline = match Pipeline::new(config) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    if !args.quiet {
        eprintln!("Processing {}...", args.edf);
    }

    let outcome = match pipeline.process_file(
        Path::new(&args.edf),
        rename_map.as_ref(),
        Path::new(&args.out_dir),
    ) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if !args.quiet {
        let bad = &outcome.diagnostics.bad_channels;
        eprintln!(
            "  Bad channels: {}",
            if bad.is_empty() { "none".to_string() } else { bad.join(", ") }
        );
        eprintln!(
            "  Asymmetry ({} Hz, {} vs {}): {:.6}",
            outcome.row.band_hz,
            outcome.row.right_channel,
            outcome.row.left_channel,
            outcome.row.asymmetry
        );
        eprintln!("  Wrote {}", outcome.clean_edf.display());
        eprintln!("  Wrote {}", outcome.faa_csv.display());
    }

    if args.json {
        if let Err(e) = output::emit(&outcome, false, None) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    exit_codes::SUCCESS
}
