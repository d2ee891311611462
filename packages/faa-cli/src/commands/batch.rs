use crate::cli::BatchArgs;
use crate::exit_codes;
use crate::output;
use crate::params;
use faa_rs::channels::{find_single_tsv, load_rename_map};
use faa_rs::{run_batch, Pipeline, RenameMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub fn execute(args: BatchArgs) -> i32 {
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No EDF files found");
        return exit_codes::INPUT_ERROR;
    }

    if args.dry_run {
        for f in &files {
            println!("{}", f.display());
        }
        if !args.quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
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

    let rename_map = match resolve_rename_map(&args) {
        Ok(m) => m,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    let out_dir = output_dir(&args);
    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        eprintln!(
            "Error: Failed to create output directory '{}': {}",
            out_dir.display(),
            e
        );
        return exit_codes::EXECUTION_ERROR;
    }

    let total = files.len();
    let start_time = Instant::now();
    let mut index = 0usize;
    let quiet = args.quiet;

    let items = files.iter().map(|f| (f.display().to_string(), f.as_path()));
    let report = run_batch(items, |path| {
        index += 1;
        if !quiet {
            eprintln!("[{}/{}] {}...", index, total, path.display());
        }
        let result = pipeline.process_file(path, rename_map.as_ref(), &out_dir);
        if let Err(ref e) = result {
            if !quiet {
                eprintln!("  Error: {}", e);
            }
        }
        result
    });

    if !args.quiet {
        eprintln!(
            "Batch complete: {}/{} succeeded, {}/{} failed, {:.1}s",
            report.succeeded,
            total,
            report.failed,
            total,
            start_time.elapsed().as_secs_f64()
        );
        for (source, reason) in report.failures() {
            eprintln!("  {}: {}", source, reason);
        }
    }

    if let Some(ref summary) = args.summary {
        if let Err(e) = output::emit(&report, false, Some(summary.as_str())) {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    if report.failed == 0 {
        exit_codes::SUCCESS
    } else if report.succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<PathBuf>, String> {
    if let Some(ref dir) = args.dir {
        resolve_dir(Path::new(dir))
    } else if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.iter().map(PathBuf::from).collect())
    } else {
        Err("One of --dir, --glob, or --files must be specified".to_string())
    }
}

fn is_edf(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("edf"))
            .unwrap_or(false)
}

/// EDF files directly inside `dir`, sorted by name
fn resolve_dir(dir: &Path) -> Result<Vec<PathBuf>, String> {
    if !dir.is_dir() {
        return Err(format!("Input directory not found: {}", dir.display()));
    }
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory '{}': {}", dir.display(), e))?;

    let mut files: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| is_edf(p))
        .collect();
    files.sort();
    Ok(files)
}

fn resolve_glob(pattern: &str) -> Result<Vec<PathBuf>, String> {
    let paths =
        glob::glob(pattern).map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => eprintln!("Warning: glob error: {}", e),
        }
    }
    files.sort();
    Ok(files)
}

/// An explicit `--rename-tsv` wins; with `--dir` the directory's single TSV
/// is mandatory.
fn resolve_rename_map(args: &BatchArgs) -> Result<Option<RenameMap>, String> {
    if args.rename_tsv.is_some() {
        return params::load_optional_rename_map(args.rename_tsv.as_deref());
    }
    match args.dir {
        Some(ref dir) => find_single_tsv(Path::new(dir))
            .and_then(|tsv| load_rename_map(&tsv))
            .map(Some)
            .map_err(|e| e.to_string()),
        None => Ok(None),
    }
}

fn output_dir(args: &BatchArgs) -> PathBuf {
    match (&args.out_dir, &args.dir) {
        (Some(out), _) => PathBuf::from(out),
        (None, Some(dir)) => PathBuf::from(dir),
        (None, None) => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::PipelineArgs;
    use std::fs;

    fn make_batch_args() -> BatchArgs {
        BatchArgs {
            dir: None,
            glob: None,
            files: None,
            out_dir: None,
            rename_tsv: None,
            pipeline: PipelineArgs::default(),
            summary: None,
            dry_run: false,
            quiet: true,
        }
    }

    #[test]
    fn test_resolve_files_no_input() {
        let result = resolve_files(&make_batch_args());
        assert!(result.unwrap_err().contains("must be specified"));
    }

    #[test]
    fn test_resolve_dir_sorted_edf_only() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("est002yc.edf"), "").unwrap();
        fs::write(tmp.path().join("est001yo.EDF"), "").unwrap();
        fs::write(tmp.path().join("rename.tsv"), "").unwrap();
        fs::create_dir(tmp.path().join("nested.edf")).unwrap();

        let files = resolve_dir(tmp.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["est001yo.EDF", "est002yc.edf"]);
    }

    #[test]
    fn test_resolve_dir_missing() {
        assert!(resolve_dir(Path::new("/nonexistent_dir_12345")).is_err());
    }

    #[test]
    fn test_dir_requires_single_tsv() {
        let tmp = tempfile::tempdir().unwrap();
        let mut args = make_batch_args();
        args.dir = Some(tmp.path().to_string_lossy().into_owned());
        assert!(resolve_rename_map(&args).unwrap_err().contains("No TSV"));

        fs::write(tmp.path().join("rename.tsv"), "EEG 1\tF3\n").unwrap();
        let map = resolve_rename_map(&args).unwrap().unwrap();
        assert_eq!(map.get("EEG 1"), Some("F3"));
    }

    #[test]
    fn test_glob_without_tsv_has_no_rename_map() {
        let mut args = make_batch_args();
        args.glob = Some("/nonexistent_dir_12345/*.edf".to_string());
        assert!(resolve_rename_map(&args).unwrap().is_none());
        assert!(resolve_files(&args).unwrap().is_empty());
    }

    #[test]
    fn test_output_dir_defaults() {
        let mut args = make_batch_args();
        assert_eq!(output_dir(&args), PathBuf::from("."));
        args.dir = Some("in".to_string());
        assert_eq!(output_dir(&args), PathBuf::from("in"));
        args.out_dir = Some("out".to_string());
        assert_eq!(output_dir(&args), PathBuf::from("out"));
    }
}
