//! Batch compilation driver.
//!
//! Finds `.rwc` sources, compiles each to a `.js` program with the same stem,
//! and writes it either alongside the input or under a chosen output
//! directory. Directory batches run in parallel; a failing file is logged and
//! does not abort the rest of the batch.

use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::cache::IncrementalCache;
use crate::emit;
use crate::error::{CompileError, E_IO};

pub struct BatchOutcome {
    pub written: Vec<PathBuf>,
    pub failures: Vec<(PathBuf, CompileError)>,
}

/// Recursively find all .rwc files under a directory.
pub fn find_rwc_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true).into_iter().flatten() {
        let path = entry.path();
        if path.is_file() && path.extension().map(|ext| ext == "rwc").unwrap_or(false) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}

/// `<stem>.js`, under the output directory when one is given, otherwise next
/// to the input.
pub fn output_path(input: &Path, out_dir: Option<&Path>) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "component".to_string());
    let file_name = format!("{}.js", stem);
    match out_dir {
        Some(dir) => dir.join(file_name),
        None => input.with_file_name(file_name),
    }
}

fn io_error(message: String, file: &Path) -> CompileError {
    CompileError::new(E_IO, &message, &file.to_string_lossy(), 1, 1)
}

/// Compile one source file and write its program; returns the output path.
pub fn compile_file(
    input: &Path,
    out_dir: Option<&Path>,
    cache: Option<&IncrementalCache>,
) -> Result<PathBuf, CompileError> {
    let source =
        fs::read_to_string(input).map_err(|e| io_error(format!("failed to read: {}", e), input))?;
    let input_str = input.to_string_lossy().to_string();

    let program = match cache.and_then(|c| c.get(&input_str, &source)) {
        Some(cached) => cached,
        None => {
            let program = emit::compile(&source, &input_str)?;
            if let Some(cache) = cache {
                cache.set(&input_str, &source, &program);
            }
            program
        }
    };

    let out = output_path(input, out_dir);
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| io_error(format!("failed to create output dir: {}", e), &out))?;
    }
    fs::write(&out, program).map_err(|e| io_error(format!("failed to write: {}", e), &out))?;
    Ok(out)
}

/// Compile every .rwc file under a directory, in parallel.
pub fn compile_directory(
    dir: &Path,
    out_dir: Option<&Path>,
    cache: Option<&IncrementalCache>,
) -> BatchOutcome {
    let files = find_rwc_files(dir);
    let results: Vec<(PathBuf, Result<PathBuf, CompileError>)> = files
        .par_iter()
        .map(|input| (input.clone(), compile_file(input, out_dir, cache)))
        .collect();

    let mut outcome = BatchOutcome {
        written: Vec::new(),
        failures: Vec::new(),
    };
    for (input, result) in results {
        match result {
            Ok(out) => outcome.written.push(out),
            Err(err) => {
                eprintln!("[rwc] {} failed: {}", input.display(), err);
                outcome.failures.push((input, err));
            }
        }
    }
    outcome
}
