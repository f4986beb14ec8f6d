use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use rwc_compiler::{compile_directory, compile_file, IncrementalCache};

/// Compile .rwc component sources into web-component programs.
#[derive(Parser)]
#[command(name = "rwcc", version)]
struct Cli {
    /// An .rwc file, or a directory scanned recursively for .rwc files
    input: PathBuf,

    /// Directory for generated .js files (default: alongside each input)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Recompile everything, ignoring the content-hash cache
    #[arg(long)]
    no_cache: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let cache = if cli.no_cache {
        None
    } else {
        Some(IncrementalCache::new())
    };

    if cli.input.is_dir() {
        let outcome = compile_directory(&cli.input, cli.out_dir.as_deref(), cache.as_ref());
        eprintln!(
            "[rwc] compiled {} component(s), {} failure(s)",
            outcome.written.len(),
            outcome.failures.len()
        );
        if outcome.failures.is_empty() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    } else {
        match compile_file(&cli.input, cli.out_dir.as_deref(), cache.as_ref()) {
            Ok(out) => {
                eprintln!("[rwc] wrote {}", out.display());
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("[rwc] {}", err);
                ExitCode::FAILURE
            }
        }
    }
}
