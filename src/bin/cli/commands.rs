//! Command implementations for the CLI tool.

use std::fs;
use std::path::{Path, PathBuf};

use nestpack::{BatchConfig, BatchExecutor};

use crate::OutputFormat;
use crate::exit_codes::{ExitCode, error_to_exit_code};
use crate::output::create_formatter;

/// Configuration for the process command.
pub struct ProcessConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub sign: Option<String>,
    pub condition: bool,
    pub all: bool,
    pub verbose: bool,
    pub filter: String,
    pub extension: String,
    pub exclude_sign: Vec<String>,
    pub exclude_sign_file: Option<PathBuf>,
    pub format: OutputFormat,
    pub quiet: bool,
}

/// Process command implementation
pub fn process(config: &ProcessConfig) -> ExitCode {
    let formatter = create_formatter(config.format, config.verbose);

    let mut exclusions = config.exclude_sign.clone();
    if let Some(list) = &config.exclude_sign_file {
        match read_exclusion_list(list) {
            Ok(entries) => exclusions.extend(entries),
            Err(e) => {
                eprintln!("Error reading {}: {}", list.display(), e);
                return ExitCode::IoError;
            }
        }
    }

    let mut batch = BatchConfig::new(&config.input, &config.output)
        .condition(config.condition)
        .process_all(config.all)
        .verbose(config.verbose)
        .filter(config.filter.as_str())
        .package_extension(config.extension.as_str())
        .sign_exclusions(exclusions);
    if let Some(command) = &config.sign {
        batch = batch.sign_command(command.as_str());
    }

    let executor = match BatchExecutor::new(batch) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };

    if let Err(e) = fs::create_dir_all(&config.output) {
        eprintln!("Error creating output directory: {}", e);
        return ExitCode::IoError;
    }

    let report = match run(&executor) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error_to_exit_code(&e);
        }
    };

    if !config.quiet {
        print!("{}", formatter.format_report(&report));
    }

    if report.is_success() {
        ExitCode::Success
    } else {
        ExitCode::Warning
    }
}

/// Inspect command implementation
pub fn inspect(archive_path: &Path, format: OutputFormat) -> ExitCode {
    let formatter = create_formatter(format, false);

    match nestpack::inspect(archive_path) {
        Ok(summary) => {
            print!("{}", formatter.format_summary(&summary));
            ExitCode::Success
        }
        Err(e) => {
            eprintln!("Error inspecting archive: {}", e);
            error_to_exit_code(&e)
        }
    }
}

#[cfg(feature = "parallel")]
fn run(executor: &BatchExecutor) -> nestpack::Result<nestpack::BatchReport> {
    executor.run_parallel()
}

#[cfg(not(feature = "parallel"))]
fn run(executor: &BatchExecutor) -> nestpack::Result<nestpack::BatchReport> {
    executor.run()
}

/// Reads root-relative paths, one per line. Blank lines and lines starting
/// with `#` are ignored; backslashes are turned into forward slashes.
fn read_exclusion_list(path: &Path) -> std::io::Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.replace('\\', "/"))
        .collect())
}
