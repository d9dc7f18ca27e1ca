//! Batch processing of a file or directory tree.
//!
//! [`BatchExecutor`] discovers every package archive below a root, builds the
//! step chain each one needs and runs it through an [`ArchiveProcessor`]. A
//! failure in one file is recorded in the [`BatchReport`] and never stops the
//! rest of the batch.
//!
//! # Example
//!
//! ```rust,no_run
//! use nestpack::{BatchConfig, BatchExecutor};
//!
//! fn main() -> nestpack::Result<()> {
//!     let config = BatchConfig::new("plugins/", "signed/")
//!         .sign_command("jarsigner -keystore release.jks")
//!         .exclude_from_signing("third-party/vendor.pkg");
//!
//!     let report = BatchExecutor::new(config)?.run()?;
//!     for failure in &report.failed {
//!         eprintln!("{}: {}", failure.relative_path, failure.error);
//!     }
//!     Ok(())
//! }
//! ```

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use glob::{MatchOptions, Pattern};
use walkdir::WalkDir;

use crate::processor::{ArchiveProcessor, ProcessOptions, ProcessReport};
use crate::step::StepChain;
use crate::steps::{ConditionStep, SignStep};
use crate::temp::TEMP_PREFIX;
use crate::{DEFAULT_PACKAGE_EXTENSION, Error, Result, flat};

/// Extension of flat multi-archive containers.
const CONTAINER_EXTENSION: &str = "zip";

/// Configuration of a batch run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// A single archive, a flat container, or a directory to walk.
    pub input: PathBuf,
    /// Where changed archives are written, mirroring the input layout.
    pub output_dir: PathBuf,
    /// External signing command; enables the sign step when set.
    pub sign_command: Option<String>,
    /// Add the conditioning step. Implies processing unmarked archives.
    pub condition: bool,
    /// Log per-file failures and per-archive progress.
    pub verbose: bool,
    /// Process archives without the conditioning marker.
    pub process_all: bool,
    /// Glob matched against file names to select archives.
    pub filter: String,
    /// Extension of nested packages the steps recurse into.
    pub package_extension: String,
    /// Root-relative paths (forward slashes) that must not be signed.
    pub sign_exclusions: BTreeSet<String>,
}

impl BatchConfig {
    /// Creates a configuration with no steps and the default filter.
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            sign_command: None,
            condition: false,
            verbose: false,
            process_all: false,
            filter: format!("*.{}", DEFAULT_PACKAGE_EXTENSION),
            package_extension: DEFAULT_PACKAGE_EXTENSION.to_string(),
            sign_exclusions: BTreeSet::new(),
        }
    }

    /// Enables signing with the given command.
    pub fn sign_command(mut self, command: impl Into<String>) -> Self {
        self.sign_command = Some(command.into());
        self
    }

    /// Enables the conditioning step.
    pub fn condition(mut self, condition: bool) -> Self {
        self.condition = condition;
        self
    }

    /// Sets verbose logging.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Sets whether unmarked archives are processed.
    pub fn process_all(mut self, process_all: bool) -> Self {
        self.process_all = process_all;
        self
    }

    /// Sets the file name glob.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the nested package extension.
    pub fn package_extension(mut self, extension: impl Into<String>) -> Self {
        self.package_extension = extension.into();
        self
    }

    /// Adds a root-relative path to the signing exclusions.
    pub fn exclude_from_signing(mut self, relative_path: impl Into<String>) -> Self {
        self.sign_exclusions.insert(relative_path.into());
        self
    }

    /// Replaces the signing exclusions.
    pub fn sign_exclusions(mut self, exclusions: impl IntoIterator<Item = String>) -> Self {
        self.sign_exclusions = exclusions.into_iter().collect();
        self
    }
}

/// A file that went through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessedFile {
    /// Path relative to the batch root (an entry name for flat containers).
    pub relative_path: String,
    /// The resulting file.
    pub output: PathBuf,
    /// True if the pipeline produced a new file.
    pub changed: bool,
    /// Counters over the file's recursion.
    pub report: ProcessReport,
}

/// A file whose processing failed.
#[derive(Debug, Clone)]
pub struct FailedFile {
    /// Path relative to the batch root.
    pub relative_path: String,
    /// The error, rendered for display.
    pub error: String,
}

/// Outcome of a batch run.
#[must_use = "batch report should be checked for failed files"]
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Files processed successfully, in walk order.
    pub processed: Vec<ProcessedFile>,
    /// Files that failed.
    pub failed: Vec<FailedFile>,
}

impl BatchReport {
    /// Returns true if no file failed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of files for which a new output was written.
    pub fn changed_count(&self) -> usize {
        self.processed.iter().filter(|p| p.changed).count()
    }
}

/// Drives the pipeline over every qualifying file below a root.
#[derive(Debug)]
pub struct BatchExecutor {
    config: BatchConfig,
    filter: Pattern,
    sign_step: Option<SignStep>,
}

impl BatchExecutor {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPattern`] for a bad filter and
    /// [`Error::StepFailed`] for an empty signing command.
    pub fn new(config: BatchConfig) -> Result<Self> {
        let filter = Pattern::new(&config.filter).map_err(|e| Error::InvalidPattern {
            pattern: config.filter.clone(),
            reason: e.to_string(),
        })?;
        let sign_step = config
            .sign_command
            .as_deref()
            .map(|command| {
                SignStep::new(command).map(|s| s.with_extension(config.package_extension.as_str()))
            })
            .transpose()?;
        Ok(Self {
            config,
            filter,
            sign_step,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Builds the step chain for the file at `relative_path`.
    pub fn chain_for(&self, relative_path: &str) -> StepChain {
        let mut chain = StepChain::new();
        if self.config.condition {
            chain.push(ConditionStep::with_extension(self.config.package_extension.as_str()));
        }
        if let Some(sign) = &self.sign_step {
            if self.config.sign_exclusions.contains(relative_path) {
                log::debug!("'{}' is excluded from signing", relative_path);
            } else {
                chain.push(sign.clone());
            }
        }
        chain
    }

    /// Returns true if the file name of `path` matches the filter.
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| self.matches_name(&name.to_string_lossy()))
    }

    pub(crate) fn matches_name(&self, name: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        self.filter.matches_with(name, options)
    }

    /// Runs the batch sequentially.
    ///
    /// # Errors
    ///
    /// Only a missing input or a failure of the flat-container handler itself
    /// is returned as an error. Per-file failures end up in
    /// [`BatchReport::failed`].
    pub fn run(&self) -> Result<BatchReport> {
        let input = &self.config.input;
        if !input.exists() {
            return Err(Error::InputNotFound(input.clone()));
        }

        if input.is_file() {
            if self.is_flat_container(input) {
                return flat::process_container(self, input);
            }
            let mut report = BatchReport::default();
            if self.matches(input) {
                let relative = input
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let result = self.process_file(input, &relative, &self.config.output_dir);
                self.record(&mut report, relative, result);
            }
            return Ok(report);
        }

        let mut report = BatchReport::default();
        for (path, relative) in self.collect_candidates(&mut report) {
            let output_dir = self.output_dir_for(&relative);
            let result = self.process_file(&path, &relative, &output_dir);
            self.record(&mut report, relative, result);
        }
        Ok(report)
    }

    /// Runs the batch with top-level files processed in parallel.
    ///
    /// Results are reported in walk order, as with [`run`](Self::run).
    #[cfg(feature = "parallel")]
    pub fn run_parallel(&self) -> Result<BatchReport> {
        use rayon::prelude::*;

        if !self.config.input.is_dir() {
            return self.run();
        }

        let mut report = BatchReport::default();
        let candidates = self.collect_candidates(&mut report);
        let results: Vec<_> = candidates
            .par_iter()
            .map(|(path, relative)| {
                let output_dir = self.output_dir_for(relative);
                (relative.clone(), self.process_file(path, relative, &output_dir))
            })
            .collect();

        for (relative, result) in results {
            self.record(&mut report, relative, result);
        }
        Ok(report)
    }

    /// Runs one file through a freshly built processor.
    pub(crate) fn process_file(
        &self,
        input: &Path,
        relative_path: &str,
        output_dir: &Path,
    ) -> Result<ProcessedFile> {
        let options = ProcessOptions::new()
            .process_all(self.config.process_all || self.config.condition)
            .verbose(self.config.verbose);
        let processor = ArchiveProcessor::new(self.chain_for(relative_path)).with_options(options);
        let outcome = processor.process_with_report(input, output_dir)?;
        Ok(ProcessedFile {
            relative_path: relative_path.to_string(),
            output: outcome.path,
            changed: outcome.changed,
            report: outcome.report,
        })
    }

    pub(crate) fn record(
        &self,
        report: &mut BatchReport,
        relative_path: String,
        result: Result<ProcessedFile>,
    ) {
        match result {
            Ok(processed) => report.processed.push(processed),
            Err(e) => {
                if self.config.verbose {
                    log::warn!("Failed to process '{}': {}", relative_path, e);
                }
                report.failed.push(FailedFile {
                    relative_path,
                    error: e.to_string(),
                });
            }
        }
    }

    fn is_flat_container(&self, path: &Path) -> bool {
        let is_zip = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CONTAINER_EXTENSION));
        is_zip && !self.matches(path)
    }

    /// Walks the input directory, returning matching files with their
    /// root-relative paths. The list is complete before anything is written,
    /// so outputs never feed back into the walk.
    fn collect_candidates(&self, report: &mut BatchReport) -> Vec<(PathBuf, String)> {
        let root = &self.config.input;
        let output_dir = &self.config.output_dir;
        let skip_output = output_dir != root;

        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                let leftover = entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX);
                !leftover && !(skip_output && entry.path() == output_dir)
            });

        let mut candidates = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    let relative = e
                        .path()
                        .map(|p| relative_path(root, p))
                        .unwrap_or_default();
                    self.record(report, relative, Err(Error::Io(e.into())));
                    continue;
                }
            };
            if entry.file_type().is_file() && self.matches(entry.path()) {
                let relative = relative_path(root, entry.path());
                candidates.push((entry.into_path(), relative));
            }
        }
        candidates
    }

    /// Output directory for a file, mirroring its position below the root.
    fn output_dir_for(&self, relative_path: &str) -> PathBuf {
        match relative_path.rsplit_once('/') {
            Some((parent, _)) => self.config.output_dir.join(parent),
            None => self.config.output_dir.clone(),
        }
    }
}

/// `path` relative to `root`, with forward slashes.
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
