//! The recursive archive pipeline.
//!
//! [`ArchiveProcessor::process`] runs one archive through its full pass:
//!
//! 1. skip archives that are not marked as conditioned (unless
//!    [`ProcessOptions::process_all`] is set) or that exclude themselves;
//! 2. fold the steps' `pre_process` hooks;
//! 3. read the metadata record;
//! 4. extract every entry some step wants to recurse into and run the same
//!    pass on it, unless the record excludes children;
//! 5. fold `adjust_metadata`;
//! 6. rebuild the archive if entries were replaced or metadata changed;
//! 7. fold `post_process`;
//! 8. normalize entry timestamps;
//! 9. move the result next to the caller's other outputs and restore the
//!    input's modification time.
//!
//! Every call owns a [`ScopedTempDir`] that is removed however the call ends.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use filetime::FileTime;

use crate::archive::{self, EntrySource, FileArchive, Replacement};
use crate::metadata::{Ancestors, Metadata, keys};
use crate::step::StepChain;
use crate::temp::ScopedTempDir;
use crate::{Error, Result};

/// Options controlling which archives are processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Process archives even if they lack the conditioning marker.
    pub process_all: bool,
    /// Log per-archive progress at `info` level instead of `debug`.
    pub verbose: bool,
}

impl ProcessOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether unmarked archives are processed.
    pub fn process_all(mut self, process_all: bool) -> Self {
        self.process_all = process_all;
        self
    }

    /// Sets verbose logging.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Counters collected over one top-level call, nested archives included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Archives that went through the full pass.
    pub archives_processed: usize,
    /// Archives returned untouched by the marker/exclusion check.
    pub archives_skipped: usize,
    /// Entries extracted and recursed into.
    pub entries_recursed: usize,
    /// Entries whose bytes were substituted during rebuild.
    pub entries_replaced: usize,
    /// Entries that kept their original bytes because the replacement was
    /// missing.
    pub entries_fell_back: usize,
    /// Entries that could not be read and were left untouched.
    pub entries_unreadable: usize,
    /// Archives whose metadata record was rewritten.
    pub metadata_rewrites: usize,
    /// Working files that were not archives and skipped normalization.
    pub normalizations_skipped: usize,
    /// Entries normalization could not decode and copied with their original
    /// bytes.
    pub entries_copied_raw: usize,
}

/// Result of a top-level call.
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// The resulting file: the input itself when nothing changed, otherwise a
    /// file in the output directory with the input's name.
    pub path: PathBuf,
    /// True if a new file was written to `path`.
    pub changed: bool,
    /// Counters over the whole recursion.
    pub report: ProcessReport,
}

/// State threaded through one recursion.
///
/// The ancestor stack holds one record per enclosing archive, so its length
/// is the current nesting level.
struct ProcessContext {
    ancestors: Vec<Metadata>,
    report: ProcessReport,
    top_level_written: bool,
}

impl ProcessContext {
    fn new() -> Self {
        Self {
            ancestors: Vec::new(),
            report: ProcessReport::default(),
            top_level_written: false,
        }
    }

    /// Depth of the archive being processed, 1 for a top-level archive.
    fn depth(&self) -> usize {
        self.ancestors.len() + 1
    }

    fn ancestors(&self) -> Ancestors<'_> {
        Ancestors::new(&self.ancestors)
    }

    /// Runs `f` one level deeper, with `metadata` as the innermost ancestor.
    /// The record is popped again whatever `f` returns.
    fn descend<T>(&mut self, metadata: Metadata, f: impl FnOnce(&mut Self) -> T) -> T {
        self.ancestors.push(metadata);
        let result = f(self);
        self.ancestors.pop();
        result
    }
}

/// Runs a step chain over an archive and all archives nested inside it.
#[derive(Debug)]
pub struct ArchiveProcessor {
    steps: StepChain,
    options: ProcessOptions,
}

impl ArchiveProcessor {
    /// Creates a processor for the given chain with default options.
    pub fn new(steps: StepChain) -> Self {
        Self {
            steps,
            options: ProcessOptions::default(),
        }
    }

    /// Sets the processing options.
    pub fn with_options(mut self, options: ProcessOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the step chain.
    pub fn steps(&self) -> &StepChain {
        &self.steps
    }

    /// Returns the processing options.
    pub fn options(&self) -> ProcessOptions {
        self.options
    }

    /// Processes `input`, placing a changed result in `output_dir`.
    ///
    /// Returns `input` itself if the archive was not processed.
    pub fn process(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<PathBuf> {
        self.process_with_report(input, output_dir).map(|o| o.path)
    }

    /// Like [`process`](Self::process), also returning counters over the
    /// whole recursion.
    pub fn process_with_report(
        &self,
        input: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<ProcessOutcome> {
        let input = input.as_ref();
        let mut ctx = ProcessContext::new();
        let path = self.process_archive(input, output_dir.as_ref(), &mut ctx)?;
        Ok(ProcessOutcome {
            changed: ctx.top_level_written,
            path,
            report: ctx.report,
        })
    }

    fn process_archive(
        &self,
        input: &Path,
        output_dir: &Path,
        ctx: &mut ProcessContext,
    ) -> Result<PathBuf> {
        let depth = ctx.depth();
        let original_mtime = FileTime::from_last_modification_time(&fs::metadata(input)?);

        if !self.should_process(input)? {
            log::debug!("[{}] Skipping unmarked archive '{}'", depth, input.display());
            ctx.report.archives_skipped += 1;
            return Ok(input.to_path_buf());
        }
        self.log_progress(format_args!("[{}] Processing '{}'", depth, input.display()));
        ctx.report.archives_processed += 1;

        let mut temp = ScopedTempDir::new(output_dir, depth);

        let mut working = input.to_path_buf();
        if !self.steps.is_empty() {
            working = self.steps.pre_process(&working, temp.path()?, &ctx.ancestors())?;
        }

        let mut archive = archive::open(&working)?;
        let mut metadata = archive::read_metadata(&mut archive)?.unwrap_or_default();

        let mut replacements = BTreeMap::new();
        if metadata.is_flag_set(keys::EXCLUDE_CHILDREN) {
            log::debug!("[{}] '{}' excludes its children", depth, working.display());
        } else {
            self.scan_entries(&mut archive, &metadata, &mut temp, &mut replacements, ctx)?;
        }
        drop(archive);

        let metadata_changed = self
            .steps
            .adjust_metadata(&working, &mut metadata, &ctx.ancestors())?;

        if !replacements.is_empty() || metadata_changed {
            let rebuilt = temp
                .path()?
                .join(format!("rebuilt-{}", file_name(input)?.to_string_lossy()));
            let outcome = archive::rebuild(
                &working,
                &rebuilt,
                &replacements,
                metadata_changed.then_some(&metadata),
            )?;
            ctx.report.entries_replaced += outcome.count(EntrySource::Replaced);
            ctx.report.entries_fell_back += outcome.count(EntrySource::FellBack);
            ctx.report.metadata_rewrites += usize::from(outcome.count(EntrySource::Metadata) > 0);
            working = rebuilt;
        }

        if !self.steps.is_empty() {
            working = self.steps.post_process(&working, temp.path()?, &ctx.ancestors())?;
        }

        let normalized = temp
            .path()?
            .join(format!("normalized-{}", file_name(input)?.to_string_lossy()));
        match archive::normalize(&working, &normalized)? {
            Some(copied_raw) => {
                ctx.report.entries_copied_raw += copied_raw;
                working = normalized;
            }
            None => ctx.report.normalizations_skipped += 1,
        }

        if working == input {
            return Ok(working);
        }

        fs::create_dir_all(output_dir)?;
        let dest = output_dir.join(file_name(input)?);
        move_file(&working, &dest)?;
        filetime::set_file_mtime(&dest, original_mtime)?;
        ctx.top_level_written |= depth == 1;
        log::debug!("[{}] Wrote '{}'", depth, dest.display());
        Ok(dest)
    }

    /// Checks the marker and exclusion flags of an archive on disk.
    fn should_process(&self, input: &Path) -> Result<bool> {
        let Some(mut archive) = archive::try_open(input)? else {
            return Ok(false);
        };
        let metadata = archive::read_metadata(&mut archive)?.unwrap_or_default();
        if metadata.is_flag_set(keys::EXCLUDE) {
            return Ok(false);
        }
        Ok(self.options.process_all || metadata.is_flag_set(keys::CONDITIONED))
    }

    /// Extracts and recursively processes every entry the chain selects,
    /// recording changed results in `replacements`.
    fn scan_entries(
        &self,
        archive: &mut FileArchive,
        metadata: &Metadata,
        temp: &mut ScopedTempDir,
        replacements: &mut BTreeMap<String, Replacement>,
        ctx: &mut ProcessContext,
    ) -> Result<()> {
        for index in 0..archive.len() {
            let name = match archive::entry_name(archive, index) {
                Ok(name) => name,
                Err(e) => {
                    log::warn!("Skipping unreadable entry #{}: {}", index, e);
                    ctx.report.entries_unreadable += 1;
                    continue;
                }
            };
            if name.ends_with('/') {
                continue;
            }
            let Some(new_name) = self.steps.recursion_effect(&name) else {
                continue;
            };

            let data = match archive::read_entry(archive, index) {
                Ok(data) => data,
                Err(e) => {
                    log::warn!("Leaving unreadable entry '{}' untouched: {}", name, e);
                    ctx.report.entries_unreadable += 1;
                    continue;
                }
            };

            // one slot per entry keeps equal base names apart
            let slot = temp.path()?.join(index.to_string());
            let extracted = slot.join("in").join(base_name(&name));
            archive::write_entry(&data, &extracted)?;
            drop(data);
            ctx.report.entries_recursed += 1;

            let result = ctx.descend(metadata.clone(), |ctx| {
                self.process_archive(&extracted, &slot, ctx)
            })?;

            let content_changed = result != extracted;
            if content_changed || new_name != name {
                log::debug!("Entry '{}' will be replaced by '{}'", name, new_name);
                replacements.insert(
                    name,
                    Replacement {
                        name: new_name,
                        source: result,
                    },
                );
            }
            if content_changed {
                remove_if_exists(&extracted)?;
            }
        }
        Ok(())
    }

    fn log_progress(&self, message: std::fmt::Arguments<'_>) {
        if self.options.verbose {
            log::info!("{}", message);
        } else {
            log::debug!("{}", message);
        }
    }
}

fn file_name(path: &Path) -> Result<&std::ffi::OsStr> {
    path.file_name().ok_or_else(|| Error::InvalidArchive {
        path: path.to_path_buf(),
        reason: "path has no file name".into(),
    })
}

/// Last segment of an entry name.
pub(crate) fn base_name(entry_name: &str) -> &str {
    entry_name.rsplit('/').next().unwrap_or(entry_name)
}

/// Renames `from` to `to`, copying when the rename crosses filesystems.
pub(crate) fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    fs::copy(from, to)?;
    remove_if_exists(from)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
