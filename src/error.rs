//! Error types for pipeline operations.
//!
//! This module provides the [`Error`] enum which represents all failure modes
//! of the pipeline, along with a convenient [`Result<T>`] type alias.
//!
//! # Recoverable conditions are not errors
//!
//! Several conditions the pipeline meets routinely are *not* reported through
//! [`Error`]:
//!
//! - an entry whose content cannot be read is left untouched and logged;
//! - a replacement file that disappeared before the rebuild falls back to the
//!   original entry bytes (see [`EntrySource`](crate::EntrySource));
//! - a working file that is not a ZIP archive skips normalization.
//!
//! Everything else propagates to the caller of
//! [`ArchiveProcessor::process`](crate::ArchiveProcessor::process). The
//! [`BatchExecutor`](crate::BatchExecutor) catches these per file.
//!
//! ```rust
//! use nestpack::Error;
//!
//! fn describe(error: &Error) -> String {
//!     match error {
//!         Error::Io(e) => format!("file error: {}", e),
//!         Error::CommandFailed { command, .. } => format!("'{}' failed", command),
//!         _ => error.to_string(),
//!     }
//! }
//! ```

use std::io;
use std::path::PathBuf;

/// The main error type for pipeline operations.
///
/// | Category | Variants |
/// |----------|----------|
/// | I/O | [`Io`][Self::Io] |
/// | Format | [`Zip`][Self::Zip], [`InvalidArchive`][Self::InvalidArchive] |
/// | Steps | [`StepFailed`][Self::StepFailed], [`CommandFailed`][Self::CommandFailed] |
/// | Configuration | [`InvalidPattern`][Self::InvalidPattern], [`InputNotFound`][Self::InputNotFound] |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The ZIP layer rejected an archive or an entry.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// A file that must be an archive could not be read as one.
    #[error("Not a valid archive: {}: {reason}", .path.display())]
    InvalidArchive {
        /// The offending file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A processing step reported a failure.
    #[error("Step '{step}' failed: {reason}")]
    StepFailed {
        /// Diagnostic name of the step.
        step: String,
        /// A description of the failure.
        reason: String,
    },

    /// An external command exited unsuccessfully.
    #[error("Command '{command}' failed with {status}")]
    CommandFailed {
        /// The command line that was run.
        command: String,
        /// The exit status, rendered for display.
        status: String,
    },

    /// A file filter pattern could not be compiled.
    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The pattern as given.
        pattern: String,
        /// Parser message.
        reason: String,
    },

    /// The batch input path does not exist.
    #[error("Input not found: {}", .0.display())]
    InputNotFound(PathBuf),
}

/// A specialized Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
