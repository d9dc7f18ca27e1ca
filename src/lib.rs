//! # nestpack
//!
//! A recursive transformation pipeline for ZIP package archives.
//!
//! The crate applies an ordered chain of [`ProcessingStep`]s to a package
//! archive and, transparently, to every package nested inside it. The output
//! is byte-identical to the input except where a step deliberately changed
//! something and where normalization fixed entry timestamps.
//!
//! ## Quick Start
//!
//! ### Processing a Single Archive
//!
//! ```rust,no_run
//! use nestpack::{ArchiveProcessor, ProcessOptions, Result, StepChain};
//! use nestpack::steps::{ConditionStep, SignStep};
//!
//! fn main() -> Result<()> {
//!     let chain = StepChain::new()
//!         .with(ConditionStep::new())
//!         .with(SignStep::new("jarsigner -keystore release.jks")?);
//!
//!     let processor = ArchiveProcessor::new(chain)
//!         .with_options(ProcessOptions::new().process_all(true));
//!
//!     let output = processor.process("app.pkg", "out/")?;
//!     println!("Wrote {}", output.display());
//!     Ok(())
//! }
//! ```
//!
//! ### Processing a Directory Tree
//!
//! ```rust,no_run
//! use nestpack::{BatchConfig, BatchExecutor, Result};
//!
//! fn main() -> Result<()> {
//!     let config = BatchConfig::new("plugins/", "out/").condition(true);
//!     let report = BatchExecutor::new(config)?.run()?;
//!     println!(
//!         "{} processed, {} changed, {} failed",
//!         report.processed.len(),
//!         report.changed_count(),
//!         report.failed.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Pipeline
//!
//! Each archive goes through the following stages (see [`processor`]):
//!
//! | Stage | What happens |
//! |-------|--------------|
//! | marker check | unmarked or excluded archives are returned untouched |
//! | pre-process | `pre_process` hooks, folded over the chain |
//! | scan | entries selected by `recursion_effect` are extracted and processed recursively |
//! | metadata | `adjust_metadata` hooks may change the [`Metadata`] record |
//! | rebuild | replaced entries and changed metadata are written into a new archive |
//! | post-process | `post_process` hooks, folded over the chain |
//! | normalize | every entry is rewritten with the ZIP epoch as timestamp |
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `parallel` | [`BatchExecutor::run_parallel`] via rayon |
//! | `cli` | the `nestpack` command-line tool |

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod archive;
pub mod batch;
pub mod error;
pub mod metadata;
pub mod processor;
pub mod step;
pub mod steps;
pub mod timestamp;

mod flat;
mod temp;

pub use archive::{ArchiveSummary, EntrySource, RebuildOutcome, Replacement, inspect};
pub use batch::{BatchConfig, BatchExecutor, BatchReport, FailedFile, ProcessedFile};
pub use error::{Error, Result};
pub use metadata::{Ancestors, METADATA_ENTRY, Metadata};
pub use processor::{ArchiveProcessor, ProcessOptions, ProcessOutcome, ProcessReport};
pub use step::{ProcessingStep, StepChain};
pub use temp::TEMP_PREFIX;

/// Extension of package archives, used by the default file filter and by the
/// built-in steps to recognize nested packages.
pub const DEFAULT_PACKAGE_EXTENSION: &str = "pkg";
