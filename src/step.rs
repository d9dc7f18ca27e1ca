//! The processing step contract and ordered step chains.
//!
//! A [`ProcessingStep`] is invoked at four points of every archive's pipeline
//! pass. Steps are registered into a [`StepChain`]; the chain applies them in
//! registration order, threading the intermediate file (or entry name) from
//! one step into the next.
//!
//! # Example
//!
//! ```rust
//! use std::path::{Path, PathBuf};
//! use nestpack::{Ancestors, Metadata, ProcessingStep, Result, StepChain};
//!
//! struct Stamp;
//!
//! impl ProcessingStep for Stamp {
//!     fn name(&self) -> &str {
//!         "stamp"
//!     }
//!
//!     fn adjust_metadata(
//!         &self,
//!         _input: &Path,
//!         metadata: &mut Metadata,
//!         _ancestors: &Ancestors<'_>,
//!     ) -> Result<bool> {
//!         Ok(metadata.set("stamped", "true").as_deref() != Some("true"))
//!     }
//! }
//!
//! let chain = StepChain::new().with(Stamp);
//! assert_eq!(chain.names(), ["stamp"]);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use crate::Result;
use crate::metadata::{Ancestors, Metadata};

/// A pluggable transformation unit.
///
/// Every hook has an identity default, so implementations override only the
/// points they care about. Hooks must not depend on global state: the same
/// inputs produce the same outputs.
pub trait ProcessingStep: Send + Sync {
    /// Diagnostic label. Has no effect on behavior.
    fn name(&self) -> &str;

    /// Decides whether `entry_name` should be extracted and reprocessed as an
    /// archive of its own, and under which name it is written back.
    fn recursion_effect(&self, entry_name: &str) -> Option<String> {
        let _ = entry_name;
        None
    }

    /// Runs before entries are enumerated. Returns the file the rest of the
    /// pass works on, which may be `input` itself.
    fn pre_process(
        &self,
        input: &Path,
        work_dir: &Path,
        ancestors: &Ancestors<'_>,
    ) -> Result<PathBuf> {
        let _ = (work_dir, ancestors);
        Ok(input.to_path_buf())
    }

    /// Runs after recursion and rebuild, with the same chaining discipline as
    /// [`pre_process`](Self::pre_process).
    fn post_process(
        &self,
        input: &Path,
        work_dir: &Path,
        ancestors: &Ancestors<'_>,
    ) -> Result<PathBuf> {
        let _ = (work_dir, ancestors);
        Ok(input.to_path_buf())
    }

    /// May change the metadata record written back into the archive. Returning
    /// `true` forces a rewrite even when no entry was replaced.
    fn adjust_metadata(
        &self,
        input: &Path,
        metadata: &mut Metadata,
        ancestors: &Ancestors<'_>,
    ) -> Result<bool> {
        let _ = (input, metadata, ancestors);
        Ok(false)
    }
}

/// An ordered chain of processing steps.
#[derive(Default)]
pub struct StepChain {
    steps: Vec<Box<dyn ProcessingStep>>,
}

impl StepChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step, builder style.
    pub fn with(mut self, step: impl ProcessingStep + 'static) -> Self {
        self.push(step);
        self
    }

    /// Appends a step.
    pub fn push(&mut self, step: impl ProcessingStep + 'static) {
        self.steps.push(Box::new(step));
    }

    /// Appends an already boxed step.
    pub fn push_boxed(&mut self, step: Box<dyn ProcessingStep>) {
        self.steps.push(step);
    }

    /// Number of registered steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if no step is registered.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Diagnostic names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Composes the recursion effects of all steps, left to right.
    ///
    /// Each step sees the name produced so far. A step returning `None` keeps
    /// the current decision; the entry is recursed into if any step opted in.
    pub fn recursion_effect(&self, entry_name: &str) -> Option<String> {
        let mut current: Option<String> = None;
        for step in &self.steps {
            let name = current.as_deref().unwrap_or(entry_name);
            if let Some(renamed) = step.recursion_effect(name) {
                current = Some(renamed);
            }
        }
        current
    }

    /// Folds `pre_process` over the chain.
    pub fn pre_process(
        &self,
        input: &Path,
        work_dir: &Path,
        ancestors: &Ancestors<'_>,
    ) -> Result<PathBuf> {
        self.steps.iter().try_fold(input.to_path_buf(), |file, step| {
            log::debug!("pre_process '{}' on '{}'", step.name(), file.display());
            step.pre_process(&file, work_dir, ancestors)
        })
    }

    /// Folds `post_process` over the chain.
    pub fn post_process(
        &self,
        input: &Path,
        work_dir: &Path,
        ancestors: &Ancestors<'_>,
    ) -> Result<PathBuf> {
        self.steps.iter().try_fold(input.to_path_buf(), |file, step| {
            log::debug!("post_process '{}' on '{}'", step.name(), file.display());
            step.post_process(&file, work_dir, ancestors)
        })
    }

    /// Calls `adjust_metadata` on every step. Returns true if any step
    /// reported a change.
    pub fn adjust_metadata(
        &self,
        input: &Path,
        metadata: &mut Metadata,
        ancestors: &Ancestors<'_>,
    ) -> Result<bool> {
        let mut changed = false;
        for step in &self.steps {
            if step.adjust_metadata(input, metadata, ancestors)? {
                log::debug!("'{}' changed metadata of '{}'", step.name(), input.display());
                changed = true;
            }
        }
        Ok(changed)
    }
}

impl fmt::Debug for StepChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl FromIterator<Box<dyn ProcessingStep>> for StepChain {
    fn from_iter<I: IntoIterator<Item = Box<dyn ProcessingStep>>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}
