//! Marks archives as conditioned.

use std::path::Path;

use crate::metadata::{Ancestors, Metadata, keys};
use crate::step::ProcessingStep;
use crate::{DEFAULT_PACKAGE_EXTENSION, Result};

use super::nested_package_effect;

/// Sets the conditioning marker in the metadata record of every archive it
/// visits, nested packages included.
///
/// Archives that already carry the marker are left as they are, so running
/// the step twice reports no change the second time.
#[derive(Debug, Clone)]
pub struct ConditionStep {
    extension: String,
}

impl ConditionStep {
    /// Creates a step recursing into entries with the default package
    /// extension.
    pub fn new() -> Self {
        Self::with_extension(DEFAULT_PACKAGE_EXTENSION)
    }

    /// Creates a step recursing into entries with the given extension.
    pub fn with_extension(extension: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
        }
    }
}

impl Default for ConditionStep {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessingStep for ConditionStep {
    fn name(&self) -> &str {
        "condition"
    }

    fn recursion_effect(&self, entry_name: &str) -> Option<String> {
        nested_package_effect(entry_name, &self.extension)
    }

    fn adjust_metadata(
        &self,
        _input: &Path,
        metadata: &mut Metadata,
        _ancestors: &Ancestors<'_>,
    ) -> Result<bool> {
        if metadata.is_flag_set(keys::CONDITIONED) {
            return Ok(false);
        }
        metadata.set(keys::CONDITIONED, "true");
        Ok(true)
    }
}
