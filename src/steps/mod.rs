//! Built-in processing steps.
//!
//! - [`ConditionStep`] marks archives as prepared for processing.
//! - [`SignStep`] runs an external signing command on every archive.
//!
//! Both recurse into nested packages recognized by their file extension.

mod condition;
mod sign;

pub use condition::ConditionStep;
pub use sign::SignStep;

/// Recursion effect shared by the built-in steps: entries whose name ends
/// with `.{extension}` (ASCII case-insensitive) are reprocessed under their
/// own name.
pub fn nested_package_effect(entry_name: &str, extension: &str) -> Option<String> {
    let (_, ext) = entry_name.rsplit_once('.')?;
    if ext.eq_ignore_ascii_case(extension) && !entry_name.ends_with('/') {
        Some(entry_name.to_string())
    } else {
        None
    }
}
