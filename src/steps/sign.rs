//! Signing through an external command.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::metadata::{Ancestors, keys};
use crate::step::ProcessingStep;
use crate::{DEFAULT_PACKAGE_EXTENSION, Error, Result, archive};

use super::nested_package_effect;

/// Runs `<command> <file>` on every archive after its entries were processed.
///
/// The command signs a copy of the working file in the step's work directory;
/// the input itself is never modified. Archives are left unsigned when their
/// own metadata sets [`keys::EXCLUDE_SIGN`] or when an enclosing archive sets
/// [`keys::EXCLUDE_CHILDREN_SIGN`].
///
/// # Example
///
/// ```rust
/// use nestpack::steps::SignStep;
///
/// let step = SignStep::new("jarsigner -keystore ks.jks").unwrap();
/// assert_eq!(step.command_line(), "jarsigner -keystore ks.jks");
/// ```
#[derive(Debug, Clone)]
pub struct SignStep {
    program: String,
    args: Vec<String>,
    extension: String,
}

impl SignStep {
    /// Parses a whitespace-separated command line. The file to sign is
    /// appended as the last argument.
    pub fn new(command: &str) -> Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            return Err(Error::StepFailed {
                step: "sign".into(),
                reason: "signing command is empty".into(),
            });
        };
        Ok(Self {
            program,
            args: parts.collect(),
            extension: DEFAULT_PACKAGE_EXTENSION.to_string(),
        })
    }

    /// Recurses into nested entries with the given extension instead of the
    /// default one.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The command line without the file argument.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn should_sign(&self, input: &Path, ancestors: &Ancestors<'_>) -> Result<bool> {
        if ancestors.any_flag_set(keys::EXCLUDE_CHILDREN_SIGN) {
            return Ok(false);
        }
        let Some(mut archive) = archive::try_open(input)? else {
            return Ok(true);
        };
        let excluded = archive::read_metadata(&mut archive)?
            .is_some_and(|m| m.is_flag_set(keys::EXCLUDE_SIGN));
        Ok(!excluded)
    }
}

impl ProcessingStep for SignStep {
    fn name(&self) -> &str {
        "sign"
    }

    fn recursion_effect(&self, entry_name: &str) -> Option<String> {
        nested_package_effect(entry_name, &self.extension)
    }

    fn post_process(
        &self,
        input: &Path,
        work_dir: &Path,
        ancestors: &Ancestors<'_>,
    ) -> Result<PathBuf> {
        if !self.should_sign(input, ancestors)? {
            log::debug!("Signing of '{}' is excluded", input.display());
            return Ok(input.to_path_buf());
        }

        let file_name = input.file_name().ok_or_else(|| Error::StepFailed {
            step: self.name().into(),
            reason: format!("'{}' has no file name", input.display()),
        })?;
        let signed_dir = work_dir.join("signed");
        fs::create_dir_all(&signed_dir)?;
        let signed = signed_dir.join(file_name);
        fs::copy(input, &signed)?;

        let command = format!("{} {}", self.command_line(), signed.display());
        log::debug!("Running '{}'", command);
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&signed)
            .status()
            .map_err(|e| Error::CommandFailed {
                command: command.clone(),
                status: e.to_string(),
            })?;

        if !status.success() {
            return Err(Error::CommandFailed {
                command,
                status: status.to_string(),
            });
        }
        Ok(signed)
    }
}
