//! Exit codes for the CLI tool.

use nestpack::Error;

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Some files failed, the rest were processed
pub const WARNING: i32 = 1;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// Archive format error
pub const BAD_ARCHIVE: i32 = 3;
/// External command failed
pub const COMMAND_FAILED: i32 = 4;
/// I/O error
pub const IO_ERROR: i32 = 5;
/// Ctrl+C (128 + SIGINT)
pub const USER_INTERRUPT: i32 = 130;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(dead_code)] // UserInterrupt is only produced by the signal handler
pub enum ExitCode {
    Success,
    Warning,
    FatalError,
    BadArchive,
    CommandFailed,
    IoError,
    UserInterrupt,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Warning => WARNING,
            Self::FatalError => FATAL_ERROR,
            Self::BadArchive => BAD_ARCHIVE,
            Self::CommandFailed => COMMAND_FAILED,
            Self::IoError => IO_ERROR,
            Self::UserInterrupt => USER_INTERRUPT,
            Self::BadArgs => BAD_ARGS,
        }
    }
}

/// Converts a nestpack error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::Io(_) | Error::InputNotFound(_) => ExitCode::IoError,
        Error::Zip(_) | Error::InvalidArchive { .. } => ExitCode::BadArchive,
        Error::CommandFailed { .. } => ExitCode::CommandFailed,
        Error::InvalidPattern { .. } | Error::StepFailed { .. } => ExitCode::BadArgs,
        // Future error variants - required by #[non_exhaustive]
        _ => ExitCode::FatalError,
    }
}
