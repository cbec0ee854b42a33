//! Exit codes for the CLI tool.

use std::io;

use flzma2::Error;

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Fatal error occurred
pub const FATAL_ERROR: i32 = 2;
/// Stream is corrupt, truncated or fails its checksum
pub const BAD_STREAM: i32 = 3;
/// I/O error
pub const IO_ERROR: i32 = 5;
/// Ctrl+C (128 + SIGINT)
pub const USER_INTERRUPT: i32 = 130;
/// Invalid command line arguments
pub const BAD_ARGS: i32 = 255;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    FatalError,
    BadStream,
    IoError,
    BadArgs,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::FatalError => FATAL_ERROR,
            Self::BadStream => BAD_STREAM,
            Self::IoError => IO_ERROR,
            Self::BadArgs => BAD_ARGS,
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::BadStream => 1,
            Self::IoError => 2,
            Self::FatalError => 3,
            Self::BadArgs => 4,
        }
    }

    /// Returns the more severe of two codes, for runs over several files
    pub fn worst(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

/// Converts a decoder error to an exit code
pub fn error_to_exit_code(error: &Error) -> ExitCode {
    match error {
        Error::Io(e) => io_error_to_exit_code(e),
        e if e.is_data_error() => ExitCode::BadStream,
        _ => ExitCode::FatalError,
    }
}

/// Converts an I/O error to an exit code, looking through to a wrapped
/// decoder error
pub fn io_error_to_exit_code(error: &io::Error) -> ExitCode {
    if let Some(inner) = error.get_ref().and_then(|e| e.downcast_ref::<Error>()) {
        return error_to_exit_code(inner);
    }
    match error.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => ExitCode::BadStream,
        _ => ExitCode::IoError,
    }
}
