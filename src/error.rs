//! Error types for Fast LZMA2 decompression.
//!
//! This module provides the [`Error`] enum which represents every way a
//! decompression call can fail, along with a convenient [`Result<T>`] type
//! alias and the closed [`ErrorCode`] set used by the command-line tool.
//!
//! "Needs more input" is never an error: the streaming API reports it by
//! returning `Ok(true)` so the caller can supply more bytes and call again.
//!
//! # Example
//!
//! ```rust
//! use flzma2::{Error, decompress};
//!
//! // Property byte, one uncompressed chunk holding "AB", end marker.
//! let src = [0x01, 0x01, 0x00, 0x01, b'A', b'B', 0x00];
//!
//! let mut small = [0u8; 1];
//! match decompress(&mut small, &src) {
//!     Err(Error::DstSizeTooSmall) => println!("need a bigger buffer"),
//!     Err(e) => println!("failed: {}", e),
//!     Ok(n) => println!("decoded {} bytes", n),
//! }
//! ```

use std::io;

/// Helper struct for formatting checksum mismatch messages.
struct ChecksumDisplay {
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for ChecksumDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Checksum mismatch: stored {:#010x}, computed {:#010x}",
            self.expected, self.actual
        )
    }
}

/// The main error type for decompression operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | Resources | [`MemoryAllocation`][Self::MemoryAllocation], [`NoMemory`][Self::NoMemory] | Allocation failure or memory limit |
/// | Size | [`SrcSizeWrong`][Self::SrcSizeWrong], [`DstSizeTooSmall`][Self::DstSizeTooSmall] | Truncated input, small output buffer |
/// | Integrity | [`ChecksumWrong`][Self::ChecksumWrong] | Trailing XXH32 mismatch |
/// | Format | [`Corrupted`][Self::Corrupted], [`InvalidProperty`][Self::InvalidProperty] | Malformed chunk data |
/// | I/O | [`Io`][Self::Io] | Reader/writer failures |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading compressed input or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A context, dictionary, or buffer could not be allocated.
    ///
    /// # Recovery
    ///
    /// The context is left unusable for the current session. Drop it, or
    /// call [`DStream::init_stream`](crate::DStream::init_stream) to start over.
    #[error("Memory allocation failed: {0}")]
    MemoryAllocation(String),

    /// The input ended before the stream's end marker, or fewer than four
    /// checksum bytes followed the end marker.
    ///
    /// One-shot decompression reports this as soon as the given input is
    /// exhausted. The streaming API reports "more input needed" instead and
    /// this error only surfaces from adapters such as
    /// [`Fl2Reader`](crate::Fl2Reader) when the underlying reader hits EOF.
    #[error("Compressed input is incomplete")]
    SrcSizeWrong,

    /// The destination buffer filled up before the end marker was reached.
    ///
    /// # Recovery
    ///
    /// Query the exact size with
    /// [`find_decompressed_size`](crate::find_decompressed_size) and retry.
    #[error("Destination buffer is too small")]
    DstSizeTooSmall,

    /// The trailing XXH32 digest does not match the decompressed data.
    ///
    /// Output produced before this error must not be trusted.
    #[error("{}", ChecksumDisplay { expected: *expected, actual: *actual })]
    ChecksumWrong {
        /// The digest stored in the stream.
        expected: u32,
        /// The digest computed over the decompressed bytes.
        actual: u32,
    },

    /// A chunk header or chunk payload is malformed.
    #[error("Corrupted data: {0}")]
    Corrupted(String),

    /// The property byte selects a dictionary size class outside `0..=40`.
    #[error("Invalid property byte: {0:#04x}")]
    InvalidProperty(u8),

    /// The multithreaded decoder could not reserve an output buffer for a block.
    ///
    /// This fails the whole session; the decoder does not fall back to
    /// single-threaded decoding.
    ///
    /// # Recovery
    ///
    /// Raise [`DecoderConfig::memory_limit`](crate::DecoderConfig::memory_limit),
    /// lower the thread count, or decode with [`Threads::Single`](crate::Threads::Single).
    #[error("Out of memory for block buffer: {requested} bytes requested (limit: {limit} bytes)")]
    NoMemory {
        /// Bytes requested for the block.
        requested: usize,
        /// The configured memory limit.
        limit: usize,
    },
}

/// Closed set of error codes, one per [`Error`] category.
///
/// These mirror the numeric codes a C caller would compare against and are
/// what the command-line tool reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// Generic failure, including I/O.
    Generic,
    /// Allocation failure.
    MemoryAllocation,
    /// Incomplete input.
    SrcSizeWrong,
    /// Output buffer too small.
    DstSizeTooSmall,
    /// Checksum mismatch.
    ChecksumWrong,
    /// Corrupted stream data.
    CorruptionDetected,
    /// Unsupported property byte.
    ParameterUnsupported,
    /// Block buffer allocation failure in multithreaded mode.
    NoMemory,
}

impl ErrorCode {
    /// Returns a short, stable name for this code.
    pub fn name(self) -> &'static str {
        match self {
            Self::Generic => "Error (generic)",
            Self::MemoryAllocation => "Allocation error : not enough memory",
            Self::SrcSizeWrong => "Src size incorrect",
            Self::DstSizeTooSmall => "Destination buffer is too small",
            Self::ChecksumWrong => "Restored data doesn't match checksum",
            Self::CorruptionDetected => "Corrupted block detected",
            Self::ParameterUnsupported => "Unsupported parameter",
            Self::NoMemory => "Out of memory for block buffers",
        }
    }

    /// Returns the numeric value of this code.
    pub fn value(self) -> u32 {
        match self {
            Self::Generic => 1,
            Self::CorruptionDetected => 3,
            Self::ChecksumWrong => 4,
            Self::ParameterUnsupported => 5,
            Self::MemoryAllocation => 6,
            Self::DstSizeTooSmall => 7,
            Self::SrcSizeWrong => 8,
            Self::NoMemory => 9,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl Error {
    /// Returns the code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::Io(_) => ErrorCode::Generic,
            Error::MemoryAllocation(_) => ErrorCode::MemoryAllocation,
            Error::SrcSizeWrong => ErrorCode::SrcSizeWrong,
            Error::DstSizeTooSmall => ErrorCode::DstSizeTooSmall,
            Error::ChecksumWrong { .. } => ErrorCode::ChecksumWrong,
            Error::Corrupted(_) => ErrorCode::CorruptionDetected,
            Error::InvalidProperty(_) => ErrorCode::ParameterUnsupported,
            Error::NoMemory { .. } => ErrorCode::NoMemory,
        }
    }

    /// Returns `true` if the stream data itself is bad.
    ///
    /// Such errors will recur on every attempt with the same input, unlike
    /// resource errors which may succeed with a different configuration.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Error::SrcSizeWrong
                | Error::ChecksumWrong { .. }
                | Error::Corrupted(_)
                | Error::InvalidProperty(_)
        )
    }

    /// Creates a Corrupted error.
    pub fn corrupted(reason: impl Into<String>) -> Self {
        Error::Corrupted(reason.into())
    }

    /// Creates a MemoryAllocation error.
    pub fn allocation(what: impl Into<String>) -> Self {
        Error::MemoryAllocation(what.into())
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::SrcSizeWrong => io::Error::new(io::ErrorKind::UnexpectedEof, err),
            Error::MemoryAllocation(_) | Error::NoMemory { .. } => {
                io::Error::new(io::ErrorKind::OutOfMemory, err)
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

/// A specialized Result type for decompression operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
        assert_eq!(err.code(), ErrorCode::Generic);
    }

    #[test]
    fn test_checksum_wrong_display() {
        let err = Error::ChecksumWrong {
            expected: 0xDEAD_BEEF,
            actual: 0x1234_5678,
        };
        let msg = err.to_string();
        assert!(msg.contains("0xdeadbeef"));
        assert!(msg.contains("0x12345678"));
        assert_eq!(err.code(), ErrorCode::ChecksumWrong);
        assert!(err.is_data_error());
    }

    #[test]
    fn test_no_memory_display() {
        let err = Error::NoMemory {
            requested: 4096,
            limit: 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("4096"));
        assert!(msg.contains("1024"));
        assert!(!err.is_data_error());
    }

    #[test]
    fn test_invalid_property() {
        let err = Error::InvalidProperty(0x29);
        assert!(err.to_string().contains("0x29"));
        assert_eq!(err.code(), ErrorCode::ParameterUnsupported);
    }

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ErrorCode::Generic,
            ErrorCode::MemoryAllocation,
            ErrorCode::SrcSizeWrong,
            ErrorCode::DstSizeTooSmall,
            ErrorCode::ChecksumWrong,
            ErrorCode::CorruptionDetected,
            ErrorCode::ParameterUnsupported,
            ErrorCode::NoMemory,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a.value(), b.value());
                assert_ne!(a.name(), b.name());
            }
        }
    }

    #[test]
    fn test_into_io_error_kinds() {
        let e: io::Error = Error::SrcSizeWrong.into();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);

        let e: io::Error = Error::corrupted("bad control byte").into();
        assert_eq!(e.kind(), io::ErrorKind::InvalidData);

        let e: io::Error = Error::allocation("dictionary").into();
        assert_eq!(e.kind(), io::ErrorKind::OutOfMemory);

        let inner = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let e: io::Error = Error::Io(inner).into();
        assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
