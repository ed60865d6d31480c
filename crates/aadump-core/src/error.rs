//! Error types for the aadump-core library.
//!
//! Per-packet failures ([`Error::Underflow`], [`Error::MalformedRecord`]) are
//! recovered by the pass controller; pass-level failures
//! ([`Error::OpcodeNotFound`], [`Error::NoRecordsDecoded`]) are only surfaced
//! once the retry sequence is exhausted.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for aadump operations
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all aadump operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The field cursor ran out of bytes
    #[error("buffer underflow at offset {offset}: requested {requested} bytes, {remaining} remaining")]
    Underflow {
        /// Cursor position when the read was attempted
        offset: usize,
        /// Number of bytes the read needed
        requested: usize,
        /// Number of bytes left in the buffer
        remaining: usize,
    },

    /// A payload failed a structural sanity check
    #[error("malformed record: {reason}")]
    MalformedRecord {
        /// Which check failed
        reason: MalformedReason,
    },

    /// Discovery completed without any opcode reaching the corroboration threshold
    #[error("opcode not found")]
    OpcodeNotFound,

    /// A decode pass against a chosen opcode produced zero records
    #[error("no records decoded with opcode {opcode:#06x}: format has changed, cannot parse")]
    NoRecordsDecoded {
        /// The opcode the failed pass decoded against
        opcode: u16,
    },

    /// A report writer failed while rendering
    #[error("failed to render report for {path}")]
    Render {
        /// Destination of the report
        path: PathBuf,
    },

    /// The packet log container is not well formed
    #[error("invalid packet log at offset {offset}: {details}")]
    InvalidCaptureLog {
        /// Byte offset where the problem was detected
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },
}

/// Structural checks that can reject a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum MalformedReason {
    /// A requirement count at or above the configured cap
    TooManyRequirements {
        /// The count read from the payload
        count: u32,
    },
    /// A special ability slot count above the configured cap
    TooManySpaSlots {
        /// The count read from the payload
        count: u32,
    },
    /// The title string reference is `-1`
    MissingTitle,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyRequirements { count } => {
                write!(f, "bad AA format (requirement count {})", count)
            }
            Self::TooManySpaSlots { count } => {
                write!(f, "bad AA format (spa slot count {})", count)
            }
            Self::MissingTitle => write!(f, "missing title reference"),
        }
    }
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Creates a new underflow error
    pub fn underflow(offset: usize, requested: usize, remaining: usize) -> Self {
        Self::Underflow {
            offset,
            requested,
            remaining,
        }
    }

    /// Creates a new malformed record error
    pub fn malformed(reason: MalformedReason) -> Self {
        Self::MalformedRecord { reason }
    }

    /// Creates a new packet log error
    pub fn invalid_capture_log(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidCaptureLog {
            offset,
            details: details.into(),
        }
    }

    /// Returns true if this error only disqualifies a single packet
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Underflow { .. } | Self::MalformedRecord { .. })
    }
}
