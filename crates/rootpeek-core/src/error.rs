//! Error types for the rootpeek-core library.
//!
//! This module provides error handling using the `thiserror` crate. Errors are
//! split into two families: branch-local errors that abort the current
//! traversal branch and leave the inspector usable, and fatal errors that
//! leave no valid view of the input file.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for rootpeek operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all rootpeek operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to open the input file
    #[error("failed to open file '{path}': {source}")]
    FileOpen {
        /// Path to the file that failed to open
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to memory-map a window of the input file
    #[error("failed to map {len} bytes at offset {offset}: {source}")]
    Map {
        /// Absolute file offset of the window
        offset: u64,
        /// Requested window length
        len: usize,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Window size is not a usable power of two
    #[error("invalid window size {size}: must be a power of two of at least 64 KiB")]
    InvalidWindowSize {
        /// The rejected size
        size: usize,
    },

    /// A read was requested past the end of the input
    #[error("position {position} is outside the file ({file_len} bytes)")]
    PositionOutOfRange {
        /// Requested absolute position
        position: u64,
        /// Length of the input
        file_len: u64,
    },

    /// An accessor path has no matching field in the layout chain
    #[error("field not found: '{path}'")]
    FieldNotFound {
        /// The full accessor path that was requested
        path: String,
    },

    /// Requested decoding width does not match the field's declared size
    #[error("wrong size for '{path}': requested {requested} bytes, field declares {declared}")]
    WrongSize {
        /// The full accessor path that was requested
        path: String,
        /// Width requested by the caller
        requested: usize,
        /// Size declared by (or computed for) the field
        declared: usize,
    },

    /// A field or record extends past the end of its buffer
    #[error("truncated buffer at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        /// Offset where the read started, in its buffer or in the file
        offset: usize,
        /// Number of bytes the read needed
        needed: usize,
        /// Number of bytes left in the buffer
        available: usize,
    },

    /// A record's self-reported position disagrees with where it was read
    #[error("{position}: not a real record (self-reported position {reported})")]
    StructuralMismatch {
        /// Absolute position the record was read from
        position: u64,
        /// Position the record claims to start at
        reported: u64,
        /// Hex dump of the bytes around the record
        dump: String,
    },

    /// A polymorphic catalog entry has a type tag with no known decoder
    #[error("unsupported type '{class}' at offset {position}")]
    UnsupportedType {
        /// Class name (or tag) that has no decoder
        class: String,
        /// Offset of the entry inside its buffer
        position: usize,
    },

    /// A task carried a tag that has no handler
    #[error("unknown node at position {position}")]
    UnknownNode {
        /// Position carried by the task
        position: u64,
    },

    /// A compressed block could not be decoded
    #[error("{codec} decompression failed: {details}")]
    Decompression {
        /// Name of the codec that failed
        codec: &'static str,
        /// Detailed description of the failure
        details: String,
    },

    /// A shell command line could not be parsed
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Writing inspector output failed
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    /// Formatting a report failed
    #[error("failed to format report")]
    Format(#[from] std::fmt::Error),
}

impl Error {
    /// Creates a new file open error
    pub fn file_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileOpen {
            path: path.into(),
            source,
        }
    }

    /// Creates a new field-not-found error
    pub fn field_not_found(path: impl Into<String>) -> Self {
        Self::FieldNotFound { path: path.into() }
    }

    /// Creates a new wrong-size error
    pub fn wrong_size(path: impl Into<String>, requested: usize, declared: usize) -> Self {
        Self::WrongSize {
            path: path.into(),
            requested,
            declared,
        }
    }

    /// Creates a new truncation error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::Truncated {
            offset,
            needed,
            available,
        }
    }

    /// Creates a new structural mismatch error carrying a hex dump
    pub fn structural_mismatch(position: u64, reported: u64, dump: impl Into<String>) -> Self {
        Self::StructuralMismatch {
            position,
            reported,
            dump: dump.into(),
        }
    }

    /// Creates a new unsupported type error
    pub fn unsupported_type(class: impl Into<String>, position: usize) -> Self {
        Self::UnsupportedType {
            class: class.into(),
            position,
        }
    }

    /// Creates a new decompression error
    pub fn decompression(codec: &'static str, details: impl Into<String>) -> Self {
        Self::Decompression {
            codec,
            details: details.into(),
        }
    }

    /// Creates a new invalid command error
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Returns the hex dump attached to the error, if any
    pub fn dump(&self) -> Option<&str> {
        match self {
            Self::StructuralMismatch { dump, .. } if !dump.is_empty() => Some(dump),
            _ => None,
        }
    }

    /// Returns true if this error only invalidates the current traversal branch
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::FieldNotFound { .. }
                | Self::WrongSize { .. }
                | Self::Truncated { .. }
                | Self::StructuralMismatch { .. }
                | Self::UnsupportedType { .. }
                | Self::UnknownNode { .. }
                | Self::Decompression { .. }
                | Self::PositionOutOfRange { .. }
                | Self::InvalidCommand(_)
        )
    }
}
