//! Decoding of the d3plot family binary format.
//!
//! Everything in here is concerned with getting bytes off disk and into the
//! typed structures the analysis layer consumes: segment discovery, word-level
//! access, header probing, the control block, geometry and state records.

pub mod family;
pub mod cursor;
pub mod probe;
pub mod control;
pub mod geometry;
pub mod state;

use std::path::PathBuf;

use thiserror::Error;

/// Size of one machine word in the stream.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum WordSize {
    Four,
    Eight,
}

impl WordSize {
    pub fn bytes(self) -> usize {
        match self {
            WordSize::Four => 4,
            WordSize::Eight => 8,
        }
    }
}

/// Byte order of every word in the stream.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Endianness {
    Little,
    Big,
}

/// Established once while opening a family; every subsequent read uses it.
#[derive(Clone, Debug)]
pub struct FileFormat {
    pub word_size: WordSize,
    pub endianness: Endianness,
    /// Solver version float from the header. Recorded for reporting, never
    /// branched on.
    pub version: f64,
    /// The 10-word run title, trimmed of padding.
    pub title: String,
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("required family segment is missing: {0}")]
    FileNotFound(PathBuf),

    #[error("i/o error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("header does not decode as a d3plot database under any word size or byte order")]
    InvalidFormat,

    #[error("stream ended in the middle of {what}")]
    Truncated { what: &'static str },

    #[error("corrupted data: {what}")]
    CorruptedData { what: String },

    #[error("unsupported database layout: {what}")]
    UnsupportedVersion { what: String },
}

impl FormatError {
    /// Stable machine-readable name for each error kind. External drivers
    /// map these to exit codes or UI strings.
    pub fn kind_name(&self) -> &'static str {
        match self {
            FormatError::FileNotFound(_) => "FileNotFound",
            FormatError::Io { .. } => "Io",
            FormatError::InvalidFormat => "InvalidFormat",
            FormatError::Truncated { .. } => "Truncated",
            FormatError::CorruptedData { .. } => "CorruptedData",
            FormatError::UnsupportedVersion { .. } => "UnsupportedVersion",
        }
    }
}
