//! Error types for vmp-player
//!
//! [`LoadError`] is what a failed movie load reports; [`Error`] covers
//! everything else the crate (config, binary plumbing) can fail with.

use std::fmt;
use thiserror::Error;
use vmp_common::Zone;

/// Session buffer that failed to allocate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    Work,
    Ring,
    Pcm,
    Decode,
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferKind::Work => write!(f, "work"),
            BufferKind::Ring => write!(f, "ring"),
            BufferKind::Pcm => write!(f, "pcm"),
            BufferKind::Decode => write!(f, "decode"),
        }
    }
}

/// Why a movie could not be loaded
///
/// The player is always left unloaded when one of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// Name did not resolve, or the file could not be opened
    #[error("Movie '{name}' not found")]
    ResourceNotFound { name: String },

    /// A session buffer could not be allocated
    #[error("Not enough space for {buffer} buffer ({bytes} bytes in {zone})")]
    OutOfMemory {
        buffer: BufferKind,
        zone: Zone,
        bytes: usize,
    },

    /// Header missing or with a zero dimension
    #[error("Could not load movie header: {0}")]
    HeaderInvalid(String),

    /// The decoder rejected the session
    #[error("Decoder refused to create a session")]
    SessionCreateFailed,
}

impl LoadError {
    /// Stable numeric code, negative like every failure code on the error channel
    pub fn code(&self) -> i32 {
        match self {
            LoadError::ResourceNotFound { .. } => -1,
            LoadError::OutOfMemory { .. } => -2,
            LoadError::HeaderInvalid(_) => -3,
            LoadError::SessionCreateFailed => -4,
        }
    }
}

/// Main error type for vmp-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Movie load failures
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] vmp_common::Error),
}

/// Convenience Result type using vmp-player Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_and_negative() {
        let errors = [
            LoadError::ResourceNotFound {
                name: "A.CPK".into(),
            },
            LoadError::OutOfMemory {
                buffer: BufferKind::Ring,
                zone: Zone::LowWorkRam,
                bytes: 204_800,
            },
            LoadError::HeaderInvalid("zero width".into()),
            LoadError::SessionCreateFailed,
        ];
        let mut codes: Vec<i32> = errors.iter().map(LoadError::code).collect();
        assert!(codes.iter().all(|c| *c < 0));
        codes.dedup();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn test_out_of_memory_message_names_buffer() {
        let err = LoadError::OutOfMemory {
            buffer: BufferKind::Decode,
            zone: Zone::HighWorkRam,
            bytes: 50_688,
        };
        assert_eq!(
            err.to_string(),
            "Not enough space for decode buffer (50688 bytes in hwram)"
        );
    }
}
