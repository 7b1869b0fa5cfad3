//! Error types for target sessions

use thiserror::Error;

/// Errors from opening or using a target
#[derive(Debug, Error)]
pub enum SessionError {
    /// No target registered under this name
    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    /// Malformed target option
    #[error("Invalid parameter format: '{0}' (expected key=value)")]
    InvalidParameter(String),

    /// The identification register matched no known flash
    #[error("No known flash found (IDCODE 0x{id:08X})")]
    NotDetected {
        /// Identification register value read from the target
        id: u32,
    },

    /// Requested range is outside the detected flash
    #[error("Range 0x{addr:08X}+{len} is outside the flash")]
    OutOfRange {
        /// Start address
        addr: u32,
        /// Length in bytes
        len: usize,
    },

    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] jtagflash_core::Error),

    /// Emulated target error
    #[cfg(feature = "dummy")]
    #[error("Dummy target: {0}")]
    Dummy(#[from] jtagflash_dummy::DummyError),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;
