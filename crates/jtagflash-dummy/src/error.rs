//! Error types for the emulated board

use thiserror::Error;

/// Emulated board errors
#[derive(Debug, Error)]
pub enum DummyError {
    /// Part name not found in the part table
    #[error("Unknown part: {0}")]
    UnknownPart(String),

    /// Flash size has no FSZ encoding
    #[error("Flash size {0} bytes cannot be reported by the controller")]
    UnsupportedSize(u32),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] jtagflash_core::Error),
}

/// Result type for emulated board operations
pub type Result<T> = std::result::Result<T, DummyError>;
