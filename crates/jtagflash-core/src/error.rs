//! Error types for jtagflash-core
//!
//! This module provides a no_std compatible error type that can be used
//! throughout the crate.

use core::fmt;

use crate::chain::SignalId;
use crate::flash::{FlashCommand, FlashStatus};

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Chain errors
    /// Part index is not present in the chain
    PartNotFound,
    /// Signal is not defined for the part
    UnknownSignal(SignalId),
    /// Signal cannot be used in the requested direction
    SignalDirection(SignalId),
    /// Signal definition is invalid (duplicate or outside the data register)
    InvalidSignal(SignalId),
    /// Data register shift failed or returned a short capture
    ShiftFailed,

    // Flash errors
    /// Identification value does not match any known flash part
    AutodetectFailed,
    /// Flash controller did not report ready within the polling bound
    Timeout,
    /// Flash controller reported an error after a command
    CommandError {
        /// Command that was issued
        command: FlashCommand,
        /// Page number encoded in the command word
        page: u32,
        /// Status register value read after the command
        status: FlashStatus,
    },
    /// Read-back data differs from the image
    VerifyMismatch {
        /// Bus address of the first differing byte
        addr: u32,
        /// Byte value from the image
        expected: u8,
        /// Byte value read from the target
        found: u8,
    },
    /// Address is beyond the detected flash
    AddressOutOfBounds,

    // I/O errors
    /// Input image could not be read (or was empty)
    StreamError,
    /// Part database could not be loaded
    DatabaseError,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PartNotFound => write!(f, "part not found in chain"),
            Self::UnknownSignal(id) => write!(f, "unknown signal {}", id),
            Self::SignalDirection(id) => {
                write!(f, "signal {} cannot be used in this direction", id)
            }
            Self::InvalidSignal(id) => write!(f, "invalid definition for signal {}", id),
            Self::ShiftFailed => write!(f, "data register shift failed"),
            Self::AutodetectFailed => write!(f, "flash autodetection failed"),
            Self::Timeout => write!(f, "flash controller timed out"),
            Self::CommandError {
                command,
                page,
                status,
            } => write!(
                f,
                "flash command {} failed on page {} (FSR=0x{:08X})",
                command,
                page,
                status.bits()
            ),
            Self::VerifyMismatch {
                addr,
                expected,
                found,
            } => write!(
                f,
                "verify failed at 0x{:08X}: expected 0x{:02X}, found 0x{:02X}",
                addr, expected, found
            ),
            Self::AddressOutOfBounds => write!(f, "address out of bounds"),
            Self::StreamError => write!(f, "input stream error"),
            Self::DatabaseError => write!(f, "part database error"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;
