//! Flash state discovered by autodetection

use core::fmt;

use super::controller::FLASH_BASE;
use super::parts::{PartDescriptor, PAGE_SIZE, PAGE_WORDS};

/// Runtime state of a detected flash controller
///
/// Created by [`FlashController::autodetect`](super::FlashController::autodetect)
/// and passed explicitly to the programming and verification steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashInfo {
    /// The identified part
    pub part: PartDescriptor,
    /// Flash size reported by the controller, in bytes
    pub size: u32,
}

impl FlashInfo {
    /// Create a flash context for a part and a detected size
    pub fn new(part: PartDescriptor, size: u32) -> Self {
        Self { part, size }
    }

    /// Page size in bytes
    pub fn page_size(&self) -> usize {
        PAGE_SIZE
    }

    /// Number of pages in the part
    pub fn page_count(&self) -> u32 {
        self.part.pages
    }

    /// Bus address of the first byte of `page`
    pub fn page_address(&self, page: u32) -> u32 {
        FLASH_BASE | (page * PAGE_SIZE as u32)
    }

    /// Whether the controller size disagrees with the part table
    pub fn size_mismatch(&self) -> bool {
        self.size != self.part.bytes
    }
}

impl fmt::Display for FlashInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Flash on {}", self.part.name)?;
        writeln!(f, "Size(detected): {}", self.size)?;
        writeln!(f, "Pages: {}", self.part.pages)?;
        write!(f, "Page size: {} words", PAGE_WORDS)
    }
}
