//! On-chip flash support
//!
//! - [`parts`] - static part table and flash size table
//! - [`FlashController`] - register-level command engine over a [`Bus`](crate::bus::Bus)
//! - [`FlashInfo`] - what autodetection found, passed to later steps
//! - `program` (with `std`) - the erase/program/verify page sequence
//! - `PartDatabase` (with `std`) - RON files extending the part table

mod context;
mod controller;
pub mod parts;

#[cfg(feature = "std")]
mod database;
#[cfg(feature = "std")]
mod program;

pub use context::FlashInfo;
pub use controller::{
    FlashCommand, FlashController, FlashStatus, PollConfig, FCMD, FCMD_KEY, FCR, FGPFRHI,
    FGPFRLO, FLASHC_BASE, FLASH_BASE, FSR, MAX_PAGES,
};
pub use parts::{find_part, PartDescriptor, AVR32_PARTS, FLASH_SIZES, PAGE_SIZE, PAGE_WORDS};

#[cfg(feature = "std")]
pub use database::{PartDatabase, PartDbError, Size};
#[cfg(feature = "std")]
pub use program::{
    bytes_to_words, program, words_to_bytes, FlashProgrammer, NoProgress, ProgramError,
    ProgramOptions, ProgramProgress, ProgramState, ProgramStats, ProgramStep,
};
