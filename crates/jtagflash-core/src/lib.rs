//! jtagflash-core - Core library for driving memory buses over boundary scan
//!
//! This crate drives the memory bus of a target device indirectly, through
//! the boundary-scan register of a JTAG chain, and layers an on-chip flash
//! programming algorithm on top of that bus. It is designed to be `no_std`
//! compatible (it needs `alloc`) so the protocol layers can run close to
//! the cable.
//!
//! The crate is organised in layers, leaves first:
//!
//! - [`chain`] - signal registry per part and the atomic data-register shift
//! - [`bus`] - bus driver protocols that turn reads and writes into signal
//!   assignments and shifts
//! - [`flash`] - part tables, the flash command engine and (with `std`) the
//!   erase/program/verify algorithm
//!
//! # Features
//!
//! - `std` - Enable the programming algorithm over `std::io` streams and the
//!   RON part database
//!
//! # Example
//!
//! ```ignore
//! use jtagflash_core::bus::{BusConfig, SplitPhaseBus};
//! use jtagflash_core::flash::FlashController;
//!
//! let bus = SplitPhaseBus::new(chain, BusConfig::pxa250());
//! let mut ctl = FlashController::new(bus);
//! match ctl.autodetect()? {
//!     Some(info) => println!("Found: {} ({} bytes)", info.part.name, info.size),
//!     None => println!("No AVR32 flash detected"),
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod bus;
pub mod chain;
pub mod error;
pub mod flash;

pub use error::{Error, Result};
