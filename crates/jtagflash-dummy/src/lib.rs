//! jtagflash-dummy - Emulated boundary-scan target for testing
//!
//! This crate emulates a board whose only access path is the boundary-scan
//! register of a PXA-style part: the memory bus pins are modelled, and an
//! AT32UC3 flash controller answers on that bus. It is useful for testing
//! the bus driver and the flash programming path without real hardware.
//!
//! # Usage with jtagflash CLI
//!
//! ```bash
//! jtagflash -t dummy detect
//! jtagflash -t dummy:part=AT32UC3B064,busy=5 flashmem -i firmware.bin
//! jtagflash -t dummy:bus=wide readmem --addr 0x80000000 --len 512 -o dump.bin
//! ```

mod board;
pub mod error;
mod flash;

pub use board::{board_layout, DummyBoard};
pub use error::{DummyError, Result};
pub use flash::{EmulatedFlash, Faults};

use jtagflash_core::bus::BusConfig;
use jtagflash_core::flash::{PartDescriptor, AVR32_PARTS};

/// Silicon revision reported in the top nibble of the emulated IDCODE
const REVISION: u32 = 0x1;

/// Configuration for the emulated board
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Emulated flash part
    pub part: PartDescriptor,
    /// Identification register value of the target part
    pub idcode: u32,
    /// Status reads reporting busy after each command
    pub busy_polls: u32,
    /// Bus signals of the target part
    pub bus: BusConfig,
    /// One-bit parts placed ahead of the target in the chain
    pub inert_parts: usize,
    /// Injected failures
    pub faults: Faults,
}

impl DummyConfig {
    /// Emulate `part` with default settings
    pub fn for_part(part: PartDescriptor) -> Self {
        Self {
            idcode: (REVISION << 28) | part.id,
            part,
            busy_polls: 2,
            bus: BusConfig::pxa250(),
            inert_parts: 0,
            faults: Faults::default(),
        }
    }
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self::for_part(AVR32_PARTS[0].clone())
    }
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| DummyError::InvalidParameter(format!("{}={}", key, value)))
}

/// Parse target options from a list of key-value pairs
///
/// Supported options:
/// * `part=<name>` - emulated part, looked up in `parts` (case-insensitive)
/// * `busy=<n>` - status reads reporting busy after each command
/// * `bus=pxa250|wide` - 26 address lines, or all 32
/// * `inert=<n>` - one-bit parts ahead of the target
/// * `idcode=<value>` - override the identification register
pub fn parse_options(options: &[(&str, &str)], parts: &[PartDescriptor]) -> Result<DummyConfig> {
    let mut config = DummyConfig::default();
    let mut idcode = None;

    for (key, value) in options {
        match *key {
            "part" => {
                let part = parts
                    .iter()
                    .find(|p| p.name.eq_ignore_ascii_case(value))
                    .ok_or_else(|| DummyError::UnknownPart(value.to_string()))?;
                config.idcode = (REVISION << 28) | part.id;
                config.part = part.clone();
            }
            "busy" => config.busy_polls = parse_number(key, value)?,
            "bus" => {
                config.bus = match *value {
                    "pxa250" => BusConfig::pxa250(),
                    "wide" => BusConfig::pxa250().with_address_lines(32),
                    _ => {
                        return Err(DummyError::InvalidParameter(format!(
                            "bus={} (expected pxa250 or wide)",
                            value
                        )))
                    }
                }
            }
            "inert" => config.inert_parts = parse_number(key, value)? as usize,
            "idcode" => idcode = Some(parse_number(key, value)?),
            _ => {
                log::warn!("dummy: Unknown option: {}={}", key, value);
            }
        }
    }

    if let Some(id) = idcode {
        config.idcode = id;
    }
    Ok(config)
}
