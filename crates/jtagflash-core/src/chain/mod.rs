//! Scan chain abstractions
//!
//! This module holds the signal registry of every part in the chain and
//! the single operation that touches the hardware: one data-register shift
//! across the whole chain.
//!
//! ## Layers
//!
//! - [`DrShifter`] is the transport. It moves a bit vector through the data
//!   registers and returns what was captured. TAP state handling and the
//!   cable live behind it.
//! - [`Chain`] owns the [`Part`]s and the transport and implements
//!   [`ScanChain`], the interface bus drivers program against.
//!
//! A shift is one bus clock edge. All pending output values of all parts
//! are committed, and all input values are captured, in one transport call.

mod part;
mod signal;

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::{Error, Result};

pub use part::{Part, PartLayout};
pub use signal::{Direction, SignalCells, SignalId};

/// Boundary-scan transport
///
/// Implementations shift `bits` bits of `tdi` (packed LSB first) through
/// the chain's data registers and return the captured bits in the same
/// packing. The vector covers all parts, part 0 at the lowest offset.
pub trait DrShifter {
    /// Shift the data registers of all parts and return the captured bits
    fn shift_dr(&mut self, tdi: &[u8], bits: usize) -> Result<Vec<u8>>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

/// Signal-level access to a scan chain
///
/// This is the interface bus drivers use. Assignments only take effect on
/// the next [`shift_data_registers`](Self::shift_data_registers).
pub trait ScanChain {
    /// Assign a signal of `part` for the next shift
    fn set_signal(&mut self, part: usize, id: SignalId, enabled: bool, value: bool) -> Result<()>;

    /// Read a signal of `part` as captured by the last shift
    fn get_signal(&self, part: usize, id: SignalId) -> Result<bool>;

    /// Apply all pending values and capture all inputs in one shift
    fn shift_data_registers(&mut self) -> Result<()>;

    /// Identification register value of `part`
    fn id_register(&self, part: usize) -> Result<u32>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

impl<C: ScanChain + ?Sized> ScanChain for &mut C {
    fn set_signal(&mut self, part: usize, id: SignalId, enabled: bool, value: bool) -> Result<()> {
        (**self).set_signal(part, id, enabled, value)
    }

    fn get_signal(&self, part: usize, id: SignalId) -> Result<bool> {
        (**self).get_signal(part, id)
    }

    fn shift_data_registers(&mut self) -> Result<()> {
        (**self).shift_data_registers()
    }

    fn id_register(&self, part: usize) -> Result<u32> {
        (**self).id_register(part)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

impl<C: ScanChain + ?Sized> ScanChain for Box<C> {
    fn set_signal(&mut self, part: usize, id: SignalId, enabled: bool, value: bool) -> Result<()> {
        (**self).set_signal(part, id, enabled, value)
    }

    fn get_signal(&self, part: usize, id: SignalId) -> Result<bool> {
        (**self).get_signal(part, id)
    }

    fn shift_data_registers(&mut self) -> Result<()> {
        (**self).shift_data_registers()
    }

    fn id_register(&self, part: usize) -> Result<u32> {
        (**self).id_register(part)
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

/// A scan chain: ordered parts plus the transport that shifts them
pub struct Chain<T> {
    transport: T,
    parts: Vec<Part>,
    shifts: u64,
}

impl<T: DrShifter> Chain<T> {
    /// Create a chain from its parts, in chain order
    pub fn new(transport: T, parts: Vec<Part>) -> Self {
        Self {
            transport,
            parts,
            shifts: 0,
        }
    }

    /// All parts, in chain order
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Get one part
    pub fn part(&self, index: usize) -> Result<&Part> {
        self.parts.get(index).ok_or(Error::PartNotFound)
    }

    /// Get one part mutably
    pub fn part_mut(&mut self, index: usize) -> Result<&mut Part> {
        self.parts.get_mut(index).ok_or(Error::PartNotFound)
    }

    /// Total data register length across all parts
    pub fn dr_len(&self) -> usize {
        self.parts.iter().map(Part::dr_len).sum()
    }

    /// Number of completed shifts
    pub fn shift_count(&self) -> u64 {
        self.shifts
    }

    /// Access the transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Access the transport mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consume the chain and return the transport
    pub fn into_transport(self) -> T {
        self.transport
    }
}

impl<T: DrShifter> ScanChain for Chain<T> {
    fn set_signal(&mut self, part: usize, id: SignalId, enabled: bool, value: bool) -> Result<()> {
        self.part_mut(part)?.set_signal(id, enabled, value)
    }

    fn get_signal(&self, part: usize, id: SignalId) -> Result<bool> {
        self.part(part)?.get_signal(id)
    }

    fn shift_data_registers(&mut self) -> Result<()> {
        let total = self.dr_len();
        let tdi = pack_bits(self.parts.iter().flat_map(|p| p.driven_bits().iter().copied()), total);

        let tdo = self.transport.shift_dr(&tdi, total)?;
        if tdo.len() * 8 < total {
            log::error!(
                "Short capture: expected {} bits, got {}",
                total,
                tdo.len() * 8
            );
            return Err(Error::ShiftFailed);
        }

        // Nothing is committed to the parts until the whole capture is known
        let mut offset = 0;
        for part in &mut self.parts {
            let len = part.dr_len();
            let bits: Vec<bool> = (offset..offset + len).map(|i| bit_at(&tdo, i)).collect();
            part.capture(&bits);
            offset += len;
        }

        self.shifts += 1;
        Ok(())
    }

    fn id_register(&self, part: usize) -> Result<u32> {
        Ok(self.part(part)?.id())
    }

    fn delay_us(&mut self, us: u32) {
        self.transport.delay_us(us)
    }
}

/// Pack a bit stream LSB first
pub fn pack_bits(bits: impl Iterator<Item = bool>, len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len.div_ceil(8)];
    for (i, bit) in bits.take(len).enumerate() {
        if bit {
            out[i / 8] |= 1 << (i % 8);
        }
    }
    out
}

/// Read bit `index` from an LSB-first packed buffer
pub fn bit_at(bytes: &[u8], index: usize) -> bool {
    bytes[index / 8] & (1 << (index % 8)) != 0
}
