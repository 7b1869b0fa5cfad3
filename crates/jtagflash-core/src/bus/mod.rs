//! Bus driver protocols
//!
//! A bus driver turns memory-style operations into signal assignments and
//! data-register shifts on a [`ScanChain`](crate::chain::ScanChain), following
//! the timing diagram of one device family.
//!
//! Every driver provides the same five operations through the [`Bus`] trait.
//! Reads are split-phase: [`read_start`](Bus::read_start) opens a cycle,
//! [`read_next`](Bus::read_next) moves the address while the cycle stays
//! open, and [`read_end`](Bus::read_end) closes it. Each shift captures the
//! data presented for the address driven by the previous shift, so the
//! value returned by `read_next(a1)` belongs to the address before `a1`.

mod split_phase;

use alloc::boxed::Box;

use crate::error::Result;

pub use split_phase::{BusConfig, SplitPhaseBus};

/// Memory bus driven through the scan chain
pub trait Bus {
    /// Open a read cycle at `addr`
    ///
    /// Callers must close the cycle with [`read_end`](Self::read_end).
    fn read_start(&mut self, addr: u32) -> Result<()>;

    /// Drive the next address of an open read cycle
    ///
    /// Returns the data captured during this shift. Burst address rules of
    /// the target are not checked.
    fn read_next(&mut self, addr: u32) -> Result<u32>;

    /// Close the read cycle and return the last captured word
    fn read_end(&mut self) -> Result<u32>;

    /// Single-word read
    fn read(&mut self, addr: u32) -> Result<u32> {
        self.read_start(addr)?;
        self.read_end()
    }

    /// Single-word write
    fn write(&mut self, addr: u32, data: u32) -> Result<()>;

    /// Identification register value of the addressed part
    fn target_id(&self) -> Result<u32>;

    /// Delay for the specified number of microseconds
    fn delay_us(&mut self, us: u32);
}

impl<B: Bus + ?Sized> Bus for &mut B {
    fn read_start(&mut self, addr: u32) -> Result<()> {
        (**self).read_start(addr)
    }

    fn read_next(&mut self, addr: u32) -> Result<u32> {
        (**self).read_next(addr)
    }

    fn read_end(&mut self) -> Result<u32> {
        (**self).read_end()
    }

    fn read(&mut self, addr: u32) -> Result<u32> {
        (**self).read(addr)
    }

    fn write(&mut self, addr: u32, data: u32) -> Result<()> {
        (**self).write(addr, data)
    }

    fn target_id(&self) -> Result<u32> {
        (**self).target_id()
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

// Boxed buses let the session layer hold any driver behind one type
impl<B: Bus + ?Sized> Bus for Box<B> {
    fn read_start(&mut self, addr: u32) -> Result<()> {
        (**self).read_start(addr)
    }

    fn read_next(&mut self, addr: u32) -> Result<u32> {
        (**self).read_next(addr)
    }

    fn read_end(&mut self) -> Result<u32> {
        (**self).read_end()
    }

    fn read(&mut self, addr: u32) -> Result<u32> {
        (**self).read(addr)
    }

    fn write(&mut self, addr: u32, data: u32) -> Result<()> {
        (**self).write(addr, data)
    }

    fn target_id(&self) -> Result<u32> {
        (**self).target_id()
    }

    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us)
    }
}

/// Read consecutive words with one burst cycle
///
/// Issues `read_start` for the first address, `read_next` for each
/// following address and `read_end` for the last word, so `buf.len()`
/// shifts follow the opening shift. The start address is word aligned.
/// A failed `read_next` still ends the cycle before the error is returned.
pub fn read_block<B: Bus + ?Sized>(bus: &mut B, addr: u32, buf: &mut [u32]) -> Result<()> {
    let Some(last) = buf.len().checked_sub(1) else {
        return Ok(());
    };
    let addr = addr & !3;

    bus.read_start(addr)?;
    for (i, word) in buf[..last].iter_mut().enumerate() {
        match bus.read_next(addr.wrapping_add(4 * (i as u32 + 1))) {
            Ok(w) => *word = w,
            Err(e) => {
                // Release the bus; the first error is the one reported
                let _ = bus.read_end();
                return Err(e);
            }
        }
    }
    buf[last] = bus.read_end()?;

    log::trace!("burst read 0x{:08X}: {} words", addr, buf.len());
    Ok(())
}
