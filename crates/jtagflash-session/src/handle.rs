//! FlashHandle - an opened bus together with the detected flash

use std::io::{Read, Seek};

use jtagflash_core::bus::{self, Bus};
use jtagflash_core::flash::{
    FlashController, FlashInfo, ProgramError, ProgramOptions, ProgramProgress, ProgramStats,
    FLASH_BASE, PAGE_WORDS,
};

use crate::error::{Result, SessionError};

/// Boxed bus driver, as produced by the target registry
pub type BoxedBus = Box<dyn Bus>;

/// Programming session handle
///
/// Owns the flash controller (which owns the bus and the chain behind it)
/// and the [`FlashInfo`] found by autodetection, so later operations do
/// not need to probe again.
pub struct FlashHandle {
    ctl: FlashController<BoxedBus>,
    info: FlashInfo,
    target: String,
}

impl FlashHandle {
    pub(crate) fn new(ctl: FlashController<BoxedBus>, info: FlashInfo, target: String) -> Self {
        Self { ctl, info, target }
    }

    /// Detected flash
    pub fn info(&self) -> &FlashInfo {
        &self.info
    }

    /// Target name this handle was opened with
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Flash size in bytes, from the part table
    pub fn size(&self) -> u32 {
        self.info.part.bytes
    }

    /// Identification register of the target part
    pub fn idcode(&self) -> Result<u32> {
        Ok(self.ctl.bus().target_id()?)
    }

    /// Access the flash controller
    pub fn controller_mut(&mut self) -> &mut FlashController<BoxedBus> {
        &mut self.ctl
    }

    /// Program an image, see [`jtagflash_core::flash::program`]
    pub fn program<R, P>(
        &mut self,
        image: &mut R,
        opts: &ProgramOptions,
        progress: &mut P,
    ) -> std::result::Result<ProgramStats, ProgramError>
    where
        R: Read + Seek,
        P: ProgramProgress,
    {
        jtagflash_core::flash::program(&mut self.ctl, &self.info, image, opts, progress)
    }

    /// Check that `len` bytes from bus address `addr` lie inside the flash
    ///
    /// Returns the offset of `addr` from the start of the flash.
    pub fn check_range(&self, addr: u32, len: usize) -> Result<usize> {
        let out_of_range = || SessionError::OutOfRange { addr, len };
        let offset = addr.checked_sub(FLASH_BASE).ok_or_else(out_of_range)? as usize;
        match offset.checked_add(len) {
            Some(end) if end <= self.size() as usize => Ok(offset),
            _ => Err(out_of_range()),
        }
    }

    /// Read flash contents starting at bus address `addr`
    ///
    /// Reads are done as page-sized bursts. The range must lie inside the
    /// flash window.
    pub fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let offset = self.check_range(addr, buf.len())?;

        let mut words = [0u32; PAGE_WORDS];
        let mut done = 0;
        while done < buf.len() {
            let at = offset + done;
            let aligned = at & !3;
            let skip = at - aligned;
            let count = (skip + buf.len() - done).div_ceil(4).min(PAGE_WORDS);

            bus::read_block(self.ctl.bus_mut(), FLASH_BASE + aligned as u32, &mut words[..count])?;

            let bytes: Vec<u8> = words[..count].iter().flat_map(|w| w.to_le_bytes()).collect();
            let n = (bytes.len() - skip).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&bytes[skip..skip + n]);
            done += n;
        }
        Ok(())
    }
}
