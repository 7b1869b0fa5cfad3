//! AVR32 UC3 flash controller command engine
//!
//! All controller access goes through [`Bus::read`] and [`Bus::write`] on
//! fixed register addresses. Commands are fire-and-poll: wait for the ready
//! bit, write the key-prefixed command word, read the status once.

use bitflags::bitflags;
use core::fmt;

use super::context::FlashInfo;
use super::parts::{self, PartDescriptor, AVR32_PARTS, PAGE_WORDS};
use crate::bus::Bus;
use crate::error::{Error, Result};

/// Base of the flash array; writes here land in the page buffer
pub const FLASH_BASE: u32 = 0x8000_0000;

/// Base of the flash controller registers
pub const FLASHC_BASE: u32 = 0xFFFE_1400;
/// Flash control register
pub const FCR: u32 = FLASHC_BASE;
/// Flash command register
pub const FCMD: u32 = FLASHC_BASE + 0x4;
/// Flash status register
pub const FSR: u32 = FLASHC_BASE + 0x8;
/// General purpose fuse register high
pub const FGPFRHI: u32 = FLASHC_BASE + 0xC;
/// General purpose fuse register low
pub const FGPFRLO: u32 = FLASHC_BASE + 0x10;

/// Key that must prefix every command word
pub const FCMD_KEY: u32 = 0xA500_0000;

/// Pages addressable through the 16-bit page field of a command word
pub const MAX_PAGES: u32 = 0x1_0000;

/// Controller commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlashCommand {
    /// No operation
    Nop = 0,
    /// Write page
    WritePage = 1,
    /// Erase page
    ErasePage = 2,
    /// Clear page buffer
    ClearPageBuffer = 3,
    /// Lock region containing page
    LockRegion = 4,
    /// Unlock region containing page
    UnlockRegion = 5,
    /// Erase all
    EraseAll = 6,
    /// Write general-purpose fuse bit
    WriteGpFuseBit = 7,
    /// Erase general-purpose fuse bit
    EraseGpFuseBit = 8,
    /// Set security bit
    SetSecurityBit = 9,
    /// Program general-purpose fuse byte
    ProgramGpFuseByte = 10,
    /// Erase all general-purpose fuses
    EraseAllGpFuses = 11,
    /// Quick page read
    QuickPageRead = 12,
    /// Write user page
    WriteUserPage = 13,
    /// Erase user page
    EraseUserPage = 14,
    /// Quick page read user page
    QuickPageReadUserPage = 15,
}

impl FlashCommand {
    /// Command opcode (low byte of the command word)
    pub const fn opcode(self) -> u32 {
        self as u32
    }

    /// Full command word for `page`
    pub const fn encode(self, page: u32) -> u32 {
        FCMD_KEY | ((page & (MAX_PAGES - 1)) << 8) | self.opcode()
    }

    /// Decode an opcode
    pub fn from_opcode(op: u8) -> Option<Self> {
        Some(match op {
            0 => Self::Nop,
            1 => Self::WritePage,
            2 => Self::ErasePage,
            3 => Self::ClearPageBuffer,
            4 => Self::LockRegion,
            5 => Self::UnlockRegion,
            6 => Self::EraseAll,
            7 => Self::WriteGpFuseBit,
            8 => Self::EraseGpFuseBit,
            9 => Self::SetSecurityBit,
            10 => Self::ProgramGpFuseByte,
            11 => Self::EraseAllGpFuses,
            12 => Self::QuickPageRead,
            13 => Self::WriteUserPage,
            14 => Self::EraseUserPage,
            15 => Self::QuickPageReadUserPage,
            _ => return None,
        })
    }

    /// Datasheet mnemonic
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::WritePage => "WP",
            Self::ErasePage => "EP",
            Self::ClearPageBuffer => "CPB",
            Self::LockRegion => "LP",
            Self::UnlockRegion => "UP",
            Self::EraseAll => "EA",
            Self::WriteGpFuseBit => "WGPB",
            Self::EraseGpFuseBit => "EGPB",
            Self::SetSecurityBit => "SSB",
            Self::ProgramGpFuseByte => "PGPFB",
            Self::EraseAllGpFuses => "EAGPF",
            Self::QuickPageRead => "QPR",
            Self::WriteUserPage => "WUP",
            Self::EraseUserPage => "EUP",
            Self::QuickPageReadUserPage => "QPRUP",
        }
    }
}

impl fmt::Display for FlashCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

bitflags! {
    /// Flash status register (FSR)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FlashStatus: u32 {
        /// Flash ready
        const FRDY  = 1 << 0;
        /// Lock error
        const LOCKE = 1 << 2;
        /// Programming error
        const PROGE = 1 << 3;
        /// Flash size field
        const FSZ   = 0x7 << 13;
    }
}

impl FlashStatus {
    /// Controller is ready for a command
    pub fn is_ready(&self) -> bool {
        self.contains(Self::FRDY)
    }

    /// Last command ended with an error
    pub fn has_error(&self) -> bool {
        self.intersects(Self::LOCKE | Self::PROGE)
    }

    /// Index into [`FLASH_SIZES`](super::FLASH_SIZES)
    pub fn size_index(&self) -> usize {
        ((self.bits() >> 13) & 0x7) as usize
    }
}

/// Readiness polling bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Number of status polls before giving up
    pub tries: u32,
    /// Delay between polls in microseconds
    pub delay_us: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tries: 1000,
            delay_us: 100,
        }
    }
}

/// Flash command engine on top of a bus driver
pub struct FlashController<B> {
    bus: B,
    poll: PollConfig,
}

impl<B: Bus> FlashController<B> {
    /// Create a controller with default polling bounds
    pub fn new(bus: B) -> Self {
        Self::with_poll(bus, PollConfig::default())
    }

    /// Create a controller with explicit polling bounds
    pub fn with_poll(bus: B, poll: PollConfig) -> Self {
        Self { bus, poll }
    }

    /// Polling bounds in use
    pub fn poll(&self) -> PollConfig {
        self.poll
    }

    /// Access the bus
    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Access the bus mutably
    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Consume the controller and return the bus
    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Read the status register
    pub fn read_status(&mut self) -> Result<FlashStatus> {
        Ok(FlashStatus::from_bits_retain(self.bus.read(FSR)?))
    }

    /// Identify the part against the built-in table
    pub fn autodetect(&mut self) -> Result<Option<FlashInfo>> {
        self.autodetect_in(AVR32_PARTS)
    }

    /// Identify the part against `table`
    ///
    /// Returns `Ok(None)` when the identification value matches no entry,
    /// so the caller can try other flash engines. On a match the size field
    /// of the status register is read over the bus.
    pub fn autodetect_in(&mut self, table: &[PartDescriptor]) -> Result<Option<FlashInfo>> {
        let id = self.bus.target_id()?;
        let Some(part) = parts::find_in(table, id) else {
            log::debug!("IDCODE 0x{:08X} is not a known AVR32 part", id);
            return Ok(None);
        };

        let status = self.read_status()?;
        let size = parts::flash_size(status.size_index()).ok_or(Error::AutodetectFailed)?;
        let info = FlashInfo::new(part.clone(), size);

        log::info!(
            "Found: {} ({} bytes, {} pages)",
            info.part.name,
            info.size,
            info.page_count()
        );
        if info.size_mismatch() {
            log::warn!(
                "Controller reports {} bytes, part table says {} bytes",
                info.size,
                info.part.bytes
            );
        }
        Ok(Some(info))
    }

    /// Poll the status register until the ready bit is set
    ///
    /// Polls at most `tries` times with the configured delay after each
    /// unsuccessful poll. Returns immediately, without delay, when the
    /// first poll already reports ready.
    pub fn wait_ready(&mut self, tries: u32) -> Result<()> {
        for _ in 0..tries {
            if self.read_status()?.is_ready() {
                return Ok(());
            }
            self.bus.delay_us(self.poll.delay_us);
        }

        log::debug!("flash not ready after {} polls", tries);
        Err(Error::Timeout)
    }

    /// Issue a command: wait ready, write the command word, check status
    pub fn command(&mut self, command: FlashCommand, page: u32) -> Result<()> {
        self.wait_ready(self.poll.tries)?;

        log::debug!("FCMD {} page {}", command, page);
        self.bus.write(FCMD, command.encode(page))?;

        let status = self.read_status()?;
        if status.has_error() {
            return Err(Error::CommandError {
                command,
                page,
                status,
            });
        }
        Ok(())
    }

    /// Erase one page
    pub fn erase_page(&mut self, page: u32) -> Result<()> {
        self.command(FlashCommand::ErasePage, page)
    }

    /// Reset the page buffer to all ones
    pub fn clear_page_buffer(&mut self) -> Result<()> {
        self.command(FlashCommand::ClearPageBuffer, 0)
    }

    /// Program the page buffer into `page`
    pub fn write_page(&mut self, page: u32) -> Result<()> {
        self.command(FlashCommand::WritePage, page)
    }

    /// Fill the page buffer
    ///
    /// Each word is an independent bus write; the page buffer has no busy
    /// state, so nothing is polled in between.
    pub fn load_page_buffer(&mut self, words: &[u32; PAGE_WORDS]) -> Result<()> {
        let mut addr = FLASH_BASE;
        for &word in words {
            self.bus.write(addr, word)?;
            addr += 4;
        }
        Ok(())
    }

    /// Read words from flash with single-word cycles
    pub fn read_words(&mut self, addr: u32, buf: &mut [u32]) -> Result<()> {
        let mut addr = addr & !3;
        for word in buf.iter_mut() {
            *word = self.bus.read(addr)?;
            addr = addr.wrapping_add(4);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Register-level stand-in for the bus: answers FSR reads from a script
    #[derive(Default)]
    struct ScriptedBus {
        id: u32,
        fsr: Vec<u32>,
        fsr_reads: usize,
        writes: Vec<(u32, u32)>,
        delays: Vec<u32>,
        pending: Option<u32>,
    }

    impl ScriptedBus {
        fn fsr(&mut self) -> u32 {
            let v = self
                .fsr
                .get(self.fsr_reads)
                .or(self.fsr.last())
                .copied()
                .unwrap_or(0);
            self.fsr_reads += 1;
            v
        }
    }

    impl Bus for ScriptedBus {
        fn read_start(&mut self, addr: u32) -> Result<()> {
            self.pending = Some(addr);
            Ok(())
        }

        fn read_next(&mut self, _addr: u32) -> Result<u32> {
            unreachable!()
        }

        fn read_end(&mut self) -> Result<u32> {
            match self.pending.take() {
                Some(FSR) => Ok(self.fsr()),
                _ => Ok(0xDEAD_BEEF),
            }
        }

        fn write(&mut self, addr: u32, data: u32) -> Result<()> {
            self.writes.push((addr, data));
            Ok(())
        }

        fn target_id(&self) -> Result<u32> {
            Ok(self.id)
        }

        fn delay_us(&mut self, us: u32) {
            self.delays.push(us);
        }
    }

    const READY: u32 = 1;

    fn controller(fsr: &[u32]) -> FlashController<ScriptedBus> {
        let bus = ScriptedBus {
            fsr: fsr.to_vec(),
            ..Default::default()
        };
        FlashController::with_poll(bus, PollConfig { tries: 5, delay_us: 7 })
    }

    #[test]
    fn test_encode() {
        assert_eq!(FlashCommand::ErasePage.encode(3), 0xA500_0302);
        assert_eq!(FlashCommand::ClearPageBuffer.encode(0), 0xA500_0003);
        assert_eq!(FlashCommand::WritePage.encode(1023), 0xA503_FF01);
        for op in 0..16u8 {
            assert_eq!(FlashCommand::from_opcode(op).unwrap().opcode(), u32::from(op));
        }
        assert_eq!(FlashCommand::from_opcode(16), None);
    }

    #[test]
    fn test_status() {
        let s = FlashStatus::from_bits_retain(0x0000_A001);
        assert!(s.is_ready());
        assert!(!s.has_error());
        assert_eq!(s.size_index(), 5);
        assert!(FlashStatus::from_bits_retain(0x8).has_error());
        assert!(FlashStatus::from_bits_retain(0x4).has_error());
    }

    #[test]
    fn test_wait_ready_immediate() {
        let mut ctl = controller(&[READY]);
        ctl.wait_ready(5).unwrap();
        assert_eq!(ctl.bus().fsr_reads, 1);
        assert!(ctl.bus().delays.is_empty());
    }

    #[test]
    fn test_wait_ready_after_polls() {
        let mut ctl = controller(&[0, 0, READY]);
        ctl.wait_ready(5).unwrap();
        assert_eq!(ctl.bus().fsr_reads, 3);
        assert_eq!(ctl.bus().delays, [7, 7]);
    }

    #[test]
    fn test_wait_ready_timeout() {
        let mut ctl = controller(&[0]);
        assert_eq!(ctl.wait_ready(5), Err(Error::Timeout));
        assert_eq!(ctl.bus().fsr_reads, 5);
        assert_eq!(ctl.bus().delays.len(), 5);
    }

    #[test]
    fn test_command_sequence() {
        let mut ctl = controller(&[READY]);
        ctl.erase_page(9).unwrap();
        assert_eq!(ctl.bus().writes, [(FCMD, 0xA500_0902)]);
        // One poll before, one check after
        assert_eq!(ctl.bus().fsr_reads, 2);
    }

    #[test]
    fn test_command_error_bit() {
        let mut ctl = controller(&[READY, READY | 0x8]);
        let err = ctl.write_page(4).unwrap_err();
        assert_eq!(
            err,
            Error::CommandError {
                command: FlashCommand::WritePage,
                page: 4,
                status: FlashStatus::from_bits_retain(READY | 0x8),
            }
        );
    }

    #[test]
    fn test_command_not_sent_on_timeout() {
        let mut ctl = controller(&[0]);
        assert_eq!(ctl.clear_page_buffer(), Err(Error::Timeout));
        assert!(ctl.bus().writes.is_empty());
    }

    #[test]
    fn test_load_page_buffer() {
        let mut ctl = controller(&[READY]);
        let mut words = [0u32; PAGE_WORDS];
        for (i, w) in words.iter_mut().enumerate() {
            *w = i as u32;
        }
        ctl.load_page_buffer(&words).unwrap();

        let writes = &ctl.bus().writes;
        assert_eq!(writes.len(), PAGE_WORDS);
        assert_eq!(writes[0], (0x8000_0000, 0));
        assert_eq!(writes[127], (0x8000_01FC, 127));
        assert_eq!(ctl.bus().fsr_reads, 0);
    }

    #[test]
    fn test_autodetect() {
        let mut ctl = controller(&[READY | (5 << 13)]);
        ctl.bus_mut().id = 0x11ED_C03F;
        let info = ctl.autodetect().unwrap().unwrap();
        assert_eq!(info.part.name, "AT32UC3A0512");
        assert_eq!(info.size, 512 * 1024);
        assert_eq!(info.page_count(), 1024);
    }

    #[test]
    fn test_autodetect_no_match() {
        let mut ctl = controller(&[READY]);
        ctl.bus_mut().id = 0x0492_0093;
        assert_eq!(ctl.autodetect(), Ok(None));
        assert_eq!(ctl.bus().fsr_reads, 0);
    }
}
