//! Register-level model of the on-chip flash controller
//!
//! Addresses are decoded after masking with the width of the emulated
//! address bus, the way the real bus only sees the low address lines.

use jtagflash_core::flash::{
    FlashCommand, FlashStatus, PartDescriptor, FCMD, FCMD_KEY, FCR, FGPFRHI, FGPFRLO,
    FLASH_BASE, FLASH_SIZES, FSR, PAGE_WORDS,
};

use crate::error::{DummyError, Result};

const ERASED: u32 = 0xFFFF_FFFF;

/// Injected misbehaviour of the emulated flash
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Faults {
    /// FSR never reports ready
    pub stuck_busy: bool,
    /// This command always ends with PROGE set
    pub fail_command: Option<FlashCommand>,
    /// Pages whose erase/write ends with LOCKE set
    pub locked_pages: Vec<u32>,
    /// `(flash offset, mask)`: bits of the word at that offset that read as 0
    pub stuck_bits: Vec<(u32, u32)>,
    /// Return one byte less than requested from every shift
    pub short_capture: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Region {
    Fcr,
    Fcmd,
    Fsr,
    Fgpfr,
    Flash(usize),
    Unmapped,
}

/// Emulated flash array, page buffer and controller registers
#[derive(Debug, Clone)]
pub struct EmulatedFlash {
    mem: Vec<u32>,
    buffer: [u32; PAGE_WORDS],
    pages: u32,
    size_index: u32,
    address_mask: u32,
    busy_polls: u32,
    busy: u32,
    errors: FlashStatus,
    fcr: u32,
    faults: Faults,
    commands: Vec<(FlashCommand, u32)>,
}

impl EmulatedFlash {
    /// Create an erased flash for `part`
    ///
    /// `busy_polls` is the number of status reads that report busy after
    /// each command.
    pub fn new(
        part: &PartDescriptor,
        busy_polls: u32,
        address_mask: u32,
        faults: Faults,
    ) -> Result<Self> {
        let size_index = FLASH_SIZES
            .iter()
            .position(|&s| s == part.bytes)
            .ok_or(DummyError::UnsupportedSize(part.bytes))?;

        Ok(Self {
            mem: vec![ERASED; part.bytes as usize / 4],
            buffer: [ERASED; PAGE_WORDS],
            pages: part.pages,
            size_index: size_index as u32,
            address_mask,
            busy_polls,
            busy: 0,
            errors: FlashStatus::empty(),
            fcr: 0,
            faults,
            commands: Vec::new(),
        })
    }

    /// Commands executed so far, with their page numbers
    pub fn commands(&self) -> &[(FlashCommand, u32)] {
        &self.commands
    }

    /// Number of times `cmd` was executed
    pub fn count(&self, cmd: FlashCommand) -> usize {
        self.commands.iter().filter(|(c, _)| *c == cmd).count()
    }

    /// Flash contents as bytes
    pub fn contents(&self) -> Vec<u8> {
        self.mem.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    /// Preload flash contents starting at `offset`
    pub fn preload(&mut self, offset: usize, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            let at = offset + i;
            if let Some(word) = self.mem.get_mut(at / 4) {
                let shift = (at % 4) * 8;
                *word = (*word & !(0xFF << shift)) | (u32::from(b) << shift);
            }
        }
    }

    /// Access the injected faults
    pub fn faults_mut(&mut self) -> &mut Faults {
        &mut self.faults
    }

    pub(crate) fn short_capture(&self) -> bool {
        self.faults.short_capture
    }

    fn decode(&self, addr: u32) -> Region {
        let m = self.address_mask;
        let a = addr & m;
        if a == FCR & m {
            Region::Fcr
        } else if a == FCMD & m {
            Region::Fcmd
        } else if a == FSR & m {
            Region::Fsr
        } else if a == FGPFRHI & m || a == FGPFRLO & m {
            Region::Fgpfr
        } else {
            let off = a.wrapping_sub(FLASH_BASE & m) as usize;
            if off < self.mem.len() * 4 {
                Region::Flash(off)
            } else {
                Region::Unmapped
            }
        }
    }

    /// Data the target presents for a read of `addr`
    pub fn read(&mut self, addr: u32) -> u32 {
        match self.decode(addr) {
            Region::Fcr => self.fcr,
            Region::Fcmd => 0,
            Region::Fsr => self.read_status().bits(),
            Region::Fgpfr => ERASED,
            Region::Flash(off) => {
                let mut w = self.mem[off / 4];
                for &(at, mask) in &self.faults.stuck_bits {
                    if at as usize / 4 == off / 4 {
                        w &= !mask;
                    }
                }
                w
            }
            Region::Unmapped => {
                log::trace!("dummy: read from unmapped 0x{:08X}", addr);
                0
            }
        }
    }

    /// Accept a write of `data` to `addr`
    pub fn write(&mut self, addr: u32, data: u32) {
        match self.decode(addr) {
            Region::Fcr => self.fcr = data,
            Region::Fcmd => self.command(data),
            Region::Flash(off) => self.buffer[(off / 4) % PAGE_WORDS] = data,
            Region::Fsr | Region::Fgpfr => {}
            Region::Unmapped => log::trace!("dummy: write to unmapped 0x{:08X}", addr),
        }
    }

    // Error bits clear once read, like the real controller
    fn read_status(&mut self) -> FlashStatus {
        let mut fsr = self.errors | FlashStatus::from_bits_retain(self.size_index << 13);
        self.errors = FlashStatus::empty();

        if self.busy > 0 {
            self.busy -= 1;
        } else if !self.faults.stuck_busy {
            fsr |= FlashStatus::FRDY;
        }
        fsr
    }

    fn command(&mut self, word: u32) {
        self.busy = self.busy_polls;

        if word & 0xFF00_0000 != FCMD_KEY {
            log::warn!("dummy: command 0x{:08X} without key", word);
            self.errors |= FlashStatus::PROGE;
            return;
        }
        let Some(cmd) = FlashCommand::from_opcode((word & 0xFF) as u8) else {
            self.errors |= FlashStatus::PROGE;
            return;
        };
        let page = (word >> 8) & 0xFFFF;
        self.commands.push((cmd, page));

        if self.faults.fail_command == Some(cmd) {
            self.errors |= FlashStatus::PROGE;
            return;
        }

        match cmd {
            FlashCommand::ErasePage | FlashCommand::WritePage => {
                if page >= self.pages {
                    self.errors |= FlashStatus::PROGE;
                    return;
                }
                if self.faults.locked_pages.contains(&page) {
                    self.errors |= FlashStatus::LOCKE;
                    return;
                }
                let base = page as usize * PAGE_WORDS;
                let words = &mut self.mem[base..base + PAGE_WORDS];
                if cmd == FlashCommand::ErasePage {
                    words.fill(ERASED);
                } else {
                    // Programming only clears bits
                    for (cell, w) in words.iter_mut().zip(self.buffer) {
                        *cell &= w;
                    }
                }
            }
            FlashCommand::ClearPageBuffer => self.buffer = [ERASED; PAGE_WORDS],
            FlashCommand::EraseAll => {
                if self.faults.locked_pages.is_empty() {
                    self.mem.fill(ERASED);
                } else {
                    self.errors |= FlashStatus::LOCKE;
                }
            }
            FlashCommand::LockRegion => {
                if !self.faults.locked_pages.contains(&page) {
                    self.faults.locked_pages.push(page);
                }
            }
            FlashCommand::UnlockRegion => self.faults.locked_pages.retain(|&p| p != page),
            _ => log::debug!("dummy: {} has no effect", cmd),
        }
    }
}
