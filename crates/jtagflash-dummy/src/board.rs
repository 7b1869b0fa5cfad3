//! Emulated board: a boundary-scan register wired to a split-phase bus
//!
//! Every shift first captures the pins as they are, then applies the newly
//! shifted values. Input cells therefore always show the state left behind
//! by the previous shift.

use jtagflash_core::bus::{BusConfig, SplitPhaseBus};
use jtagflash_core::chain::{self, Chain, DrShifter, Part, PartLayout, SignalCells, SignalId};

use crate::error::Result;
use crate::flash::EmulatedFlash;
use crate::DummyConfig;

const RDNWR: SignalId = SignalId::new("RDnWR");
const NWE: SignalId = SignalId::new("nWE");
const NOE: SignalId = SignalId::new("nOE");

fn address_line(i: u16) -> SignalId {
    SignalId::indexed("MA", i)
}

fn data_line(i: u16) -> SignalId {
    SignalId::indexed("MD", i)
}

fn data_lines(bus: &BusConfig) -> u16 {
    u16::from(bus.data_lines.min(32))
}

/// Boundary-scan register layout of the emulated part
///
/// Control signals and address lines are outputs with an enable cell each;
/// data lines are bidirectional. Cells are allocated in that order.
pub fn board_layout(bus: &BusConfig) -> jtagflash_core::Result<PartLayout> {
    let mut outputs = vec![bus.chip_select];
    outputs.extend((0..u16::from(bus.byte_masks)).map(|i| SignalId::indexed("DQM", i)));
    outputs.extend([RDNWR, NWE, NOE]);
    outputs.extend(bus.command_strobe);
    outputs.extend((0..u16::from(bus.address_lines)).map(address_line));

    let data = data_lines(bus) as usize;
    let mut layout = PartLayout::new(outputs.len() * 2 + data * 3);

    let mut cell = 0;
    for id in outputs {
        layout.add_signal(id, SignalCells::output(cell, cell + 1))?;
        cell += 2;
    }
    for i in 0..data as u16 {
        layout.add_signal(data_line(i), SignalCells::bidirectional(cell, cell + 1, cell + 2))?;
        cell += 3;
    }
    Ok(layout)
}

/// Emulated target board implementing the data-register transport
pub struct DummyBoard {
    layout: PartLayout,
    bus: BusConfig,
    offset: usize,
    total_bits: usize,
    /// Target part register contents after the last update
    cells: Vec<bool>,
    /// Word the target drives on the data lines
    read_latch: Option<u32>,
    /// Address and data held while the write strobe is low
    write_latch: Option<(u32, u32)>,
    flash: EmulatedFlash,
    delayed_us: u64,
}

impl DummyBoard {
    /// Create a board from its configuration
    pub fn new(config: &DummyConfig) -> Result<Self> {
        let layout = board_layout(&config.bus)?;
        let flash = EmulatedFlash::new(
            &config.part,
            config.busy_polls,
            config.bus.address_mask(),
            config.faults.clone(),
        )?;
        let len = layout.dr_len();

        Ok(Self {
            layout,
            bus: config.bus,
            offset: config.inert_parts,
            total_bits: config.inert_parts + len,
            cells: vec![false; len],
            read_latch: None,
            write_latch: None,
            flash,
            delayed_us: 0,
        })
    }

    /// Build the whole chain: inert parts first, then the target part
    pub fn chain(config: &DummyConfig) -> Result<Chain<DummyBoard>> {
        let board = Self::new(config)?;
        let mut parts: Vec<Part> = (0..config.inert_parts)
            .map(|i| Part::bypass(format!("inert{}", i), 0))
            .collect();
        parts.push(Part::new(
            config.part.name.clone(),
            config.idcode,
            board.layout.clone(),
        ));
        Ok(Chain::new(board, parts))
    }

    /// Build a bus driver for the target part of a new chain
    pub fn bus(config: &DummyConfig) -> Result<SplitPhaseBus<Chain<DummyBoard>>> {
        let chain = Self::chain(config)?;
        Ok(SplitPhaseBus::with_part(chain, config.inert_parts, config.bus))
    }

    /// Access the emulated flash
    pub fn flash(&self) -> &EmulatedFlash {
        &self.flash
    }

    /// Access the emulated flash mutably
    pub fn flash_mut(&mut self) -> &mut EmulatedFlash {
        &mut self.flash
    }

    /// Total time requested through `delay_us`
    pub fn delayed_us(&self) -> u64 {
        self.delayed_us
    }

    /// Level the board drives for `id`, `None` when its driver is off
    fn driven(&self, id: SignalId) -> Option<bool> {
        let cells = self.layout.signal(&id)?;
        let out = cells.output?;
        match cells.control {
            Some(ctrl) if !self.cells[ctrl] => None,
            _ => Some(self.cells[out]),
        }
    }

    /// Pin level as driven by the chain; undriven pins are pulled up
    pub fn pin_level(&self, id: SignalId) -> bool {
        self.driven(id).unwrap_or(true)
    }

    fn address(&self) -> u32 {
        (0..u16::from(self.bus.address_lines).min(32))
            .filter(|&i| self.pin_level(address_line(i)))
            .fold(0, |a, i| a | 1 << i)
    }

    fn data(&self) -> u32 {
        (0..data_lines(&self.bus))
            .filter(|&i| self.pin_level(data_line(i)))
            .fold(0, |d, i| d | 1 << i)
    }

    fn capture(&self) -> Vec<bool> {
        let mut bits = vec![false; self.total_bits];
        for (id, cells) in self.layout.signals() {
            let Some(input) = cells.input else {
                continue;
            };
            let pin = match (self.driven(*id), self.read_latch, id.index()) {
                (Some(v), _, _) => v,
                (None, Some(word), Some(i)) if id.name() == "MD" => (word >> i) & 1 != 0,
                _ => true,
            };
            bits[self.offset + input] = pin;
        }
        bits
    }

    fn update(&mut self, tdi: &[u8]) {
        for (i, cell) in self.cells.iter_mut().enumerate() {
            *cell = chain::bit_at(tdi, self.offset + i);
        }

        let selected = !self.pin_level(self.bus.chip_select);
        let read = self.pin_level(RDNWR);
        let strobe = self.bus.command_strobe.map_or(true, |s| !self.pin_level(s));

        self.read_latch = if selected && read && !self.pin_level(NOE) && strobe {
            let addr = self.address();
            let data = self.flash.read(addr);
            log::trace!("dummy: read 0x{:08X} -> 0x{:08X}", addr, data);
            Some(data)
        } else {
            None
        };

        if selected && !read && !self.pin_level(NWE) {
            self.write_latch = Some((self.address(), self.data()));
        } else if self.pin_level(NWE) {
            // Rising edge of the write strobe commits the cycle
            if let Some((addr, data)) = self.write_latch.take() {
                log::trace!("dummy: write 0x{:08X} <- 0x{:08X}", addr, data);
                self.flash.write(addr, data);
            }
        }
    }
}

impl DrShifter for DummyBoard {
    fn shift_dr(&mut self, tdi: &[u8], bits: usize) -> jtagflash_core::Result<Vec<u8>> {
        if bits != self.total_bits || tdi.len() * 8 < bits {
            log::error!(
                "dummy: shift of {} bits, chain is {} bits",
                bits,
                self.total_bits
            );
            return Err(jtagflash_core::Error::ShiftFailed);
        }

        let captured = self.capture();
        self.update(tdi);

        let mut tdo = chain::pack_bits(captured.into_iter(), bits);
        if self.flash.short_capture() {
            tdo.pop();
        }
        Ok(tdo)
    }

    fn delay_us(&mut self, us: u32) {
        self.delayed_us += u64::from(us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jtagflash_core::chain::ScanChain;

    #[test]
    fn test_layout() {
        let layout = board_layout(&BusConfig::pxa250()).unwrap();
        // nCS, 4 DQM, RDnWR, nWE, nOE, nSDCAS, 26 MA as outputs; 32 MD bidirectional
        assert_eq!(layout.len(), 9 + 26 + 32);
        assert_eq!(layout.dr_len(), (9 + 26) * 2 + 32 * 3);
        assert_eq!(
            layout.signal(&SignalId::indexed("MD", 0)),
            Some(&SignalCells::bidirectional(70, 71, 72))
        );
    }

    #[test]
    fn test_undriven_data_lines_float_high() {
        let config = DummyConfig::default();
        let mut chain = DummyBoard::chain(&config).unwrap();
        chain.shift_data_registers().unwrap();
        chain.shift_data_registers().unwrap();
        for i in 0..32 {
            assert!(chain.get_signal(0, SignalId::indexed("MD", i)).unwrap());
        }
    }

    #[test]
    fn test_driven_data_is_captured() {
        let config = DummyConfig::default();
        let mut chain = DummyBoard::chain(&config).unwrap();
        for i in 0..32 {
            chain
                .set_signal(0, SignalId::indexed("MD", i), true, i % 3 == 0)
                .unwrap();
        }
        chain.shift_data_registers().unwrap();
        chain.shift_data_registers().unwrap();
        for i in 0..32 {
            assert_eq!(
                chain.get_signal(0, SignalId::indexed("MD", i)).unwrap(),
                i % 3 == 0
            );
        }
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let config = DummyConfig::default();
        let mut board = DummyBoard::new(&config).unwrap();
        assert_eq!(
            board.shift_dr(&[0u8; 4], 32),
            Err(jtagflash_core::Error::ShiftFailed)
        );
    }
}
