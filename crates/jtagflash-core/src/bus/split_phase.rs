//! Split-phase bus driver for PXA-style memory controllers
//!
//! Reproduces the static memory read and write cycles of the PXA250
//! (Figures 6-13 and 6-17 of the PXA developer manual) through boundary
//! scan. Each shift is one clock edge, so every control signal is assigned
//! before the shift that has to present it.

use super::Bus;
use crate::chain::{ScanChain, SignalId};
use crate::error::Result;

const MA: &str = "MA";
const MD: &str = "MD";
const DQM: &str = "DQM";

const RDNWR: SignalId = SignalId::new("RDnWR");
const NWE: SignalId = SignalId::new("nWE");
const NOE: SignalId = SignalId::new("nOE");

/// Signal configuration of a split-phase bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Number of address lines (`MA[0]` upwards); higher address bits are dropped
    pub address_lines: u8,
    /// Number of data lines (`MD[0]` upwards), at most 32
    pub data_lines: u8,
    /// Chip select of the addressed bank (active low)
    pub chip_select: SignalId,
    /// Number of byte-lane masks (`DQM[0]` upwards, active low)
    pub byte_masks: u8,
    /// Command strobe held active during a cycle, if the device class has one
    pub command_strobe: Option<SignalId>,
}

impl BusConfig {
    /// PXA250 static memory bank 0
    pub const fn pxa250() -> Self {
        Self {
            address_lines: 26,
            data_lines: 32,
            chip_select: SignalId::indexed("nCS", 0),
            byte_masks: 4,
            command_strobe: Some(SignalId::new("nSDCAS")),
        }
    }

    /// Same configuration with a different address bus width
    pub const fn with_address_lines(mut self, lines: u8) -> Self {
        self.address_lines = lines;
        self
    }

    /// Mask of the address bits that reach the bus
    pub fn address_mask(&self) -> u32 {
        if self.address_lines >= 32 {
            u32::MAX
        } else {
            (1u32 << self.address_lines) - 1
        }
    }

    fn data_lines(&self) -> u16 {
        u16::from(self.data_lines.min(32))
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::pxa250()
    }
}

/// Bus driver for one part of a scan chain
///
/// The driven part is part 0 unless chosen with [`with_part`](Self::with_part).
/// Other parts of the chain are left untouched.
pub struct SplitPhaseBus<C> {
    chain: C,
    part: usize,
    config: BusConfig,
}

impl<C: ScanChain> SplitPhaseBus<C> {
    /// Drive part 0 of `chain`
    pub fn new(chain: C, config: BusConfig) -> Self {
        Self::with_part(chain, 0, config)
    }

    /// Drive part `part` of `chain`
    pub fn with_part(chain: C, part: usize, config: BusConfig) -> Self {
        Self {
            chain,
            part,
            config,
        }
    }

    /// Bus configuration
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Access the underlying chain
    pub fn chain(&self) -> &C {
        &self.chain
    }

    /// Access the underlying chain mutably
    pub fn chain_mut(&mut self) -> &mut C {
        &mut self.chain
    }

    /// Consume the driver and return the chain
    pub fn into_chain(self) -> C {
        self.chain
    }

    fn drive(&mut self, id: SignalId, value: bool) -> Result<()> {
        self.chain.set_signal(self.part, id, true, value)
    }

    fn shift(&mut self) -> Result<()> {
        self.chain.shift_data_registers()
    }

    /// Assert the cycle's control signals; `read` selects the direction
    fn select(&mut self, read: bool) -> Result<()> {
        self.drive(self.config.chip_select, false)?;
        for i in 0..u16::from(self.config.byte_masks) {
            self.drive(SignalId::indexed(DQM, i), false)?;
        }
        self.drive(RDNWR, read)?;
        self.drive(NWE, true)?;
        self.drive(NOE, !read)?;
        if let Some(strobe) = self.config.command_strobe {
            self.drive(strobe, false)?;
        }
        Ok(())
    }

    /// Lines above bit 31 are driven low
    fn setup_address(&mut self, addr: u32) -> Result<()> {
        for i in 0..u16::from(self.config.address_lines) {
            let bit = addr.checked_shr(u32::from(i)).unwrap_or(0) & 1;
            self.drive(SignalId::indexed(MA, i), bit != 0)?;
        }
        Ok(())
    }

    fn set_data_in(&mut self) -> Result<()> {
        for i in 0..self.config.data_lines() {
            self.chain
                .set_signal(self.part, SignalId::indexed(MD, i), false, false)?;
        }
        Ok(())
    }

    fn setup_data(&mut self, data: u32) -> Result<()> {
        for i in 0..self.config.data_lines() {
            self.drive(SignalId::indexed(MD, i), (data >> i) & 1 != 0)?;
        }
        Ok(())
    }

    fn capture_data(&self) -> Result<u32> {
        let mut d = 0u32;
        for i in 0..self.config.data_lines() {
            if self.chain.get_signal(self.part, SignalId::indexed(MD, i))? {
                d |= 1 << i;
            }
        }
        Ok(d)
    }
}

impl<C: ScanChain> Bus for SplitPhaseBus<C> {
    fn read_start(&mut self, addr: u32) -> Result<()> {
        log::trace!("read start 0x{:08X}", addr);
        self.select(true)?;
        self.setup_address(addr)?;
        self.set_data_in()?;
        self.shift()
    }

    fn read_next(&mut self, addr: u32) -> Result<u32> {
        self.setup_address(addr)?;
        self.shift()?;
        let d = self.capture_data()?;
        log::trace!("read next 0x{:08X} -> 0x{:08X}", addr, d);
        Ok(d)
    }

    fn read_end(&mut self) -> Result<u32> {
        self.drive(self.config.chip_select, true)?;
        self.drive(NOE, true)?;
        if let Some(strobe) = self.config.command_strobe {
            self.drive(strobe, true)?;
        }
        self.shift()?;
        let d = self.capture_data()?;
        log::trace!("read end -> 0x{:08X}", d);
        Ok(d)
    }

    fn write(&mut self, addr: u32, data: u32) -> Result<()> {
        log::trace!("write 0x{:08X} <- 0x{:08X}", addr, data);
        self.select(false)?;
        self.setup_address(addr)?;
        self.setup_data(data)?;
        self.shift()?;

        self.drive(NWE, false)?;
        self.shift()?;
        self.drive(NWE, true)?;
        self.shift()
    }

    fn target_id(&self) -> Result<u32> {
        self.chain.id_register(self.part)
    }

    fn delay_us(&mut self, us: u32) {
        self.chain.delay_us(us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::read_block;
    use crate::error::Error;
    use alloc::collections::BTreeMap;
    use alloc::vec::Vec;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Set(SignalId, bool, bool),
        Shift,
    }

    /// Records every assignment and shift. Data lines capture the number
    /// of shifts done so far.
    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        levels: BTreeMap<SignalId, bool>,
        shifts: u32,
        /// Shift number that fails once
        fail_shift: Option<u32>,
    }

    impl Recorder {
        fn shifts_in(&self, events: &[Event]) -> usize {
            events.iter().filter(|e| **e == Event::Shift).count()
        }

        /// Value of a signal as presented on the most recent shift
        fn level(&self, id: SignalId) -> Option<bool> {
            self.levels.get(&id).copied()
        }

        fn commit(&mut self) {
            // Replay assignments since the previous shift
            let start = self.events[..self.events.len() - 1]
                .iter()
                .rposition(|e| *e == Event::Shift)
                .map_or(0, |i| i + 1);
            for e in &self.events[start..] {
                if let Event::Set(id, enabled, value) = e {
                    self.levels.insert(*id, *enabled && *value);
                }
            }
        }
    }

    impl ScanChain for Recorder {
        fn set_signal(&mut self, part: usize, id: SignalId, enabled: bool, value: bool) -> Result<()> {
            assert_eq!(part, 0);
            self.events.push(Event::Set(id, enabled, value));
            Ok(())
        }

        fn get_signal(&self, _part: usize, id: SignalId) -> Result<bool> {
            let i = id.index().unwrap_or(0);
            Ok((self.shifts >> i) & 1 != 0)
        }

        fn shift_data_registers(&mut self) -> Result<()> {
            if self.fail_shift == Some(self.shifts + 1) {
                self.fail_shift = None;
                return Err(Error::ShiftFailed);
            }
            self.events.push(Event::Shift);
            self.shifts += 1;
            self.commit();
            Ok(())
        }

        fn id_register(&self, _part: usize) -> Result<u32> {
            Ok(0x01ED_C03F)
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    fn bus() -> SplitPhaseBus<Recorder> {
        SplitPhaseBus::new(Recorder::default(), BusConfig::pxa250())
    }

    const NCS0: SignalId = SignalId::indexed("nCS", 0);
    const NSDCAS: SignalId = SignalId::new("nSDCAS");

    #[test]
    fn test_read_start_sets_everything_before_one_shift() {
        let mut b = bus();
        b.read_start(0x0123_4567).unwrap();

        let events = &b.chain().events;
        assert_eq!(b.chain().shifts_in(events), 1);
        assert_eq!(events.last(), Some(&Event::Shift));

        let rec = b.chain();
        assert_eq!(rec.level(NCS0), Some(false));
        assert_eq!(rec.level(RDNWR), Some(true));
        assert_eq!(rec.level(NWE), Some(true));
        assert_eq!(rec.level(NOE), Some(false));
        assert_eq!(rec.level(NSDCAS), Some(false));
        for i in 0..4 {
            assert_eq!(rec.level(SignalId::indexed("DQM", i)), Some(false));
        }
        // 26 address lines: bit 26 of the address is dropped
        assert_eq!(rec.level(SignalId::indexed("MA", 0)), Some(true));
        assert_eq!(rec.level(SignalId::indexed("MA", 3)), Some(false));
        assert_eq!(rec.level(SignalId::indexed("MA", 26)), None);
        assert!(events.contains(&Event::Set(SignalId::indexed("MD", 31), false, false)));
    }

    #[test]
    fn test_read_end_deasserts_controls() {
        let mut b = bus();
        b.read_start(0x100).unwrap();
        let d = b.read_end().unwrap();

        assert_eq!(d, 2);
        let rec = b.chain();
        assert_eq!(rec.shifts, 2);
        assert_eq!(rec.level(NCS0), Some(true));
        assert_eq!(rec.level(NOE), Some(true));
        assert_eq!(rec.level(NSDCAS), Some(true));
    }

    #[test]
    fn test_read_next_only_moves_address() {
        let mut b = bus();
        b.read_start(0x0).unwrap();
        let before = b.chain().events.len();
        b.read_next(0x4).unwrap();

        let events = &b.chain().events[before..];
        assert_eq!(events.len(), 27);
        assert!(events[..26]
            .iter()
            .all(|e| matches!(e, Event::Set(id, true, _) if id.name() == "MA")));
        assert_eq!(events[26], Event::Shift);
    }

    #[test]
    fn test_write_is_three_edges() {
        let mut b = bus();
        b.write(0x40, 0xA5A5_0001).unwrap();

        let events = &b.chain().events;
        assert_eq!(b.chain().shifts_in(events), 3);

        let shifts: Vec<usize> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| **e == Event::Shift)
            .map(|(i, _)| i)
            .collect();

        // Setup: write direction, nWE inactive, data driven
        let setup = &events[..shifts[0]];
        assert!(setup.contains(&Event::Set(RDNWR, true, false)));
        assert!(setup.contains(&Event::Set(NWE, true, true)));
        assert!(setup.contains(&Event::Set(NOE, true, true)));
        assert!(setup.contains(&Event::Set(SignalId::indexed("MD", 0), true, true)));
        assert!(setup.contains(&Event::Set(SignalId::indexed("MD", 1), true, false)));

        // Pulse, then completion
        assert_eq!(&events[shifts[0] + 1..shifts[1]], &[Event::Set(NWE, true, false)]);
        assert_eq!(&events[shifts[1] + 1..shifts[2]], &[Event::Set(NWE, true, true)]);
    }

    #[test]
    fn test_burst_shift_count() {
        let mut b = bus();
        let mut words = [0u32; 5];
        read_block(&mut b, 0x1002, &mut words).unwrap();

        // One opening shift plus one per word
        assert_eq!(b.chain().shifts, 6);
        assert_eq!(words, [2, 3, 4, 5, 6]);
        assert_eq!(b.chain().level(NCS0), Some(true));
        assert_eq!(b.chain().level(SignalId::indexed("MA", 1)), Some(false));
    }

    #[test]
    fn test_failed_burst_releases_bus() {
        let mut b = bus();
        b.chain_mut().fail_shift = Some(3);
        let mut words = [0u32; 4];
        assert_eq!(
            read_block(&mut b, 0x200, &mut words),
            Err(Error::ShiftFailed)
        );

        let rec = b.chain();
        assert_eq!(rec.level(NCS0), Some(true));
        assert_eq!(rec.level(NOE), Some(true));
        assert_eq!(rec.level(NSDCAS), Some(true));
    }

    #[test]
    fn test_address_lines_beyond_32() {
        let mut b = SplitPhaseBus::new(
            Recorder::default(),
            BusConfig::pxa250().with_address_lines(34),
        );
        b.read_start(0xFFFF_FFFF).unwrap();

        let rec = b.chain();
        assert_eq!(rec.level(SignalId::indexed("MA", 31)), Some(true));
        assert_eq!(rec.level(SignalId::indexed("MA", 32)), Some(false));
        assert_eq!(rec.level(SignalId::indexed("MA", 33)), Some(false));
    }

    #[test]
    fn test_narrow_data_bus() {
        let mut config = BusConfig::pxa250();
        config.data_lines = 16;
        config.command_strobe = None;
        let mut b = SplitPhaseBus::new(Recorder::default(), config);
        b.write(0, 0xFFFF_FFFF).unwrap();

        let events = &b.chain().events;
        assert!(events.contains(&Event::Set(SignalId::indexed("MD", 15), true, true)));
        assert!(!events.iter().any(|e| matches!(e, Event::Set(id, _, _) if *id == SignalId::indexed("MD", 16))));
        assert!(!events.iter().any(|e| matches!(e, Event::Set(id, _, _) if *id == NSDCAS)));
    }

    #[test]
    fn test_address_mask() {
        assert_eq!(BusConfig::pxa250().address_mask(), 0x03FF_FFFF);
        assert_eq!(BusConfig::pxa250().with_address_lines(32).address_mask(), u32::MAX);
        assert_eq!(bus().target_id().unwrap(), 0x01ED_C03F);
    }
}
