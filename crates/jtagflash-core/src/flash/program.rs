//! Erase/program/verify algorithm over a seekable image stream

use alloc::vec::Vec;
use core::fmt;
use std::io::{self, Read, Seek, SeekFrom};

use super::context::FlashInfo;
use super::controller::{FlashController, FLASH_BASE};
use super::parts::{PAGE_SIZE, PAGE_WORDS};
use crate::bus::{self, Bus};
use crate::error::Error;

/// Offset bits of a flash address
const FLASH_OFFSET_MASK: u32 = 0x0FFF_FFFF;

/// Erased cell value used to pad a partial last page
const ERASED: u8 = 0xFF;

/// Programming session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    /// Nothing started yet
    Idle,
    /// Writing pages
    Programming,
    /// Comparing the target against the image
    Verifying,
    /// Finished successfully
    Done,
    /// Aborted with an error
    Failed,
}

/// Options for a programming run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramOptions {
    /// Target address; the page offset bits are ignored
    pub addr: u32,
    /// Read back and compare after programming
    pub verify: bool,
}

impl Default for ProgramOptions {
    fn default() -> Self {
        Self {
            addr: FLASH_BASE,
            verify: true,
        }
    }
}

/// Statistics from a programming run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramStats {
    /// First page written
    pub start_page: u32,
    /// Number of pages erased and written
    pub pages_written: u32,
    /// Image bytes written (padding excluded)
    pub bytes_written: usize,
    /// Image bytes compared during verification
    pub bytes_verified: usize,
    /// Whether verification ran
    pub verified: bool,
    /// Image had data beyond the last flash page
    pub truncated: bool,
}

/// Step of the page sequence that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramStep {
    /// Reading or rewinding the image
    Read,
    /// Checking the start address
    Address,
    /// Page erase
    Erase,
    /// Page buffer clear
    ClearBuffer,
    /// Page buffer load
    LoadBuffer,
    /// Page write
    Write,
    /// Read-back comparison
    Verify,
}

impl fmt::Display for ProgramStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "reading image",
            Self::Address => "checking address",
            Self::Erase => "erasing page",
            Self::ClearBuffer => "clearing page buffer",
            Self::LoadBuffer => "loading page buffer",
            Self::Write => "writing page",
            Self::Verify => "verifying page",
        };
        f.write_str(s)
    }
}

/// Failure of a programming run, with the page it happened on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramError {
    /// Page being processed
    pub page: u32,
    /// Bus address of that page
    pub addr: u32,
    /// Failed step
    pub step: ProgramStep,
    /// Underlying error
    pub error: Error,
}

impl fmt::Display for ProgramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (0x{:08X}) failed: {}",
            self.step, self.page, self.addr, self.error
        )
    }
}

impl std::error::Error for ProgramError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Progress callback for programming operations
pub trait ProgramProgress {
    /// Called when the programming phase starts
    fn programming(&mut self, start_page: u32, page_limit: u32);

    /// Called after each page is written
    fn page_written(&mut self, page: u32, bytes_written: usize);

    /// Called when the verification phase starts
    fn verifying(&mut self, pages: u32, bytes: usize);

    /// Called after each page is compared
    fn page_verified(&mut self, page: u32, bytes_verified: usize);

    /// Called when the operation is complete
    fn complete(&mut self, stats: &ProgramStats);
}

/// A no-op progress reporter
pub struct NoProgress;

impl ProgramProgress for NoProgress {
    fn programming(&mut self, _start_page: u32, _page_limit: u32) {}
    fn page_written(&mut self, _page: u32, _bytes_written: usize) {}
    fn verifying(&mut self, _pages: u32, _bytes: usize) {}
    fn page_verified(&mut self, _page: u32, _bytes_verified: usize) {}
    fn complete(&mut self, _stats: &ProgramStats) {}
}

/// Runs the page sequence for one image against a detected flash
pub struct FlashProgrammer<'a, B> {
    ctl: &'a mut FlashController<B>,
    info: &'a FlashInfo,
    state: ProgramState,
}

impl<'a, B: Bus> FlashProgrammer<'a, B> {
    /// Create a programmer for a detected flash
    pub fn new(ctl: &'a mut FlashController<B>, info: &'a FlashInfo) -> Self {
        Self {
            ctl,
            info,
            state: ProgramState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// Program `image` starting at `opts.addr`, then optionally verify
    ///
    /// An empty image is an error. An image longer than the remaining flash
    /// is cut after the last page; this is reported through
    /// [`ProgramStats::truncated`], not as an error.
    pub fn run<R, P>(
        &mut self,
        image: &mut R,
        opts: &ProgramOptions,
        progress: &mut P,
    ) -> Result<ProgramStats, ProgramError>
    where
        R: Read + Seek,
        P: ProgramProgress,
    {
        let result = self.run_inner(image, opts, progress);
        self.state = match &result {
            Ok(_) => ProgramState::Done,
            Err(e) => {
                log::error!("{}", e);
                ProgramState::Failed
            }
        };
        result
    }

    fn run_inner<R, P>(
        &mut self,
        image: &mut R,
        opts: &ProgramOptions,
        progress: &mut P,
    ) -> Result<ProgramStats, ProgramError>
    where
        R: Read + Seek,
        P: ProgramProgress,
    {
        let start_page = self.start_page(opts.addr)?;
        let mut stats = ProgramStats {
            start_page,
            ..Default::default()
        };

        self.state = ProgramState::Programming;
        self.program_pages(image, &mut stats, progress)?;
        log::info!(
            "Programmed {} bytes in {} pages starting at page {}",
            stats.bytes_written,
            stats.pages_written,
            stats.start_page
        );

        if opts.verify {
            self.state = ProgramState::Verifying;
            self.verify_pages(image, &mut stats, progress)?;
            stats.verified = true;
            log::info!("Verified {} bytes", stats.bytes_verified);
        }

        progress.complete(&stats);
        Ok(stats)
    }

    fn fail(&self, page: u32, step: ProgramStep, error: Error) -> ProgramError {
        ProgramError {
            page,
            addr: self.info.page_address(page),
            step,
            error,
        }
    }

    fn start_page(&self, addr: u32) -> Result<u32, ProgramError> {
        let offset = addr & FLASH_OFFSET_MASK;
        let page_size = PAGE_SIZE as u32;
        if offset % page_size != 0 {
            log::warn!(
                "Address 0x{:08X} is not page aligned, ignoring offset 0x{:X}",
                addr,
                offset % page_size
            );
        }

        let page = offset / page_size;
        if page >= self.info.page_count() {
            return Err(self.fail(page, ProgramStep::Address, Error::AddressOutOfBounds));
        }
        Ok(page)
    }

    fn program_pages<R, P>(
        &mut self,
        image: &mut R,
        stats: &mut ProgramStats,
        progress: &mut P,
    ) -> Result<(), ProgramError>
    where
        R: Read,
        P: ProgramProgress,
    {
        let pages = self.info.page_count();
        let mut page = stats.start_page;
        let mut buf = [0u8; PAGE_SIZE];

        progress.programming(page, pages);

        loop {
            let n = read_full(image, &mut buf)
                .map_err(|_| self.fail(page, ProgramStep::Read, Error::StreamError))?;
            if n == 0 {
                if stats.pages_written == 0 {
                    return Err(self.fail(page, ProgramStep::Read, Error::StreamError));
                }
                break;
            }
            buf[n..].fill(ERASED);

            self.program_page(page, &buf)?;
            stats.pages_written += 1;
            stats.bytes_written += n;
            progress.page_written(page, stats.bytes_written);
            page += 1;

            if n < PAGE_SIZE {
                break;
            }
            if page >= pages {
                let mut probe = [0u8; 1];
                let more = read_full(image, &mut probe)
                    .map_err(|_| self.fail(page, ProgramStep::Read, Error::StreamError))?;
                if more != 0 {
                    log::warn!(
                        "Image exceeds flash size, stopped after page {}",
                        pages - 1
                    );
                    stats.truncated = true;
                }
                break;
            }
        }
        Ok(())
    }

    fn program_page(&mut self, page: u32, data: &[u8; PAGE_SIZE]) -> Result<(), ProgramError> {
        let words = bytes_to_words(data);

        log::debug!("programming page {} at 0x{:08X}", page, self.info.page_address(page));
        self.ctl
            .erase_page(page)
            .map_err(|e| self.fail(page, ProgramStep::Erase, e))?;
        self.ctl
            .clear_page_buffer()
            .map_err(|e| self.fail(page, ProgramStep::ClearBuffer, e))?;
        self.ctl
            .load_page_buffer(&words)
            .map_err(|e| self.fail(page, ProgramStep::LoadBuffer, e))?;
        self.ctl
            .write_page(page)
            .map_err(|e| self.fail(page, ProgramStep::Write, e))
    }

    fn verify_pages<R, P>(
        &mut self,
        image: &mut R,
        stats: &mut ProgramStats,
        progress: &mut P,
    ) -> Result<(), ProgramError>
    where
        R: Read + Seek,
        P: ProgramProgress,
    {
        let start = stats.start_page;
        image
            .seek(SeekFrom::Start(0))
            .map_err(|_| self.fail(start, ProgramStep::Read, Error::StreamError))?;

        progress.verifying(stats.pages_written, stats.bytes_written);

        let mut expected = [0u8; PAGE_SIZE];
        let mut words = [0u32; PAGE_WORDS];
        for page in start..start + stats.pages_written {
            let n = read_full(image, &mut expected)
                .map_err(|_| self.fail(page, ProgramStep::Read, Error::StreamError))?;
            if n == 0 {
                break;
            }

            let addr = self.info.page_address(page);
            bus::read_block(self.ctl.bus_mut(), addr, &mut words)
                .map_err(|e| self.fail(page, ProgramStep::Verify, e))?;
            let found = words_to_bytes(&words);

            if let Some(i) = (0..n).find(|&i| expected[i] != found[i]) {
                let error = Error::VerifyMismatch {
                    addr: addr + i as u32,
                    expected: expected[i],
                    found: found[i],
                };
                return Err(self.fail(page, ProgramStep::Verify, error));
            }

            stats.bytes_verified += n;
            progress.page_verified(page, stats.bytes_verified);
        }
        Ok(())
    }
}

/// Program `image` into the flash described by `info`
pub fn program<B, R, P>(
    ctl: &mut FlashController<B>,
    info: &FlashInfo,
    image: &mut R,
    opts: &ProgramOptions,
    progress: &mut P,
) -> Result<ProgramStats, ProgramError>
where
    B: Bus,
    R: Read + Seek,
    P: ProgramProgress,
{
    FlashProgrammer::new(ctl, info).run(image, opts, progress)
}

/// Fill `buf` from `reader` until it is full or the stream ends
fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Pack bytes into little-endian words
pub fn bytes_to_words(bytes: &[u8; PAGE_SIZE]) -> [u32; PAGE_WORDS] {
    let mut words = [0u32; PAGE_WORDS];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    words
}

/// Unpack little-endian words into bytes
pub fn words_to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::flash::controller::{FlashCommand, FCMD, FSR};
    use crate::flash::parts::{PartDescriptor, AVR32_PARTS};
    use crate::flash::PollConfig;
    use std::io::Cursor;
    use std::vec;
    use std::vec::Vec;

    /// Register-level flash model behind a pipelined bus
    struct MemBus {
        flash: Vec<u32>,
        buffer: [u32; PAGE_WORDS],
        commands: Vec<(FlashCommand, u32)>,
        pending: Option<u32>,
        stuck: Option<(usize, u32)>,
        read_shifts: usize,
    }

    impl MemBus {
        fn new(pages: u32) -> Self {
            Self {
                flash: vec![0xFFFF_FFFF; pages as usize * PAGE_WORDS],
                buffer: [0xFFFF_FFFF; PAGE_WORDS],
                commands: Vec::new(),
                pending: None,
                stuck: None,
                read_shifts: 0,
            }
        }

        fn load(&self, addr: u32) -> u32 {
            if addr == FSR {
                return 1;
            }
            let i = ((addr - FLASH_BASE) / 4) as usize;
            let w = self.flash[i];
            match self.stuck {
                Some((at, mask)) if at == i => w & !mask,
                _ => w,
            }
        }

        fn count(&self, cmd: FlashCommand) -> usize {
            self.commands.iter().filter(|(c, _)| *c == cmd).count()
        }

        fn bytes(&self, page: usize) -> Vec<u8> {
            words_to_bytes(&self.flash[page * PAGE_WORDS..(page + 1) * PAGE_WORDS])
        }
    }

    impl Bus for MemBus {
        fn read_start(&mut self, addr: u32) -> Result<()> {
            self.pending = Some(addr);
            self.read_shifts += 1;
            Ok(())
        }

        fn read_next(&mut self, addr: u32) -> Result<u32> {
            let prev = self.pending.replace(addr).unwrap();
            self.read_shifts += 1;
            Ok(self.load(prev))
        }

        fn read_end(&mut self) -> Result<u32> {
            let prev = self.pending.take().unwrap();
            self.read_shifts += 1;
            Ok(self.load(prev))
        }

        fn write(&mut self, addr: u32, data: u32) -> Result<()> {
            if addr == FCMD {
                let cmd = FlashCommand::from_opcode((data & 0xFF) as u8).unwrap();
                let page = (data >> 8) & 0xFFFF;
                let base = page as usize * PAGE_WORDS;
                match cmd {
                    FlashCommand::ErasePage => {
                        self.flash[base..base + PAGE_WORDS].fill(0xFFFF_FFFF)
                    }
                    FlashCommand::ClearPageBuffer => self.buffer = [0xFFFF_FFFF; PAGE_WORDS],
                    FlashCommand::WritePage => {
                        for (cell, w) in self.flash[base..].iter_mut().zip(self.buffer) {
                            *cell &= w;
                        }
                    }
                    _ => {}
                }
                self.commands.push((cmd, page));
            } else if addr >= FLASH_BASE {
                self.buffer[((addr >> 2) & 0x7F) as usize] = data;
            }
            Ok(())
        }

        fn target_id(&self) -> Result<u32> {
            Ok(0)
        }

        fn delay_us(&mut self, _us: u32) {}
    }

    fn setup(part: PartDescriptor) -> (FlashController<MemBus>, FlashInfo) {
        let bus = MemBus::new(part.pages);
        let size = part.bytes;
        (
            FlashController::with_poll(bus, PollConfig { tries: 3, delay_us: 0 }),
            FlashInfo::new(part, size),
        )
    }

    fn small_part() -> PartDescriptor {
        PartDescriptor::new(0x0123_403F, "TEST4", 4, 4 * PAGE_SIZE as u32)
    }

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 3) as u8).collect()
    }

    #[test]
    fn test_one_full_page() {
        let (mut ctl, info) = setup(AVR32_PARTS[10].clone());
        let data = image(PAGE_SIZE);
        let stats = program(
            &mut ctl,
            &info,
            &mut Cursor::new(&data),
            &ProgramOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(stats.pages_written, 1);
        assert_eq!(stats.bytes_written, PAGE_SIZE);
        assert_eq!(stats.bytes_verified, PAGE_SIZE);
        assert!(stats.verified && !stats.truncated);

        let bus = ctl.bus();
        assert_eq!(bus.count(FlashCommand::ErasePage), 1);
        assert_eq!(bus.count(FlashCommand::ClearPageBuffer), 1);
        assert_eq!(bus.count(FlashCommand::WritePage), 1);
        assert_eq!(bus.bytes(0), data);
    }

    #[test]
    fn test_command_order() {
        let (mut ctl, info) = setup(small_part());
        let data = image(PAGE_SIZE + 1);
        let opts = ProgramOptions {
            verify: false,
            ..Default::default()
        };
        program(&mut ctl, &info, &mut Cursor::new(&data), &opts, &mut NoProgress).unwrap();

        use FlashCommand::*;
        assert_eq!(
            ctl.bus().commands,
            [
                (ErasePage, 0),
                (ClearPageBuffer, 0),
                (WritePage, 0),
                (ErasePage, 1),
                (ClearPageBuffer, 0),
                (WritePage, 1),
            ]
        );
    }

    #[test]
    fn test_513_bytes() {
        let (mut ctl, info) = setup(AVR32_PARTS[10].clone());
        let data = image(513);
        let stats = program(
            &mut ctl,
            &info,
            &mut Cursor::new(&data),
            &ProgramOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(stats.pages_written, 2);
        assert_eq!(stats.bytes_written, 513);
        assert_eq!(stats.bytes_verified, 513);

        let page1 = ctl.bus().bytes(1);
        assert_eq!(page1[0], data[512]);
        assert!(page1[1..].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_short_image_padding_not_compared() {
        let (mut ctl, info) = setup(small_part());
        let data = image(10);
        // Damage a padding byte: verification must not look at it
        ctl.bus_mut().stuck = Some((3, 0x0000_0001));
        let stats = program(
            &mut ctl,
            &info,
            &mut Cursor::new(&data),
            &ProgramOptions::default(),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(stats.bytes_verified, 10);
        assert_eq!(&ctl.bus().bytes(0)[..10], &data[..]);
    }

    #[test]
    fn test_truncates_at_last_page() {
        let (mut ctl, info) = setup(small_part());
        let data = image(6 * PAGE_SIZE);
        let stats = program(
            &mut ctl,
            &info,
            &mut Cursor::new(&data),
            &ProgramOptions::default(),
            &mut NoProgress,
        )
        .unwrap();

        assert_eq!(stats.pages_written, 4);
        assert_eq!(stats.bytes_written, 4 * PAGE_SIZE);
        assert_eq!(stats.bytes_verified, 4 * PAGE_SIZE);
        assert!(stats.truncated);
    }

    #[test]
    fn test_exact_fit_is_not_truncated() {
        let (mut ctl, info) = setup(small_part());
        let data = image(4 * PAGE_SIZE);
        let stats = program(
            &mut ctl,
            &info,
            &mut Cursor::new(&data),
            &ProgramOptions::default(),
            &mut NoProgress,
        )
        .unwrap();
        assert_eq!(stats.pages_written, 4);
        assert!(!stats.truncated);
    }

    #[test]
    fn test_start_page_from_address() {
        let (mut ctl, info) = setup(small_part());
        let data = image(100);
        let opts = ProgramOptions {
            addr: 0x8000_0404,
            verify: true,
        };
        let stats =
            program(&mut ctl, &info, &mut Cursor::new(&data), &opts, &mut NoProgress).unwrap();

        assert_eq!(stats.start_page, 2);
        assert_eq!(&ctl.bus().bytes(2)[..100], &data[..]);
        assert!(ctl.bus().bytes(0).iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_start_page_out_of_bounds() {
        let (mut ctl, info) = setup(small_part());
        let opts = ProgramOptions {
            addr: 0x8000_0800,
            verify: false,
        };
        let err = program(
            &mut ctl,
            &info,
            &mut Cursor::new(&image(4)),
            &opts,
            &mut NoProgress,
        )
        .unwrap_err();
        assert_eq!(err.error, Error::AddressOutOfBounds);
        assert!(ctl.bus().commands.is_empty());
    }

    #[test]
    fn test_empty_image() {
        let (mut ctl, info) = setup(small_part());
        let mut programmer = FlashProgrammer::new(&mut ctl, &info);
        let err = programmer
            .run(
                &mut Cursor::new(Vec::new()),
                &ProgramOptions::default(),
                &mut NoProgress,
            )
            .unwrap_err();

        assert_eq!(err.error, Error::StreamError);
        assert_eq!(err.step, ProgramStep::Read);
        assert_eq!(programmer.state(), ProgramState::Failed);
        assert!(ctl.bus().commands.is_empty());
    }

    #[test]
    fn test_verify_mismatch() {
        let (mut ctl, info) = setup(small_part());
        ctl.bus_mut().stuck = Some((PAGE_WORDS + 2, 0x0000_FF00));
        let data = vec![0xA5; 2 * PAGE_SIZE];
        let err = program(
            &mut ctl,
            &info,
            &mut Cursor::new(&data),
            &ProgramOptions::default(),
            &mut NoProgress,
        )
        .unwrap_err();

        assert_eq!(err.page, 1);
        assert_eq!(err.step, ProgramStep::Verify);
        assert_eq!(
            err.error,
            Error::VerifyMismatch {
                addr: 0x8000_0209,
                expected: 0xA5,
                found: 0x00,
            }
        );
    }

    #[test]
    fn test_verify_uses_bursts() {
        let (mut ctl, info) = setup(small_part());
        let data = image(PAGE_SIZE);
        program(
            &mut ctl,
            &info,
            &mut Cursor::new(&data),
            &ProgramOptions::default(),
            &mut NoProgress,
        )
        .unwrap();
        // Each command: one status poll and one status check, single-shift reads each.
        // Verification: one page burst of PAGE_WORDS + 1 shifts.
        assert_eq!(ctl.bus().read_shifts, 3 * 2 * 2 + PAGE_WORDS + 1);
    }

    #[test]
    fn test_state_done() {
        let (mut ctl, info) = setup(small_part());
        let mut programmer = FlashProgrammer::new(&mut ctl, &info);
        assert_eq!(programmer.state(), ProgramState::Idle);
        programmer
            .run(
                &mut Cursor::new(image(1)),
                &ProgramOptions::default(),
                &mut NoProgress,
            )
            .unwrap();
        assert_eq!(programmer.state(), ProgramState::Done);
    }

    #[test]
    fn test_word_packing() {
        let mut bytes = [0u8; PAGE_SIZE];
        bytes[..4].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);
        let words = bytes_to_words(&bytes);
        assert_eq!(words[0], 0x1234_5678);
        assert_eq!(&words_to_bytes(&words[..1])[..], &[0x78, 0x56, 0x34, 0x12]);
    }
}
