//! Target sessions for jtagflash
//!
//! This crate opens targets by name and bundles the opened bus with the
//! autodetected flash. The CLI works only with [`FlashHandle`] and the
//! registry functions; it never builds chains or bus drivers itself.
//!
//! # Example
//!
//! ```ignore
//! use jtagflash_core::flash::{PartDatabase, PollConfig};
//! use jtagflash_session::open_target;
//!
//! let db = PartDatabase::builtin();
//! let mut handle = open_target("dummy:part=AT32UC3B064", &db, PollConfig::default())?;
//!
//! let mut buf = vec![0u8; 512];
//! handle.read(0x8000_0000, &mut buf)?;
//! ```

mod error;
mod handle;
mod registry;

pub use error::{Result, SessionError};
pub use handle::{BoxedBus, FlashHandle};
pub use registry::{
    available_targets, open_bus, open_target, parse_target_params, target_names_short,
    TargetInfo, TargetParams,
};

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use jtagflash_core::flash::{
        NoProgress, PartDatabase, PollConfig, ProgramOptions, FLASH_BASE, PAGE_SIZE,
    };
    use std::io::Cursor;

    fn handle() -> FlashHandle {
        let db = PartDatabase::builtin();
        open_target("dummy:part=AT32UC3B064,busy=1", &db, PollConfig::default()).unwrap()
    }

    #[test]
    fn test_program_then_read() {
        let mut handle = handle();
        let data: Vec<u8> = (0..700).map(|i| (i % 251) as u8).collect();
        let stats = handle
            .program(
                &mut Cursor::new(&data),
                &ProgramOptions::default(),
                &mut NoProgress,
            )
            .unwrap();
        assert_eq!(stats.bytes_verified, 700);

        let mut buf = vec![0u8; 700];
        handle.read(FLASH_BASE, &mut buf).unwrap();
        assert_eq!(buf, data);

        // Unaligned start and length spanning a page boundary
        let mut buf = vec![0u8; 11];
        handle.read(FLASH_BASE + PAGE_SIZE as u32 - 5, &mut buf).unwrap();
        assert_eq!(buf, &data[PAGE_SIZE - 5..PAGE_SIZE + 6]);
    }

    #[test]
    fn test_read_out_of_range() {
        let mut handle = handle();
        let mut buf = [0u8; 8];
        assert!(matches!(
            handle.read(FLASH_BASE + 64 * 1024 - 4, &mut buf),
            Err(SessionError::OutOfRange { .. })
        ));
        assert!(matches!(
            handle.read(0x1000, &mut buf),
            Err(SessionError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_check_range() {
        let handle = handle();
        assert_eq!(handle.check_range(FLASH_BASE + 0x100, 0x200).unwrap(), 0x100);
        assert_eq!(handle.check_range(FLASH_BASE, 64 * 1024).unwrap(), 0);
        assert!(matches!(
            handle.check_range(FLASH_BASE, u32::MAX as usize),
            Err(SessionError::OutOfRange { .. })
        ));
        assert!(matches!(
            handle.check_range(FLASH_BASE + 64 * 1024, 1),
            Err(SessionError::OutOfRange { .. })
        ));
    }
}
