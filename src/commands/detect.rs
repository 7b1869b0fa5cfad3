//! Detect command implementation

use jtagflash_core::flash::{PartDatabase, PollConfig};
use jtagflash_session::{open_target, SessionError};

/// Identify the flash behind a target and print its geometry
pub fn run_detect(
    target: &str,
    db: &PartDatabase,
    poll: PollConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    match open_target(target, db, poll) {
        Ok(handle) => {
            println!("{}", handle.info());
            println!("IDCODE: 0x{:08X}", handle.idcode()?);
            if handle.info().size_mismatch() {
                println!(
                    "Note: controller reports {} bytes, part table says {} bytes",
                    handle.info().size,
                    handle.info().part.bytes
                );
            }
            Ok(())
        }
        Err(SessionError::NotDetected { id }) => {
            println!("No known flash found");
            println!("IDCODE: 0x{:08X}", id);
            Err(Box::new(SessionError::NotDetected { id }))
        }
        Err(e) => Err(Box::new(e)),
    }
}
