//! Readmem command implementation

use indicatif::{ProgressBar, ProgressStyle};
use jtagflash_core::flash::FLASH_BASE;
use jtagflash_session::FlashHandle;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Default chunk size for reading (4 KiB)
const READ_CHUNK_SIZE: usize = 4096;

/// Run the readmem command
pub fn run_readmem(
    handle: &mut FlashHandle,
    addr: u32,
    len: Option<u32>,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Found: {} ({} bytes)",
        handle.info().part.name,
        handle.size()
    );

    let end = FLASH_BASE.saturating_add(handle.size());
    let len = match len {
        Some(len) => len,
        None => end
            .checked_sub(addr)
            .ok_or_else(|| format!("Address 0x{:08X} is outside the flash", addr))?,
    };

    // Reject the range before allocating the buffer for it
    handle.check_range(addr, len as usize)?;

    let data = read_with_progress(handle, addr, len as usize)?;

    let mut file = File::create(output)?;
    file.write_all(&data)?;

    println!("Wrote {} bytes to {:?}", data.len(), output);

    Ok(())
}

/// Read `len` bytes from `addr` with a progress bar
fn read_with_progress(
    handle: &mut FlashHandle,
    addr: u32,
    len: usize,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut data = vec![0u8; len];

    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})")?
            .progress_chars("#>-"),
    );

    let mut offset = 0usize;
    while offset < len {
        let chunk_size = std::cmp::min(READ_CHUNK_SIZE, len - offset);
        let chunk = &mut data[offset..offset + chunk_size];

        if let Err(e) = handle.read(addr + offset as u32, chunk) {
            pb.abandon_with_message("Read failed");
            return Err(e.into());
        }

        offset += chunk_size;
        pb.set_position(offset as u64);
    }

    pb.finish_with_message("Read complete");
    Ok(data)
}
