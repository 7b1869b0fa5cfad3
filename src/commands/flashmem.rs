//! Flashmem command implementation

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use jtagflash_core::flash::{ProgramOptions, ProgramProgress, ProgramStats, PAGE_SIZE};
use jtagflash_session::FlashHandle;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Progress reporter using indicatif progress bars
struct IndicatifProgress {
    multi: MultiProgress,
    current_bar: Option<ProgressBar>,
    /// Bytes in the image file
    image_len: usize,
    /// First page of the run, for bar positions
    start_page: u32,
}

impl IndicatifProgress {
    fn new(image_len: usize) -> Self {
        Self {
            multi: MultiProgress::new(),
            current_bar: None,
            image_len,
            start_page: 0,
        }
    }

    fn create_bar(&mut self, total: u64, phase: &str) {
        let pb = self.multi.add(ProgressBar::new(total));
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message(phase.to_string());
        self.current_bar = Some(pb);
    }

    fn finish(&mut self, msg: &str) {
        if let Some(pb) = self.current_bar.take() {
            pb.finish_with_message(msg.to_string());
        }
    }
}

impl ProgramProgress for IndicatifProgress {
    fn programming(&mut self, start_page: u32, page_limit: u32) {
        self.start_page = start_page;
        let room = page_limit.saturating_sub(start_page) as usize * PAGE_SIZE;
        self.create_bar(self.image_len.min(room) as u64, "Programming");
    }

    fn page_written(&mut self, _page: u32, bytes_written: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_written as u64);
        }
    }

    fn verifying(&mut self, _pages: u32, bytes: usize) {
        self.finish("Programming complete");
        self.create_bar(bytes as u64, "Verifying");
    }

    fn page_verified(&mut self, _page: u32, bytes_verified: usize) {
        if let Some(pb) = &self.current_bar {
            pb.set_position(bytes_verified as u64);
        }
    }

    fn complete(&mut self, stats: &ProgramStats) {
        if stats.verified {
            self.finish("Verification passed");
        } else {
            self.finish("Programming complete");
        }
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        // A failed run leaves the bar where it stopped
        if let Some(pb) = self.current_bar.take() {
            pb.abandon_with_message("Failed");
        }
    }
}

/// Run the flashmem command
pub fn run_flashmem(
    handle: &mut FlashHandle,
    input: &Path,
    addr: u32,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    println!(
        "Found: {} ({} bytes, {} pages)",
        handle.info().part.name,
        handle.size(),
        handle.info().page_count()
    );

    let file = File::open(input)?;
    let image_len = file.metadata()?.len() as usize;
    println!("Programming {} bytes from {:?}", image_len, input);

    let opts = ProgramOptions { addr, verify };
    let mut progress = IndicatifProgress::new(image_len);
    let stats = handle.program(&mut BufReader::new(file), &opts, &mut progress)?;
    drop(progress);

    println!(
        "Wrote {} bytes to {} pages starting at page {}",
        stats.bytes_written, stats.pages_written, stats.start_page
    );
    if stats.truncated {
        println!(
            "Warning: image is larger than the flash, {} bytes were not written",
            image_len.saturating_sub(stats.bytes_written)
        );
    }
    if stats.verified {
        println!("Verified {} bytes", stats.bytes_verified);
    }

    Ok(())
}
