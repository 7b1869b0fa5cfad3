//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Generate dynamic help text for the target argument
fn target_help() -> String {
    format!(
        "Target to use, as name[:key=value,...] [available: {}]",
        jtagflash_session::target_names_short()
    )
}

#[derive(Parser)]
#[command(name = "jtagflash")]
#[command(
    author,
    version,
    about = "On-chip flash programmer over a boundary-scan bus",
    long_about = None
)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Additional part definitions (.ron file), merged over the built-in table
    #[arg(long, global = true)]
    pub part_db: Option<PathBuf>,

    /// Status polls before a flash command times out
    #[arg(long, global = true, default_value_t = 1000)]
    pub poll_tries: u32,

    /// Delay between status polls in microseconds
    #[arg(long, global = true, default_value_t = 100)]
    pub poll_delay_us: u32,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect the flash behind the target bus
    Detect {
        #[arg(short, long, help = target_help())]
        target: String,
    },

    /// Erase, program and verify flash from an image file
    Flashmem {
        #[arg(short, long, help = target_help())]
        target: String,

        /// Image file to program
        #[arg(short, long)]
        input: PathBuf,

        /// Start address (hex with 0x prefix, or decimal); page offset bits are ignored
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x80000000")]
        addr: u32,

        /// Skip reading back and comparing after programming
        #[arg(long)]
        no_verify: bool,
    },

    /// Read flash contents to a file
    Readmem {
        #[arg(short, long, help = target_help())]
        target: String,

        /// Start address (hex with 0x prefix, or decimal)
        #[arg(long, value_parser = parse_hex_u32, default_value = "0x80000000")]
        addr: u32,

        /// Number of bytes to read (defaults to the rest of the flash)
        #[arg(long, value_parser = parse_hex_u32)]
        len: Option<u32>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// List known flash parts
    ListParts,

    /// List available targets
    ListTargets,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_parse_hex_u32() {
        assert_eq!(parse_hex_u32("0x80000200"), Ok(0x8000_0200));
        assert_eq!(parse_hex_u32("0X10"), Ok(16));
        assert_eq!(parse_hex_u32("512"), Ok(512));
        assert!(parse_hex_u32("0xZZ").is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flashmem_args() {
        let cli = Cli::parse_from([
            "jtagflash",
            "-vv",
            "flashmem",
            "-t",
            "dummy",
            "-i",
            "image.bin",
            "--addr",
            "0x80000400",
            "--no-verify",
        ]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.poll_tries, 1000);
        match cli.command {
            Commands::Flashmem {
                addr, no_verify, ..
            } => {
                assert_eq!(addr, 0x8000_0400);
                assert!(no_verify);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}
