//! jtagflash - program on-chip flash through a boundary-scan bus
//!
//! The target's external bus is driven pin by pin through its boundary-scan
//! register. The flash controller sits behind that bus, so every register
//! access and every flash word costs one or more data register shifts.
//!
//! Targets are opened by name through `jtagflash-session`; the commands here
//! only deal with the resulting `FlashHandle`.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use jtagflash_core::flash::{PartDatabase, PollConfig};
use jtagflash_session::open_target;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let db = match load_part_database(cli.part_db.as_deref()) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Failed to load part database: {}", e);
            std::process::exit(1);
        }
    };

    log::debug!("Loaded {} part definitions", db.len());

    let poll = PollConfig {
        tries: cli.poll_tries,
        delay_us: cli.poll_delay_us,
    };

    match cli.command {
        Commands::Detect { target } => commands::run_detect(&target, &db, poll),
        Commands::Flashmem {
            target,
            input,
            addr,
            no_verify,
        } => {
            let mut handle = open_target(&target, &db, poll)?;
            commands::run_flashmem(&mut handle, &input, addr, !no_verify)
        }
        Commands::Readmem {
            target,
            addr,
            len,
            output,
        } => {
            let mut handle = open_target(&target, &db, poll)?;
            commands::run_readmem(&mut handle, addr, len, &output)
        }
        Commands::ListParts => {
            commands::list_parts(&db);
            Ok(())
        }
        Commands::ListTargets => {
            commands::list_targets();
            Ok(())
        }
    }
}

/// Built-in part table, extended by an optional RON file
fn load_part_database(path: Option<&Path>) -> Result<PartDatabase, Box<dyn std::error::Error>> {
    let mut db = PartDatabase::builtin();

    if let Some(path) = path {
        if !path.is_file() {
            return Err(format!("Part database not found: {}", path.display()).into());
        }
        let count = db.load_file(path)?;
        log::info!("Loaded {} parts from {}", count, path.display());
    }

    Ok(db)
}
