//! List commands implementation

use jtagflash_core::flash::{PartDatabase, PAGE_SIZE};

/// List all known flash parts
pub fn list_parts(db: &PartDatabase) {
    println!("Known flash parts:");
    println!();
    println!("{:<16} {:>10} {:>8} {:>12}", "Name", "Size", "Pages", "ID");
    println!("{}", "-".repeat(50));

    for part in db.iter() {
        println!(
            "{:<16} {:>10} {:>8} {:>12}",
            part.name,
            format_size(part.bytes),
            part.pages,
            format!("0x{:08X}", part.id)
        );
    }

    println!();
    println!("{} parts, {} byte pages", db.len(), PAGE_SIZE);
}

/// List all targets compiled into this binary
pub fn list_targets() {
    let targets = jtagflash_session::available_targets();
    if targets.is_empty() {
        println!("No targets available (recompile with target features)");
        return;
    }

    println!("Available targets:");
    println!();
    for target in targets {
        println!("  {:<10} - {}", target.name, target.description);
    }
}

fn format_size(bytes: u32) -> String {
    if bytes >= 1024 * 1024 {
        format!("{} MiB", bytes / (1024 * 1024))
    } else if bytes >= 1024 {
        format!("{} KiB", bytes / 1024)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(64 * 1024), "64 KiB");
        assert_eq!(format_size(1024 * 1024), "1 MiB");
    }
}
