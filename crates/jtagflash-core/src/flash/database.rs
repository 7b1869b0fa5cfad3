//! Part database for runtime loading and lookup
//!
//! The built-in AT32UC3 table can be extended (or overridden) with parts
//! described in RON files:
//!
//! ```ron
//! (
//!     family: "AT32UC3",
//!     parts: [
//!         (name: "AT32UC3A3256", id: 0x01F0203F, size: KiB(256)),
//!     ],
//! )
//! ```

use alloc::borrow::Cow;
use alloc::{format, string::String, vec::Vec};
use std::fs;
use std::io;
use std::path::Path;

use super::controller::MAX_PAGES;
use super::parts::{self, PartDescriptor, AVR32_PARTS, ID_MASK, PAGE_SIZE};

/// Error type for part database operations
#[derive(Debug)]
pub enum PartDbError {
    /// I/O error reading files
    Io(io::Error),
    /// RON parsing error
    Parse(ron::error::SpannedError),
    /// Validation error
    Validation(String),
}

impl From<io::Error> for PartDbError {
    fn from(e: io::Error) -> Self {
        PartDbError::Io(e)
    }
}

impl From<ron::error::SpannedError> for PartDbError {
    fn from(e: ron::error::SpannedError) -> Self {
        PartDbError::Parse(e)
    }
}

impl std::fmt::Display for PartDbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartDbError::Io(e) => write!(f, "I/O error: {}", e),
            PartDbError::Parse(e) => write!(f, "Parse error: {}", e),
            PartDbError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for PartDbError {}

/// Size with human-readable units (for RON parsing)
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub enum Size {
    /// Size in bytes
    B(u32),
    /// Size in kibibytes (1024 bytes)
    KiB(u32),
    /// Size in mebibytes (1024 * 1024 bytes)
    MiB(u32),
}

impl Size {
    /// Convert to bytes, `None` if the result does not fit in 32 bits
    pub fn to_bytes(self) -> Option<u32> {
        match self {
            Size::B(n) => Some(n),
            Size::KiB(n) => n.checked_mul(1024),
            Size::MiB(n) => n.checked_mul(1024 * 1024),
        }
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
struct PartDef {
    name: String,
    id: u32,
    size: Size,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct FamilyDef {
    family: String,
    parts: Vec<PartDef>,
}

impl PartDef {
    fn into_descriptor(self) -> Result<PartDescriptor, PartDbError> {
        let bytes = self.size.to_bytes().ok_or_else(|| {
            PartDbError::Validation(format!("{}: size {:?} exceeds 4 GiB", self.name, self.size))
        })?;
        if bytes == 0 || bytes as usize % PAGE_SIZE != 0 {
            return Err(PartDbError::Validation(format!(
                "{}: size {} is not a whole number of {}-byte pages",
                self.name, bytes, PAGE_SIZE
            )));
        }
        let pages = bytes / PAGE_SIZE as u32;
        if pages > MAX_PAGES {
            return Err(PartDbError::Validation(format!(
                "{}: {} pages, command words address at most {}",
                self.name, pages, MAX_PAGES
            )));
        }
        if self.id & !ID_MASK != 0 {
            return Err(PartDbError::Validation(format!(
                "{}: id 0x{:08X} has revision bits set",
                self.name, self.id
            )));
        }
        Ok(PartDescriptor {
            id: self.id,
            name: Cow::Owned(self.name),
            pages,
            bytes,
        })
    }
}

/// Runtime part database
///
/// Parts loaded later replace earlier entries with the same id.
#[derive(Debug, Clone, Default)]
pub struct PartDatabase {
    parts: Vec<PartDescriptor>,
}

impl PartDatabase {
    /// Create an empty part database
    pub fn new() -> Self {
        Self { parts: Vec::new() }
    }

    /// Create a database holding the built-in AT32UC3 table
    pub fn builtin() -> Self {
        Self {
            parts: AVR32_PARTS.to_vec(),
        }
    }

    /// Load part definitions from a RON file
    pub fn load_file(&mut self, path: &Path) -> Result<usize, PartDbError> {
        let content = fs::read_to_string(path)?;
        self.load_ron(&content)
    }

    /// Load part definitions from a RON string
    ///
    /// Nothing is added when any entry fails validation.
    pub fn load_ron(&mut self, content: &str) -> Result<usize, PartDbError> {
        let FamilyDef { family, parts } = ron::from_str(content)?;
        let parts = parts
            .into_iter()
            .map(PartDef::into_descriptor)
            .collect::<Result<Vec<_>, _>>()?;

        let count = parts.len();
        log::debug!("loaded {} {} parts", count, family);
        for part in parts {
            self.insert(part);
        }
        Ok(count)
    }

    /// Add a part, replacing any entry with the same id
    pub fn insert(&mut self, part: PartDescriptor) {
        match self.parts.iter_mut().find(|p| p.id == part.id) {
            Some(existing) => {
                log::debug!("part 0x{:08X}: {} overrides {}", part.id, part.name, existing.name);
                *existing = part;
            }
            None => self.parts.push(part),
        }
    }

    /// Get all parts in the database
    pub fn parts(&self) -> &[PartDescriptor] {
        &self.parts
    }

    /// Get the number of parts in the database
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Check if the database is empty
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Find a part by identification value (revision bits ignored)
    pub fn find(&self, id: u32) -> Option<&PartDescriptor> {
        parts::find_in(&self.parts, id)
    }

    /// Iterate over all parts
    pub fn iter(&self) -> impl Iterator<Item = &PartDescriptor> {
        self.parts.iter()
    }
}
