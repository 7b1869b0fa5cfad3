//! AVR32 UC3 flash part table

use alloc::borrow::Cow;

/// Bits of the identification register compared against the table
///
/// The top nibble is the silicon revision and is ignored.
pub const ID_MASK: u32 = 0x0FFF_FFFF;

/// Words per flash page
pub const PAGE_WORDS: usize = 128;

/// Bytes per flash page
pub const PAGE_SIZE: usize = PAGE_WORDS * 4;

/// Static description of a flash part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDescriptor {
    /// Identification register value (revision nibble cleared)
    pub id: u32,
    /// Part name
    pub name: Cow<'static, str>,
    /// Number of flash pages
    pub pages: u32,
    /// Total flash size in bytes
    pub bytes: u32,
}

impl PartDescriptor {
    /// Create a descriptor with a static name
    pub const fn new(id: u32, name: &'static str, pages: u32, bytes: u32) -> Self {
        Self {
            id,
            name: Cow::Borrowed(name),
            pages,
            bytes,
        }
    }
}

const KIB: u32 = 1024;

/// Known AT32UC3 parts
pub static AVR32_PARTS: &[PartDescriptor] = &[
    PartDescriptor::new(0x01ED_C03F, "AT32UC3A0512", 1024, 512 * KIB),
    PartDescriptor::new(0x01ED_D03F, "AT32UC3A1512", 1024, 512 * KIB),
    PartDescriptor::new(0x01ED_F03F, "AT32UC3A0256", 512, 256 * KIB),
    PartDescriptor::new(0x01EE_003F, "AT32UC3A1256", 512, 256 * KIB),
    PartDescriptor::new(0x01EE_403F, "AT32UC3B0256", 512, 256 * KIB),
    PartDescriptor::new(0x01EE_503F, "AT32UC3B1256", 512, 256 * KIB),
    PartDescriptor::new(0x01EE_203F, "AT32UC3A0128", 256, 128 * KIB),
    PartDescriptor::new(0x01EE_303F, "AT32UC3A1128", 256, 128 * KIB),
    PartDescriptor::new(0x01EE_603F, "AT32UC3B0128", 256, 128 * KIB),
    PartDescriptor::new(0x01EE_903F, "AT32UC3B1128", 256, 128 * KIB),
    PartDescriptor::new(0x01EE_A03F, "AT32UC3B064", 128, 64 * KIB),
    PartDescriptor::new(0x01EE_B03F, "AT32UC3B164", 128, 64 * KIB),
];

/// Flash sizes selected by the FSZ field of the status register
pub const FLASH_SIZES: [u32; 8] = [
    32 * KIB,
    64 * KIB,
    128 * KIB,
    256 * KIB,
    384 * KIB,
    512 * KIB,
    768 * KIB,
    1024 * KIB,
];

/// Look up a part in the built-in table
pub fn find_part(id: u32) -> Option<&'static PartDescriptor> {
    find_in(AVR32_PARTS, id)
}

/// Look up a part in `parts` by identification value
///
/// `id` is masked with [`ID_MASK`] before the comparison.
pub fn find_in(parts: &[PartDescriptor], id: u32) -> Option<&PartDescriptor> {
    let id = id & ID_MASK;
    parts.iter().find(|p| p.id == id)
}

/// Flash size for an FSZ field value
pub fn flash_size(index: usize) -> Option<u32> {
    FLASH_SIZES.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_ignores_revision() {
        let p = find_part(0x31ED_C03F).unwrap();
        assert_eq!(p.name, "AT32UC3A0512");
        assert_eq!(p.pages, 1024);
        assert_eq!(p.bytes, 512 * 1024);
    }

    #[test]
    fn test_find_unknown() {
        assert!(find_part(0x0BA0_0477).is_none());
        assert!(find_part(0).is_none());
    }

    #[test]
    fn test_table_is_consistent() {
        for p in AVR32_PARTS {
            assert_eq!(p.pages as usize * PAGE_SIZE, p.bytes as usize, "{}", p.name);
            assert_eq!(p.id & !ID_MASK, 0);
        }
    }

    #[test]
    fn test_flash_size() {
        assert_eq!(flash_size(0), Some(32 * 1024));
        assert_eq!(flash_size(5), Some(512 * 1024));
        assert_eq!(flash_size(8), None);
    }
}
