//! # Page Table
//!
//! The leaf level: 1024 [`PageTableEntry`]s, selected by address bits
//! `[21:12]` ([`TableIndex`]), each mapping one 4 KiB page. Bit 7 is PAT
//! here, not a page-size flag.

use crate::page_table::ENTRIES;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// **PTE** — maps a single 4 KiB page.
///
/// | Bits  | Field |
/// |-------|-------|
/// | 0     | present |
/// | 1     | writable |
/// | 2     | user |
/// | 3     | write-through |
/// | 4     | cache-disable |
/// | 5     | accessed |
/// | 6     | dirty |
/// | 7     | PAT |
/// | 8     | global |
/// | 9–11  | reserved |
/// | 12–31 | frame (`physical >> 12`) |
#[doc(alias = "PTE")]
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageTableEntry {
    /// Present (bit 0).
    pub present: bool,
    /// Writable (bit 1).
    pub writable: bool,
    /// User (bit 2).
    pub user: bool,
    /// Write-Through (bit 3).
    pub write_through: bool,
    /// Cache Disable (bit 4).
    pub cache_disable: bool,
    /// Accessed (bit 5).
    pub accessed: bool,
    /// Dirty (bit 6).
    pub dirty: bool,
    /// PAT (bit 7).
    pub pat: bool,
    /// Global (bit 8).
    pub global: bool,
    /// Reserved (bits 9..11).
    #[bits(3)]
    __reserved9: u8,
    /// Physical page frame number (bits 12..31).
    #[bits(20)]
    frame: u32,
}

/// Index into a page table (derived from VA bits `[21:12]`).
///
/// Range is `0..1024` (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

/// A page table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PageTableEntry; ENTRIES],
}

impl PageTableEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self::new()
    }

    /// Set the mapped 4 KiB frame.
    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, phys: PhysicalPage<Size4K>) -> Self {
        self.set_physical_page(phys);
        self
    }

    /// Set the mapped 4 KiB frame.
    #[inline]
    pub const fn set_physical_page(&mut self, phys: PhysicalPage<Size4K>) {
        self.set_frame(phys.frame_number());
    }

    /// The mapped 4 KiB frame, regardless of the present bit.
    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_frame_number(self.frame())
    }

    /// If present, return the mapped 4 KiB frame.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<PhysicalPage<Size4K>> {
        if self.present() {
            Some(self.physical_page())
        } else {
            None
        }
    }

    /// Create a present 4 KiB leaf entry with the given flags.
    #[inline]
    #[must_use]
    pub const fn make_4k(page: PhysicalPage<Size4K>, flags: Self) -> Self {
        flags.with_present(true).with_physical_page(page)
    }

    /// Leaf PTE with common kernel RW flags.
    #[inline]
    #[must_use]
    pub const fn new_common_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }
}

impl TableIndex {
    /// Build an index from a virtual address (extracts bits `[21:12]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_address(va: VirtualAddress) -> Self {
        Self::new(((va.as_u32() >> 12) & 0x3FF) as u16)
    }

    /// Construct from a raw `u16`.
    ///
    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Byte offset of the entry inside the table frame.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self) -> usize {
        self.as_usize() * size_of::<PageTableEntry>()
    }
}

impl PageTable {
    /// Create a fully zeroed page table (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageTableEntry::zero(); ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageTableEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageTableEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub const fn set_zero(&mut self, i: TableIndex) {
        self.set(i, PageTableEntry::zero());
    }

    /// Derive the PT index from a virtual address.
    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> TableIndex {
        TableIndex::from_address(va)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn pt_4k_leaf() {
        let k4 = PhysicalAddress::new(0x0004_5000).page::<Size4K>();
        let e = PageTableEntry::make_4k(k4, PageTableEntry::new_common_rw());
        assert_eq!(e.into_bits(), 0x0004_5003);
        assert_eq!(e.page_4k().unwrap().base().as_u32(), 0x0004_5000);
    }

    #[test]
    fn not_present_still_carries_frame() {
        let e = PageTableEntry::from_bits(0x0001_2000);
        assert!(e.page_4k().is_none());
        assert_eq!(e.physical_page().base().as_u32(), 0x0001_2000);
    }

    #[test]
    fn flag_bits_match_hardware() {
        let e = PageTableEntry::new()
            .with_present(true)
            .with_writable(true)
            .with_user(true)
            .with_write_through(true)
            .with_cache_disable(true)
            .with_accessed(true)
            .with_dirty(true)
            .with_pat(true)
            .with_global(true);
        assert_eq!(e.into_bits(), 0x1FF);
    }

    #[test]
    fn index_from_address() {
        let i = TableIndex::from_address(VirtualAddress::new(0xFF80_1234));
        assert_eq!(i.as_usize(), 1);
        assert_eq!(i.byte_offset(), 4);
        let last = TableIndex::from_address(VirtualAddress::new(0x003F_F000));
        assert_eq!(last.as_usize(), 1023);
    }
}
