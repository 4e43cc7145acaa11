//! # Page Directory
//!
//! The upper level of two-level paging. Bits `[31:22]` of a virtual address
//! pick one of 1024 [`PageDirectoryEntry`]s, addressed by a [`DirectoryIndex`].
//!
//! An entry's `PS` bit decides what it is. With `PS=0` it points at a
//! [`PageTable`](crate::page_table::pt::PageTable) whose 4 KiB frame sits in
//! bits `[31:12]`; with `PS=1` it maps a 4 MiB page directly and only bits
//! `[31:22]` carry the frame. [`PdeKind`] is the decoded form of a present
//! entry.
//!
//! Constructors here trust their inputs, and nothing in this module touches
//! the TLB.

use crate::page_table::{ENTRIES, PRESENT_BIT, PS_BIT};
use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::{PhysicalPage, Size4K, Size4M, VirtualAddress};

/// **Borrowed view** into a PDE.
///
/// Returned by [`PageDirectoryEntry::view`].
#[derive(Copy, Clone, Debug)]
pub enum PdeView {
    /// Non-leaf PDE view (PS=0).
    Table(Pde),
    /// 4 MiB leaf PDE view (PS=1).
    Leaf4M(Pde4M),
}

/// **PDE union** — overlays non-leaf [`Pde`] and leaf [`Pde4M`]
/// on the same 32-bit storage.
///
/// Prefer [`PageDirectoryEntry::view`] or [`PageDirectoryEntry::kind`] for
/// typed access. These check the **PS** bit and hand you the correct variant.
#[doc(alias = "PDE")]
#[derive(Copy, Clone)]
#[repr(C)]
pub union PageDirectoryEntry {
    /// Raw 32-bit storage of the entry.
    bits: u32,
    /// Non-leaf form: next-level page table (PS=0).
    table: Pde,
    /// Leaf form: 4 MiB mapping (PS=1).
    large: Pde4M,
}

/// **PDE** — pointer to a **page table** (non-leaf; PS **= 0**).
///
/// Bits `[31:12]` hold the 4 KiB-aligned page table frame.
#[bitfield(u32)]
pub struct Pde {
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
    /// Bit 6: **ignored** in non-leaf.
    #[bits(1)]
    __ignored6: u8,
    /// PS (bit 7): **must be 0** in non-leaf.
    #[bits(1)]
    __ps_must_be_0: u8,
    /// Bit 8: **ignored** in non-leaf.
    #[bits(1)]
    __ignored8: u8,
    /// OS-available (bits 9..11).
    #[bits(3)]
    pub os_available: u8,
    /// **Page table frame number** (bits 12..31).
    #[bits(20)]
    table_frame: u32,
}

impl Pde {
    /// Set the page table base (4 KiB-aligned).
    #[inline]
    #[must_use]
    pub const fn with_page_table(mut self, table: PhysicalPage<Size4K>) -> Self {
        self.set_page_table(table);
        self
    }

    /// Set the page table base (4 KiB-aligned).
    #[inline]
    pub const fn set_page_table(&mut self, table: PhysicalPage<Size4K>) {
        self.set_table_frame(table.frame_number());
    }

    /// Get the page table base.
    #[inline]
    #[must_use]
    pub const fn page_table(self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_frame_number(self.table_frame())
    }

    /// Non-leaf PDE with common kernel RW flags.
    #[inline]
    #[must_use]
    pub const fn new_common_rw() -> Self {
        Self::new().with_present(true).with_writable(true)
    }
}

/// **PDE (4 MiB leaf)** — maps a single 4 MiB page (`PS = 1`).
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
/// | 7     | large-page (always 1) |
/// | 8     | global |
/// | 9–11  | reserved |
/// | 12    | PAT |
/// | 13–21 | reserved |
/// | 22–31 | frame (`physical >> 22`) |
#[bitfield(u32)]
pub struct Pde4M {
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
    /// **Dirty** (bit 6): set by CPU on first write to this 4 MiB page.
    pub dirty: bool,
    /// **Page Size** (bit 7): **must be 1** for a 4 MiB leaf.
    #[bits(default = true)]
    pub large_page: bool,
    /// **Global** (bit 8): TLB entry not flushed on CR3 reload.
    pub global: bool,
    /// Reserved (bits 9..11).
    #[bits(3)]
    __reserved9: u8,
    /// **PAT** selector for 4 MiB mappings (bit 12).
    pub pat: bool,
    /// Reserved (bits 13..21): must be 0.
    #[bits(9)]
    __reserved13: u16,
    /// Physical address bits 31:22.
    #[bits(10)]
    frame: u16,
}

impl Pde4M {
    /// Set the 4 MiB page base.
    #[inline]
    #[must_use]
    pub const fn with_physical_page(mut self, phys: PhysicalPage<Size4M>) -> Self {
        self.set_physical_page(phys);
        self
    }

    /// Set the 4 MiB page base.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn set_physical_page(&mut self, phys: PhysicalPage<Size4M>) {
        self.set_frame(phys.frame_number() as u16);
        self.set_large_page(true);
    }

    /// Get the 4 MiB page base.
    #[inline]
    #[must_use]
    pub const fn physical_page(self) -> PhysicalPage<Size4M> {
        PhysicalPage::from_frame_number(self.frame() as u32)
    }

    /// Leaf PDE with common kernel RW flags.
    #[inline]
    #[must_use]
    pub const fn new_common_rw() -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_large_page(true)
    }
}

/// Index into the page directory (derived from VA bits `[31:22]`).
///
/// Strongly-typed to avoid mixing with table indices. Range is `0..1024`
/// (checked in debug builds).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DirectoryIndex(u16);

/// Decoded PDE kind.
///
/// - [`PageTable`](PdeKind::PageTable): non-leaf (`PS=0`), contains the 4 KiB-aligned table base.
/// - [`Leaf4MiB`](PdeKind::Leaf4MiB): leaf (`PS=1`), contains the 4 MiB-aligned large-page base.
#[derive(Copy, Clone, Debug)]
pub enum PdeKind {
    PageTable(PhysicalPage<Size4K>, Pde),
    Leaf4MiB(PhysicalPage<Size4M>, Pde4M),
}

/// The page directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PageDirectoryEntry; ENTRIES],
}

impl DirectoryIndex {
    /// Build an index from a virtual address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_address(va: VirtualAddress) -> Self {
        Self::new((va.as_u32() >> 22) as u16)
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

    /// Return the index as `usize` for table access.
    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Byte offset of the entry inside the directory frame.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self) -> usize {
        self.as_usize() * size_of::<PageDirectoryEntry>()
    }

    /// First virtual address governed by this entry.
    #[inline]
    #[must_use]
    pub const fn base_address(self) -> VirtualAddress {
        VirtualAddress::new((self.0 as u32) << 22)
    }
}

impl Default for PageDirectoryEntry {
    #[inline]
    fn default() -> Self {
        Self::zero()
    }
}

impl PageDirectoryEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self { bits: 0 }
    }

    #[inline]
    #[must_use]
    pub const fn new_table(table: Pde) -> Self {
        Self { table }
    }

    #[inline]
    #[must_use]
    pub const fn new_leaf(large: Pde4M) -> Self {
        Self { large }
    }

    /// Construct union from raw `bits` (no validation).
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self { bits }
    }

    /// Extract raw `bits` back from the union.
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u32 {
        // SAFETY: every variant is a `u32` bit pattern.
        unsafe { self.bits }
    }

    #[inline]
    #[must_use]
    pub const fn present(self) -> bool {
        self.into_bits() & PRESENT_BIT != 0
    }

    /// Whether the entry maps a 4 MiB page directly (`PS=1`).
    #[inline]
    #[must_use]
    pub const fn large_page(self) -> bool {
        self.into_bits() & PS_BIT != 0
    }

    /// **Typed read-only view** chosen by the **PS** bit.
    ///
    /// - If PS=1 → [`PdeView::Leaf4M`]
    /// - If PS=0 → [`PdeView::Table`]
    #[inline]
    #[must_use]
    pub const fn view(self) -> PdeView {
        // SAFETY: every variant is a `u32` bit pattern.
        unsafe {
            if self.large_page() {
                PdeView::Leaf4M(self.large)
            } else {
                PdeView::Table(self.table)
            }
        }
    }

    /// Decode the entry into its semantic kind, or `None` if not present.
    #[inline]
    #[must_use]
    pub const fn kind(self) -> Option<PdeKind> {
        if !self.present() {
            return None;
        }

        Some(match self.view() {
            PdeView::Table(entry) => PdeKind::PageTable(entry.page_table(), entry),
            PdeView::Leaf4M(entry) => PdeKind::Leaf4MiB(entry.physical_page(), entry),
        })
    }

    /// Create a present non-leaf PDE that points to a page table (`PS=0`).
    #[inline]
    #[must_use]
    pub const fn make_table(table: PhysicalPage<Size4K>, flags: Pde) -> Self {
        Self::new_table(flags.with_present(true).with_page_table(table))
    }

    /// Create a present 4 MiB leaf PDE (`PS=1`).
    #[inline]
    #[must_use]
    pub const fn make_4m(page: PhysicalPage<Size4M>, flags: Pde4M) -> Self {
        Self::new_leaf(flags.with_present(true).with_physical_page(page))
    }
}

impl fmt::Debug for PageDirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.view() {
            PdeView::Table(e) => f.debug_tuple("PageDirectoryEntry").field(&e).finish(),
            PdeView::Leaf4M(e) => f.debug_tuple("PageDirectoryEntry").field(&e).finish(),
        }
    }
}

impl From<Pde> for PageDirectoryEntry {
    #[inline]
    fn from(e: Pde) -> Self {
        Self::new_table(e)
    }
}

impl From<Pde4M> for PageDirectoryEntry {
    #[inline]
    fn from(e: Pde4M) -> Self {
        Self::new_leaf(e)
    }
}

impl PageDirectory {
    /// Create a fully zeroed page directory (all entries non-present).
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PageDirectoryEntry::zero(); ENTRIES],
        }
    }

    /// Read the entry at `i`.
    ///
    /// Plain load; does not imply any TLB synchronization.
    #[inline]
    #[must_use]
    pub const fn get(&self, i: DirectoryIndex) -> PageDirectoryEntry {
        self.entries[i.as_usize()]
    }

    /// Write the entry at `i`.
    ///
    /// Caller must handle any required TLB invalidation when changing active mappings.
    #[inline]
    pub const fn set(&mut self, i: DirectoryIndex, e: PageDirectoryEntry) {
        self.entries[i.as_usize()] = e;
    }

    /// Set the entry at `i` to [`PageDirectoryEntry::zero`].
    #[inline]
    pub const fn set_zero(&mut self, i: DirectoryIndex) {
        self.set(i, PageDirectoryEntry::zero());
    }

    /// Derive the PD index from a virtual address.
    #[inline]
    #[must_use]
    pub const fn index_of(va: VirtualAddress) -> DirectoryIndex {
        DirectoryIndex::from_address(va)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use kernel_memory_addresses::PhysicalAddress;

    #[test]
    fn pd_table_vs_4m() {
        let pt = PhysicalAddress::new(0x0030_0000).page::<Size4K>();
        let e_tbl = PageDirectoryEntry::make_table(pt, Pde::new_common_rw());
        assert_eq!(e_tbl.into_bits(), 0x0030_0003);
        match e_tbl.kind().unwrap() {
            PdeKind::PageTable(p, f) => {
                assert_eq!(p.base().as_u32(), 0x0030_0000);
                assert_eq!(f.into_bits() & (1 << 7), 0, "must be PS=0");
            }
            PdeKind::Leaf4MiB(..) => panic!("expected next PT"),
        }

        let m4 = PhysicalAddress::new(0x0C00_0000).page::<Size4M>();
        let e_4m = PageDirectoryEntry::make_4m(m4, Pde4M::new_common_rw());
        assert_eq!(e_4m.into_bits(), 0x0C00_0083);
        match e_4m.kind().unwrap() {
            PdeKind::Leaf4MiB(p, f) => {
                assert_eq!(p.base().as_u32(), 0x0C00_0000);
                assert!(f.large_page(), "must be PS=1");
            }
            PdeKind::PageTable(..) => panic!("expected 4MiB leaf"),
        }
    }

    #[test]
    fn large_page_bit_layout_matches_hardware() {
        let e = Pde4M::new()
            .with_present(true)
            .with_writable(true)
            .with_user(true)
            .with_write_through(true)
            .with_cache_disable(true)
            .with_accessed(true)
            .with_dirty(true)
            .with_global(true)
            .with_pat(true)
            .with_physical_page(PhysicalPage::from_frame_number(0x3FF));
        assert_eq!(e.into_bits(), 0xFFC0_11FF);
    }

    #[test]
    fn reserved_bits_do_not_leak_into_frame() {
        let e = PageDirectoryEntry::from_bits(0x0040_0000 | 0x003F_E000 | 0x81);
        let PdeView::Leaf4M(leaf) = e.view() else {
            panic!("expected 4MiB leaf");
        };
        assert_eq!(leaf.physical_page().base().as_u32(), 0x0040_0000);
    }

    #[test]
    fn non_present_entries_have_no_kind() {
        assert!(PageDirectoryEntry::zero().kind().is_none());
        assert!(PageDirectoryEntry::from_bits(0x0040_0080).kind().is_none());
    }

    #[test]
    fn index_from_address() {
        let i = DirectoryIndex::from_address(VirtualAddress::new(0xFF80_1234));
        assert_eq!(i.as_usize(), 0x3FE);
        assert_eq!(i.byte_offset(), 0xFF8);
        assert_eq!(i.base_address().as_u32(), 0xFF80_0000);
    }
}
