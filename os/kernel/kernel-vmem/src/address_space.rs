//! # Address Space (IA-32, non-PAE)
//!
//! Strongly-typed access to **one** two-level paging hierarchy, identified by
//! its [`AddressSpaceId`] (the CR3 value that selects its page directory).
//!
//! ## Highlights
//!
//! - [`AddressSpace::map_in_pde`] maps in the directory entry governing a VA.
//! - [`AddressSpace::map_in_pte`] maps in the table entry governing a VA, or
//!   reports that a 4 MiB leaf ends the translation at the directory level.
//! - [`AddressSpace::map_out_entry`] releases either kind of handle.
//! - [`AddressSpace::query`] translates a VA to a PA.
//! - [`AddressSpace::init_walk`] starts a reverse (PA → VA) walk.
//!
//! ## Design
//!
//! - Every entry is reached through the [`PhysMapper`]; nothing relies on a
//!   recursive mapping or on the space being active.
//! - Handles unmap on drop, so a mapping is released on every path.
//! - All operations here are passive level only. The DIRQL-safe resolver lives
//!   in `kernel-alloc`.

use crate::mapped::{Mapped, MappedPde, MappedPte};
use crate::page_table::pd::{DirectoryIndex, PageDirectory, PdeKind, PdeView};
use crate::page_table::pt::{PageTable, TableIndex};
use crate::walk::PageWalk;
use crate::PhysMapper;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};
use kernel_registers::cr3::Cr3;
use log::trace;

/// Identifies one page-directory hierarchy: the value CR3 holds while the
/// space is active.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct AddressSpaceId(Cr3);

impl AddressSpaceId {
    /// Wrap a raw CR3 value.
    #[inline]
    #[must_use]
    pub const fn from_cr3(cr3: Cr3) -> Self {
        Self(cr3)
    }

    /// Identify the space whose page directory lives in `directory`.
    #[inline]
    #[must_use]
    pub const fn from_page_directory(directory: PhysicalPage<Size4K>) -> Self {
        Self(Cr3::from_page_directory(directory, false, false))
    }

    /// Identify the address space that is currently active on this processor.
    ///
    /// # Safety
    /// Must run at CPL0 with paging enabled.
    #[cfg(all(feature = "asm", target_arch = "x86"))]
    #[inline]
    #[must_use]
    pub unsafe fn from_current() -> Self {
        use kernel_registers::LoadRegisterUnsafe;
        // SAFETY: forwarded to the caller.
        Self(unsafe { Cr3::load_unsafe() })
    }

    /// The `CR3` value that loads this address space.
    #[inline]
    #[must_use]
    pub const fn cr3(self) -> Cr3 {
        self.0
    }

    /// Physical frame of the page directory.
    #[inline]
    #[must_use]
    pub const fn page_directory(self) -> PhysicalPage<Size4K> {
        self.0.page_directory()
    }

    /// Physical address of the directory entry that governs `va`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn directory_entry_address(self, va: VirtualAddress) -> PhysicalAddress {
        let offset = DirectoryIndex::from_address(va).byte_offset() as u32;
        PhysicalAddress::new(self.page_directory().base().as_u32() | offset)
    }
}

/// Handle to a single, concrete address space.
pub struct AddressSpace<'m, M: PhysMapper> {
    id: AddressSpaceId,
    mapper: &'m M,
}

impl<'m, M: PhysMapper> AddressSpace<'m, M> {
    /// Bind `mapper` to the space identified by `id`.
    #[inline]
    #[must_use]
    pub const fn new(mapper: &'m M, id: AddressSpaceId) -> Self {
        Self { id, mapper }
    }

    /// View the **currently active** address space by reading CR3.
    ///
    /// # Safety
    /// - Must run at CPL0 with paging enabled.
    /// - Assumes CR3 points at a valid page directory frame.
    #[cfg(all(feature = "asm", target_arch = "x86"))]
    #[inline]
    pub unsafe fn from_current(mapper: &'m M) -> Self {
        // SAFETY: forwarded to the caller.
        Self::new(mapper, unsafe { AddressSpaceId::from_current() })
    }

    /// The address space this resolver works on.
    #[inline]
    #[must_use]
    pub const fn id(&self) -> AddressSpaceId {
        self.id
    }

    /// The mapper used for temporary entry mappings.
    #[inline]
    #[must_use]
    pub const fn mapper(&self) -> &'m M {
        self.mapper
    }

    /// Map in the page-directory entry that governs `va`.
    ///
    /// Never fails: every address has a directory entry. Whether it is present
    /// is for the caller to inspect.
    pub fn map_in_pde(&self, va: VirtualAddress) -> MappedPde<'m, M> {
        let index = DirectoryIndex::from_address(va);
        trace!(
            "Mapping in PDE {} of {va} (directory at {})",
            index.as_usize(),
            self.id.page_directory()
        );

        // SAFETY: the entry lies inside the directory frame named by CR3.
        unsafe { Mapped::map_in(self.mapper, self.id.page_directory(), index.byte_offset()) }
    }

    /// Map in the page-table entry that governs `va`.
    ///
    /// Returns `None` if and only if the governing directory entry has its
    /// large-page bit set: the translation then completes at the directory
    /// level and no table exists. The directory entry is mapped out before
    /// returning.
    ///
    /// A directory entry whose present bit is clear is still followed; the
    /// returned table entry then belongs to whatever frame the stale entry
    /// references, and callers must check the directory's present bit first
    /// if that matters to them.
    pub fn map_in_pte(&self, va: VirtualAddress) -> Option<MappedPte<'m, M>> {
        let pde = *self.map_in_pde(va);

        let PdeView::Table(table) = pde.view() else {
            trace!("{va} is covered by a 4 MiB page; no PTE exists");
            return None;
        };

        let index = TableIndex::from_address(va);
        trace!(
            "Mapping in PTE {} of {va} (table at {})",
            index.as_usize(),
            table.page_table()
        );

        // SAFETY: the entry lies inside the table frame the PDE references.
        Some(unsafe { Mapped::map_in(self.mapper, table.page_table(), index.byte_offset()) })
    }

    /// Release a handle produced by [`map_in_pde`](Self::map_in_pde) or
    /// [`map_in_pte`](Self::map_in_pte).
    #[inline]
    pub fn map_out_entry<T>(&self, entry: Mapped<'m, T, M>) {
        entry.map_out();
    }

    /// Translate a `VirtualAddress` to `PhysicalAddress` if mapped.
    ///
    /// Handles 4 MiB leaves by adding the 22-bit in-page offset.
    #[must_use]
    pub fn query(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let table = match self.map_in_pde(va).kind()? {
            PdeKind::Leaf4MiB(base, _) => return Some(base.join(va.offset::<Size4M>())),
            PdeKind::PageTable(table, _) => table,
        };

        // SAFETY: the entry lies inside the table frame the PDE references.
        let pte: MappedPte<'m, M> = unsafe {
            Mapped::map_in(
                self.mapper,
                table,
                TableIndex::from_address(va).byte_offset(),
            )
        };
        let page = pte.page_4k()?;
        Some(page.join(va.offset::<Size4K>()))
    }

    /// Start a reverse walk for every virtual address of this space that maps
    /// the frame containing `target`.
    ///
    /// The walk is bound to this space for its whole life.
    pub fn init_walk(&self, target: PhysicalAddress) -> PageWalk<'m, M> {
        PageWalk::new(self.mapper, self.id, target)
    }
}

/// Map the whole page directory of `space`.
///
/// # Safety
/// Passive level only; `space` must name a valid page directory frame.
pub(crate) unsafe fn map_directory<M: PhysMapper>(
    mapper: &M,
    space: AddressSpaceId,
) -> Mapped<'_, PageDirectory, M> {
    // SAFETY: forwarded to the caller.
    unsafe { Mapped::map_in(mapper, space.page_directory(), 0) }
}

/// Map a whole page table.
///
/// # Safety
/// Passive level only; `table` must be a frame referenced by a present,
/// non-leaf directory entry.
pub(crate) unsafe fn map_table<M: PhysMapper>(
    mapper: &M,
    table: PhysicalPage<Size4K>,
) -> Mapped<'_, PageTable, M> {
    // SAFETY: forwarded to the caller.
    unsafe { Mapped::map_in(mapper, table, 0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_table::pd::{PageDirectoryEntry, Pde4M};
    use crate::page_table::pt::PageTableEntry;
    use crate::sim::SoftMmu;

    #[test]
    fn directory_entry_address_uses_high_bits() {
        let id = AddressSpaceId::from_page_directory(PhysicalPage::from_frame_number(0x39C));
        let pa = id.directory_entry_address(VirtualAddress::new(0xC000_1234));
        assert_eq!(pa.as_u32(), 0x0039_CC00);
    }

    #[test]
    fn id_round_trips_cr3() {
        let cr3 = Cr3::from_bits(0x0012_3018);
        let id = AddressSpaceId::from_cr3(cr3);
        assert_eq!(id.cr3(), cr3);
        assert_eq!(id.page_directory().base().as_u32(), 0x0012_3000);
    }

    #[test]
    fn map_in_pte_is_none_iff_large_page() {
        let mmu = SoftMmu::with_frames(8);
        let id = mmu.new_space();
        let space = AddressSpace::new(&mmu, id);
        let table = mmu.alloc_frame();
        let va = VirtualAddress::new(0x8040_5000);
        let index = DirectoryIndex::from_address(va);

        // Every combination of the flag bits 0..=8, over a valid table frame.
        for flags in 0..=0x1FFu32 {
            let raw = table.base().as_u32() | flags;
            mmu.set_pde(id, index, PageDirectoryEntry::from_bits(raw));

            let large = flags & (1 << 7) != 0;
            let pte = space.map_in_pte(va);
            assert_eq!(pte.is_none(), large, "flags {flags:#05x}");
            if let Some(pte) = pte {
                assert_eq!(pte.frame(), table);
                space.map_out_entry(pte);
            }
            assert_eq!(mmu.outstanding_mappings(), 0, "flags {flags:#05x}");
        }
    }

    #[test]
    fn map_in_pde_exposes_the_live_entry() {
        let mmu = SoftMmu::with_frames(8);
        let id = mmu.new_space();
        let space = AddressSpace::new(&mmu, id);
        let va = VirtualAddress::new(0xC000_0000);

        let mut pde = space.map_in_pde(va);
        assert!(!pde.present());
        assert_eq!(pde.frame(), id.page_directory());

        let page = PhysicalAddress::new(0x0100_0000).page::<Size4M>();
        *pde = PageDirectoryEntry::make_4m(page, Pde4M::new_common_rw());
        space.map_out_entry(pde);

        let stored = mmu.pde(id, DirectoryIndex::from_address(va));
        assert!(stored.present() && stored.large_page());
        assert_eq!(mmu.outstanding_mappings(), 0);
    }

    #[test]
    fn map_in_pte_follows_table() {
        let mmu = SoftMmu::with_frames(8);
        let id = mmu.new_space();
        let space = AddressSpace::new(&mmu, id);
        let frame = mmu.alloc_frame();
        let va = VirtualAddress::new(0x0040_3000);
        let table = mmu.map_4k(id, va, frame, PageTableEntry::new_common_rw());

        let mut pte = space.map_in_pte(va).expect("4 KiB mapping");
        assert_eq!(pte.frame(), table);
        assert_eq!(pte.page_4k(), Some(frame));

        pte.set_present(false);
        drop(pte);

        assert!(mmu.pte(table, TableIndex::from_address(va)).page_4k().is_none());
        assert_eq!(mmu.outstanding_mappings(), 0);
    }

    #[test]
    fn query_translates_both_page_sizes() {
        let mmu = SoftMmu::with_frames(8);
        let id = mmu.new_space();
        let space = AddressSpace::new(&mmu, id);

        let frame = mmu.alloc_frame();
        mmu.map_4k(id, VirtualAddress::new(0x0040_3000), frame, PageTableEntry::new_common_rw());
        assert_eq!(
            space.query(VirtualAddress::new(0x0040_3ABC)),
            Some(PhysicalAddress::new(frame.base().as_u32() + 0xABC))
        );

        let page = PhysicalAddress::new(0x0C00_0000).page::<Size4M>();
        mmu.map_4m(id, VirtualAddress::new(0xC000_0000), page);
        assert_eq!(
            space.query(VirtualAddress::new(0xC012_3456)),
            Some(PhysicalAddress::new(0x0C12_3456))
        );

        assert_eq!(mmu.outstanding_mappings(), 0);
    }

    #[test]
    fn query_misses_release_every_mapping() {
        let mmu = SoftMmu::with_frames(8);
        let id = mmu.new_space();
        let space = AddressSpace::new(&mmu, id);

        // Directory entry not present.
        assert_eq!(space.query(VirtualAddress::new(0x1000_0000)), None);
        assert_eq!(mmu.outstanding_mappings(), 0);

        // Table present, entry not present.
        let frame = mmu.alloc_frame();
        mmu.map_4k(id, VirtualAddress::new(0x0040_3000), frame, PageTableEntry::new_common_rw());
        assert_eq!(space.query(VirtualAddress::new(0x0040_4000)), None);
        assert_eq!(mmu.outstanding_mappings(), 0);
        assert!(mmu.mappings_made() >= 3);
    }
}
