//! # Reverse address walk
//!
//! [`PageWalk`] enumerates every virtual address of one address space that
//! maps a given physical frame. It is resumable: each call to
//! [`get_next`](PageWalk::get_next) continues at the position after the last
//! hit, so a full enumeration visits every directory and table entry at most
//! once no matter how many matches it yields.
//!
//! ```text
//! pd_index ──► 0 … 1023      (directory major)
//! pt_index ──►   0 … 1023    (table minor, reset to 0 per directory entry)
//! ```

use crate::PhysMapper;
use crate::address_space::{AddressSpaceId, map_directory, map_table};
use crate::mapped::Mapped;
use crate::page_table::pd::{DirectoryIndex, PageDirectory, PdeKind};
use crate::page_table::pt::{PageTable, TableIndex};
use crate::page_table::{ENTRIES, join_indices};
use core::iter::FusedIterator;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};
use log::{debug, trace};

/// Resumable physical → virtual walk over one address space.
///
/// Created by [`AddressSpace::init_walk`](crate::AddressSpace::init_walk);
/// advanced with [`get_next`](Self::get_next) (or as an [`Iterator`]);
/// released with [`free_walk`](Self::free_walk) or by dropping it. Any
/// directory or table mapping held between calls is released then.
///
/// A walk is single-owner and bound to the address space it was created
/// for.
#[must_use = "a walk does nothing unless advanced"]
pub struct PageWalk<'m, M: PhysMapper> {
    mapper: &'m M,
    space: AddressSpaceId,
    target: PhysicalAddress,
    directory: Option<Mapped<'m, PageDirectory, M>>,
    table: Option<Mapped<'m, PageTable, M>>,
    pd_index: usize,
    pt_index: usize,
}

impl<'m, M: PhysMapper> PageWalk<'m, M> {
    pub(crate) fn new(mapper: &'m M, space: AddressSpaceId, target: PhysicalAddress) -> Self {
        debug!("Starting reverse walk for {target} in {}", space.page_directory());
        Self {
            mapper,
            space,
            target,
            directory: None,
            table: None,
            pd_index: 0,
            pt_index: 0,
        }
    }

    /// The physical address whose frame is searched for.
    #[inline]
    #[must_use]
    pub const fn target(&self) -> PhysicalAddress {
        self.target
    }

    /// The address space this walk is bound to.
    #[inline]
    #[must_use]
    pub const fn address_space(&self) -> AddressSpaceId {
        self.space
    }

    /// Whether every directory entry has been scanned.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.pd_index >= ENTRIES
    }

    /// Find the next virtual address mapping the target frame.
    ///
    /// The returned address keeps the target's in-page offset (22 bits for a
    /// 4 MiB leaf, 12 bits for a 4 KiB page). Returns `None` once the whole
    /// directory has been scanned, and on every call after that.
    pub fn get_next(&mut self) -> Option<VirtualAddress> {
        let target_4m = self.target.page::<Size4M>();

        while self.pd_index < ENTRIES {
            #[allow(clippy::cast_possible_truncation)]
            let pd = DirectoryIndex::new(self.pd_index as u16);

            let directory = self.directory.get_or_insert_with(|| {
                // SAFETY: the space's CR3 names its page directory frame.
                unsafe { map_directory(self.mapper, self.space) }
            });

            match directory.get(pd).kind() {
                None => {}
                Some(PdeKind::Leaf4MiB(page, _)) => {
                    if page == target_4m {
                        self.pd_index += 1;
                        let va = VirtualAddress::new(
                            pd.base_address().as_u32() | self.target.offset::<Size4M>().as_u32(),
                        );
                        trace!("{} mapped by 4 MiB page at {va}", self.target);
                        return Some(va);
                    }
                }
                Some(PdeKind::PageTable(table, _)) => {
                    if let Some(va) = self.scan_table(pd, table) {
                        return Some(va);
                    }
                }
            }

            self.pd_index += 1;
            self.pt_index = 0;
        }

        if self.directory.is_some() {
            debug!("Reverse walk for {} exhausted", self.target);
        }
        self.release();
        None
    }

    /// Continue scanning the page table `table` referenced by directory entry `pd`.
    ///
    /// On a hit the table stays mapped and `pt_index` points past the hit. When
    /// the table is exhausted its mapping is released.
    fn scan_table(
        &mut self,
        pd: DirectoryIndex,
        table: PhysicalPage<Size4K>,
    ) -> Option<VirtualAddress> {
        let target_4k = self.target.page::<Size4K>();

        if self.table.as_ref().is_some_and(|t| t.frame() != table) {
            self.table = None;
        }
        let mapped = self.table.get_or_insert_with(|| {
            // SAFETY: `table` comes from a present, non-leaf directory entry.
            unsafe { map_table(self.mapper, table) }
        });

        while self.pt_index < ENTRIES {
            #[allow(clippy::cast_possible_truncation)]
            let pt = TableIndex::new(self.pt_index as u16);
            self.pt_index += 1;

            if mapped.get(pt).page_4k() == Some(target_4k) {
                let va = VirtualAddress::new(
                    join_indices(pd, pt).as_u32() | self.target.offset::<Size4K>().as_u32(),
                );
                trace!("{} mapped by 4 KiB page at {va}", self.target);
                return Some(va);
            }
        }

        self.table = None;
        None
    }

    fn release(&mut self) {
        self.table = None;
        self.directory = None;
    }

    /// Release any mapping still held and end the walk.
    #[inline]
    pub fn free_walk(mut self) {
        trace!("Freeing reverse walk for {}", self.target);
        self.release();
    }
}

impl<M: PhysMapper> Iterator for PageWalk<'_, M> {
    type Item = VirtualAddress;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.get_next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.is_exhausted() {
            (0, Some(0))
        } else {
            (0, None)
        }
    }
}

impl<M: PhysMapper> FusedIterator for PageWalk<'_, M> {}

#[cfg(test)]
mod tests {
    use crate::AddressSpace;
    use crate::page_table::pt::{PageTableEntry, TableIndex};
    use crate::sim::SoftMmu;
    use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, Size4M, VirtualAddress};

    const fn va(v: u32) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    #[test]
    fn visits_every_mapping_in_ascending_order() {
        let mmu = SoftMmu::with_frames(32);
        let id = mmu.new_space();
        let target = mmu.alloc_frame();
        let other = mmu.alloc_frame();
        let rw = PageTableEntry::new_common_rw();

        // Inserted out of order, interleaved with non-matching entries.
        mmu.map_4k(id, va(0xC000_5000), target, rw);
        mmu.map_4k(id, va(0x0040_0000), target, rw);
        mmu.map_4k(id, va(0x0040_1000), other, rw);
        mmu.map_4k(id, va(0x0040_2000), target, rw);
        mmu.map_4k(id, va(0x0080_0000), other, rw);
        mmu.map_4k(id, va(0xFFFF_F000), target, rw);
        // The 4 MiB page that contains the target frame.
        let target_4m = target.base().page::<Size4M>();
        mmu.map_4m(id, va(0x4000_0000), target_4m);
        // A 4 MiB page elsewhere in physical memory.
        let neighbour_4m = PhysicalPage::from_frame_number(target_4m.frame_number() ^ 1);
        mmu.map_4m(id, va(0x2000_0000), neighbour_4m);

        let space = AddressSpace::new(&mmu, id);
        let mut walk = space.init_walk(target.base());
        let mut found = Vec::new();
        while let Some(hit) = walk.get_next() {
            found.push(hit.as_u32());
        }

        let expected_4m = 0x4000_0000 | (target.base().as_u32() & 0x3F_FFFF);
        assert_eq!(
            found,
            [0x0040_0000, 0x0040_2000, expected_4m, 0xC000_5000, 0xFFFF_F000]
        );

        // Terminal state is sticky.
        for _ in 0..3 {
            assert_eq!(walk.get_next(), None);
        }
        assert!(walk.is_exhausted());
        assert_eq!(mmu.outstanding_mappings(), 0);
        walk.free_walk();
        assert_eq!(mmu.outstanding_mappings(), 0);
    }

    #[test]
    fn maps_each_table_once_per_walk() {
        let mmu = SoftMmu::with_frames(32);
        let id = mmu.new_space();
        let target = mmu.alloc_frame();
        let other = mmu.alloc_frame();
        let rw = PageTableEntry::new_common_rw();

        for addr in [0x0040_0000, 0x0040_3000, 0x0040_9000, 0x0080_1000, 0x0080_2000] {
            mmu.map_4k(id, va(addr), target, rw);
        }
        // A present table without hits is still scanned.
        mmu.map_4k(id, va(0x00C0_0000), other, rw);

        let space = AddressSpace::new(&mmu, id);
        let before = mmu.mappings_made();
        let hits: Vec<_> = space
            .init_walk(target.base())
            .map(VirtualAddress::as_u32)
            .collect();
        assert_eq!(
            hits,
            [0x0040_0000, 0x0040_3000, 0x0040_9000, 0x0080_1000, 0x0080_2000]
        );
        assert_eq!(
            mmu.mappings_made() - before,
            1 + 3,
            "directory once plus each present table once"
        );
        assert_eq!(mmu.outstanding_mappings(), 0);
    }

    #[test]
    fn keeps_the_in_page_offset() {
        let mmu = SoftMmu::with_frames(16);
        let id = mmu.new_space();
        let target = mmu.alloc_frame();
        mmu.map_4k(id, va(0x1234_5000), target, PageTableEntry::new_common_rw());

        let space = AddressSpace::new(&mmu, id);
        let pa = PhysicalAddress::new(target.base().as_u32() + 0x678);
        let hits: Vec<_> = space.init_walk(pa).collect();
        assert_eq!(hits, [va(0x1234_5678)]);
        assert_eq!(mmu.outstanding_mappings(), 0);
    }

    #[test]
    fn skips_non_present_entries() {
        let mmu = SoftMmu::with_frames(16);
        let id = mmu.new_space();
        let target = mmu.alloc_frame();
        let table = mmu.map_4k(id, va(0x0040_0000), target, PageTableEntry::new_common_rw());
        // A stale entry still naming the target frame, but not present.
        mmu.set_pte(table, TableIndex::new(1), PageTableEntry::new().with_physical_page(target));

        let space = AddressSpace::new(&mmu, id);
        let hits: Vec<_> = space.init_walk(target.base()).collect();
        assert_eq!(hits, [va(0x0040_0000)]);
    }

    #[test]
    fn free_walk_releases_held_mappings() {
        let mmu = SoftMmu::with_frames(16);
        let id = mmu.new_space();
        let target = mmu.alloc_frame();
        mmu.map_4k(id, va(0x0040_0000), target, PageTableEntry::new_common_rw());
        mmu.map_4k(id, va(0x0040_7000), target, PageTableEntry::new_common_rw());

        let space = AddressSpace::new(&mmu, id);
        let mut walk = space.init_walk(target.base());
        assert_eq!(walk.get_next(), Some(va(0x0040_0000)));

        // Directory and table stay mapped to resume from the next table index.
        assert_eq!(mmu.outstanding_mappings(), 2);
        walk.free_walk();
        assert_eq!(mmu.outstanding_mappings(), 0);
    }

    #[test]
    fn dropping_a_walk_releases_held_mappings() {
        let mmu = SoftMmu::with_frames(16);
        let id = mmu.new_space();
        let target = mmu.alloc_frame();
        mmu.map_4k(id, va(0x0040_0000), target, PageTableEntry::new_common_rw());

        let space = AddressSpace::new(&mmu, id);
        {
            let mut walk = space.init_walk(target.base());
            assert!(walk.next().is_some());
        }
        assert_eq!(mmu.outstanding_mappings(), 0);
    }

    #[test]
    fn empty_space_yields_nothing() {
        let mmu = SoftMmu::with_frames(4);
        let id = mmu.new_space();
        let space = AddressSpace::new(&mmu, id);
        let mut walk = space.init_walk(PhysicalAddress::new(0x0000_2000));
        assert_eq!(walk.next(), None);
        assert_eq!(walk.size_hint(), (0, Some(0)));
        assert_eq!(walk.address_space(), id);
        assert_eq!(walk.target().page::<Size4K>().frame_number(), 2);
    }
}
