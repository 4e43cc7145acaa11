//! # Memory Page Table

pub mod pd;
pub mod pt;

use crate::page_table::pd::DirectoryIndex;
use crate::page_table::pt::TableIndex;
use kernel_info::memory::ENTRIES_PER_TABLE;
use kernel_memory_addresses::VirtualAddress;

/// Number of entries in a page directory or page table.
pub(crate) const ENTRIES: usize = ENTRIES_PER_TABLE;

/// Hardware **Present** bit position shared across levels (bit 0).
const PRESENT_BIT: u32 = 1 << 0;

/// Hardware **Page Size** (PS) bit position (bit 7).
///
/// - In non-leaf PDEs: PS **must be 0**.
/// - In 4 MiB leaf PDEs: PS **must be 1**.
/// - In 4 KiB PTEs: bit 7 is **PAT** (not PS).
const PS_BIT: u32 = 1 << 7;

/// Split a virtual address into its directory and table indices.
#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (DirectoryIndex, TableIndex) {
    (DirectoryIndex::from_address(va), TableIndex::from_address(va))
}

/// Rebuild the page-aligned virtual address addressed by a pair of indices.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn join_indices(pd: DirectoryIndex, pt: TableIndex) -> VirtualAddress {
    VirtualAddress::new(pd.base_address().as_u32() | ((pt.as_usize() as u32) << 12))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_ok() {
        let va = VirtualAddress::new(0xC012_3456);
        let (pd, pt) = split_indices(va);
        assert_eq!(pd.as_usize(), 0x300);
        assert_eq!(pt.as_usize(), 0x123);
        assert_eq!(join_indices(pd, pt).as_u32(), 0xC012_3000);
    }
}
