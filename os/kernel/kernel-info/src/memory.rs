//! # Memory Layout

use kernel_memory_addresses::{PageSize, Size4K, Size4M, VirtualPage};

/// Size of a page mapped by a page-table entry.
pub const PAGE_SIZE_SMALL: u32 = Size4K::SIZE;

/// Size of a page mapped directly by a page-directory entry (`PS=1`).
pub const PAGE_SIZE_LARGE: u32 = Size4M::SIZE;

/// Number of 32-bit entries in a page directory or page table.
pub const ENTRIES_PER_TABLE: usize = 1024;

/// First page-directory index of the kernel half of every address space.
pub const KERNEL_DIRECTORY_START: usize = 512;

/// Default 4 MiB virtual window reserved for DIRQL-safe temporary mappings.
///
/// The page-directory entry covering this window is owned by the
/// mapping pool for its whole lifetime; it must not be present when the
/// pool is created.
pub const DIRQL_WINDOW: VirtualPage<Size4M> = VirtualPage::from_page_number(0x3FE);

/// Default number of pre-reserved pages handed out at elevated IRQL.
pub const DIRQL_DEFAULT_PAGES: usize = 16;

/// Upper bound for pre-reserved pages; one page table covers the window.
pub const DIRQL_MAX_PAGES: usize = ENTRIES_PER_TABLE;

const _: () = {
    assert!(PAGE_SIZE_SMALL as usize * ENTRIES_PER_TABLE == PAGE_SIZE_LARGE as usize);
    assert!(DIRQL_DEFAULT_PAGES > 0 && DIRQL_DEFAULT_PAGES <= DIRQL_MAX_PAGES);
    assert!(DIRQL_WINDOW.page_number() as usize >= KERNEL_DIRECTORY_START);
};
