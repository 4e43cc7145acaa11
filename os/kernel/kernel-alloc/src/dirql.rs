//! # DIRQL entry resolver
//!
//! The same directory/table entry lookups as
//! [`AddressSpace::map_in_pde`](kernel_vmem::AddressSpace::map_in_pde) and
//! [`AddressSpace::map_in_pte`](kernel_vmem::AddressSpace::map_in_pte), but
//! the temporary mapping comes from a [`PagingContext`] slot instead of the
//! general-purpose [`PhysMapper`]. Nothing here allocates, blocks or logs,
//! so the calls are legal at any IRQL.
//!
//! The address space is always the one the context is bound to.

use crate::pool::{PagingContext, PoolPage};
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};
use kernel_vmem::{
    DirectoryIndex, Mmu, PageDirectoryEntry, PageTableEntry, PdeView, PhysMapper, TableIndex,
};

/// Every slot of the [`PagingContext`] is in use.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("DIRQL mapping pool exhausted")]
pub struct PoolExhausted;

/// An entry mapped through a pool slot. The slot is returned when the
/// handle is dropped or passed to [`PagingContext::map_out_entry_dirql`].
#[must_use = "dropping the handle returns its slot immediately"]
pub struct DirqlEntry<'c, 'p, T, P: PhysMapper + Mmu> {
    context: &'c PagingContext<'p, P>,
    page: ManuallyDrop<PoolPage>,
    item: NonNull<T>,
}

/// Directory entry mapped through a pool slot.
pub type DirqlPde<'c, 'p, P> = DirqlEntry<'c, 'p, PageDirectoryEntry, P>;

/// Table entry mapped through a pool slot.
pub type DirqlPte<'c, 'p, P> = DirqlEntry<'c, 'p, PageTableEntry, P>;

impl<'p, P: PhysMapper + Mmu> PagingContext<'p, P> {
    /// Map in the directory entry that governs `va` in the context's space.
    ///
    /// # Errors
    /// [`PoolExhausted`] if no slot is free.
    pub fn map_in_pde_dirql(
        &self,
        va: VirtualAddress,
    ) -> Result<DirqlPde<'_, 'p, P>, PoolExhausted> {
        let directory = self.address_space().page_directory();
        // SAFETY: the entry lies inside the directory frame named by CR3.
        unsafe { self.map_entry(directory, DirectoryIndex::from_address(va).byte_offset()) }
    }

    /// Map in the table entry that governs `va` in the context's space.
    ///
    /// Returns `Ok(None)` if and only if the governing directory entry has
    /// its large-page bit set. The directory entry's slot is returned before
    /// the table is mapped, so a pool with a single free slot suffices.
    ///
    /// # Errors
    /// [`PoolExhausted`] if no slot is free.
    pub fn map_in_pte_dirql(
        &self,
        va: VirtualAddress,
    ) -> Result<Option<DirqlPte<'_, 'p, P>>, PoolExhausted> {
        let pde = *self.map_in_pde_dirql(va)?;
        let PdeView::Table(table) = pde.view() else {
            return Ok(None);
        };

        // SAFETY: the entry lies inside the table frame the PDE references.
        unsafe { self.map_entry(table.page_table(), TableIndex::from_address(va).byte_offset()) }
            .map(Some)
    }

    /// Return the slot of an entry produced by [`map_in_pde_dirql`](Self::map_in_pde_dirql)
    /// or [`map_in_pte_dirql`](Self::map_in_pte_dirql).
    #[inline]
    pub fn map_out_entry_dirql<T>(&self, entry: DirqlEntry<'_, 'p, T, P>) {
        debug_assert!(core::ptr::eq(self, entry.context));
        drop(entry);
    }

    /// # Safety
    /// `offset` must address a valid, aligned `T` inside `frame`.
    unsafe fn map_entry<T>(
        &self,
        frame: PhysicalPage<Size4K>,
        offset: usize,
    ) -> Result<DirqlEntry<'_, 'p, T, P>, PoolExhausted> {
        let page = self.map_frame(frame).ok_or(PoolExhausted)?;
        // SAFETY: forwarded to the caller; the slot maps the whole frame.
        let item = unsafe { page.as_ptr().add(offset) }.cast::<T>();
        Ok(DirqlEntry {
            context: self,
            page: ManuallyDrop::new(page),
            item,
        })
    }
}

impl<T, P: PhysMapper + Mmu> DirqlEntry<'_, '_, T, P> {
    /// Where the entry is temporarily mapped.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn virtual_address(&self) -> VirtualAddress {
        let offset = self.item.as_ptr().addr() - self.page.as_ptr().as_ptr().addr();
        VirtualAddress::new(self.page.virtual_address().as_u32() + offset as u32)
    }
}

impl<T, P: PhysMapper + Mmu> Deref for DirqlEntry<'_, '_, T, P> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: valid and aligned per `map_entry`; exclusive through `&mut self`.
        unsafe { self.item.as_ref() }
    }
}

impl<T, P: PhysMapper + Mmu> DerefMut for DirqlEntry<'_, '_, T, P> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `deref`.
        unsafe { self.item.as_mut() }
    }
}

impl<T, P: PhysMapper + Mmu> Drop for DirqlEntry<'_, '_, T, P> {
    fn drop(&mut self) {
        // SAFETY: `page` is taken exactly once, here.
        let page = unsafe { ManuallyDrop::take(&mut self.page) };
        self.context.free_page(page);
    }
}
