//! # Mapped handles
//!
//! A [`Mapped`] value is the caller-visible pointer to something that lives
//! in a physical frame, together with the obligation to unmap that frame.
//! The mapping is released when the handle is dropped, so early returns and
//! `?` paths never leak it.

use crate::PhysMapper;
use crate::page_table::pd::PageDirectoryEntry;
use crate::page_table::pt::PageTableEntry;
use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;
use kernel_memory_addresses::{PageSize, PhysicalPage, Size4K};

/// A `T` inside a frame mapped through a [`PhysMapper`].
#[must_use = "dropping the handle unmaps the frame immediately"]
pub struct Mapped<'m, T, M: PhysMapper> {
    mapper: &'m M,
    frame: PhysicalPage<Size4K>,
    base: NonNull<u8>,
    item: NonNull<T>,
    _owns: PhantomData<&'m mut T>,
}

/// Mapped page-directory entry, as returned by [`AddressSpace::map_in_pde`](crate::AddressSpace::map_in_pde).
pub type MappedPde<'m, M> = Mapped<'m, PageDirectoryEntry, M>;

/// Mapped page-table entry, as returned by [`AddressSpace::map_in_pte`](crate::AddressSpace::map_in_pte).
pub type MappedPte<'m, M> = Mapped<'m, PageTableEntry, M>;

impl<'m, T, M: PhysMapper> Mapped<'m, T, M> {
    /// Map `frame` and point at the `T` stored `offset` bytes into it.
    ///
    /// # Safety
    /// - Passive level only.
    /// - `offset + size_of::<T>()` must not exceed the frame and `offset`
    ///   must be suitably aligned for `T`.
    /// - The bytes at that location must be a valid `T`.
    pub(crate) unsafe fn map_in(mapper: &'m M, frame: PhysicalPage<Size4K>, offset: usize) -> Self {
        debug_assert!(offset + size_of::<T>() <= Size4K::SIZE as usize);
        debug_assert_eq!(offset % align_of::<T>().min(Size4K::SIZE as usize), 0);

        // SAFETY: forwarded to the caller.
        let base = unsafe { mapper.map_frame(frame) };
        // SAFETY: `offset` stays inside the 4 KiB mapping.
        let item = unsafe { base.add(offset) }.cast::<T>();
        Self {
            mapper,
            frame,
            base,
            item,
            _owns: PhantomData,
        }
    }

    /// The physical frame backing this mapping.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage<Size4K> {
        self.frame
    }

    /// Raw pointer to the mapped item.
    #[inline]
    #[must_use]
    pub const fn as_ptr(&self) -> NonNull<T> {
        self.item
    }

    /// Release the mapping. Equivalent to dropping the handle.
    #[inline]
    pub fn map_out(self) {
        drop(self);
    }
}

impl<T, M: PhysMapper> Deref for Mapped<'_, T, M> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: valid and aligned per `map_in`; exclusive through `&mut self`.
        unsafe { self.item.as_ref() }
    }
}

impl<T, M: PhysMapper> DerefMut for Mapped<'_, T, M> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: see `deref`.
        unsafe { self.item.as_mut() }
    }
}

impl<T, M: PhysMapper> Drop for Mapped<'_, T, M> {
    fn drop(&mut self) {
        // SAFETY: `base` was produced by `map_frame(self.frame)` and is not used again.
        unsafe { self.mapper.unmap_frame(self.frame, self.base) };
    }
}

impl<T: fmt::Debug, M: PhysMapper> fmt::Debug for Mapped<'_, T, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapped")
            .field("frame", &self.frame)
            .field("item", &**self)
            .finish()
    }
}
