use crate::{PageOffset, PageSize, PhysicalPage};
use core::fmt;

address_type!(
    /// A physical memory address.
    ///
    /// Entries store a page-aligned physical base plus flag bits; use
    /// [`split`](Self::split) to reason about base and offset explicitly.
    ///
    /// ```rust
    /// # use kernel_memory_addresses::*;
    /// let pa = PhysicalAddress::new(0x0020_0042);
    /// let (frame, off) = pa.split::<Size4K>();
    /// assert!(frame.base().is_aligned::<Size4K>());
    /// assert_eq!(frame.join(off), pa);
    /// ```
    PhysicalAddress, page = PhysicalPage, tag = "PA"
);
