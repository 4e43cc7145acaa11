use crate::{PageOffset, PageSize, VirtualPage};
use core::fmt;

address_type!(
    /// A virtual memory address, as translated by the paging hierarchy.
    ///
    /// ```rust
    /// # use kernel_memory_addresses::*;
    /// let va = VirtualAddress::new(0xFF80_1234);
    /// assert_eq!(va.page::<Size4M>().base().as_u32(), 0xFF80_0000);
    /// assert_eq!(va.offset::<Size4K>().as_u32(), 0x234);
    /// ```
    VirtualAddress, page = VirtualPage, tag = "VA"
);
