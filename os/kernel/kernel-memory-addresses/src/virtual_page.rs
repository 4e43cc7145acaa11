use crate::{Misaligned, PageOffset, PageSize, VirtualAddress};
use core::fmt;
use core::marker::PhantomData;

page_type!(
    /// A virtual page of size `S`.
    ///
    /// ```rust
    /// # use kernel_memory_addresses::*;
    /// let window = VirtualPage::<Size4M>::from_page_number(0x3FE);
    /// assert_eq!(window.base().as_u32(), 0xFF80_0000);
    /// ```
    VirtualPage of VirtualAddress,
    number = page_number,
    from_number = from_page_number
);
