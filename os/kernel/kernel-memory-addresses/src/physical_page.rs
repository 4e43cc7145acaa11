use crate::{Misaligned, PageOffset, PageSize, PhysicalAddress};
use core::fmt;
use core::marker::PhantomData;

page_type!(
    /// A physical frame of size `S`.
    ///
    /// ```rust
    /// # use kernel_memory_addresses::*;
    /// let frame = PhysicalPage::<Size4K>::from_frame_number(0x39C);
    /// assert_eq!(frame.base().as_u32(), 0x0039_C000);
    /// assert_eq!(frame.to_string(), "0x0039C000/4K");
    /// ```
    PhysicalPage of PhysicalAddress,
    number = frame_number,
    from_number = from_frame_number
);
